// SPDX-License-Identifier: MIT OR Apache-2.0

//! FAQ corpus commands: load, search, list

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cli::OutputFormat;
use homecare::config::Config;
use homecare::corpus::{CorpusItem, CorpusSource, SqliteCorpus, SAMPLE_FAQS};
use homecare::embedding::create_provider;
use homecare::index::Metric;
use homecare::output::{colorize_dim, colorize_id, colorize_score, print_json, use_colors};
use homecare::search::{FaqSearcher, SearchHit};
use homecare::utils::get_root_with_data;

#[derive(Debug, Serialize)]
struct LoadResult {
    database: String,
    added: usize,
    total: u64,
}

#[derive(Debug, Serialize)]
struct SearchResult<'a> {
    query: &'a str,
    k: usize,
    metric: Metric,
    model: &'a str,
    elapsed_ms: u64,
    results: &'a [SearchHit],
}

fn database_path(db: Option<&Path>, config: &Config) -> Result<PathBuf> {
    if let Some(db) = db {
        return Ok(db.to_path_buf());
    }
    let root = get_root_with_data(std::env::current_dir()?);
    Ok(config.corpus().database(&root))
}

fn open_corpus(db: Option<&Path>, config: &Config) -> Result<SqliteCorpus> {
    let path = database_path(db, config)?;
    SqliteCorpus::open(&path)
        .with_context(|| format!("Failed to open corpus database {}", path.display()))
}

/// Reads one question per non-empty, trimmed line.
fn read_questions(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Run `faq load`
pub fn load(
    db: Option<&Path>,
    file: Option<&Path>,
    sample: bool,
    replace: bool,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let config = Config::load();
    let mut corpus = open_corpus(db, &config)?;

    if replace {
        corpus.clear_all()?;
    }

    let added = if sample {
        if corpus.count_items()? == 0 {
            // The sample keeps its canonical ids 1..=4 on an empty corpus.
            let items: Vec<CorpusItem> = SAMPLE_FAQS
                .iter()
                .enumerate()
                .map(|(i, text)| CorpusItem::new(i as i64 + 1, *text))
                .collect();
            corpus.insert_items(&items)?;
            items.len()
        } else {
            let texts: Vec<String> = SAMPLE_FAQS.iter().map(|s| s.to_string()).collect();
            corpus.append_texts(&texts)?.len()
        }
    } else {
        let path = file.context("A question file or --sample is required")?;
        let questions = read_questions(path)?;
        corpus.append_texts(&questions)?.len()
    };

    let result = LoadResult {
        database: corpus.path().display().to_string(),
        added,
        total: corpus.count_items()?,
    };

    match format {
        OutputFormat::Json => print_json(&result, compact)?,
        OutputFormat::Text => {
            println!(
                "{} Added {} question(s), {} in corpus ({})",
                "✓".green(),
                result.added,
                result.total,
                result.database
            );
        }
    }
    Ok(())
}

/// Run `faq search`
pub fn search(
    db: Option<&Path>,
    query: &str,
    k: Option<usize>,
    metric: Option<Metric>,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let config = Config::load();
    let mut corpus = open_corpus(db, &config)?;
    let k = config.merge_k(k);
    let metric = metric.unwrap_or_else(|| config.index().metric());

    let provider =
        create_provider(config.embeddings()).context("Failed to create embedding provider")?;
    let searcher = FaqSearcher::new(provider, metric);

    let started = Instant::now();
    let total = corpus.count_items()?;
    let pb = if format == OutputFormat::Text && total > 0 {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} questions | Embedding")
                .expect("valid progress bar template")
                .progress_chars("##."),
        );
        pb
    } else {
        ProgressBar::hidden()
    };
    let snapshot = searcher.rebuild_cached(&mut corpus, &mut |n| pb.inc(n as u64))?;
    pb.finish_and_clear();

    let hits = searcher.search(query, k)?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match format {
        OutputFormat::Json => {
            let result = SearchResult {
                query,
                k,
                metric,
                model: snapshot.model_id(),
                elapsed_ms,
                results: &hits,
            };
            print_json(&result, compact)?;
        }
        OutputFormat::Text => {
            if snapshot.is_empty() {
                println!(
                    "{} The FAQ corpus is empty. Add questions with `homecare faq load`.",
                    "✗".red()
                );
                return Ok(());
            }
            let use_color = use_colors();
            println!("\n{} {}\n", "🔍".cyan(), query.yellow());
            for (rank, hit) in hits.iter().enumerate() {
                println!(
                    "  {}. [{}] {} {}",
                    rank + 1,
                    colorize_id(hit.id, use_color),
                    hit.text,
                    colorize_score(&format!("({:.4})", hit.distance), use_color)
                );
            }
            println!(
                "\n{}",
                colorize_dim(
                    &format!(
                        "{} of {} question(s), {} distance, {}ms",
                        hits.len(),
                        snapshot.len(),
                        metric,
                        elapsed_ms
                    ),
                    use_color
                )
            );
        }
    }
    Ok(())
}

/// Run `faq list`
pub fn list(db: Option<&Path>, format: OutputFormat, compact: bool) -> Result<()> {
    let config = Config::load();
    let corpus = open_corpus(db, &config)?;
    let items = corpus.list_items()?;

    match format {
        OutputFormat::Json => print_json(&items, compact)?,
        OutputFormat::Text => {
            if items.is_empty() {
                println!("{} The FAQ corpus is empty.", "✗".red());
                return Ok(());
            }
            let use_color = use_colors();
            for item in &items {
                println!("{:>6}  {}", colorize_id(item.id, use_color), item.text);
            }
        }
    }
    Ok(())
}
