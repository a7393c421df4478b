// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compare two documents

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use crate::cli::OutputFormat;
use homecare::config::Config;
use homecare::embedding::create_provider;
use homecare::output::{colorize_heading, colorize_score, colorize_warning, print_json, use_colors};
use homecare::similarity::{SimilarityScorer, Truncation};

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn describe(truncation: &Truncation) -> String {
    if truncation.truncated {
        format!(
            "truncated ({} of {} tokens used)",
            truncation.used_token_count, truncation.full_token_count
        )
    } else {
        format!("{} tokens", truncation.full_token_count)
    }
}

/// Run `similarity`
pub fn run(a: &Path, b: &Path, format: OutputFormat, compact: bool) -> Result<()> {
    let config = Config::load();
    let text_a = read_document(a)?;
    let text_b = read_document(b)?;

    let provider =
        create_provider(config.embeddings()).context("Failed to create embedding provider")?;
    let mut scorer = SimilarityScorer::new(provider);
    let comparison = scorer.compare(&text_a, &text_b)?;

    match format {
        OutputFormat::Json => print_json(&comparison, compact)?,
        OutputFormat::Text => {
            let use_color = use_colors();
            println!(
                "{} {:.4}",
                colorize_heading("Cosine similarity:", use_color),
                comparison.similarity
            );
            println!(
                "{} {}",
                colorize_heading("BLEU:", use_color),
                colorize_score(&format!("{:.2}", comparison.bleu), use_color)
            );
            for (path, truncation) in [(a, &comparison.truncation_a), (b, &comparison.truncation_b)]
            {
                let status = describe(truncation);
                let status = if truncation.truncated {
                    colorize_warning(&status, use_color)
                } else {
                    status
                };
                println!("  {} {}", path.display().to_string().cyan(), status);
            }
        }
    }
    Ok(())
}
