// SPDX-License-Identifier: MIT OR Apache-2.0

//! homecare - FAQ retrieval and SOAP note tooling
//!
//! Sentence-embedding FAQ search over a SQLite corpus, document comparison
//! by cosine similarity and BLEU, and transcription-to-SOAP-note processing
//! from the command line or an upload server.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands, FaqCommands};
use homecare::config::Config;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with HOMECARE_LOG env var (e.g., HOMECARE_LOG=debug homecare faq search "query")
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("HOMECARE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let format = commands::resolve_format(cli.format, &Config::load());
    let compact = cli.compact;

    match cli.command {
        Commands::Faq { db, command } => match command {
            FaqCommands::Load {
                file,
                sample,
                replace,
            } => {
                commands::faq::load(
                    db.as_deref(),
                    file.as_deref(),
                    sample,
                    replace,
                    format,
                    compact,
                )?;
            }
            FaqCommands::Search { query, k, metric } => {
                commands::faq::search(db.as_deref(), &query, k, metric, format, compact)?;
            }
            FaqCommands::List => {
                commands::faq::list(db.as_deref(), format, compact)?;
            }
        },
        Commands::Similarity { a, b } => {
            commands::compare::run(&a, &b, format, compact)?;
        }
        Commands::Transcribe { audio } => {
            commands::pipeline::transcribe(&audio, format, compact)?;
        }
        Commands::Report { transcript } => {
            commands::pipeline::report(&transcript, format, compact)?;
        }
        Commands::Process { audio } => {
            commands::pipeline::process(&audio, format, compact)?;
        }
        Commands::Serve { bind } => {
            commands::serve::run(bind)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "homecare", &mut std::io::stdout());
        }
    }

    Ok(())
}
