// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use homecare::index::Metric;
use std::path::PathBuf;

/// homecare - FAQ retrieval and SOAP note tooling for home-visit nursing
///
/// Answers questions against a small FAQ corpus with sentence embeddings,
/// compares generated notes with nurse-written ones, and turns visit
/// recordings into SOAP-format records.
#[derive(Parser, Debug)]
#[command(name = "homecare")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum FaqCommands {
    /// Add questions to the corpus, one per non-empty line
    Load {
        /// Text file with one question per line
        #[arg(required_unless_present = "sample")]
        file: Option<PathBuf>,

        /// Load the built-in sample FAQ instead of a file
        #[arg(long, conflicts_with = "file")]
        sample: bool,

        /// Remove existing questions first
        #[arg(long)]
        replace: bool,
    },

    /// Find the questions closest to a query
    #[command(alias = "s")]
    Search {
        /// Query text
        query: String,

        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,

        /// Distance metric (l2 or cosine)
        #[arg(long)]
        metric: Option<Metric>,
    },

    /// List every question in the corpus
    List,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// FAQ corpus and retrieval
    Faq {
        /// Corpus database (defaults to .homecare/faq.sqlite)
        #[arg(long, global = true)]
        db: Option<PathBuf>,

        #[command(subcommand)]
        command: FaqCommands,
    },

    /// Compare two documents by embedding similarity and BLEU
    Similarity {
        /// Reference document
        a: PathBuf,

        /// Document compared against the reference
        b: PathBuf,
    },

    /// Transcribe an audio recording
    Transcribe {
        /// Audio file (m4a, mp3, wav, mp4)
        audio: PathBuf,
    },

    /// Generate a SOAP note from a transcript file
    Report {
        /// Transcript text file
        transcript: PathBuf,
    },

    /// Transcribe a recording and generate its SOAP note
    Process {
        /// Audio file (m4a, mp3, wav, mp4)
        audio: PathBuf,
    },

    /// Run the recording upload server
    Serve {
        /// Listen address (defaults to 0.0.0.0:5000)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
