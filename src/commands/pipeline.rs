// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transcription and report commands

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use homecare::config::Config;
use homecare::output::{colorize_heading, print_json, use_colors};
use homecare::report::{
    process_recording, CommandReportGenerator, CommandTranscriber, ReportGenerator, Transcriber,
};

#[derive(Serialize)]
struct TranscriptResult {
    transcript: String,
}

#[derive(Serialize)]
struct ReportResult {
    report: String,
}

/// Run `transcribe`
pub fn transcribe(audio: &Path, format: OutputFormat, compact: bool) -> Result<()> {
    let config = Config::load();
    let transcriber = CommandTranscriber::new(config.pipeline().transcribe_command());
    let transcript = transcriber
        .transcribe(audio)
        .with_context(|| format!("Failed to transcribe {}", audio.display()))?;

    match format {
        OutputFormat::Json => print_json(&TranscriptResult { transcript }, compact)?,
        OutputFormat::Text => println!("{}", transcript),
    }
    Ok(())
}

/// Run `report`
pub fn report(transcript_path: &Path, format: OutputFormat, compact: bool) -> Result<()> {
    let config = Config::load();
    let transcript = std::fs::read_to_string(transcript_path)
        .with_context(|| format!("Failed to read {}", transcript_path.display()))?;
    let generator = CommandReportGenerator::new(config.pipeline().report_command());
    let report = generator
        .generate_report(&transcript)
        .context("Failed to generate report")?;

    match format {
        OutputFormat::Json => print_json(&ReportResult { report }, compact)?,
        OutputFormat::Text => println!("{}", report),
    }
    Ok(())
}

/// Run `process`
pub fn process(audio: &Path, format: OutputFormat, compact: bool) -> Result<()> {
    let config = Config::load();
    let transcriber = CommandTranscriber::new(config.pipeline().transcribe_command());
    let generator = CommandReportGenerator::new(config.pipeline().report_command());
    let processed = process_recording(&transcriber, &generator, audio)
        .with_context(|| format!("Failed to process {}", audio.display()))?;

    match format {
        OutputFormat::Json => print_json(&processed, compact)?,
        OutputFormat::Text => {
            let use_color = use_colors();
            println!("{}", colorize_heading("# Transcript", use_color));
            println!("{}\n", processed.transcript);
            println!("{}", colorize_heading("# Report", use_color));
            println!("{}", processed.report);
        }
    }
    Ok(())
}
