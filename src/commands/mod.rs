// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command implementations for the homecare binary

pub mod compare;
pub mod faq;
pub mod pipeline;
pub mod serve;

use homecare::config::{Config, ConfigOutputFormat};

use crate::cli::OutputFormat;

/// CLI flag first, then `default_format` from config, then text.
pub fn resolve_format(flag: Option<OutputFormat>, config: &Config) -> OutputFormat {
    flag.unwrap_or(match config.output_format() {
        Some(ConfigOutputFormat::Json) => OutputFormat::Json,
        Some(ConfigOutputFormat::Text) | None => OutputFormat::Text,
    })
}
