// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output and color utilities for consistent terminal formatting
//!
//! Provides shared color functions respecting NO_COLOR environment variable.

use colored::Colorize;
use serde::Serialize;

/// Check if colors should be used (respects NO_COLOR env var)
pub fn use_colors() -> bool {
    std::env::var("NO_COLOR").is_err()
}

/// Colorize an identifier (yellow)
pub fn colorize_id(id: i64, use_color: bool) -> String {
    if use_color {
        id.to_string().yellow().to_string()
    } else {
        id.to_string()
    }
}

/// Colorize a distance or score (cyan)
pub fn colorize_score(text: &str, use_color: bool) -> String {
    if use_color {
        text.cyan().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a section heading (bold)
pub fn colorize_heading(text: &str, use_color: bool) -> String {
    if use_color {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize a warning (yellow bold)
pub fn colorize_warning(text: &str, use_color: bool) -> String {
    if use_color {
        text.yellow().bold().to_string()
    } else {
        text.to_string()
    }
}

/// Colorize secondary detail (dimmed)
pub fn colorize_dim(text: &str, use_color: bool) -> String {
    if use_color {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

/// Print a value as JSON on stdout, pretty unless `compact`.
pub fn print_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> serde_json::Result<()> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_output_is_unchanged() {
        assert_eq!(colorize_id(7, false), "7");
        assert_eq!(colorize_score("0.25", false), "0.25");
        assert_eq!(colorize_heading("Results", false), "Results");
        assert_eq!(colorize_dim("(cached)", false), "(cached)");
    }
}
