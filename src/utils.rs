// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for homecare

use std::path::{Path, PathBuf};

/// The name of the data directory holding the corpus database
pub const DATA_DIR: &str = ".homecare";

/// Find the directory holding the nearest .homecare folder by walking up
/// from the given path. Returns None if no .homecare directory is found.
pub fn find_data_root(start: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start.as_ref().to_path_buf();

    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    loop {
        if current.join(DATA_DIR).is_dir() {
            return Some(current);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Get the root directory that contains the data directory.
/// Falls back to the given path if none is found.
pub fn get_root_with_data(path: impl AsRef<Path>) -> PathBuf {
    find_data_root(&path).unwrap_or_else(|| path.as_ref().to_path_buf())
}

/// Reduce an uploaded file name to a safe basename.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes `_`.
/// Leading dots are stripped so the result is never hidden or a traversal.
/// If sanitizing loses the original extension, `audio.<ext>` is returned.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    let original_ext = file_extension(base);
    match original_ext {
        Some(ext) if !cleaned.to_lowercase().ends_with(&format!(".{}", ext)) => {
            format!("audio.{}", ext)
        }
        _ if cleaned.is_empty() => "audio".to_string(),
        _ => cleaned,
    }
}

/// Lowercased extension after the last dot, if any.
pub fn file_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}
