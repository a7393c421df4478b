// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by the retrieval core and its collaborators.

use thiserror::Error;

/// Result alias for library operations.
pub type Result<T> = std::result::Result<T, FaqError>;

/// Errors surfaced by the embedding, index, corpus and pipeline layers.
///
/// Nothing in the library retries on these; the caller decides.
#[derive(Debug, Error)]
pub enum FaqError {
    /// The embedding or generation backend could not be loaded or reached.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Input text could not be encoded by the backend.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A vector's length disagrees with the index dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The index returned an identifier missing from the corpus snapshot.
    #[error("index returned identifier {0} which is not in the corpus")]
    UnknownIdentifier(i64),

    /// The same identifier was supplied twice to an index build.
    #[error("duplicate identifier {0} in index build")]
    DuplicateIdentifier(i64),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output from an external backend did not match the expected shape.
    #[error("failed to parse {what}: {reason}")]
    Parse { what: &'static str, reason: String },

    /// A transcription or report command failed.
    #[error("{0}")]
    Collaborator(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FaqError {
    pub(crate) fn parse(what: &'static str, reason: impl std::fmt::Display) -> Self {
        FaqError::Parse {
            what,
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the request itself was bad rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FaqError::Encoding(_)
                | FaqError::InvalidArgument(_)
                | FaqError::DimensionMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_message_names_both_sizes() {
        let err = FaqError::DimensionMismatch {
            expected: 384,
            actual: 383,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 384, got 383");
        assert!(err.is_client_error());
    }

    #[test]
    fn unknown_identifier_is_not_a_client_error() {
        assert!(!FaqError::UnknownIdentifier(7).is_client_error());
    }
}
