// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns text into fixed-length vectors
//!
//! Providers wrap a local sentence-transformer, an external command, or a
//! deterministic hashing model used for tests and offline runs.

pub mod provider;

pub use provider::{
    create_provider, CommandProvider, EmbeddingProvider, EmbeddingProviderConfig, FastEmbedder,
    HashingProvider, TokenCount, DEFAULT_EMBEDDING_DIM, DEFAULT_MAX_INPUT_TOKENS,
};

pub(crate) use provider::run_json_command;
