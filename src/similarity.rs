// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairwise document comparison.
//!
//! Compares two free-text documents (typically a generated SOAP note and a
//! nurse-written one) by embedding cosine similarity and by BLEU. Long
//! documents can exceed the embedding model's input length; that is reported
//! and logged, never treated as an error.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

use crate::embedding::EmbeddingProvider;
use crate::errors::Result;
use crate::index::cosine_similarity;

const MAX_NGRAM_ORDER: usize = 4;

static BLEU_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+|[^\w\s]").expect("valid regex"));

/// Whether a text fits in the model's input window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Truncation {
    pub truncated: bool,
    pub full_token_count: usize,
    pub used_token_count: usize,
}

/// Full comparison of two documents.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    /// Cosine similarity of the two embeddings, in `[-1, 1]`.
    pub similarity: f32,
    /// BLEU of `b` against `a` as reference, in `[0, 100]`.
    pub bleu: f64,
    pub truncation_a: Truncation,
    pub truncation_b: Truncation,
}

/// Embedding-backed document scorer.
pub struct SimilarityScorer {
    provider: Box<dyn EmbeddingProvider>,
}

impl SimilarityScorer {
    pub fn new(provider: Box<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// Token counts for `text` with and without the model's length limit.
    pub fn is_truncated(&self, text: &str) -> Result<Truncation> {
        let count = self.provider.count_tokens(text)?;
        Ok(Truncation {
            truncated: count.is_truncated(),
            full_token_count: count.full,
            used_token_count: count.used,
        })
    }

    /// Cosine similarity of the embeddings of `a` and `b`.
    ///
    /// Logs a warning when either side is truncated, then scores the
    /// truncated representation.
    pub fn similarity(&mut self, a: &str, b: &str) -> Result<f32> {
        self.warn_if_truncated("a", a)?;
        self.warn_if_truncated("b", b)?;
        self.embedding_similarity(a, b)
    }

    /// Similarity, BLEU and truncation status in one pass.
    pub fn compare(&mut self, a: &str, b: &str) -> Result<Comparison> {
        let truncation_a = self.warn_if_truncated("a", a)?;
        let truncation_b = self.warn_if_truncated("b", b)?;
        Ok(Comparison {
            similarity: self.embedding_similarity(a, b)?,
            bleu: bleu_score(a, b),
            truncation_a,
            truncation_b,
        })
    }

    pub fn into_provider(self) -> Box<dyn EmbeddingProvider> {
        self.provider
    }

    fn embedding_similarity(&mut self, a: &str, b: &str) -> Result<f32> {
        let vectors = self
            .provider
            .embed_batch(&[a.to_string(), b.to_string()])?;
        Ok(cosine_similarity(&vectors[0], &vectors[1]))
    }

    fn warn_if_truncated(&self, name: &str, text: &str) -> Result<Truncation> {
        let truncation = self.is_truncated(text)?;
        if truncation.truncated {
            warn!(
                input = name,
                full_tokens = truncation.full_token_count,
                used_tokens = truncation.used_token_count,
                "input exceeds model length and will be truncated"
            );
        }
        Ok(truncation)
    }
}

/// Collapses a multi-line document into one line: each line trimmed,
/// empty lines dropped, the rest joined with single spaces.
pub fn normalize_for_bleu(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn bleu_tokens(text: &str) -> Vec<&str> {
    BLEU_TOKEN.find_iter(text).map(|m| m.as_str()).collect()
}

/// Corpus BLEU over a single reference/hypothesis pair, on a 0-100 scale.
///
/// Both texts go through [`normalize_for_bleu`] first. Uses clipped n-gram
/// precision up to 4-grams with a brevity penalty and no smoothing; the
/// highest order is capped at the hypothesis length so identical short
/// strings still score 100. Empty input scores 0.
pub fn bleu_score(reference: &str, hypothesis: &str) -> f64 {
    let reference = normalize_for_bleu(reference);
    let hypothesis = normalize_for_bleu(hypothesis);
    let ref_tokens = bleu_tokens(&reference);
    let hyp_tokens = bleu_tokens(&hypothesis);

    if ref_tokens.is_empty() || hyp_tokens.is_empty() {
        return 0.0;
    }

    let max_order = MAX_NGRAM_ORDER.min(hyp_tokens.len());
    let mut log_precision = 0.0;
    for n in 1..=max_order {
        let ref_counts = count_ngrams(&ref_tokens, n);
        let hyp_counts = count_ngrams(&hyp_tokens, n);

        let matched: usize = hyp_counts
            .iter()
            .map(|(gram, &count)| count.min(ref_counts.get(gram).copied().unwrap_or(0)))
            .sum();
        let total = hyp_tokens.len() + 1 - n;
        if matched == 0 {
            return 0.0;
        }
        log_precision += (matched as f64 / total as f64).ln();
    }

    let hyp_len = hyp_tokens.len() as f64;
    let ref_len = ref_tokens.len() as f64;
    let brevity_penalty = if hyp_len > ref_len {
        1.0
    } else {
        (1.0 - ref_len / hyp_len).exp()
    };

    100.0 * brevity_penalty * (log_precision / max_order as f64).exp()
}

fn count_ngrams<'t>(tokens: &'t [&'t str], n: usize) -> HashMap<&'t [&'t str], usize> {
    let mut counts = HashMap::new();
    for gram in tokens.windows(n) {
        *counts.entry(gram).or_insert(0) += 1;
    }
    counts
}
