// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end checks against the real sentence-transformer.
//!
//! These download the model on first run: `cargo test -- --ignored`.

use homecare::corpus::{MemoryCorpus, SAMPLE_FAQS};
use homecare::embedding::{EmbeddingProvider, EmbeddingProviderConfig, FastEmbedder};
use homecare::index::Metric;
use homecare::search::FaqSearcher;
use homecare::similarity::SimilarityScorer;

fn embedder() -> FastEmbedder {
    FastEmbedder::new(EmbeddingProviderConfig::default()).expect("load fastembed model")
}

#[test]
#[ignore]
fn password_question_matches_reset_faq() {
    let corpus = MemoryCorpus::from_pairs(
        SAMPLE_FAQS
            .iter()
            .enumerate()
            .map(|(i, text)| (i as i64 + 1, *text)),
    );
    let searcher = FaqSearcher::new(Box::new(embedder()), Metric::L2);
    searcher.rebuild(&corpus).expect("rebuild");

    let hits = searcher
        .search("How can I change my password?", 3)
        .expect("search");
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].id, 1);
}

#[test]
#[ignore]
fn embeddings_have_model_dimension() {
    let mut provider = embedder();
    let vector = provider.embed("Patient slept well.").expect("embed");
    assert_eq!(vector.len(), provider.dimension());
}

#[test]
#[ignore]
fn truncation_uses_model_tokenizer() {
    let scorer = SimilarityScorer::new(Box::new(embedder()));

    let short = scorer
        .is_truncated("The patient slept well today.")
        .expect("count");
    assert!(!short.truncated);
    assert_eq!(short.full_token_count, short.used_token_count);

    let long = scorer
        .is_truncated(&"word ".repeat(1000))
        .expect("count");
    assert!(long.truncated);
    assert!(long.full_token_count > long.used_token_count);
}
