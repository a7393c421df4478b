// SPDX-License-Identifier: MIT OR Apache-2.0

//! FAQ query pipeline.
//!
//! `search` is the stateless form: embed the query, ask the index for the k
//! nearest ids, hydrate each id from the corpus snapshot. `FaqSearcher` owns
//! a provider and a current snapshot (corpus + index built together) and
//! swaps in a freshly built snapshot on rebuild, so readers never observe a
//! half-built index or an index that disagrees with its corpus.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::corpus::{Corpus, CorpusItem, CorpusSource, SqliteCorpus};
use crate::embedding::EmbeddingProvider;
use crate::errors::{FaqError, Result};
use crate::index::{Metric, Neighbor, VectorIndex};

/// A hydrated query hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub text: String,
    pub distance: f32,
}

impl SearchHit {
    fn hydrate(neighbor: Neighbor, corpus: &Corpus) -> Result<Self> {
        let item = corpus
            .get(neighbor.id)
            .ok_or(FaqError::UnknownIdentifier(neighbor.id))?;
        Ok(Self {
            id: item.id,
            text: item.text.clone(),
            distance: neighbor.distance,
        })
    }
}

/// Runs one query against an index and the corpus it was built from.
///
/// Fails with `UnknownIdentifier` if the index yields an id the corpus does
/// not contain.
pub fn search(
    provider: &mut dyn EmbeddingProvider,
    query_text: &str,
    k: usize,
    index: &VectorIndex,
    corpus: &Corpus,
) -> Result<Vec<SearchHit>> {
    let query = provider.embed(query_text)?;
    let neighbors = index.query(&query, k)?;
    debug!(?neighbors, "index neighbours");

    neighbors
        .into_iter()
        .map(|neighbor| SearchHit::hydrate(neighbor, corpus))
        .collect()
}

/// Embeds `items` in provider-sized batches, preserving order.
///
/// `on_batch` is called with the number of items finished after each batch.
pub fn embed_items(
    provider: &mut dyn EmbeddingProvider,
    items: &[CorpusItem],
    on_batch: &mut dyn FnMut(usize),
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(items.len());
    for chunk in items.chunks(provider.batch_size().max(1)) {
        let texts: Vec<String> = chunk.iter().map(|item| item.text.clone()).collect();
        let embedded = provider.embed_batch(&texts)?;
        if embedded.len() != texts.len() {
            return Err(FaqError::ModelUnavailable(format!(
                "provider returned {} vectors for {} texts",
                embedded.len(),
                texts.len()
            )));
        }
        vectors.extend(embedded);
        on_batch(chunk.len());
    }
    Ok(vectors)
}

/// A corpus snapshot and the index built from exactly that snapshot.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    corpus: Corpus,
    index: Option<VectorIndex>,
    model_id: String,
}

impl IndexSnapshot {
    /// Builds a snapshot from a corpus and one vector per item, in corpus order.
    pub fn new(
        corpus: Corpus,
        vectors: Vec<Vec<f32>>,
        metric: Metric,
        model_id: impl Into<String>,
    ) -> Result<Self> {
        if vectors.len() != corpus.len() {
            return Err(FaqError::InvalidArgument(format!(
                "{} vectors for {} corpus items",
                vectors.len(),
                corpus.len()
            )));
        }
        let pairs = corpus
            .items()
            .iter()
            .map(|item| item.id)
            .zip(vectors);
        let index = VectorIndex::build_with_metric(pairs, metric)?;

        Ok(Self {
            corpus,
            index: Some(index),
            model_id: model_id.into(),
        })
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }
}

/// Owns an embedding provider and the current searchable snapshot.
pub struct FaqSearcher {
    provider: Mutex<Box<dyn EmbeddingProvider>>,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    metric: Metric,
}

impl FaqSearcher {
    /// Creates a searcher with an empty snapshot.
    pub fn new(provider: Box<dyn EmbeddingProvider>, metric: Metric) -> Self {
        Self {
            provider: Mutex::new(provider),
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
            metric,
        }
    }

    /// Current snapshot. Holding the returned `Arc` pins it across rebuilds.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().clone()
    }

    /// Reloads the full corpus from `source`, re-embeds it and swaps the snapshot.
    pub fn rebuild(&self, source: &dyn CorpusSource) -> Result<Arc<IndexSnapshot>> {
        self.rebuild_with_progress(source, &mut |_| {})
    }

    pub fn rebuild_with_progress(
        &self,
        source: &dyn CorpusSource,
        on_batch: &mut dyn FnMut(usize),
    ) -> Result<Arc<IndexSnapshot>> {
        let started = Instant::now();
        let corpus = Corpus::load(source)?;

        let (vectors, model_id) = {
            let mut provider = self.provider.lock();
            let vectors = embed_items(&mut **provider, corpus.items(), on_batch)?;
            (vectors, provider.model_id().to_string())
        };

        self.finish_rebuild(corpus, vectors, model_id, started)
    }

    /// Like `rebuild`, reusing embeddings cached in the SQLite store when the
    /// item text and the provider's cache key are unchanged, and caching the
    /// ones it computes.
    pub fn rebuild_cached(
        &self,
        store: &mut SqliteCorpus,
        on_batch: &mut dyn FnMut(usize),
    ) -> Result<Arc<IndexSnapshot>> {
        let started = Instant::now();
        let corpus = Corpus::load(&*store)?;

        let mut provider = self.provider.lock();
        let model_id = provider.model_id().to_string();
        let cache_key = provider.cache_key();
        let dimension = provider.dimension();
        let mut cached = store.cached_embeddings(&cache_key)?;

        let mut slots: Vec<Option<Vec<f32>>> = Vec::with_capacity(corpus.len());
        let mut missing: Vec<CorpusItem> = Vec::new();
        for item in corpus.items() {
            match cached.remove(&item.id) {
                Some(hit)
                    if hit.content_hash == item.content_hash()
                        && hit.embedding.len() == dimension =>
                {
                    on_batch(1);
                    slots.push(Some(hit.embedding));
                }
                _ => {
                    missing.push(item.clone());
                    slots.push(None);
                }
            }
        }

        let fresh = embed_items(&mut **provider, &missing, on_batch)?;
        drop(provider);
        debug!(
            reused = corpus.len() - missing.len(),
            embedded = missing.len(),
            "resolved corpus embeddings"
        );

        let rows: Vec<(&CorpusItem, &[f32])> = missing
            .iter()
            .zip(fresh.iter())
            .map(|(item, vector)| (item, vector.as_slice()))
            .collect();
        store.store_embeddings(&cache_key, &rows)?;

        let mut fresh = fresh.into_iter();
        let vectors = slots
            .into_iter()
            .map(|slot| slot.or_else(|| fresh.next()).unwrap_or_default())
            .collect();

        self.finish_rebuild(corpus, vectors, model_id, started)
    }

    fn finish_rebuild(
        &self,
        corpus: Corpus,
        vectors: Vec<Vec<f32>>,
        model_id: String,
        started: Instant,
    ) -> Result<Arc<IndexSnapshot>> {
        let snapshot = Arc::new(IndexSnapshot::new(corpus, vectors, self.metric, model_id)?);
        *self.snapshot.write() = snapshot.clone();
        info!(
            items = snapshot.len(),
            metric = %self.metric,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rebuilt FAQ index"
        );
        Ok(snapshot)
    }

    /// Answers `query_text` against the current snapshot.
    pub fn search(&self, query_text: &str, k: usize) -> Result<Vec<SearchHit>> {
        let snapshot = self.snapshot();
        let Some(index) = snapshot.index() else {
            if k == 0 {
                return Err(FaqError::InvalidArgument("k must be positive".to_string()));
            }
            return Ok(Vec::new());
        };

        let mut provider = self.provider.lock();
        search(&mut **provider, query_text, k, index, snapshot.corpus())
    }

    /// Releases the searcher, handing back its provider.
    pub fn into_provider(self) -> Box<dyn EmbeddingProvider> {
        self.provider.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{MemoryCorpus, SAMPLE_FAQS};
    use crate::embedding::{HashingProvider, TokenCount};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how many texts reach the wrapped provider.
    struct CountingProvider {
        inner: HashingProvider,
        embedded: Arc<AtomicUsize>,
    }

    impl CountingProvider {
        fn new(inner: HashingProvider) -> (Self, Arc<AtomicUsize>) {
            let embedded = Arc::new(AtomicUsize::new(0));
            let provider = Self {
                inner,
                embedded: embedded.clone(),
            };
            (provider, embedded)
        }
    }

    impl EmbeddingProvider for CountingProvider {
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn batch_size(&self) -> usize {
            self.inner.batch_size()
        }

        fn max_input_tokens(&self) -> usize {
            self.inner.max_input_tokens()
        }

        fn cache_key(&self) -> String {
            self.inner.cache_key()
        }

        fn embed_batch(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed_batch(texts)
        }

        fn count_tokens(&self, text: &str) -> Result<TokenCount> {
            self.inner.count_tokens(text)
        }
    }

    fn counting_searcher(inner: HashingProvider) -> (FaqSearcher, Arc<AtomicUsize>) {
        let (provider, embedded) = CountingProvider::new(inner);
        (FaqSearcher::new(Box::new(provider), Metric::L2), embedded)
    }

    fn sample_store() -> SqliteCorpus {
        let mut store = SqliteCorpus::open_in_memory().unwrap();
        let texts: Vec<String> = SAMPLE_FAQS.iter().map(|s| s.to_string()).collect();
        store.append_texts(&texts).unwrap();
        store
    }

    fn sample_source() -> MemoryCorpus {
        MemoryCorpus::from_pairs(
            SAMPLE_FAQS
                .iter()
                .enumerate()
                .map(|(i, text)| (i as i64 + 1, *text)),
        )
    }

    fn searcher() -> FaqSearcher {
        FaqSearcher::new(Box::new(HashingProvider::new(4096)), Metric::L2)
    }

    #[test]
    fn password_question_ranks_first() {
        let searcher = searcher();
        searcher.rebuild(&sample_source()).unwrap();

        let hits = searcher.search("How can I change my password?", 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, 1);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn exact_question_has_zero_distance() {
        let searcher = searcher();
        searcher.rebuild(&sample_source()).unwrap();

        let hits = searcher.search("Can I return an item I bought?", 1).unwrap();
        assert_eq!(hits[0].id, 3);
        assert!(hits[0].distance.abs() < 1e-5);
    }

    #[test]
    fn k_larger_than_corpus_returns_all() {
        let searcher = searcher();
        searcher.rebuild(&sample_source()).unwrap();
        assert_eq!(searcher.search("order", 10).unwrap().len(), 4);
    }

    #[test]
    fn empty_searcher_returns_nothing() {
        let searcher = searcher();
        assert!(searcher.search("anything", 3).unwrap().is_empty());
        assert!(searcher.search("anything", 0).is_err());
    }

    #[test]
    fn desynchronized_index_is_reported() {
        let mut provider = HashingProvider::new(32);
        let index = VectorIndex::build(vec![(99, provider.embed("ghost").unwrap())]).unwrap();
        let corpus = Corpus::from_items(vec![CorpusItem::new(1, "real")]).unwrap();

        let err = search(&mut provider, "ghost", 1, &index, &corpus).unwrap_err();
        assert!(matches!(err, FaqError::UnknownIdentifier(99)));
    }

    #[test]
    fn rebuild_swaps_without_disturbing_pinned_snapshot() {
        let searcher = searcher();
        searcher.rebuild(&sample_source()).unwrap();
        let pinned = searcher.snapshot();

        let mut source = sample_source();
        source
            .insert_items(&[CorpusItem::new(5, "Do you ship overseas?")])
            .unwrap();
        searcher.rebuild(&source).unwrap();

        assert_eq!(pinned.len(), 4);
        assert_eq!(searcher.snapshot().len(), 5);
        assert_eq!(searcher.search("ship overseas", 1).unwrap()[0].id, 5);
    }

    #[test]
    fn rebuild_cached_skips_unchanged_items() {
        let mut store = sample_store();
        let (searcher, embedded) = counting_searcher(HashingProvider::new(4096));

        let mut progress = 0;
        searcher
            .rebuild_cached(&mut store, &mut |n| progress += n)
            .unwrap();
        assert_eq!(progress, 4);
        assert_eq!(embedded.load(Ordering::SeqCst), 4);
        assert_eq!(searcher.search("track my order", 1).unwrap()[0].id, 4);

        let snapshot = searcher.rebuild_cached(&mut store, &mut |_| {}).unwrap();
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.model_id(), "hashing-4096");
        assert_eq!(embedded.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn rebuild_cached_reembeds_edited_item() {
        let mut store = sample_store();
        let (searcher, embedded) = counting_searcher(HashingProvider::new(4096));
        searcher.rebuild_cached(&mut store, &mut |_| {}).unwrap();

        store.rewrite_text(2, "Do you ship overseas?").unwrap();
        searcher.rebuild_cached(&mut store, &mut |_| {}).unwrap();
        assert_eq!(embedded.load(Ordering::SeqCst), 5);

        let hits = searcher.search("Do you ship overseas?", 1).unwrap();
        assert_eq!(hits[0].id, 2);
        assert!(hits[0].distance.abs() < 1e-5);
    }

    #[test]
    fn rebuild_cached_ignores_vectors_from_other_settings() {
        let mut store = sample_store();
        let (short, _) = counting_searcher(HashingProvider::new(64).with_max_tokens(3));
        short.rebuild_cached(&mut store, &mut |_| {}).unwrap();

        // Same model id, different truncation: nothing cached may be reused.
        let (searcher, embedded) = counting_searcher(HashingProvider::new(64));
        searcher.rebuild_cached(&mut store, &mut |_| {}).unwrap();
        assert_eq!(embedded.load(Ordering::SeqCst), 4);

        let uncached = FaqSearcher::new(Box::new(HashingProvider::new(64)), Metric::L2);
        uncached.rebuild(&store).unwrap();

        let query = SAMPLE_FAQS[0];
        let cached_hits = searcher.search(query, 2).unwrap();
        assert_eq!(cached_hits, uncached.search(query, 2).unwrap());
        assert_eq!(cached_hits[0].id, 1);
        assert!(cached_hits[0].distance.abs() < 1e-5);
        assert!(cached_hits[1].distance > 1e-3);
    }

    #[test]
    fn snapshot_rejects_vector_count_mismatch() {
        let corpus = Corpus::from_items(vec![CorpusItem::new(1, "a")]).unwrap();
        assert!(IndexSnapshot::new(corpus, Vec::new(), Metric::L2, "m").is_err());
    }
}
