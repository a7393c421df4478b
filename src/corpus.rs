// SPDX-License-Identifier: MIT OR Apache-2.0

//! Corpus store for FAQ items.
//!
//! `SqliteCorpus` keeps the canonical `faq` table plus a cache of item
//! embeddings, keyed by the provider's cache key, so a rebuild does not
//! re-embed unchanged questions.
//! `MemoryCorpus` is the same contract without a database. `Corpus` is the
//! immutable snapshot that query results are hydrated from.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{FaqError, Result};

/// Questions used by `faq load --sample` and the tests.
pub const SAMPLE_FAQS: [&str; 4] = [
    "How do I reset my password?",
    "What payment methods do you accept?",
    "Can I return an item I bought?",
    "How can I track my order?",
];

/// One retrievable text with its stable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorpusItem {
    pub id: i64,
    pub text: String,
}

impl CorpusItem {
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }

    /// blake3 digest of the text, used to validate cached embeddings.
    pub fn content_hash(&self) -> String {
        blake3::hash(self.text.as_bytes()).to_hex().to_string()
    }
}

/// Backing store the corpus snapshot is loaded from.
///
/// Identifier uniqueness is the store's responsibility.
pub trait CorpusSource {
    /// All items ordered by identifier.
    fn list_items(&self) -> Result<Vec<CorpusItem>>;

    /// Inserts items with caller-chosen identifiers.
    fn insert_items(&mut self, items: &[CorpusItem]) -> Result<()>;
}

/// Immutable id → item view of a corpus at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    items: Vec<CorpusItem>,
    by_id: HashMap<i64, usize>,
}

impl Corpus {
    /// Builds a snapshot, rejecting repeated identifiers.
    pub fn from_items(items: Vec<CorpusItem>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(items.len());
        for (pos, item) in items.iter().enumerate() {
            if by_id.insert(item.id, pos).is_some() {
                return Err(FaqError::DuplicateIdentifier(item.id));
            }
        }
        Ok(Self { items, by_id })
    }

    /// Loads a full snapshot from `source`.
    pub fn load(source: &dyn CorpusSource) -> Result<Self> {
        Self::from_items(source.list_items()?)
    }

    pub fn get(&self, id: i64) -> Option<&CorpusItem> {
        self.by_id.get(&id).map(|&pos| &self.items[pos])
    }

    pub fn items(&self) -> &[CorpusItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// In-memory corpus store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    items: Vec<CorpusItem>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from `(id, text)` pairs.
    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (i64, S)>) -> Self {
        Self {
            items: pairs
                .into_iter()
                .map(|(id, text)| CorpusItem::new(id, text))
                .collect(),
        }
    }
}

impl CorpusSource for MemoryCorpus {
    fn list_items(&self) -> Result<Vec<CorpusItem>> {
        let mut items = self.items.clone();
        items.sort_by_key(|item| item.id);
        Ok(items)
    }

    fn insert_items(&mut self, items: &[CorpusItem]) -> Result<()> {
        let mut seen: HashSet<i64> = self.items.iter().map(|item| item.id).collect();
        for item in items {
            if !seen.insert(item.id) {
                return Err(FaqError::DuplicateIdentifier(item.id));
            }
        }
        self.items.extend_from_slice(items);
        Ok(())
    }
}

/// A cached embedding row for one corpus item.
#[derive(Debug, Clone)]
pub struct CachedEmbedding {
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

/// SQLite-based corpus store.
///
/// Stores items in `.homecare/faq.sqlite` by default.
pub struct SqliteCorpus {
    conn: Connection,
    path: PathBuf,
}

impl SqliteCorpus {
    /// Opens or creates a corpus database at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        let corpus = Self { conn, path };
        corpus.init_schema()?;

        Ok(corpus)
    }

    /// Opens a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let corpus = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        corpus.init_schema()?;
        Ok(corpus)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS faq (
                id INTEGER PRIMARY KEY,
                question TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS faq_embeddings (
                id INTEGER NOT NULL REFERENCES faq(id) ON DELETE CASCADE,
                model TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (id, model)
            );
            "#,
        )?;

        if self.get_meta("schema_version")?.is_none() {
            self.set_meta("schema_version", "1")?;
        }
        Ok(())
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the connection explicitly.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        Ok(())
    }

    /// Appends texts, letting SQLite assign identifiers. Returns the new ids in order.
    pub fn append_texts(&mut self, texts: &[String]) -> Result<Vec<i64>> {
        let tx = self.conn.transaction()?;
        let mut ids = Vec::with_capacity(texts.len());
        {
            let mut stmt = tx.prepare("INSERT INTO faq (question) VALUES (?1)")?;
            for text in texts {
                stmt.execute(params![text])?;
                ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;
        debug!(count = ids.len(), "appended corpus items");
        Ok(ids)
    }

    /// Fetches one item by id.
    pub fn get_item(&self, id: i64) -> Result<Option<CorpusItem>> {
        let item = self
            .conn
            .query_row(
                "SELECT id, question FROM faq WHERE id = ?1",
                params![id],
                |row| {
                    Ok(CorpusItem {
                        id: row.get(0)?,
                        text: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }

    /// Deletes every item and cached embedding.
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            DELETE FROM faq_embeddings;
            DELETE FROM faq;
            "#,
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn rewrite_text(&self, id: i64, text: &str) -> Result<()> {
        self.conn
            .execute("UPDATE faq SET question = ?1 WHERE id = ?2", params![text, id])?;
        Ok(())
    }

    /// Counts corpus items.
    pub fn count_items(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM faq", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Cached embeddings stored under a provider cache key, keyed by item id.
    pub fn cached_embeddings(&self, cache_key: &str) -> Result<HashMap<i64, CachedEmbedding>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, content_hash, embedding
            FROM faq_embeddings
            WHERE model = ?1
            "#,
        )?;

        let rows = stmt
            .query_map(params![cache_key], |row| {
                let blob: Vec<u8> = row.get(2)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    CachedEmbedding {
                        content_hash: row.get(1)?,
                        embedding: Self::blob_to_embedding(&blob),
                    },
                ))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;

        Ok(rows)
    }

    /// Upserts cached embeddings under `cache_key` in one transaction.
    pub fn store_embeddings(
        &mut self,
        cache_key: &str,
        rows: &[(&CorpusItem, &[f32])],
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO faq_embeddings (id, model, content_hash, embedding, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id, model) DO UPDATE SET
                    content_hash = excluded.content_hash,
                    embedding = excluded.embedding,
                    created_at = excluded.created_at
                "#,
            )?;
            for (item, embedding) in rows {
                stmt.execute(params![
                    item.id,
                    cache_key,
                    item.content_hash(),
                    Self::embedding_to_blob(embedding),
                    created_at
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Gets metadata value by key.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Sets metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO meta (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// Converts an embedding vector to a compact blob.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Converts a blob back to an embedding vector.
    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

impl CorpusSource for SqliteCorpus {
    fn list_items(&self) -> Result<Vec<CorpusItem>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, question FROM faq ORDER BY id")?;

        let items = stmt
            .query_map([], |row| {
                Ok(CorpusItem {
                    id: row.get(0)?,
                    text: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    fn insert_items(&mut self, items: &[CorpusItem]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT INTO faq (id, question) VALUES (?1, ?2)")?;
            for item in items {
                stmt.execute(params![item.id, item.text])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}
