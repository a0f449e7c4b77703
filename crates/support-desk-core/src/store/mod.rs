//! Storage abstraction for the knowledge base.
//!
//! The [`KnowledgeStore`] trait defines the persistence operations the
//! knowledge base needs: documents, per-chunk embedding records, nearest
//! neighbour queries, counts and reset. Backends are pluggable (SQLite in
//! the app crate, [`memory::InMemoryStore`] here).
//!
//! Implementations must be `Send + Sync`; queries may run concurrently
//! while writes are serialized per chunk by the backend.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Chunk, Document, EmbeddingRecord, SearchHit};

/// Row counts reported by [`KnowledgeStore::counts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub documents: u64,
    pub chunks: u64,
}

/// Abstract storage backend for the knowledge base.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](KnowledgeStore::insert_document) | Persist a document's metadata and text |
/// | [`insert_chunk`](KnowledgeStore::insert_chunk) | Persist one chunk and its vector atomically |
/// | [`nearest`](KnowledgeStore::nearest) | k nearest chunks by cosine distance |
/// | [`counts`](KnowledgeStore::counts) | Document and chunk counts |
/// | [`reset`](KnowledgeStore::reset) | Delete everything (idempotent) |
/// | [`ping`](KnowledgeStore::ping) | Reachability check |
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Short backend name for status output (e.g. `"sqlite"`).
    fn backend(&self) -> &str;

    /// Persist a document. Must be called before its chunks are inserted.
    async fn insert_document(&self, doc: &Document) -> Result<()>;

    /// Persist one chunk together with its embedding.
    ///
    /// Either both are stored or neither is. Earlier chunks of the same
    /// document are unaffected by a failure here.
    async fn insert_chunk(&self, chunk: &Chunk, embedding: &EmbeddingRecord) -> Result<()>;

    /// Return up to `k` chunks ordered by ascending cosine distance to
    /// `query`, ties broken by insertion order (earliest first).
    ///
    /// An empty store yields an empty vector.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    async fn counts(&self) -> Result<StoreCounts>;

    /// Delete all documents, chunks and vectors. Idempotent.
    async fn reset(&self) -> Result<()>;

    async fn ping(&self) -> bool;
}

/// Select the `k` best candidates.
///
/// Each candidate carries its insertion sequence number. Sorting is by
/// ascending distance, then ascending sequence; the sort is stable and
/// NaN distances sort last.
pub fn top_k(mut candidates: Vec<(i64, SearchHit)>, k: usize) -> Vec<SearchHit> {
    candidates.sort_by(|(seq_a, a), (seq_b, b)| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or_else(|| a.distance.is_nan().cmp(&b.distance.is_nan()))
            .then(seq_a.cmp(seq_b))
    });
    candidates.truncate(k);
    candidates.into_iter().map(|(_, hit)| hit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, distance: f64) -> SearchHit {
        SearchHit {
            chunk_id: id.to_string(),
            document_id: "d".to_string(),
            source_path: "p".to_string(),
            chunk_index: 0,
            text: id.to_string(),
            score: 1.0 - distance,
            distance,
        }
    }

    #[test]
    fn test_top_k_orders_by_distance_then_sequence() {
        let ranked = top_k(
            vec![
                (3, hit("c", 0.2)),
                (1, hit("a", 0.5)),
                (2, hit("b", 0.2)),
                (0, hit("z", f64::NAN)),
            ],
            3,
        );
        let ids: Vec<_> = ranked.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_top_k_zero_and_short() {
        assert!(top_k(vec![(0, hit("a", 0.1))], 0).is_empty());
        assert_eq!(top_k(vec![(0, hit("a", 0.1))], 5).len(), 1);
    }
}
