//! In-memory [`KnowledgeStore`] implementation for tests and embedding.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`: queries take the
//! read lock and may run concurrently, inserts take the write lock once
//! per chunk. Vector search is brute-force cosine similarity over all
//! stored vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{DeskError, Result};
use crate::models::{Chunk, Document, EmbeddingRecord, SearchHit};

use super::{top_k, KnowledgeStore, StoreCounts};

struct StoredChunk {
    chunk: Chunk,
    source_path: String,
    vector: Vec<f32>,
}

/// In-memory knowledge store.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> DeskError {
    DeskError::store("in-memory store lock poisoned")
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        let mut docs = self.docs.write().map_err(poisoned)?;
        docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn insert_chunk(&self, chunk: &Chunk, embedding: &EmbeddingRecord) -> Result<()> {
        let source_path = {
            let docs = self.docs.read().map_err(poisoned)?;
            docs.get(&chunk.document_id)
                .map(|d| d.source_path.clone())
                .ok_or_else(|| DeskError::NotFound(format!("document {}", chunk.document_id)))?
        };
        let mut chunks = self.chunks.write().map_err(poisoned)?;
        chunks.push(StoredChunk {
            chunk: chunk.clone(),
            source_path,
            vector: embedding.vector.clone(),
        });
        Ok(())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        let candidates = chunks
            .iter()
            .enumerate()
            .map(|(seq, sc)| {
                let score = cosine_similarity(query, &sc.vector) as f64;
                (
                    seq as i64,
                    SearchHit {
                        chunk_id: sc.chunk.id.clone(),
                        document_id: sc.chunk.document_id.clone(),
                        source_path: sc.source_path.clone(),
                        chunk_index: sc.chunk.chunk_index,
                        text: sc.chunk.text.clone(),
                        score,
                        distance: 1.0 - score,
                    },
                )
            })
            .collect();
        Ok(top_k(candidates, k))
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let documents = self.docs.read().map_err(poisoned)?.len() as u64;
        let chunks = self.chunks.read().map_err(poisoned)?.len() as u64;
        Ok(StoreCounts { documents, chunks })
    }

    async fn reset(&self) -> Result<()> {
        self.chunks.write().map_err(poisoned)?.clear();
        self.docs.write().map_err(poisoned)?.clear();
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}
