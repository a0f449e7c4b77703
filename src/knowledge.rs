//! Knowledge base service: ingestion, retrieval and maintenance.
//!
//! Glues the [`Chunker`], an [`Embedder`] and a [`KnowledgeStore`]
//! backend together.
//!
//! # Ingestion
//!
//! ```text
//! Document → insert_document → chunk → embed (batches) → insert_chunk × N
//! ```
//!
//! Each chunk is persisted together with its vector. If an embedding batch
//! or a chunk insert fails partway, chunks stored before the failure stay
//! in place and are searchable; the error is returned to the caller.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use walkdir::WalkDir;

use support_desk_core::chunk::Chunker;
use support_desk_core::embedding::{embed_one, Embedder};
use support_desk_core::models::{Document, DocumentFormat, EmbeddingRecord, SearchHit};
use support_desk_core::store::KnowledgeStore;
use support_desk_core::{DeskError, Result};

use crate::loader;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub source_path: String,
    pub chunks_stored: usize,
}

/// Outcome of a directory upload. Failures do not stop the batch.
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub ingested: Vec<IngestReport>,
    pub failed: Vec<FailedFile>,
}

#[derive(Debug, Serialize)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStatus {
    pub backend: String,
    pub documents: u64,
    pub chunks: u64,
    pub store_reachable: bool,
    pub embedding_model: String,
    pub embedder_reachable: bool,
}

pub struct KnowledgeBase {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    batch_size: usize,
}

impl KnowledgeBase {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            chunker,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn ingest(&self, doc: &Document) -> Result<IngestReport> {
        self.store.insert_document(doc).await?;

        let chunks = self.chunker.chunk_document(doc);
        let mut stored = 0;

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await.inspect_err(|e| {
                tracing::warn!(document = %doc.source_path, stored, error = %e, "embedding failed; ingest stopped");
            })?;
            if vectors.len() != batch.len() {
                return Err(DeskError::provider(format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                let record = EmbeddingRecord {
                    chunk_id: chunk.id.clone(),
                    dims: vector.len(),
                    vector,
                    model: self.embedder.model_name().to_string(),
                };
                self.store.insert_chunk(chunk, &record).await?;
                stored += 1;
            }
        }

        tracing::info!(document = %doc.source_path, chunks = stored, "ingested document");
        Ok(IngestReport {
            document_id: doc.id.clone(),
            source_path: doc.source_path.clone(),
            chunks_stored: stored,
        })
    }

    /// Load one file and ingest it.
    pub async fn upload(&self, path: &Path, format: Option<DocumentFormat>) -> Result<IngestReport> {
        let doc = loader::load_document(path, format)?;
        self.ingest(&doc).await
    }

    /// Upload every supported file under `dir`, in path order.
    pub async fn upload_dir(&self, dir: &Path) -> Result<BatchReport> {
        if !dir.is_dir() {
            return Err(DeskError::NotFound(format!("directory {}", dir.display())));
        }

        let mut files: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| DocumentFormat::from_path(path).is_some())
            .collect();
        files.sort();

        let mut report = BatchReport::default();
        for path in files {
            match self.upload(&path, None).await {
                Ok(r) => report.ingested.push(r),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping file");
                    report.failed.push(FailedFile {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// The `k` chunks nearest to `text`. An empty store yields no hits.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = embed_one(self.embedder.as_ref(), text).await?;
        let hits = self.store.nearest(&vector, k).await?;
        tracing::debug!(query = text, k, hits = hits.len(), "knowledge query");
        Ok(hits)
    }

    pub async fn reset(&self) -> Result<()> {
        self.store.reset().await?;
        tracing::info!("knowledge base cleared");
        Ok(())
    }

    pub async fn status(&self) -> KnowledgeStatus {
        let store_reachable = self.store.ping().await;
        let counts = self.store.counts().await.unwrap_or_default();
        KnowledgeStatus {
            backend: self.store.backend().to_string(),
            documents: counts.documents,
            chunks: counts.chunks,
            store_reachable,
            embedding_model: self.embedder.model_name().to_string(),
            embedder_reachable: self.embedder.health_check().await,
        }
    }
}
