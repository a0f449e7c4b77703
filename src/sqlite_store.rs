//! SQLite-backed [`KnowledgeStore`] implementation.
//!
//! Documents, chunks and vectors live in three tables. Every chunk is
//! written together with its vector in one transaction, so an interrupted
//! ingest leaves only whole chunks behind. Insertion order is the
//! `chunks.seq` autoincrement column and breaks ties in [`nearest`].
//!
//! [`nearest`]: KnowledgeStore::nearest

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use support_desk_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use support_desk_core::models::{Chunk, Document, EmbeddingRecord, SearchHit};
use support_desk_core::store::{top_k, KnowledgeStore, StoreCounts};
use support_desk_core::{DeskError, Result};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    fn backend(&self) -> &str {
        "sqlite"
    }

    async fn insert_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (id, source_path, format, body, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&doc.id)
        .bind(&doc.source_path)
        .bind(doc.format.as_str())
        .bind(&doc.text)
        .bind(doc.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(DeskError::store)?;
        Ok(())
    }

    async fn insert_chunk(&self, chunk: &Chunk, embedding: &EmbeddingRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DeskError::store)?;

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE id = ?")
            .bind(&chunk.document_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(DeskError::store)?;
        if exists == 0 {
            return Err(DeskError::NotFound(format!("document {}", chunk.document_id)));
        }

        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, start_offset, text, hash) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(chunk.start as i64)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await
        .map_err(DeskError::store)?;

        sqlx::query("INSERT INTO chunk_vectors (chunk_id, model, dims, embedding) VALUES (?, ?, ?, ?)")
            .bind(&chunk.id)
            .bind(&embedding.model)
            .bind(embedding.dims as i64)
            .bind(vec_to_blob(&embedding.vector))
            .execute(&mut *tx)
            .await
            .map_err(DeskError::store)?;

        tx.commit().await.map_err(DeskError::store)?;
        Ok(())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query(
            r#"
            SELECT c.seq, c.id, c.document_id, c.chunk_index, c.text, d.source_path, v.embedding
            FROM chunks c
            JOIN chunk_vectors v ON v.chunk_id = c.id
            JOIN documents d ON d.id = c.document_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DeskError::store)?;

        let candidates = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(query, &blob_to_vec(&blob)) as f64;
                (
                    row.get::<i64, _>("seq"),
                    SearchHit {
                        chunk_id: row.get("id"),
                        document_id: row.get("document_id"),
                        source_path: row.get("source_path"),
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                        score,
                        distance: 1.0 - score,
                    },
                )
            })
            .collect();

        Ok(top_k(candidates, k))
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(DeskError::store)?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(DeskError::store)?;
        Ok(StoreCounts {
            documents: documents as u64,
            chunks: chunks as u64,
        })
    }

    async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DeskError::store)?;
        for table in ["chunk_vectors", "chunks", "documents"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await
                .map_err(DeskError::store)?;
        }
        tx.commit().await.map_err(DeskError::store)?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};
    use support_desk_core::chunk::Chunker;
    use support_desk_core::embedding::HashEmbedder;
    use support_desk_core::models::DocumentFormat;

    async fn open(tmp: &tempfile::TempDir) -> SqliteStore {
        let pool = db::connect(&tmp.path().join("desk.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    fn record(embedder: &HashEmbedder, chunk: &Chunk) -> EmbeddingRecord {
        let vector = embedder.embed_text(&chunk.text);
        EmbeddingRecord {
            chunk_id: chunk.id.clone(),
            dims: vector.len(),
            vector,
            model: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_query_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = open(&tmp).await;
        let embedder = HashEmbedder::new(128).unwrap();

        let doc = Document::new(
            "faq.txt",
            DocumentFormat::Txt,
            "Reset your password by visiting /settings/security and clicking Reset.",
        );
        store.insert_document(&doc).await.unwrap();
        for chunk in Chunker::new(500, 100).unwrap().chunk_document(&doc) {
            store.insert_chunk(&chunk, &record(&embedder, &chunk)).await.unwrap();
        }

        let hits = store
            .nearest(&embedder.embed_text("reset my password"), 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_path, "faq.txt");
        assert_eq!(hits[0].document_id, doc.id);
        assert!((hits[0].distance - (1.0 - hits[0].score)).abs() < 1e-9);
        assert!(store.ping().await);
    }

    #[tokio::test]
    async fn test_orphan_chunk_leaves_no_rows() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = open(&tmp).await;
        let embedder = HashEmbedder::new(16).unwrap();
        let doc = Document::new("never-inserted.txt", DocumentFormat::Txt, "orphan text");
        let chunk = Chunker::new(50, 0).unwrap().chunk_document(&doc).remove(0);

        let err = store.insert_chunk(&chunk, &record(&embedder, &chunk)).await.unwrap_err();
        assert!(matches!(err, DeskError::NotFound(_)));
        assert_eq!(store.counts().await.unwrap().chunks, 0);
    }

    #[tokio::test]
    async fn test_reset_clears_everything_and_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = open(&tmp).await;
        let embedder = HashEmbedder::new(16).unwrap();
        let doc = Document::new("a.md", DocumentFormat::Md, "alpha beta gamma");
        store.insert_document(&doc).await.unwrap();
        for chunk in Chunker::new(5, 1).unwrap().chunk_document(&doc) {
            store.insert_chunk(&chunk, &record(&embedder, &chunk)).await.unwrap();
        }
        assert_eq!(store.counts().await.unwrap().documents, 1);

        store.reset().await.unwrap();
        store.reset().await.unwrap();
        assert_eq!(store.counts().await.unwrap(), StoreCounts::default());
        assert!(store.nearest(&[1.0; 16], 5).await.unwrap().is_empty());
    }
}
