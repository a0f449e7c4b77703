//! Knowledge base behaviour against both store backends.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use support_desk::knowledge::KnowledgeBase;
use support_desk::sqlite_store::SqliteStore;
use support_desk::{db, migrate};
use support_desk_core::chunk::Chunker;
use support_desk_core::embedding::{Embedder, HashEmbedder};
use support_desk_core::models::{Document, DocumentFormat};
use support_desk_core::store::memory::InMemoryStore;
use support_desk_core::store::{KnowledgeStore, StoreCounts};
use support_desk_core::{DeskError, Result};

const PASSWORD_DOC: &str = "To reset your password, open Settings, choose Security and click Reset password.";
const BILLING_DOC: &str = "Invoices are issued on the first day of each month and refunds take five business days.";

async fn sqlite_store(tmp: &TempDir) -> Arc<dyn KnowledgeStore> {
    let pool = db::connect(&tmp.path().join("kb.sqlite")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    Arc::new(SqliteStore::new(pool))
}

/// One knowledge base per backend, sharing the embedder settings.
async fn backends(tmp: &TempDir, embedder: Arc<dyn Embedder>, chunker: Chunker, batch_size: usize) -> Vec<KnowledgeBase> {
    vec![
        KnowledgeBase::new(Arc::new(InMemoryStore::new()), embedder.clone(), chunker, batch_size),
        KnowledgeBase::new(sqlite_store(tmp).await, embedder, chunker, batch_size),
    ]
}

fn hash_embedder() -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder::new(256).unwrap())
}

fn doc(path: &str, text: &str) -> Document {
    Document::new(path, DocumentFormat::Txt, text)
}

#[tokio::test]
async fn test_password_question_finds_password_doc() {
    let tmp = TempDir::new().unwrap();
    for kb in backends(&tmp, hash_embedder(), Chunker::new(500, 100).unwrap(), 16).await {
        kb.ingest(&doc("billing.txt", BILLING_DOC)).await.unwrap();
        kb.ingest(&doc("password.txt", PASSWORD_DOC)).await.unwrap();

        let hits = kb.query("How do I reset my password?", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_path, "password.txt");
        assert!(hits[0].text.contains("Settings"));
        assert!((hits[0].distance - (1.0 - hits[0].score)).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_empty_knowledge_base_returns_nothing() {
    let tmp = TempDir::new().unwrap();
    for kb in backends(&tmp, hash_embedder(), Chunker::new(500, 100).unwrap(), 16).await {
        assert!(kb.query("anything at all", 3).await.unwrap().is_empty());
        assert!(kb.query("anything at all", 0).await.unwrap().is_empty());
        let status = kb.status().await;
        assert_eq!((status.documents, status.chunks), (0, 0));
        assert!(status.store_reachable);
    }
}

#[tokio::test]
async fn test_duplicate_ingest_keeps_both_in_insertion_order() {
    let tmp = TempDir::new().unwrap();
    for kb in backends(&tmp, hash_embedder(), Chunker::new(500, 100).unwrap(), 16).await {
        let first = kb.ingest(&doc("a/password.txt", PASSWORD_DOC)).await.unwrap();
        let second = kb.ingest(&doc("b/password.txt", PASSWORD_DOC)).await.unwrap();
        assert_ne!(first.document_id, second.document_id);

        let hits = kb.query("reset password", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].score, hits[1].score);
        assert_eq!(hits[0].source_path, "a/password.txt");
        assert_eq!(hits[1].source_path, "b/password.txt");
    }
}

#[tokio::test]
async fn test_results_are_ordered_by_distance() {
    let tmp = TempDir::new().unwrap();
    for kb in backends(&tmp, hash_embedder(), Chunker::new(500, 100).unwrap(), 16).await {
        kb.ingest(&doc("billing.txt", BILLING_DOC)).await.unwrap();
        kb.ingest(&doc("password.txt", PASSWORD_DOC)).await.unwrap();
        kb.ingest(&doc("shipping.txt", "Orders ship within two days from our warehouse.")).await.unwrap();

        let hits = kb.query("when are invoices issued", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].source_path, "billing.txt");
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }
}

#[tokio::test]
async fn test_reset_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    for kb in backends(&tmp, hash_embedder(), Chunker::new(40, 10).unwrap(), 16).await {
        let report = kb.ingest(&doc("password.txt", PASSWORD_DOC)).await.unwrap();
        assert!(report.chunks_stored > 1);

        kb.reset().await.unwrap();
        kb.reset().await.unwrap();

        let status = kb.status().await;
        assert_eq!((status.documents, status.chunks), (0, 0));
        assert!(kb.query("reset password", 2).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_empty_document_stores_no_chunks() {
    let tmp = TempDir::new().unwrap();
    for kb in backends(&tmp, hash_embedder(), Chunker::new(500, 100).unwrap(), 16).await {
        let report = kb.ingest(&doc("empty.txt", "")).await.unwrap();
        assert_eq!(report.chunks_stored, 0);
        let status = kb.status().await;
        assert_eq!((status.documents, status.chunks), (1, 0));
    }
}

/// Fails every call after the first `ok_calls`.
struct FlakyEmbedder {
    inner: HashEmbedder,
    ok_calls: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn model_name(&self) -> &str {
        "flaky"
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_calls {
            return Err(DeskError::provider("rate limited"));
        }
        self.inner.embed(texts).await
    }
}

#[tokio::test]
async fn test_partial_failure_keeps_earlier_chunks() {
    let tmp = TempDir::new().unwrap();
    let text = "alpha ".repeat(40);
    let chunker = Chunker::new(60, 0).unwrap();
    assert!(chunker.chunk_document(&doc("x", &text)).len() >= 3);

    for store in [
        Arc::new(InMemoryStore::new()) as Arc<dyn KnowledgeStore>,
        sqlite_store(&tmp).await,
    ] {
        let embedder = Arc::new(FlakyEmbedder {
            inner: HashEmbedder::new(64).unwrap(),
            ok_calls: 1,
            calls: AtomicUsize::new(0),
        });
        let kb = KnowledgeBase::new(store.clone(), embedder, chunker, 1);

        let err = kb.ingest(&doc("alpha.txt", &text)).await.unwrap_err();
        assert!(matches!(err, DeskError::Provider(_)));

        assert_eq!(
            store.counts().await.unwrap(),
            StoreCounts {
                documents: 1,
                chunks: 1
            }
        );
    }
}

#[tokio::test]
async fn test_unreachable_database_is_store_unavailable() {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("kb.sqlite")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    let kb = KnowledgeBase::new(
        Arc::new(SqliteStore::new(pool.clone())),
        hash_embedder(),
        Chunker::new(500, 100).unwrap(),
        16,
    );
    kb.ingest(&doc("password.txt", PASSWORD_DOC)).await.unwrap();

    pool.close().await;

    let err = kb.query("reset password", 2).await.unwrap_err();
    assert!(matches!(err, DeskError::StoreUnavailable(_)), "{:?}", err);
    assert!(err.is_retryable());

    let status = kb.status().await;
    assert!(!status.store_reachable);
}
