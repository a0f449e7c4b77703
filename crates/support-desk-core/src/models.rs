//! Core data models used throughout Support Desk.
//!
//! These types represent the documents, chunks, embeddings, search hits and
//! tool invocations that flow through the ingestion, retrieval and agent
//! pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::DeskError;

/// File formats accepted by the document loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Txt,
    Pdf,
    Md,
    Csv,
}

impl DocumentFormat {
    pub const ALL: [DocumentFormat; 4] = [
        DocumentFormat::Txt,
        DocumentFormat::Pdf,
        DocumentFormat::Md,
        DocumentFormat::Csv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Txt => "txt",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Md => "md",
            DocumentFormat::Csv => "csv",
        }
    }

    /// Resolve the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<DocumentFormat> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        ext.parse().ok()
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentFormat {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(DocumentFormat::Txt),
            "pdf" => Ok(DocumentFormat::Pdf),
            "md" | "markdown" => Ok(DocumentFormat::Md),
            "csv" => Ok(DocumentFormat::Csv),
            other => Err(DeskError::config(format!(
                "unsupported document format '{}': expected txt, pdf, md or csv",
                other
            ))),
        }
    }
}

/// A loaded document. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_path: String,
    pub format: DocumentFormat,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Create a document with a fresh random id.
    pub fn new(source_path: impl Into<String>, format: DocumentFormat, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_path: source_path.into(),
            format,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// A contiguous slice of a document's text.
///
/// `start` is the offset of the first character of `text` in the parent
/// document, counted in chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub start: usize,
    pub text: String,
    pub hash: String,
}

/// Embedding vector for exactly one chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub model: String,
    pub dims: usize,
}

/// A chunk returned from a knowledge store query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub document_id: String,
    pub source_path: String,
    pub chunk_index: i64,
    pub text: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f64,
    /// `1.0 - score`; results are ordered by ascending distance.
    pub distance: f64,
}

/// Record of one tool (or knowledge-store) call made by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub input: Value,
    pub result: Value,
    pub success: bool,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl ToolInvocation {
    pub fn succeeded(tool: impl Into<String>, input: Value, result: Value) -> Self {
        Self {
            tool: tool.into(),
            input,
            result,
            success: true,
            error: None,
            at: Utc::now(),
        }
    }

    pub fn failed(tool: impl Into<String>, input: Value, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            input,
            result: Value::Null,
            success: false,
            error: Some(error.into()),
            at: Utc::now(),
        }
    }

    /// One-line human-readable summary for interfaces.
    pub fn summary(&self) -> String {
        if self.success {
            format!("{} ok: {}", self.tool, compact(&self.result))
        } else {
            format!(
                "{} failed: {}",
                self.tool,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

fn compact(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > 160 {
        let head: String = text.chars().take(160).collect();
        format!("{}...", head)
    } else {
        text
    }
}
