//! Network embedding providers and provider selection.
//!
//! The [`Embedder`] trait and the local [`HashEmbedder`] live in the core
//! crate. This module adds:
//! - **[`OpenAiEmbedder`]**: `POST {base_url}/embeddings` on any
//!   OpenAI-compatible endpoint, bearer credential.
//! - **[`OllamaEmbedder`]**: `POST {base_url}/api/embed` on a local Ollama.
//!
//! Both retry transient failures with exponential backoff (see
//! [`crate::http`]).
//!
//! ```rust
//! # use support_desk::config::EmbeddingConfig;
//! # use support_desk::embedding::create_embedder;
//! # use support_desk_core::embedding::Embedder;
//! let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
//! assert_eq!(embedder.model_name(), "hash");
//! ```

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use support_desk_core::embedding::{Embedder, HashEmbedder};
use support_desk_core::{DeskError, Result};

use crate::config::EmbeddingConfig;
use crate::http;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

// ============ OpenAI ============

pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| DeskError::config("embedding.model required for OpenAI provider"))?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            DeskError::config(format!("{} environment variable not set", config.api_key_env))
        })?;

        Ok(Self {
            model,
            dims: config.dims,
            base_url: trim_url(config.base_url.as_deref().unwrap_or(OPENAI_DEFAULT_URL)),
            api_key,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({ "model": self.model, "input": texts });
        let reply = http::post_json(&self.client, &url, Some(&self.api_key), &body, self.max_retries).await?;
        let vectors = parse_openai_response(&reply)?;
        check_batch(texts.len(), self.dims, vectors)
    }

    async fn health_check(&self) -> bool {
        http::reachable(&self.client, &format!("{}/models", self.base_url), Some(&self.api_key)).await
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| DeskError::provider("invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| DeskError::provider("invalid OpenAI response: missing embedding"))?;
        indexed.push((index, to_vector(embedding)?));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    base_url: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| DeskError::config("embedding.model required for Ollama provider"))?;
        Ok(Self {
            model,
            dims: config.dims,
            base_url: trim_url(config.base_url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL)),
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({ "model": self.model, "input": texts });
        let reply = http::post_json(&self.client, &url, None, &body, self.max_retries).await?;
        let vectors = reply
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| DeskError::provider("invalid Ollama response: missing embeddings"))?
            .iter()
            .map(to_vector)
            .collect::<Result<Vec<_>>>()?;
        check_batch(texts.len(), self.dims, vectors)
    }

    async fn health_check(&self) -> bool {
        http::reachable(&self.client, &format!("{}/api/tags", self.base_url), None).await
    }
}

// ============ Shared ============

fn to_vector(value: &Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| DeskError::provider("embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| DeskError::provider("embedding contains a non-number"))
        })
        .collect()
}

fn check_batch(expected: usize, dims: usize, vectors: Vec<Vec<f32>>) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(DeskError::provider(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(DeskError::provider(format!(
            "embedding has {} dims, configured embedding.dims is {}",
            bad.len(),
            dims
        )));
    }
    Ok(vectors)
}

fn trim_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Instantiate the embedder named by `embedding.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"hash"` | [`HashEmbedder`] |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dims)?)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => Err(DeskError::config(format!("unknown embedding provider: {}", other))),
    }
}
