//! Chat-completion clients for the planner.
//!
//! | Provider | Endpoint | Auth |
//! |----------|----------|------|
//! | [`OpenAiChat`] | `POST {base_url}/chat/completions` | bearer key |
//! | [`OllamaChat`] | `POST {base_url}/api/chat` | none |
//!
//! Both send the configured model, temperature and token budget, and use
//! the request timeout from `[llm].timeout_secs`. Chat calls are not
//! retried: a failed planner call aborts the agent cycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use support_desk_core::{DeskError, Result};

use crate::config::LlmConfig;
use crate::http;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model(&self) -> &str;

    /// Send the conversation and return the assistant's reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    async fn health_check(&self) -> bool;
}

// ============ OpenAI-compatible ============

pub struct OpenAiChat {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            DeskError::config(format!("{} environment variable not set", config.api_key_env))
        })?;
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(OPENAI_DEFAULT_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        let url = format!("{}/chat/completions", self.base_url);
        let reply = http::post_json(&self.client, &url, Some(&self.api_key), &body, 0).await?;
        parse_openai_reply(&reply)
    }

    async fn health_check(&self) -> bool {
        http::reachable(&self.client, &format!("{}/models", self.base_url), Some(&self.api_key)).await
    }
}

fn parse_openai_reply(reply: &Value) -> Result<String> {
    reply
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| DeskError::provider("invalid chat response: missing choices[0].message.content"))
}

// ============ Ollama ============

pub struct OllamaChat {
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(OLLAMA_DEFAULT_URL)
                .trim_end_matches('/')
                .to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl LlmClient for OllamaChat {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });
        let url = format!("{}/api/chat", self.base_url);
        let reply = http::post_json(&self.client, &url, None, &body, 0).await?;
        reply
            .pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| DeskError::provider("invalid Ollama response: missing message.content"))
    }

    async fn health_check(&self) -> bool {
        http::reachable(&self.client, &format!("{}/api/tags", self.base_url), None).await
    }
}

pub fn create_llm_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => Err(DeskError::config(format!("unknown llm provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let v = serde_json::to_value(ChatMessage::system("be helpful")).unwrap();
        assert_eq!(v, json!({ "role": "system", "content": "be helpful" }));
    }

    #[test]
    fn test_parse_openai_reply() {
        let reply = json!({ "choices": [{ "message": { "role": "assistant", "content": "hi" } }] });
        assert_eq!(parse_openai_reply(&reply).unwrap(), "hi");
        assert!(matches!(
            parse_openai_reply(&json!({ "choices": [] })),
            Err(DeskError::Provider(_))
        ));
    }

    #[test]
    fn test_create_client_requires_credential_for_openai() {
        let cfg = LlmConfig::default();
        assert!(matches!(create_llm_client(&cfg), Err(DeskError::Configuration(_))));

        let mut cfg = LlmConfig::default();
        cfg.api_key = Some("sk-test".to_string());
        assert_eq!(create_llm_client(&cfg).unwrap().model(), "gpt-4o-mini");

        let mut cfg = LlmConfig::default();
        cfg.provider = "ollama".to_string();
        cfg.model = "llama3.1".to_string();
        assert_eq!(create_llm_client(&cfg).unwrap().model(), "llama3.1");
    }

    #[tokio::test]
    async fn test_unreachable_ollama_is_provider_error() {
        let mut cfg = LlmConfig::default();
        cfg.provider = "ollama".to_string();
        cfg.base_url = Some("http://127.0.0.1:9".to_string());
        cfg.timeout_secs = 2;
        let client = OllamaChat::new(&cfg).unwrap();
        let err = client.complete(&[ChatMessage::user("hello")]).await.unwrap_err();
        assert!(matches!(err, DeskError::Provider(_)));
        assert!(!client.health_check().await);
    }
}
