//! Configuration parsing and validation.
//!
//! Support Desk reads an optional TOML file, applies `DESK_*` environment
//! overrides on top, resolves provider credentials from the environment
//! and validates the result. Every section has defaults, so running with
//! no file at all is valid as long as the language-model credential is
//! available.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/desk.sqlite"
//!
//! [chunking]
//! size = 500
//! overlap = 100
//!
//! [retrieval]
//! k = 2
//!
//! [embedding]
//! provider = "hash"
//! dims = 384
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! api_key_env = "OPENAI_API_KEY"
//! temperature = 0.7
//! max_tokens = 4000
//!
//! [agent]
//! max_steps = 5
//! history_turns = 20
//! session_idle_secs = 3600
//! max_sessions = 1000
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! upload_root = "./data/knowledge_base"
//!
//! [[customers]]
//! id = "CUST-001"
//! name = "Ada Lovelace"
//! email = "ada@example.com"
//! plan = "premium"
//! ```
//!
//! # Environment overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `DESK_MODEL` | `llm.model` |
//! | `DESK_DB_PATH` | `db.path` |
//! | `DESK_MAX_TOKENS` | `llm.max_tokens` |
//! | `DESK_TEMPERATURE` | `llm.temperature` |
//! | `DESK_LLM_PROVIDER` | `llm.provider` |
//! | `DESK_LLM_BASE_URL` | `llm.base_url` |

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use support_desk_core::{DeskError, Result};

use crate::helpdesk::Customer;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub agent: AgentConfig,
    pub server: ServerConfig,
    pub customers: Vec<Customer>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/desk.sqlite"),
        }
    }
}

/// Chunk window and overlap, in characters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: 500,
            overlap: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Chunks returned per knowledge-base query.
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: 2 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `hash`, `openai` or `ollama`.
    pub provider: String,
    pub model: Option<String>,
    pub dims: usize,
    pub base_url: Option<String>,
    pub api_key_env: String,
    pub batch_size: usize,
    pub max_retries: u32,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hash".to_string(),
            model: None,
            dims: 384,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// `openai` (any OpenAI-compatible endpoint) or `ollama`.
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            timeout_secs: 60,
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum retrievals plus tool calls in one chat cycle.
    pub max_steps: usize,
    /// Session events shown to the planner.
    pub history_turns: usize,
    /// Sessions untouched for this long are dropped.
    pub session_idle_secs: u64,
    /// Upper bound on live sessions.
    pub max_sessions: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 5,
            history_turns: 20,
            session_idle_secs: 3600,
            max_sessions: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// `POST /upload` only reads files under this directory.
    pub upload_root: PathBuf,
    /// Browser origins allowed to call the chat, upload, search, session
    /// and reset routes. Empty means same-origin only.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7340".to_string(),
            upload_root: PathBuf::from("./data/knowledge_base"),
            allowed_origins: Vec::new(),
        }
    }
}

const LLM_PROVIDERS: &[&str] = &["openai", "ollama"];
const EMBEDDING_PROVIDERS: &[&str] = &["hash", "openai", "ollama"];

impl Config {
    /// Parse a TOML document without applying overrides or validation.
    pub fn from_toml(content: &str) -> Result<Config> {
        toml::from_str(content).map_err(|e| DeskError::config(format!("invalid config file: {}", e)))
    }

    /// Apply `DESK_*` overrides and resolve credentials through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("DESK_MODEL") {
            self.llm.model = model;
        }
        if let Some(path) = lookup("DESK_DB_PATH") {
            self.db.path = PathBuf::from(path);
        }
        if let Some(v) = lookup("DESK_MAX_TOKENS") {
            self.llm.max_tokens = parse_env("DESK_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("DESK_TEMPERATURE") {
            self.llm.temperature = parse_env("DESK_TEMPERATURE", &v)?;
        }
        if let Some(provider) = lookup("DESK_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(url) = lookup("DESK_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }

        self.llm.api_key = lookup(&self.llm.api_key_env).filter(|k| !k.trim().is_empty());
        self.embedding.api_key =
            lookup(&self.embedding.api_key_env).filter(|k| !k.trim().is_empty());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.size == 0 {
            return Err(DeskError::config("chunking.size must be > 0"));
        }
        if self.chunking.overlap >= self.chunking.size {
            return Err(DeskError::config(format!(
                "chunking.overlap ({}) must be smaller than chunking.size ({})",
                self.chunking.overlap, self.chunking.size
            )));
        }
        if self.retrieval.k == 0 {
            return Err(DeskError::config("retrieval.k must be >= 1"));
        }
        if self.agent.max_steps == 0 {
            return Err(DeskError::config("agent.max_steps must be >= 1"));
        }
        if self.agent.max_sessions == 0 {
            return Err(DeskError::config("agent.max_sessions must be >= 1"));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(DeskError::config("llm.temperature must be in [0.0, 2.0]"));
        }
        if self.llm.max_tokens == 0 {
            return Err(DeskError::config("llm.max_tokens must be > 0"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(DeskError::config("llm.timeout_secs must be > 0"));
        }

        if !LLM_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(DeskError::config(format!(
                "unknown llm provider '{}'. Must be openai or ollama.",
                self.llm.provider
            )));
        }
        if self.llm.provider == "openai" && self.llm.api_key.is_none() {
            return Err(DeskError::config(format!(
                "{} environment variable not set (required by llm provider 'openai')",
                self.llm.api_key_env
            )));
        }

        if !EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(DeskError::config(format!(
                "unknown embedding provider '{}'. Must be hash, openai or ollama.",
                self.embedding.provider
            )));
        }
        if self.embedding.dims == 0 {
            return Err(DeskError::config("embedding.dims must be > 0"));
        }
        if self.embedding.batch_size == 0 {
            return Err(DeskError::config("embedding.batch_size must be > 0"));
        }
        if self.embedding.provider != "hash" && self.embedding.model.is_none() {
            return Err(DeskError::config(format!(
                "embedding.model must be specified when provider is '{}'",
                self.embedding.provider
            )));
        }
        if self.embedding.provider == "openai" && self.embedding.api_key.is_none() {
            return Err(DeskError::config(format!(
                "{} environment variable not set (required by embedding provider 'openai')",
                self.embedding.api_key_env
            )));
        }

        for origin in &self.server.allowed_origins {
            if origin == "*" || !(origin.starts_with("http://") || origin.starts_with("https://")) {
                return Err(DeskError::config(format!(
                    "server.allowed_origins entry '{}' must be an http(s) origin",
                    origin
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for customer in &self.customers {
            if !seen.insert(customer.id.as_str()) {
                return Err(DeskError::config(format!(
                    "duplicate customer id '{}'",
                    customer.id
                )));
            }
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| DeskError::config(format!("{} has an invalid value: '{}'", name, value)))
}

/// Load configuration from an optional file, the process environment, and
/// defaults, then validate it.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                DeskError::config(format!(
                    "failed to read config file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Config::from_toml(&content)?
        }
        None => Config::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}
