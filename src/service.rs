//! Application facade shared by the console, the CLI and the HTTP server.
//!
//! [`SupportDesk::open`] wires the production stack from a [`Config`]:
//! SQLite knowledge store and helpdesk, the configured embedder, and an
//! [`LlmPlanner`] over the configured chat client.
//! [`SupportDesk::from_parts`] accepts pre-built components instead.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use support_desk_core::chunk::Chunker;
use support_desk_core::models::{DocumentFormat, SearchHit, ToolInvocation};
use support_desk_core::session::SessionEvent;
use support_desk_core::Result;

use crate::agent::{Agent, AgentLimits, Outcome};
use crate::config::Config;
use crate::helpdesk::{Helpdesk, SqliteHelpdesk};
use crate::knowledge::{BatchReport, IngestReport, KnowledgeBase, KnowledgeStatus};
use crate::llm::{create_llm_client, LlmClient};
use crate::planner::{LlmPlanner, Planner};
use crate::sessions::{SessionLimits, SessionManager};
use crate::sqlite_store::SqliteStore;
use crate::tools::ToolSet;
use crate::{db, embedding, migrate};

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub outcome: Outcome,
    /// One line per action taken during the cycle.
    pub tool_calls: Vec<String>,
    pub invocations: Vec<ToolInvocation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_steps: usize,
    pub tools_available: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub knowledge: KnowledgeStatus,
    pub llm_reachable: bool,
    pub agent: AgentSettings,
    pub active_sessions: usize,
    /// Turns in the requested session, if one was named and exists.
    pub session_length: Option<usize>,
}

pub struct SupportDesk {
    config: Config,
    knowledge: Arc<KnowledgeBase>,
    agent: Agent,
    sessions: SessionManager,
    llm: Option<Arc<dyn LlmClient>>,
}

impl SupportDesk {
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::connect(&config.db.path).await?;
        migrate::run_migrations(&pool).await?;

        let chunker = Chunker::new(config.chunking.size, config.chunking.overlap)?;
        let embedder = embedding::create_embedder(&config.embedding)?;
        let knowledge = KnowledgeBase::new(
            Arc::new(SqliteStore::new(pool.clone())),
            embedder,
            chunker,
            config.embedding.batch_size,
        );
        let helpdesk = SqliteHelpdesk::new(pool, &config.customers).await?;
        let llm = create_llm_client(&config.llm)?;
        let planner = LlmPlanner::new(llm.clone());

        tracing::info!(
            db = %config.db.path.display(),
            model = %config.llm.model,
            embedding = %config.embedding.provider,
            "support desk ready"
        );
        Ok(Self::from_parts(
            config,
            knowledge,
            Arc::new(helpdesk),
            Arc::new(planner),
            Some(llm),
        ))
    }

    pub fn from_parts(
        config: Config,
        knowledge: KnowledgeBase,
        helpdesk: Arc<dyn Helpdesk>,
        planner: Arc<dyn Planner>,
        llm: Option<Arc<dyn LlmClient>>,
    ) -> Self {
        let knowledge = Arc::new(knowledge);
        let limits = AgentLimits {
            max_steps: config.agent.max_steps,
            history_turns: config.agent.history_turns,
            retrieval_k: config.retrieval.k,
            call_timeout: Duration::from_secs(config.llm.timeout_secs),
        };
        let agent = Agent::new(
            planner,
            knowledge.clone(),
            Arc::new(ToolSet::new(helpdesk)),
            limits,
        );
        let sessions = SessionManager::new(SessionLimits {
            idle_ttl: Duration::from_secs(config.agent.session_idle_secs),
            max_sessions: config.agent.max_sessions,
        });
        Self {
            config,
            knowledge,
            agent,
            sessions,
            llm,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle one user message. A missing `session_id` starts a new session.
    pub async fn chat(&self, session_id: Option<&str>, message: &str) -> ChatResponse {
        let session_id = session_id
            .map(str::to_string)
            .unwrap_or_else(SessionManager::new_id);
        let handle = self.sessions.get_or_create(&session_id).await;
        let mut session = handle.lock().await;

        let reply = self.agent.respond(&mut session, message).await;
        ChatResponse {
            session_id,
            tool_calls: reply.invocations.iter().map(|i| i.summary()).collect(),
            reply: reply.text,
            outcome: reply.outcome,
            invocations: reply.invocations,
        }
    }

    /// Upload a file, or every supported file in a directory.
    pub async fn upload(&self, path: &Path, format: Option<DocumentFormat>) -> Result<BatchReport> {
        if path.is_dir() {
            return self.knowledge.upload_dir(path).await;
        }
        let report = self.knowledge.upload(path, format).await?;
        Ok(BatchReport {
            ingested: vec![report],
            failed: Vec::new(),
        })
    }

    pub async fn upload_file(&self, path: &Path, format: Option<DocumentFormat>) -> Result<IngestReport> {
        self.knowledge.upload(path, format).await
    }

    pub async fn search(&self, query: &str, k: Option<usize>) -> Result<Vec<SearchHit>> {
        self.knowledge
            .query(query, k.unwrap_or(self.config.retrieval.k))
            .await
    }

    pub async fn status(&self, session_id: Option<&str>) -> StatusReport {
        let llm_reachable = match &self.llm {
            Some(client) => client.health_check().await,
            None => false,
        };
        let session_length = match session_id {
            Some(id) => self.sessions.turn_count(id).await,
            None => None,
        };
        StatusReport {
            knowledge: self.knowledge.status().await,
            llm_reachable,
            agent: AgentSettings::from(self),
            active_sessions: self.sessions.len().await,
            session_length,
        }
    }

    pub async fn history(&self, session_id: &str) -> Result<Vec<SessionEvent>> {
        self.sessions.events(session_id).await
    }

    /// Forget a session's history but keep it open.
    pub async fn clear_session(&self, session_id: &str) -> Result<()> {
        self.sessions.clear(session_id).await
    }

    /// Remove a session from memory.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        self.sessions.remove(session_id).await
    }

    pub async fn reset_knowledge(&self) -> Result<()> {
        self.knowledge.reset().await
    }
}

impl From<&SupportDesk> for AgentSettings {
    fn from(desk: &SupportDesk) -> Self {
        AgentSettings {
            model: desk.config.llm.model.clone(),
            temperature: desk.config.llm.temperature,
            max_tokens: desk.config.llm.max_tokens,
            max_steps: desk.agent.limits().max_steps,
            tools_available: ToolSet::catalogue().into_iter().map(|t| t.name).collect(),
        }
    }
}

/// Parse an optional user-supplied format tag.
pub fn parse_format(tag: Option<&str>) -> Result<Option<DocumentFormat>> {
    tag.map(str::parse::<DocumentFormat>).transpose()
}
