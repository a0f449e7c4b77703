//! Agent loop scenarios driven by scripted planners.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use support_desk::agent::Outcome;
use support_desk::config::Config;
use support_desk::helpdesk::{Customer, Helpdesk, InMemoryHelpdesk};
use support_desk::knowledge::KnowledgeBase;
use support_desk::planner::{Decision, Planner, PlanningContext};
use support_desk::service::SupportDesk;
use support_desk_core::chunk::Chunker;
use support_desk_core::embedding::{Embedder, HashEmbedder};
use support_desk_core::session::SessionEvent;
use support_desk_core::store::memory::InMemoryStore;
use support_desk_core::{DeskError, Result};

type Script = dyn Fn(&PlanningContext<'_>) -> Result<Decision> + Send + Sync;

struct ScriptedPlanner {
    script: Box<Script>,
}

impl ScriptedPlanner {
    fn new(script: impl Fn(&PlanningContext<'_>) -> Result<Decision> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
        }
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, ctx: &PlanningContext<'_>) -> Result<Decision> {
        (self.script)(ctx)
    }
}

struct StalledPlanner;

#[async_trait]
impl Planner for StalledPlanner {
    async fn plan(&self, _ctx: &PlanningContext<'_>) -> Result<Decision> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Decision::Answer("too late".to_string()))
    }
}

fn customers() -> Vec<Customer> {
    vec![Customer {
        id: "C-100".to_string(),
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        plan: "pro".to_string(),
    }]
}

/// Embedder that never answers in time.
struct StalledEmbedder;

#[async_trait]
impl Embedder for StalledEmbedder {
    fn model_name(&self) -> &str {
        "stalled"
    }

    fn dims(&self) -> usize {
        8
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![vec![0.0; 8]; texts.len()])
    }
}

struct DownEmbedder;

#[async_trait]
impl Embedder for DownEmbedder {
    fn model_name(&self) -> &str {
        "down"
    }

    fn dims(&self) -> usize {
        8
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(DeskError::provider("embedding service unreachable"))
    }
}

fn knowledge_with(embedder: Arc<dyn Embedder>) -> KnowledgeBase {
    KnowledgeBase::new(
        Arc::new(InMemoryStore::new()),
        embedder,
        Chunker::new(200, 40).unwrap(),
        8,
    )
}

fn knowledge() -> KnowledgeBase {
    knowledge_with(Arc::new(HashEmbedder::new(256).unwrap()))
}

fn desk_with(planner: Arc<dyn Planner>, config: Config) -> (SupportDesk, Arc<InMemoryHelpdesk>) {
    let helpdesk = Arc::new(InMemoryHelpdesk::new(customers()));
    let desk = SupportDesk::from_parts(config, knowledge(), helpdesk.clone(), planner, None);
    (desk, helpdesk)
}

fn retrieve_then_answer() -> ScriptedPlanner {
    ScriptedPlanner::new(|ctx| match ctx.observations.last() {
        None => Ok(Decision::Retrieve {
            query: String::new(),
        }),
        Some(_) => Ok(Decision::Answer("answered".to_string())),
    })
}

fn config(max_steps: usize) -> Config {
    let mut config = Config::default();
    config.agent.max_steps = max_steps;
    config
}

#[tokio::test]
async fn test_create_ticket_then_answer_with_id() {
    let planner = ScriptedPlanner::new(|ctx| match ctx.observations.last() {
        None => Ok(Decision::Invoke {
            tool: "create_ticket".to_string(),
            args: json!({ "description": "Printer is broken", "customer_id": "C-100", "priority": "high" }),
        }),
        Some(obs) => {
            let id = obs.result["ticket_id"].as_str().unwrap_or("?");
            Ok(Decision::Answer(format!("Your ticket {} has been created.", id)))
        }
    });
    let (desk, helpdesk) = desk_with(Arc::new(planner), config(5));

    let response = desk.chat(None, "My printer is broken, please open a ticket").await;

    assert_eq!(response.outcome, Outcome::Responded);
    assert!(response.reply.contains("TKT-00001"), "{}", response.reply);
    assert_eq!(response.invocations.len(), 1);
    assert!(response.invocations[0].success);
    assert_eq!(response.tool_calls.len(), 1);

    let ticket = helpdesk.get_ticket("TKT-00001").await.unwrap();
    assert_eq!(ticket.description, "Printer is broken");
    assert_eq!(ticket.customer_id.as_deref(), Some("C-100"));

    let history = desk.history(&response.session_id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(matches!(history[1], SessionEvent::Tool(_)));
}

#[tokio::test]
async fn test_failed_tool_call_is_visible_to_planner() {
    let planner = ScriptedPlanner::new(|ctx| match ctx.observations.last() {
        None => Ok(Decision::Invoke {
            tool: "get_customer_info".to_string(),
            args: json!({ "customer_id": "C-999" }),
        }),
        Some(obs) if !obs.success => Ok(Decision::Answer(format!(
            "I couldn't find that account ({}).",
            obs.error.as_deref().unwrap_or_default()
        ))),
        Some(_) => Ok(Decision::Answer("Found you.".to_string())),
    });
    let (desk, _) = desk_with(Arc::new(planner), config(5));

    let response = desk.chat(None, "What plan am I on? I'm C-999").await;

    assert_eq!(response.outcome, Outcome::Responded);
    assert!(response.reply.contains("not found"), "{}", response.reply);
    assert!(!response.invocations[0].success);
}

#[tokio::test]
async fn test_escalation_of_unknown_ticket_fails_cleanly() {
    let planner = ScriptedPlanner::new(|ctx| match ctx.observations.len() {
        0 => Ok(Decision::Invoke {
            tool: "escalate_issue".to_string(),
            args: json!({ "ticket_id": "TKT-04242", "reason": "customer asked for a human" }),
        }),
        _ => Ok(Decision::Answer("Let me create a ticket first.".to_string())),
    });
    let (desk, _) = desk_with(Arc::new(planner), config(5));

    let response = desk.chat(None, "I want a human").await;
    assert_eq!(response.outcome, Outcome::Responded);
    let inv = &response.invocations[0];
    assert_eq!(inv.tool, "escalate_issue");
    assert!(!inv.success);
}

#[tokio::test]
async fn test_step_limit_aborts_with_fallback() {
    let planner = ScriptedPlanner::new(|_| {
        Ok(Decision::Invoke {
            tool: "create_ticket".to_string(),
            args: json!({ "description": "loop" }),
        })
    });
    let (desk, helpdesk) = desk_with(Arc::new(planner), config(3));

    let response = desk.chat(None, "help").await;

    assert_eq!(response.outcome, Outcome::Aborted);
    assert_eq!(response.invocations.len(), 3);
    assert!(!response.reply.is_empty());
    assert!(response.reply.contains("TKT-00003"), "{}", response.reply);
    assert!(helpdesk.get_ticket("TKT-00004").await.is_err());

    let history = desk.history(&response.session_id).await.unwrap();
    match history.last() {
        Some(SessionEvent::Turn(turn)) => assert_eq!(turn.text, response.reply),
        other => panic!("expected the fallback turn last, got {:?}", other),
    }
}

#[tokio::test]
async fn test_provider_error_aborts() {
    let planner = ScriptedPlanner::new(|_| Err(DeskError::provider("connection refused")));
    let (desk, _) = desk_with(Arc::new(planner), config(5));

    let response = desk.chat(None, "hello").await;

    assert_eq!(response.outcome, Outcome::Aborted);
    assert!(response.invocations.is_empty());
    assert!(response.reply.contains("try again"));
}

#[tokio::test]
async fn test_planner_timeout_aborts() {
    let mut cfg = config(5);
    cfg.llm.timeout_secs = 1;
    let (desk, _) = desk_with(Arc::new(StalledPlanner), cfg);

    let response = desk.chat(None, "hello").await;

    assert_eq!(response.outcome, Outcome::Aborted);
    assert!(!response.reply.contains("too late"));
}

#[tokio::test]
async fn test_retrieval_is_recorded_and_grounds_answer() {
    let planner = ScriptedPlanner::new(|ctx| match ctx.observations.last() {
        None => Ok(Decision::Retrieve {
            query: String::new(),
        }),
        Some(obs) => {
            let top = obs.result["results"][0]["text"].as_str().unwrap_or("nothing");
            Ok(Decision::Answer(format!("From our docs: {}", top)))
        }
    });
    let (desk, _) = desk_with(Arc::new(planner), config(5));
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("password.txt");
    std::fs::write(&path, "To reset your password, open Settings and choose Security.").unwrap();
    let report = desk.upload_file(&path, None).await.unwrap();
    assert_eq!(report.chunks_stored, 1);

    let response = desk.chat(None, "How do I reset my password?").await;

    assert_eq!(response.outcome, Outcome::Responded);
    let inv = &response.invocations[0];
    assert_eq!(inv.tool, "search_knowledge_base");
    assert_eq!(inv.input["query"], "How do I reset my password?");
    assert!(response.reply.contains("Settings"), "{}", response.reply);
}

#[tokio::test]
async fn test_history_is_shared_across_messages() {
    let planner = ScriptedPlanner::new(|ctx| {
        Ok(Decision::Answer(format!("seen {} earlier events", ctx.history.len())))
    });
    let (desk, _) = desk_with(Arc::new(planner), config(5));

    let first = desk.chat(Some("s-1"), "hi").await;
    assert_eq!(first.reply, "seen 0 earlier events");
    let second = desk.chat(Some("s-1"), "again").await;
    assert_eq!(second.reply, "seen 2 earlier events");

    desk.clear_session("s-1").await.unwrap();
    let third = desk.chat(Some("s-1"), "after clear").await;
    assert_eq!(third.reply, "seen 0 earlier events");
}

#[tokio::test]
async fn test_stalled_retrieval_aborts_within_deadline() {
    let mut cfg = config(5);
    cfg.llm.timeout_secs = 1;
    let desk = SupportDesk::from_parts(
        cfg,
        knowledge_with(Arc::new(StalledEmbedder)),
        Arc::new(InMemoryHelpdesk::new(customers())),
        Arc::new(retrieve_then_answer()),
        None,
    );

    let started = Instant::now();
    let response = desk.chat(None, "How do I reset my password?").await;

    assert!(started.elapsed() < Duration::from_secs(10), "took {:?}", started.elapsed());
    assert_eq!(response.outcome, Outcome::Aborted);
    assert_eq!(response.invocations.len(), 1);
    assert_eq!(response.invocations[0].tool, "search_knowledge_base");
    assert!(!response.invocations[0].success);
    assert!(response.reply.contains("try again"), "{}", response.reply);
}

#[tokio::test]
async fn test_embedder_failure_during_retrieval_aborts() {
    let desk = SupportDesk::from_parts(
        config(5),
        knowledge_with(Arc::new(DownEmbedder)),
        Arc::new(InMemoryHelpdesk::new(customers())),
        Arc::new(retrieve_then_answer()),
        None,
    );

    let response = desk.chat(None, "Where is my invoice?").await;

    assert_eq!(response.outcome, Outcome::Aborted);
    assert_ne!(response.reply, "answered");
    let history = desk.history(&response.session_id).await.unwrap();
    assert!(matches!(history[1], SessionEvent::Tool(ref inv) if !inv.success));
}

#[tokio::test]
async fn test_sessions_are_bounded_and_can_be_ended() {
    let planner = ScriptedPlanner::new(|_| Ok(Decision::Answer("ok".to_string())));
    let mut cfg = config(5);
    cfg.agent.max_sessions = 10;
    let (desk, _) = desk_with(Arc::new(planner), cfg);

    for _ in 0..200 {
        desk.chat(None, "x").await;
    }
    assert_eq!(desk.status(None).await.active_sessions, 10);

    let kept = desk.chat(Some("named"), "hello").await;
    assert!(desk.history(&kept.session_id).await.is_ok());

    desk.end_session("named").await.unwrap();
    assert!(matches!(desk.history("named").await, Err(DeskError::NotFound(_))));
    assert_eq!(desk.status(None).await.active_sessions, 9);
    assert!(matches!(desk.end_session("named").await, Err(DeskError::NotFound(_))));
}
