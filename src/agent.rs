//! The agent decision loop.
//!
//! One call to [`Agent::respond`] handles one user message:
//!
//! ```text
//! Received ─▶ Planning ─┬─▶ Responding            (answer)
//!               ▲       ├─▶ Acting ─┐             (retrieve / tool call)
//!               └───────┼───────────┘
//!                       └─▶ Aborted               (step limit, provider error, timeout)
//! ```
//!
//! Every retrieval and tool call is appended to the session as a
//! [`ToolInvocation`]. At most `max_steps` actions run per cycle; a planner
//! that still wants to act after that is cut off. Planner calls and
//! retrievals share one per-call deadline, and a retrieval that times out
//! or whose embedder fails aborts the cycle the same way a planner failure
//! does. Aborted cycles end with a fallback reply that is stored in the
//! session like any other answer.

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use support_desk_core::models::ToolInvocation;
use support_desk_core::session::{Role, Session, SessionEvent};
use support_desk_core::DeskError;

use crate::knowledge::KnowledgeBase;
use crate::planner::{Decision, Planner, PlanningContext};
use crate::tools::{ToolSet, CREATE_TICKET, SEARCH_KNOWLEDGE_BASE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Responded,
    Aborted,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub text: String,
    pub outcome: Outcome,
    /// Actions taken during this cycle, in order.
    pub invocations: Vec<ToolInvocation>,
}

/// Loop limits and retrieval settings.
#[derive(Debug, Clone)]
pub struct AgentLimits {
    pub max_steps: usize,
    pub history_turns: usize,
    pub retrieval_k: usize,
    /// Deadline for each planner call and each retrieval.
    pub call_timeout: Duration,
}

enum AbortReason {
    StepLimit,
    Provider(String),
}

pub struct Agent {
    planner: Arc<dyn Planner>,
    knowledge: Arc<KnowledgeBase>,
    tools: Arc<ToolSet>,
    limits: AgentLimits,
}

impl Agent {
    pub fn new(
        planner: Arc<dyn Planner>,
        knowledge: Arc<KnowledgeBase>,
        tools: Arc<ToolSet>,
        limits: AgentLimits,
    ) -> Self {
        Self {
            planner,
            knowledge,
            tools,
            limits,
        }
    }

    pub fn limits(&self) -> &AgentLimits {
        &self.limits
    }

    /// Run one full cycle for `message`. Never fails: problems end the cycle
    /// as [`Outcome::Aborted`] with a fallback reply.
    pub async fn respond(&self, session: &mut Session, message: &str) -> AgentReply {
        let history: Vec<SessionEvent> = session.recent(self.limits.history_turns).to_vec();
        session.append_turn(Role::User, message);

        let catalogue = ToolSet::catalogue();
        let mut invocations: Vec<ToolInvocation> = Vec::new();

        for step in 0..=self.limits.max_steps {
            let ctx = PlanningContext {
                history: &history,
                message,
                observations: &invocations,
                tools: &catalogue,
                step,
                max_steps: self.limits.max_steps,
            };

            let decision = match tokio::time::timeout(self.limits.call_timeout, self.planner.plan(&ctx)).await {
                Ok(Ok(decision)) => decision,
                Ok(Err(e)) => {
                    tracing::error!(session = %session.id, step, error = %e, "planner failed");
                    return self.abort(session, invocations, AbortReason::Provider(e.to_string()));
                }
                Err(_) => {
                    tracing::error!(session = %session.id, step, "planner timed out");
                    return self.abort(
                        session,
                        invocations,
                        AbortReason::Provider(format!("planner timed out after {:?}", self.limits.call_timeout)),
                    );
                }
            };

            let invocation = match decision {
                Decision::Answer(text) => {
                    session.append_turn(Role::Agent, &text);
                    tracing::info!(session = %session.id, steps = step, "responded");
                    return AgentReply {
                        text,
                        outcome: Outcome::Responded,
                        invocations,
                    };
                }
                _ if step == self.limits.max_steps => {
                    tracing::warn!(session = %session.id, max_steps = self.limits.max_steps, "step limit reached");
                    return self.abort(session, invocations, AbortReason::StepLimit);
                }
                Decision::Retrieve { query } => {
                    let query = if query.trim().is_empty() { message.to_string() } else { query };
                    match self.retrieve(&query).await {
                        Retrieval::Observed(invocation) => invocation,
                        Retrieval::Fatal(invocation, reason) => {
                            tracing::error!(session = %session.id, step, error = %reason, "retrieval failed");
                            session.record_invocation(invocation.clone());
                            invocations.push(invocation);
                            return self.abort(session, invocations, AbortReason::Provider(reason));
                        }
                    }
                }
                Decision::Invoke { tool, args } => {
                    tracing::info!(session = %session.id, step, tool = %tool, "invoking tool");
                    self.tools.run(&tool, args).await
                }
            };

            session.record_invocation(invocation.clone());
            invocations.push(invocation);
        }

        self.abort(session, invocations, AbortReason::StepLimit)
    }

    /// Query the knowledge base under the call deadline. A store error is
    /// an observation for the planner; an embedder failure or timeout is not.
    async fn retrieve(&self, query: &str) -> Retrieval {
        let k = self.limits.retrieval_k;
        let input = json!({ "query": query, "k": k });
        match tokio::time::timeout(self.limits.call_timeout, self.knowledge.query(query, k)).await {
            Ok(Ok(hits)) => {
                let results: Vec<_> = hits
                    .iter()
                    .map(|h| json!({ "source": h.source_path, "text": h.text, "score": h.score }))
                    .collect();
                Retrieval::Observed(ToolInvocation::succeeded(
                    SEARCH_KNOWLEDGE_BASE,
                    input,
                    json!({ "results": results }),
                ))
            }
            Ok(Err(e @ DeskError::Provider(_))) => {
                let reason = e.to_string();
                Retrieval::Fatal(ToolInvocation::failed(SEARCH_KNOWLEDGE_BASE, input, reason.clone()), reason)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "knowledge query failed");
                Retrieval::Observed(ToolInvocation::failed(SEARCH_KNOWLEDGE_BASE, input, e.to_string()))
            }
            Err(_) => {
                let reason = format!("retrieval timed out after {:?}", self.limits.call_timeout);
                Retrieval::Fatal(ToolInvocation::failed(SEARCH_KNOWLEDGE_BASE, input, reason.clone()), reason)
            }
        }
    }

    fn abort(&self, session: &mut Session, invocations: Vec<ToolInvocation>, reason: AbortReason) -> AgentReply {
        let text = fallback_message(&reason, &invocations);
        session.append_turn(Role::Agent, &text);
        AgentReply {
            text,
            outcome: Outcome::Aborted,
            invocations,
        }
    }
}

enum Retrieval {
    Observed(ToolInvocation),
    Fatal(ToolInvocation, String),
}

fn fallback_message(reason: &AbortReason, invocations: &[ToolInvocation]) -> String {
    let mut text = match reason {
        AbortReason::StepLimit => "I'm sorry, I wasn't able to fully resolve your request. \
            Could you rephrase it, or ask me to create a support ticket so a human agent can follow up?"
            .to_string(),
        AbortReason::Provider(_) => "I'm sorry, I'm having trouble reaching the assistant service right now. \
            Please try again in a moment."
            .to_string(),
    };

    let tickets: Vec<&str> = invocations
        .iter()
        .filter(|inv| inv.success && inv.tool == CREATE_TICKET)
        .filter_map(|inv| inv.result.get("ticket_id").and_then(|t| t.as_str()))
        .collect();
    if !tickets.is_empty() {
        text.push_str(&format!(" Your ticket {} has been created.", tickets.join(", ")));
    }
    text
}
