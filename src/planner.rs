//! Planning: deciding the agent's next move.
//!
//! A [`Planner`] looks at the conversation so far and the observations
//! gathered in the current cycle, and returns one [`Decision`]. The
//! production planner, [`LlmPlanner`], asks a chat model to reply with a
//! single JSON object:
//!
//! ```json
//! {"type": "tool_call", "tool_name": "create_ticket", "tool_args": {"description": "..."}}
//! {"type": "final", "content": "Your ticket TKT-00001 has been created."}
//! ```
//!
//! A `tool_call` naming `search_knowledge_base` becomes
//! [`Decision::Retrieve`]. Replies that are not a recognised JSON decision
//! are taken as the final answer verbatim.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use support_desk_core::models::ToolInvocation;
use support_desk_core::session::{Role, SessionEvent};
use support_desk_core::Result;

use crate::llm::{ChatMessage, LlmClient};
use crate::tools::{ToolSpec, SEARCH_KNOWLEDGE_BASE};

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Reply to the user and end the cycle.
    Answer(String),
    /// Query the knowledge base. An empty query means "use the user's message".
    Retrieve { query: String },
    /// Call a tool from the tool set.
    Invoke { tool: String, args: Value },
}

/// Everything a planner may look at for one step.
pub struct PlanningContext<'a> {
    /// Earlier session events, oldest first, already windowed.
    pub history: &'a [SessionEvent],
    /// The user message that opened this cycle.
    pub message: &'a str,
    /// Retrievals and tool calls made so far in this cycle.
    pub observations: &'a [ToolInvocation],
    pub tools: &'a [ToolSpec],
    /// Zero-based step number.
    pub step: usize,
    pub max_steps: usize,
}

impl PlanningContext<'_> {
    /// Actions still allowed before the step limit.
    pub fn remaining_actions(&self) -> usize {
        self.max_steps.saturating_sub(self.step)
    }
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, ctx: &PlanningContext<'_>) -> Result<Decision>;
}

pub struct LlmPlanner {
    client: Arc<dyn LlmClient>,
}

impl LlmPlanner {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, ctx: &PlanningContext<'_>) -> Result<Decision> {
        let messages = render_messages(ctx);
        let reply = self.client.complete(&messages).await?;
        let decision = parse_decision(&reply);
        tracing::debug!(step = ctx.step, ?decision, "planner decision");
        Ok(decision)
    }
}

const ROLE_PROMPT: &str = "You are a friendly, accurate customer support agent. \
Use the knowledge base for product and policy questions and never invent policies. \
Create a ticket when an issue needs follow-up, and escalate when the customer asks for a human \
or the issue is urgent. Always tell the customer the ticket id you created.";

pub fn system_prompt(tools: &[ToolSpec]) -> String {
    let mut prompt = String::from(ROLE_PROMPT);
    prompt.push_str("\n\nAvailable tools:\n");
    for tool in tools {
        prompt.push_str(&format!(
            "- {}: {}\n  parameters: {}\n",
            tool.name, tool.description, tool.parameters
        ));
    }
    prompt.push_str(
        "\nReply with exactly one JSON object and nothing else.\n\
         To call a tool: {\"type\": \"tool_call\", \"tool_name\": \"<name>\", \"tool_args\": {...}}\n\
         To answer the customer: {\"type\": \"final\", \"content\": \"<answer>\"}\n",
    );
    prompt
}

/// Build the chat transcript sent to the model for one planning step.
pub fn render_messages(ctx: &PlanningContext<'_>) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt(ctx.tools))];

    for event in ctx.history {
        match event {
            SessionEvent::Turn(turn) => messages.push(match turn.role {
                Role::User => ChatMessage::user(&turn.text),
                Role::Agent => ChatMessage::assistant(&turn.text),
            }),
            SessionEvent::Tool(inv) => {
                messages.push(ChatMessage::system(format!("Earlier tool result: {}", inv.summary())))
            }
        }
    }

    messages.push(ChatMessage::user(ctx.message));

    for inv in ctx.observations {
        messages.push(ChatMessage::assistant(
            json!({ "type": "tool_call", "tool_name": inv.tool, "tool_args": inv.input }).to_string(),
        ));
        let observation = if inv.success {
            format!("Observation from {}: {}", inv.tool, inv.result)
        } else {
            format!(
                "Observation from {}: FAILED: {}",
                inv.tool,
                inv.error.as_deref().unwrap_or("unknown error")
            )
        };
        messages.push(ChatMessage::user(observation));
    }

    if ctx.remaining_actions() == 0 {
        messages.push(ChatMessage::system(
            "No tool calls remain. Answer the customer now with a final response.",
        ));
    }
    messages
}

/// Interpret a model reply. Never fails: unrecognised replies are answers.
pub fn parse_decision(text: &str) -> Decision {
    json_from_text(text)
        .and_then(|v| decision_from_value(&v))
        .unwrap_or_else(|| Decision::Answer(text.trim().to_string()))
}

fn json_from_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn decision_from_value(value: &Value) -> Option<Decision> {
    let kind = value
        .get("type")
        .or_else(|| value.get("action"))
        .and_then(|v| v.as_str())?;

    match kind {
        "tool_call" => {
            let name = value
                .get("tool_name")
                .or_else(|| value.get("name"))
                .or_else(|| value.get("tool"))
                .and_then(|v| v.as_str())?;
            let args = value
                .get("tool_args")
                .or_else(|| value.get("args"))
                .cloned()
                .unwrap_or_else(|| json!({}));

            if name == SEARCH_KNOWLEDGE_BASE {
                let query = args
                    .get("query")
                    .and_then(|q| q.as_str())
                    .unwrap_or_default()
                    .to_string();
                Some(Decision::Retrieve { query })
            } else {
                Some(Decision::Invoke { tool: name.to_string(), args })
            }
        }
        "final" => {
            let content = value
                .get("content")
                .or_else(|| value.get("message"))
                .or_else(|| value.get("response"))
                .and_then(|v| v.as_str())?
                .trim();
            if content.is_empty() {
                None
            } else {
                Some(Decision::Answer(content.to_string()))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolSet;
    use support_desk_core::session::Session;
    use support_desk_core::DeskError;
    use tokio::sync::Mutex;

    #[test]
    fn test_parse_tool_call() {
        let d = parse_decision(r#"{"type":"tool_call","tool_name":"create_ticket","tool_args":{"description":"printer"}}"#);
        assert_eq!(
            d,
            Decision::Invoke {
                tool: "create_ticket".to_string(),
                args: json!({ "description": "printer" })
            }
        );
    }

    #[test]
    fn test_parse_search_becomes_retrieve() {
        let d = parse_decision(r#"{"type":"tool_call","tool_name":"search_knowledge_base","tool_args":{"query":"reset password"}}"#);
        assert_eq!(d, Decision::Retrieve { query: "reset password".to_string() });

        let d = parse_decision(r#"{"action":"tool_call","name":"search_knowledge_base"}"#);
        assert_eq!(d, Decision::Retrieve { query: String::new() });
    }

    #[test]
    fn test_parse_final_inside_code_fence() {
        let d = parse_decision("```json\n{\"type\": \"final\", \"content\": \"Done!\"}\n```");
        assert_eq!(d, Decision::Answer("Done!".to_string()));
    }

    #[test]
    fn test_plain_text_is_an_answer() {
        assert_eq!(
            parse_decision("  Sure, happy to help.  "),
            Decision::Answer("Sure, happy to help.".to_string())
        );
        let odd = r#"{"type":"dance"}"#;
        assert_eq!(parse_decision(odd), Decision::Answer(odd.to_string()));
    }

    #[test]
    fn test_render_includes_history_observations_and_last_step_note() {
        let mut session = Session::new("s");
        session.append_turn(Role::User, "hi");
        session.append_turn(Role::Agent, "hello!");
        let tools = ToolSet::catalogue();
        let obs = vec![ToolInvocation::failed(
            "get_customer_info",
            json!({ "customer_id": "X" }),
            "customer X not found",
        )];
        let ctx = PlanningContext {
            history: session.events(),
            message: "who am I?",
            observations: &obs,
            tools: &tools,
            step: 2,
            max_steps: 2,
        };

        let messages = render_messages(&ctx);
        assert!(messages[0].content.contains("create_ticket"));
        assert!(messages[0].content.contains("search_knowledge_base"));
        assert_eq!(messages[1], ChatMessage::user("hi"));
        assert_eq!(messages[2], ChatMessage::assistant("hello!"));
        assert_eq!(messages[3], ChatMessage::user("who am I?"));
        assert!(messages[5].content.contains("FAILED: customer X not found"));
        assert!(messages.last().unwrap().content.contains("No tool calls remain"));
    }

    struct Recorder {
        replies: Mutex<Vec<String>>,
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl LlmClient for Recorder {
        fn model(&self) -> &str {
            "recorder"
        }

        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().await.push(messages.len());
            self.replies
                .lock()
                .await
                .pop()
                .ok_or_else(|| DeskError::provider("no reply scripted"))
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_llm_planner_uses_client() {
        let client = Arc::new(Recorder {
            replies: Mutex::new(vec![r#"{"type":"final","content":"ok"}"#.to_string()]),
            seen: Mutex::new(Vec::new()),
        });
        let planner = LlmPlanner::new(client.clone());
        let tools = ToolSet::catalogue();
        let ctx = PlanningContext {
            history: &[],
            message: "hello",
            observations: &[],
            tools: &tools,
            step: 0,
            max_steps: 5,
        };
        assert_eq!(planner.plan(&ctx).await.unwrap(), Decision::Answer("ok".to_string()));
        assert_eq!(*client.seen.lock().await, vec![2]);
        assert!(matches!(planner.plan(&ctx).await, Err(DeskError::Provider(_))));
    }
}
