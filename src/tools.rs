//! The agent's tool set.
//!
//! Tools are the side-effecting actions the agent may take on behalf of a
//! customer. Each call goes through two phases:
//!
//! 1. **Validate**: [`ToolRequest::parse`] turns a tool name and JSON
//!    arguments into a typed request. Bad input never reaches a backend.
//! 2. **Execute**: [`ToolSet::invoke`] matches on the request and calls the
//!    [`Helpdesk`].
//!
//! [`ToolSet::run`] does both and always returns a [`ToolInvocation`],
//! recording failures with `success = false` instead of propagating them.
//!
//! # Catalogue
//!
//! | Tool | Parameters | Result |
//! |------|------------|--------|
//! | `create_ticket` | `description`, `customer_id?`, `priority?` | ticket id |
//! | `escalate_issue` | `ticket_id`, `reason` | escalation record |
//! | `get_customer_info` | `customer_id` | customer record |
//!
//! Knowledge-base retrieval is advertised to the planner as
//! `search_knowledge_base` (see [`search_spec`]) but is executed by the
//! agent itself, not by this module.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use support_desk_core::models::ToolInvocation;
use support_desk_core::{DeskError, Result};

use crate::helpdesk::{Helpdesk, NewTicket, Priority};

pub const SEARCH_KNOWLEDGE_BASE: &str = "search_knowledge_base";
pub const CREATE_TICKET: &str = "create_ticket";
pub const ESCALATE_ISSUE: &str = "escalate_issue";
pub const GET_CUSTOMER_INFO: &str = "get_customer_info";

/// Name, description and JSON Schema of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A validated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    CreateTicket(NewTicket),
    EscalateIssue { ticket_id: String, reason: String },
    GetCustomerInfo { customer_id: String },
}

impl ToolRequest {
    /// Validate `args` for the tool called `name`.
    ///
    /// Fails with [`DeskError::ToolExecution`] for unknown tools, non-object
    /// arguments, missing or empty required fields, and bad priorities.
    pub fn parse(name: &str, args: &Value) -> Result<ToolRequest> {
        let empty = Map::new();
        let obj = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(DeskError::tool(name, "arguments must be a JSON object")),
        };

        match name {
            CREATE_TICKET => {
                let priority = match optional_str(name, obj, "priority")? {
                    Some(p) => p.parse::<Priority>().map_err(|e| DeskError::tool(name, e))?,
                    None => Priority::default(),
                };
                Ok(ToolRequest::CreateTicket(NewTicket {
                    customer_id: optional_str(name, obj, "customer_id")?,
                    description: required_str(name, obj, "description")?,
                    priority,
                }))
            }
            ESCALATE_ISSUE => Ok(ToolRequest::EscalateIssue {
                ticket_id: required_str(name, obj, "ticket_id")?,
                reason: required_str(name, obj, "reason")?,
            }),
            GET_CUSTOMER_INFO => Ok(ToolRequest::GetCustomerInfo {
                customer_id: required_str(name, obj, "customer_id")?,
            }),
            other => Err(DeskError::tool(other, "unknown tool")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolRequest::CreateTicket(_) => CREATE_TICKET,
            ToolRequest::EscalateIssue { .. } => ESCALATE_ISSUE,
            ToolRequest::GetCustomerInfo { .. } => GET_CUSTOMER_INFO,
        }
    }
}

fn optional_str(tool: &str, obj: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(DeskError::tool(tool, format!("'{}' must be a string", key))),
    }
}

fn required_str(tool: &str, obj: &Map<String, Value>, key: &str) -> Result<String> {
    optional_str(tool, obj, key)?
        .ok_or_else(|| DeskError::tool(tool, format!("missing required parameter '{}'", key)))
}

pub struct ToolSet {
    helpdesk: Arc<dyn Helpdesk>,
}

impl ToolSet {
    pub fn new(helpdesk: Arc<dyn Helpdesk>) -> Self {
        Self { helpdesk }
    }

    pub fn specs() -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: CREATE_TICKET.to_string(),
                description: "Create a support ticket for an issue that needs follow-up".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "description": { "type": "string", "description": "What the customer needs help with" },
                        "customer_id": { "type": "string" },
                        "priority": { "type": "string", "enum": ["low", "medium", "high", "urgent"], "default": "medium" }
                    },
                    "required": ["description"]
                }),
            },
            ToolSpec {
                name: ESCALATE_ISSUE.to_string(),
                description: "Escalate an existing ticket to a human agent".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "ticket_id": { "type": "string", "description": "Ticket id, e.g. TKT-00001" },
                        "reason": { "type": "string" }
                    },
                    "required": ["ticket_id", "reason"]
                }),
            },
            ToolSpec {
                name: GET_CUSTOMER_INFO.to_string(),
                description: "Look up a customer's account details".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "customer_id": { "type": "string" }
                    },
                    "required": ["customer_id"]
                }),
            },
        ]
    }

    /// Every action the planner may request: retrieval first, then tools.
    pub fn catalogue() -> Vec<ToolSpec> {
        let mut all = vec![search_spec()];
        all.extend(Self::specs());
        all
    }

    pub async fn invoke(&self, request: &ToolRequest) -> Result<Value> {
        match request {
            ToolRequest::CreateTicket(new) => {
                let ticket = self.helpdesk.create_ticket(new.clone()).await?;
                Ok(json!({
                    "ticket_id": ticket.id,
                    "status": ticket.status,
                    "priority": ticket.priority,
                    "customer_id": ticket.customer_id,
                    "message": format!("Support ticket {} created with {} priority", ticket.id, ticket.priority),
                }))
            }
            ToolRequest::EscalateIssue { ticket_id, reason } => {
                let esc = self.helpdesk.escalate(ticket_id, reason).await?;
                Ok(json!({
                    "ticket_id": esc.ticket_id,
                    "reason": esc.reason,
                    "escalated_at": esc.escalated_at,
                    "message": format!("Ticket {} escalated to a human agent", esc.ticket_id),
                }))
            }
            ToolRequest::GetCustomerInfo { customer_id } => {
                let customer = self.helpdesk.get_customer(customer_id).await?;
                serde_json::to_value(customer).map_err(|e| DeskError::tool(GET_CUSTOMER_INFO, e.to_string()))
            }
        }
    }

    /// Validate and execute, recording the outcome either way.
    pub async fn run(&self, name: &str, args: Value) -> ToolInvocation {
        let outcome = match ToolRequest::parse(name, &args) {
            Ok(request) => self.invoke(&request).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                tracing::info!(tool = name, "tool call succeeded");
                ToolInvocation::succeeded(name, args, result)
            }
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool call failed");
                ToolInvocation::failed(name, args, e.to_string())
            }
        }
    }
}

pub fn search_spec() -> ToolSpec {
    ToolSpec {
        name: SEARCH_KNOWLEDGE_BASE.to_string(),
        description: "Search the support knowledge base for relevant documentation".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" }
            },
            "required": ["query"]
        }),
    }
}
