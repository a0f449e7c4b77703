//! Conversation state for one chat session.
//!
//! A [`Session`] is an append-only log of [`SessionEvent`]s: user and agent
//! turns interleaved with the tool invocations the agent performed between
//! them. Events are never reordered; the only destructive operation is
//! [`Session::clear`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ToolInvocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
        }
    }
}

/// One message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    Turn(Turn),
    Tool(ToolInvocation),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            events: Vec::new(),
        }
    }

    pub fn append_turn(&mut self, role: Role, text: impl Into<String>) {
        self.events.push(SessionEvent::Turn(Turn {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }));
    }

    pub fn record_invocation(&mut self, invocation: ToolInvocation) {
        self.events.push(SessionEvent::Tool(invocation));
    }

    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    /// Turns only, in order.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.events.iter().filter_map(|e| match e {
            SessionEvent::Turn(t) => Some(t),
            SessionEvent::Tool(_) => None,
        })
    }

    /// The last `n` events, oldest first.
    pub fn recent(&self, n: usize) -> &[SessionEvent] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    /// Number of turns (tool invocations are not counted).
    pub fn turn_count(&self) -> usize {
        self.turns().count()
    }

    /// True when no turn or tool invocation has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_events_keep_append_order() {
        let mut s = Session::new("s1");
        s.append_turn(Role::User, "my printer is broken");
        s.record_invocation(ToolInvocation::succeeded(
            "create_ticket",
            json!({"description": "printer"}),
            json!({"ticket_id": "TKT-00001"}),
        ));
        s.append_turn(Role::Agent, "Created TKT-00001");

        assert_eq!(s.events().len(), 3);
        assert!(matches!(s.events()[1], SessionEvent::Tool(_)));
        let roles: Vec<Role> = s.turns().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Agent]);
        assert_eq!(s.turn_count(), 2);
    }

    #[test]
    fn test_tool_only_session_has_no_turns_but_is_not_empty() {
        let mut s = Session::new("s1");
        s.record_invocation(ToolInvocation::failed("get_customer_info", json!({}), "not found"));
        assert_eq!(s.turn_count(), 0);
        assert!(!s.is_empty());
    }

    #[test]
    fn test_recent_window() {
        let mut s = Session::new("s1");
        for i in 0..5 {
            s.append_turn(Role::User, format!("m{}", i));
        }
        let recent = s.recent(2);
        assert_eq!(recent.len(), 2);
        match &recent[0] {
            SessionEvent::Turn(t) => assert_eq!(t.text, "m3"),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(s.recent(50).len(), 5);
    }

    #[test]
    fn test_clear_empties_session() {
        let mut s = Session::new("s1");
        s.append_turn(Role::User, "hi");
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.id, "s1");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let mut s = Session::new("s1");
        s.append_turn(Role::Agent, "hello");
        let value = serde_json::to_value(&s.events()[0]).unwrap();
        assert_eq!(value["kind"], "turn");
        assert_eq!(value["role"], "agent");
    }
}
