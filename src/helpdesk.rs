//! Helpdesk backends: tickets, escalations and the customer directory.
//!
//! [`Helpdesk`] is the seam the tool set talks to. Two implementations:
//! [`InMemoryHelpdesk`] for tests and ephemeral sessions, and
//! [`SqliteHelpdesk`] sharing the knowledge-base database.
//!
//! Ticket ids are sequential: `TKT-00001`, `TKT-00002`, ...

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use support_desk_core::{DeskError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub plan: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "normal" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" | "critical" => Ok(Priority::Urgent),
            other => Err(format!(
                "invalid priority '{}': expected low, medium, high or urgent",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Escalated,
}

impl TicketStatus {
    fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Escalated => "escalated",
        }
    }

    fn parse(s: &str) -> TicketStatus {
        if s == "escalated" {
            TicketStatus::Escalated
        } else {
            TicketStatus::Open
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub customer_id: Option<String>,
    pub description: String,
    pub priority: Priority,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub ticket_id: String,
    pub reason: String,
    pub escalated_at: DateTime<Utc>,
}

/// Input for [`Helpdesk::create_ticket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub customer_id: Option<String>,
    pub description: String,
    pub priority: Priority,
}

pub fn ticket_id(seq: u64) -> String {
    format!("TKT-{:05}", seq)
}

#[async_trait]
pub trait Helpdesk: Send + Sync {
    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket>;

    /// Mark a ticket escalated. Unknown tickets are [`DeskError::NotFound`].
    async fn escalate(&self, ticket_id: &str, reason: &str) -> Result<Escalation>;

    async fn get_ticket(&self, ticket_id: &str) -> Result<Ticket>;

    /// Unknown customers are [`DeskError::NotFound`].
    async fn get_customer(&self, customer_id: &str) -> Result<Customer>;
}

// ============ In-memory ============

#[derive(Default)]
struct Desk {
    next_seq: u64,
    tickets: HashMap<String, Ticket>,
    escalations: Vec<Escalation>,
}

pub struct InMemoryHelpdesk {
    customers: HashMap<String, Customer>,
    desk: Mutex<Desk>,
}

impl InMemoryHelpdesk {
    pub fn new(customers: Vec<Customer>) -> Self {
        Self {
            customers: customers.into_iter().map(|c| (c.id.clone(), c)).collect(),
            desk: Mutex::new(Desk::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Desk>> {
        self.desk
            .lock()
            .map_err(|_| DeskError::store("helpdesk lock poisoned"))
    }
}

#[async_trait]
impl Helpdesk for InMemoryHelpdesk {
    async fn create_ticket(&self, new: NewTicket) -> Result<Ticket> {
        let mut desk = self.lock()?;
        desk.next_seq += 1;
        let ticket = Ticket {
            id: ticket_id(desk.next_seq),
            customer_id: new.customer_id,
            description: new.description,
            priority: new.priority,
            status: TicketStatus::Open,
            created_at: Utc::now(),
        };
        desk.tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(ticket)
    }

    async fn escalate(&self, ticket_id: &str, reason: &str) -> Result<Escalation> {
        let mut desk = self.lock()?;
        let ticket = desk
            .tickets
            .get_mut(ticket_id)
            .ok_or_else(|| DeskError::NotFound(format!("ticket {}", ticket_id)))?;
        ticket.status = TicketStatus::Escalated;
        let escalation = Escalation {
            ticket_id: ticket_id.to_string(),
            reason: reason.to_string(),
            escalated_at: Utc::now(),
        };
        desk.escalations.push(escalation.clone());
        Ok(escalation)
    }

    async fn get_ticket(&self, ticket_id: &str) -> Result<Ticket> {
        self.lock()?
            .tickets
            .get(ticket_id)
            .cloned()
            .ok_or_else(|| DeskError::NotFound(format!("ticket {}", ticket_id)))
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Customer> {
        self.customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| DeskError::NotFound(format!("customer {}", customer_id)))
    }
}

// ============ SQLite ============

pub struct SqliteHelpdesk {
    pool: SqlitePool,
}

impl SqliteHelpdesk {
    /// Wrap `pool` and upsert the configured customer directory.
    pub async fn new(pool: SqlitePool, customers: &[Customer]) -> Result<Self> {
        for c in customers {
            sqlx::query(
                r#"
                INSERT INTO customers (id, name, email, plan) VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    email = excluded.email,
                    plan = excluded.plan
                "#,
            )
            .bind(&c.id)
            .bind(&c.name)
            .bind(&c.email)
            .bind(&c.plan)
            .execute(&pool)
            .await
            .map_err(DeskError::store)?;
        }
        Ok(Self { pool })
    }
}

fn from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

#[async_trait]
impl Helpdesk for SqliteHelpdesk {
    async fn create_ticket(&self, new: NewTicket) -> Result<Ticket> {
        let created_at = Utc::now();
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO tickets (id, customer_id, description, priority, status, created_at)
            VALUES ('TKT-' || printf('%05d', (SELECT COALESCE(MAX(seq), 0) + 1 FROM tickets)), ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&new.customer_id)
        .bind(&new.description)
        .bind(new.priority.as_str())
        .bind(TicketStatus::Open.as_str())
        .bind(created_at.timestamp())
        .fetch_one(&self.pool)
        .await
        .map_err(DeskError::store)?;

        Ok(Ticket {
            id,
            customer_id: new.customer_id,
            description: new.description,
            priority: new.priority,
            status: TicketStatus::Open,
            created_at: from_ts(created_at.timestamp()),
        })
    }

    async fn escalate(&self, ticket_id: &str, reason: &str) -> Result<Escalation> {
        let mut tx = self.pool.begin().await.map_err(DeskError::store)?;
        let updated = sqlx::query("UPDATE tickets SET status = ? WHERE id = ?")
            .bind(TicketStatus::Escalated.as_str())
            .bind(ticket_id)
            .execute(&mut *tx)
            .await
            .map_err(DeskError::store)?;
        if updated.rows_affected() == 0 {
            return Err(DeskError::NotFound(format!("ticket {}", ticket_id)));
        }

        let escalated_at = Utc::now();
        sqlx::query("INSERT INTO escalations (ticket_id, reason, escalated_at) VALUES (?, ?, ?)")
            .bind(ticket_id)
            .bind(reason)
            .bind(escalated_at.timestamp())
            .execute(&mut *tx)
            .await
            .map_err(DeskError::store)?;
        tx.commit().await.map_err(DeskError::store)?;

        Ok(Escalation {
            ticket_id: ticket_id.to_string(),
            reason: reason.to_string(),
            escalated_at,
        })
    }

    async fn get_ticket(&self, ticket_id: &str) -> Result<Ticket> {
        let row = sqlx::query(
            "SELECT id, customer_id, description, priority, status, created_at FROM tickets WHERE id = ?",
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DeskError::store)?
        .ok_or_else(|| DeskError::NotFound(format!("ticket {}", ticket_id)))?;

        let priority: String = row.get("priority");
        let status: String = row.get("status");
        Ok(Ticket {
            id: row.get("id"),
            customer_id: row.get("customer_id"),
            description: row.get("description"),
            priority: priority.parse().unwrap_or_default(),
            status: TicketStatus::parse(&status),
            created_at: from_ts(row.get("created_at")),
        })
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Customer> {
        let row = sqlx::query("SELECT id, name, email, plan FROM customers WHERE id = ?")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DeskError::store)?
            .ok_or_else(|| DeskError::NotFound(format!("customer {}", customer_id)))?;

        Ok(Customer {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            plan: row.get("plan"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, migrate};

    fn ada() -> Customer {
        Customer {
            id: "CUST-001".to_string(),
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            plan: "premium".to_string(),
        }
    }

    fn printer() -> NewTicket {
        NewTicket {
            customer_id: None,
            description: "printer not working".to_string(),
            priority: Priority::default(),
        }
    }

    async fn exercise(desk: &dyn Helpdesk) {
        let first = desk.create_ticket(printer()).await.unwrap();
        let second = desk.create_ticket(printer()).await.unwrap();
        assert_eq!(first.id, "TKT-00001");
        assert_eq!(second.id, "TKT-00002");
        assert_eq!(first.priority, Priority::Medium);

        let esc = desk.escalate(&first.id, "customer is blocked").await.unwrap();
        assert_eq!(esc.ticket_id, "TKT-00001");
        assert_eq!(desk.get_ticket(&first.id).await.unwrap().status, TicketStatus::Escalated);
        assert_eq!(desk.get_ticket(&second.id).await.unwrap().status, TicketStatus::Open);

        assert!(matches!(
            desk.escalate("TKT-99999", "x").await,
            Err(DeskError::NotFound(_))
        ));
        assert_eq!(desk.get_customer("CUST-001").await.unwrap(), ada());
        assert!(matches!(
            desk.get_customer("CUST-404").await,
            Err(DeskError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_in_memory_helpdesk() {
        exercise(&InMemoryHelpdesk::new(vec![ada()])).await;
    }

    #[tokio::test]
    async fn test_sqlite_helpdesk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("desk.sqlite")).await.unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        exercise(&SqliteHelpdesk::new(pool, &[ada()]).await.unwrap()).await;
    }

    #[test]
    fn test_priority_parsing() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!("whenever".parse::<Priority>().is_err());
    }
}
