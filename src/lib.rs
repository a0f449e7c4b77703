//! # Support Desk
//!
//! A retrieval-augmented customer support assistant.
//!
//! Documents (txt, pdf, md, csv) are chunked, embedded and stored in a
//! knowledge base. A bounded agent loop answers customer messages by
//! searching that knowledge base and calling helpdesk tools (create a
//! ticket, escalate it, look up a customer), and is reachable from a console
//! and a JSON HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────┐
//! │ Console  │──▶│  Agent    │──▶│  Knowledge   │──▶ SQLite
//! │ HTTP API │   │  loop     │   │  base        │
//! └──────────┘   │ (planner) │──▶│  Tool set    │──▶ helpdesk
//!                └─────┬─────┘   └──────────────┘
//!                      ▼
//!                 LLM provider
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! desk init
//! desk upload ./docs
//! desk search "reset password"
//! desk ask "How do I reset my password?"
//! desk serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite knowledge store backend |
//! | [`http`] | Shared HTTP client and retry helper |
//! | [`embedding`] | OpenAI and Ollama embedders |
//! | [`loader`] | Text extraction from documents |
//! | [`knowledge`] | Ingestion, retrieval, reset and status |
//! | [`helpdesk`] | Customers, tickets and escalations |
//! | [`tools`] | Agent tool set |
//! | [`llm`] | Chat-completion clients |
//! | [`planner`] | Next-step decisions |
//! | [`agent`] | Bounded decision loop |
//! | [`sessions`] | Live conversations |
//! | [`service`] | Application facade |
//! | [`console`] | Interactive console |
//! | [`server`] | HTTP API |

pub mod agent;
pub mod config;
pub mod console;
pub mod db;
pub mod embedding;
pub mod helpdesk;
pub mod http;
pub mod knowledge;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod planner;
pub mod server;
pub mod service;
pub mod sessions;
pub mod sqlite_store;
pub mod tools;

pub use support_desk_core::{DeskError, Result};
