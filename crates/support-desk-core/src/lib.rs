//! # Support Desk Core
//!
//! Shared, runtime-agnostic logic for Support Desk: data models, the error
//! taxonomy, chunking, the knowledge store abstraction, the embedder trait,
//! and conversation sessions.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or network
//! dependencies. Concrete backends (SQLite, HTTP embedders, LLM clients)
//! live in the `support-desk` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod session;
pub mod store;

pub use error::{DeskError, Result};
