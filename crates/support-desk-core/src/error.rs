//! Error taxonomy shared by every Support Desk component.
//!
//! | Variant | Raised by | Handling |
//! |---------|-----------|----------|
//! | [`Configuration`](DeskError::Configuration) | config validation, chunker setup | fatal at startup |
//! | [`Parsing`](DeskError::Parsing) | document loader | reported per file |
//! | [`StoreUnavailable`](DeskError::StoreUnavailable) | knowledge store backends | reported, retryable |
//! | [`Provider`](DeskError::Provider) | embedding / language-model calls | agent aborts with a fallback |
//! | [`ToolExecution`](DeskError::ToolExecution) | tool set | recorded on the invocation |
//! | [`NotFound`](DeskError::NotFound) | helpdesk lookups, sessions | recorded or reported |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to parse {path}: {message}")]
    Parsing { path: String, message: String },

    #[error("knowledge store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("{0} not found")]
    NotFound(String),
}

impl DeskError {
    pub fn config(message: impl Into<String>) -> Self {
        DeskError::Configuration(message.into())
    }

    pub fn parsing(path: impl Into<String>, message: impl Into<String>) -> Self {
        DeskError::Parsing {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn store(message: impl std::fmt::Display) -> Self {
        DeskError::StoreUnavailable(message.to_string())
    }

    pub fn provider(message: impl std::fmt::Display) -> Self {
        DeskError::Provider(message.to_string())
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        DeskError::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code used by the HTTP error contract.
    pub fn code(&self) -> &'static str {
        match self {
            DeskError::Configuration(_) => "configuration",
            DeskError::Parsing { .. } => "parse_error",
            DeskError::StoreUnavailable(_) => "store_unavailable",
            DeskError::Provider(_) => "provider_error",
            DeskError::ToolExecution { .. } => "tool_error",
            DeskError::NotFound(_) => "not_found",
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeskError::StoreUnavailable(_) | DeskError::Provider(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsing_error_names_file() {
        let err = DeskError::parsing("faq.pdf", "truncated xref table");
        assert_eq!(err.to_string(), "failed to parse faq.pdf: truncated xref table");
        assert_eq!(err.code(), "parse_error");
    }

    #[test]
    fn test_not_found_message() {
        let err = DeskError::NotFound("customer CUST-404".to_string());
        assert_eq!(err.to_string(), "customer CUST-404 not found");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_store_errors_are_retryable() {
        assert!(DeskError::store("connection refused").is_retryable());
        assert!(!DeskError::config("bad overlap").is_retryable());
    }
}
