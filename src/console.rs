//! Interactive console (`desk chat`).
//!
//! Each input line is either a command or a chat message:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `help` | list commands |
//! | `status` | knowledge base counts, provider reachability, agent settings |
//! | `upload <path>` | ingest a file or a directory |
//! | `search <query>` | show the closest chunks |
//! | `history` | show this session's turns and tool calls |
//! | `clear` | forget this session's history |
//! | `kb_info` | knowledge base counts only |
//! | `clear_kb` | delete every document and chunk |
//! | `quit`, `exit` | leave |
//!
//! Commands may be written with a leading `/`. Anything else is sent to the
//! agent. End of input leaves the console like `quit`.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use support_desk_core::models::SearchHit;
use support_desk_core::session::SessionEvent;
use support_desk_core::DeskError;

use crate::knowledge::{BatchReport, KnowledgeStatus};
use crate::service::{StatusReport, SupportDesk};
use crate::sessions::SessionManager;

const HELP: &str = "Commands:
  help              show this list
  status            knowledge base, providers and agent settings
  upload <path>     add a file or directory to the knowledge base
  search <query>    show the closest knowledge base chunks
  history           show this conversation
  clear             forget this conversation
  kb_info           knowledge base counts
  clear_kb          delete everything in the knowledge base
  quit, exit        leave the console
Anything else is sent to the support agent.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Status,
    Upload(PathBuf),
    Search(String),
    History,
    Clear,
    KbInfo,
    ClearKb,
    Quit,
    Chat(String),
    Empty,
    /// A known command used wrongly, or an unknown `/command`.
    Usage(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> ConsoleCommand {
        let line = line.trim();
        if line.is_empty() {
            return ConsoleCommand::Empty;
        }
        let slashed = line.starts_with('/');
        let body = line.trim_start_matches('/');
        let (word, rest) = match body.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (body, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "help" | "?" => ConsoleCommand::Help,
            "status" => ConsoleCommand::Status,
            "history" => ConsoleCommand::History,
            "clear" => ConsoleCommand::Clear,
            "kb_info" => ConsoleCommand::KbInfo,
            "clear_kb" => ConsoleCommand::ClearKb,
            "quit" | "exit" => ConsoleCommand::Quit,
            "upload" if rest.is_empty() => ConsoleCommand::Usage("usage: upload <path>".to_string()),
            "upload" => ConsoleCommand::Upload(PathBuf::from(rest)),
            "search" if rest.is_empty() => ConsoleCommand::Usage("usage: search <query>".to_string()),
            "search" => ConsoleCommand::Search(rest.to_string()),
            _ if slashed => ConsoleCommand::Usage(format!(
                "unknown command '/{}'. Type 'help' for the list of commands.",
                word
            )),
            _ => ConsoleCommand::Chat(line.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleStep {
    Continue(String),
    Quit(String),
}

/// One console conversation over a shared [`SupportDesk`].
pub struct Console {
    desk: Arc<SupportDesk>,
    session_id: String,
}

impl Console {
    pub fn new(desk: Arc<SupportDesk>) -> Self {
        Self {
            desk,
            session_id: SessionManager::new_id(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Handle one input line. Errors become output text; nothing here is fatal.
    pub async fn handle(&mut self, line: &str) -> ConsoleStep {
        let output = match ConsoleCommand::parse(line) {
            ConsoleCommand::Empty => String::new(),
            ConsoleCommand::Quit => return ConsoleStep::Quit("Goodbye!".to_string()),
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Usage(text) => text,
            ConsoleCommand::Status => format_status(&self.desk.status(Some(&self.session_id)).await),
            ConsoleCommand::KbInfo => format_knowledge(&self.desk.status(None).await.knowledge),
            ConsoleCommand::Upload(path) => match self.desk.upload(&path, None).await {
                Ok(report) => format_batch(&report),
                Err(e) => format!("Upload failed: {}", e),
            },
            ConsoleCommand::Search(query) => match self.desk.search(&query, None).await {
                Ok(hits) => format_hits(&hits),
                Err(e) => format!("Search failed: {}", e),
            },
            ConsoleCommand::History => match self.desk.history(&self.session_id).await {
                Ok(events) => format_history(&events),
                Err(DeskError::NotFound(_)) => "No conversation yet.".to_string(),
                Err(e) => format!("History unavailable: {}", e),
            },
            ConsoleCommand::Clear => match self.desk.clear_session(&self.session_id).await {
                Ok(()) | Err(DeskError::NotFound(_)) => "Conversation cleared.".to_string(),
                Err(e) => format!("Clear failed: {}", e),
            },
            ConsoleCommand::ClearKb => match self.desk.reset_knowledge().await {
                Ok(()) => "Knowledge base cleared.".to_string(),
                Err(e) => format!("Reset failed: {}", e),
            },
            ConsoleCommand::Chat(message) => {
                let response = self.desk.chat(Some(&self.session_id), &message).await;
                let mut out = String::new();
                for call in &response.tool_calls {
                    out.push_str(&format!("  [{}]\n", call));
                }
                out.push_str(&format!("Agent: {}", response.reply));
                out
            }
        };
        ConsoleStep::Continue(output)
    }
}

/// Run the REPL on stdin/stdout until `quit` or end of input.
pub async fn run_console(desk: Arc<SupportDesk>) -> anyhow::Result<()> {
    let mut console = Console::new(desk);
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout
        .write_all(b"Support Desk console. Type 'help' for commands, 'quit' to leave.\n")
        .await?;

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            stdout.write_all(b"\n").await?;
            break;
        };
        match console.handle(&line).await {
            ConsoleStep::Continue(out) if out.is_empty() => {}
            ConsoleStep::Continue(out) => {
                stdout.write_all(out.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
            ConsoleStep::Quit(out) => {
                stdout.write_all(out.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                break;
            }
        }
    }
    stdout.flush().await?;
    Ok(())
}

// ============ Output formatting (shared with the CLI) ============

pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results.".to_string();
    }
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!(
            "{}. [{:.3}] {} (chunk {})\n   {}",
            i + 1,
            hit.score,
            hit.source_path,
            hit.chunk_index,
            preview(&hit.text, 200)
        ));
    }
    out
}

pub fn format_batch(report: &BatchReport) -> String {
    let mut lines = Vec::new();
    for doc in &report.ingested {
        lines.push(format!(
            "Ingested {} ({} chunks)",
            doc.source_path, doc.chunks_stored
        ));
    }
    for failed in &report.failed {
        lines.push(format!("Failed {}: {}", failed.path, failed.error));
    }
    if lines.is_empty() {
        lines.push("No supported files found.".to_string());
    }
    lines.join("\n")
}

pub fn format_knowledge(status: &KnowledgeStatus) -> String {
    format!(
        "Knowledge base ({}): {} documents, {} chunks",
        status.backend, status.documents, status.chunks
    )
}

pub fn format_status(report: &StatusReport) -> String {
    let k = &report.knowledge;
    let mut out = format_knowledge(k);
    out.push_str(&format!(
        "\n  store:      {}\n  embedder:   {} ({})\n  llm:        {} ({})",
        reachability(k.store_reachable),
        k.embedding_model,
        reachability(k.embedder_reachable),
        report.agent.model,
        reachability(report.llm_reachable),
    ));
    out.push_str(&format!(
        "\n  agent:      max_steps={} temperature={} max_tokens={}\n  tools:      {}\n  sessions:   {}",
        report.agent.max_steps,
        report.agent.temperature,
        report.agent.max_tokens,
        report.agent.tools_available.join(", "),
        report.active_sessions,
    ));
    if let Some(turns) = report.session_length {
        out.push_str(&format!("\n  this session: {} turns", turns));
    }
    out
}

pub fn format_history(events: &[SessionEvent]) -> String {
    if events.is_empty() {
        return "No conversation yet.".to_string();
    }
    events
        .iter()
        .map(|event| match event {
            SessionEvent::Turn(turn) => format!("{}: {}", turn.role.as_str(), turn.text),
            SessionEvent::Tool(inv) => format!("  [{}]", inv.summary()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn reachability(ok: bool) -> &'static str {
    if ok {
        "reachable"
    } else {
        "unreachable"
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
