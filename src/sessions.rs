//! Session manager: owns every live conversation.
//!
//! The map is behind an `RwLock` and each session behind its own `Mutex`.
//! Holding a session's mutex for a whole agent cycle serializes messages
//! within that conversation while other sessions proceed in parallel.
//!
//! Sessions idle for longer than `idle_ttl` are evicted whenever a new
//! session is created, and the map never grows past `max_sessions` unless
//! every session is busy. A session is busy while anyone holds a handle
//! to it, so an in-flight chat is never evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use support_desk_core::session::{Session, SessionEvent};
use support_desk_core::{DeskError, Result};

pub type SessionHandle = Arc<Mutex<Session>>;

#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub idle_ttl: Duration,
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(3600),
            max_sessions: 1000,
        }
    }
}

struct Entry {
    handle: SessionHandle,
    /// Milliseconds since the manager started.
    last_used: AtomicU64,
}

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Entry>>,
    limits: SessionLimits,
    started: Instant,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionLimits::default())
    }
}

impl SessionManager {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            limits,
            started: Instant::now(),
        }
    }

    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub async fn get(&self, id: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(id)?;
        entry.last_used.store(self.now_ms(), Ordering::Relaxed);
        Some(entry.handle.clone())
    }

    pub async fn get_or_create(&self, id: &str) -> SessionHandle {
        if let Some(handle) = self.get(id).await {
            return handle;
        }
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get(id) {
            return entry.handle.clone();
        }

        self.evict(&mut sessions);
        tracing::debug!(session = id, "session created");
        let handle = Arc::new(Mutex::new(Session::new(id)));
        sessions.insert(
            id.to_string(),
            Entry {
                handle: handle.clone(),
                last_used: AtomicU64::new(self.now_ms()),
            },
        );
        handle
    }

    /// Drop idle sessions, then the least recently used ones until there is
    /// room for one more.
    fn evict(&self, sessions: &mut HashMap<String, Entry>) {
        let now = self.now_ms();
        let ttl = self.limits.idle_ttl.as_millis() as u64;
        let before = sessions.len();
        sessions.retain(|_, entry| {
            is_busy(entry) || now.saturating_sub(entry.last_used.load(Ordering::Relaxed)) < ttl
        });

        while sessions.len() >= self.limits.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, entry)| !is_busy(entry))
                .min_by_key(|(_, entry)| entry.last_used.load(Ordering::Relaxed))
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => {
                    tracing::warn!(sessions = sessions.len(), "every session is busy; exceeding max_sessions");
                    break;
                }
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "sessions evicted");
        }
    }

    pub async fn events(&self, id: &str) -> Result<Vec<SessionEvent>> {
        let handle = self.get(id).await.ok_or_else(|| not_found(id))?;
        let session = handle.lock().await;
        Ok(session.events().to_vec())
    }

    /// Number of turns in a session, or `None` if it does not exist.
    pub async fn turn_count(&self, id: &str) -> Option<usize> {
        let handle = self.get(id).await?;
        let session = handle.lock().await;
        Some(session.turn_count())
    }

    /// Drop a session's events but keep the session.
    pub async fn clear(&self, id: &str) -> Result<()> {
        let handle = self.get(id).await.ok_or_else(|| not_found(id))?;
        handle.lock().await.clear();
        Ok(())
    }

    /// Remove a session entirely. A chat already holding it finishes normally.
    pub async fn remove(&self, id: &str) -> Result<()> {
        if self.sessions.write().await.remove(id).is_none() {
            return Err(not_found(id));
        }
        tracing::debug!(session = id, "session removed");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

fn is_busy(entry: &Entry) -> bool {
    Arc::strong_count(&entry.handle) > 1
}

fn not_found(id: &str) -> DeskError {
    DeskError::NotFound(format!("session {}", id))
}
