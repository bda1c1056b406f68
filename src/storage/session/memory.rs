use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::SessionStore;
use crate::storage::StoreResult;

struct SessionEntry {
    history: VecDeque<String>,
    last_active: Instant,
}

impl SessionEntry {
    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        now.duration_since(self.last_active) >= ttl
    }
}

/// Process-local session store
///
/// Used for single-replica deployments and tests. Expired entries are dropped on
/// read and by [`MemorySessionStore::purge_expired`].
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    window: usize,
    ttl: Duration,
}

impl MemorySessionStore {
    pub fn new(window: usize, ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            window,
            ttl,
        }
    }

    /// Drops every expired session, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_expired(self.ttl, now));
        before - sessions.len()
    }

    /// Number of live (non-expired) sessions
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .lock()
            .values()
            .filter(|entry| !entry.is_expired(self.ttl, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns a background task that calls [`purge_expired`](Self::purge_expired)
    /// every `interval` until the returned handle is shut down
    pub fn spawn_sweeper(store: Arc<Self>, interval: Duration) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "Purged expired sessions");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Session sweeper stopped");
                        break;
                    }
                }
            }
        });

        SweeperHandle { shutdown_tx }
    }
}

/// Handle for stopping the session sweeper
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn record_click(&self, session_id: &str, item_id: &str) -> StoreResult<()> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();

        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                history: VecDeque::with_capacity(self.window),
                last_active: now,
            });

        // A stale entry must not leak old clicks into the new session
        if entry.is_expired(self.ttl, now) {
            entry.history.clear();
        }

        entry.history.push_back(item_id.to_string());
        while entry.history.len() > self.window {
            entry.history.pop_front();
        }
        entry.last_active = now;

        Ok(())
    }

    async fn get_history(&self, session_id: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();

        let expired = match sessions.get(session_id) {
            Some(entry) if !entry.is_expired(self.ttl, now) => {
                return Ok(entry.history.iter().cloned().collect());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            sessions.remove(session_id);
            tracing::debug!(session_id = %session_id, "Dropped expired session");
        }

        Ok(Vec::new())
    }

    async fn delete_session(&self, session_id: &str) -> StoreResult<()> {
        self.sessions.lock().remove(session_id);
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
