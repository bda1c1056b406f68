use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StoreResult;

pub mod memory;
pub mod redis;

pub use self::memory::{MemorySessionStore, SweeperHandle};
pub use self::redis::RedisSessionStore;

/// A single click recorded against a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClickEvent {
    pub item_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ClickEvent {
    pub fn now(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Bounded, expiring per-session interaction log
///
/// Implementations own session lifetime: the window bound and the TTL are enforced
/// here, never by callers. An expired session is indistinguishable from one that
/// never existed. Concurrent writes to the same session are last-write-wins.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Appends a click, keeps only the most recent window and restarts the TTL.
    /// Creates the session when it does not exist.
    async fn record_click(&self, session_id: &str, item_id: &str) -> StoreResult<()>;

    /// Item ids of the session, oldest first. Empty for unknown or expired sessions.
    async fn get_history(&self, session_id: &str) -> StoreResult<Vec<String>>;

    /// Forgets the session immediately
    async fn delete_session(&self, session_id: &str) -> StoreResult<()>;

    /// Live connectivity probe
    async fn health_check(&self) -> bool;

    /// Store name for logging
    fn name(&self) -> &'static str;
}
