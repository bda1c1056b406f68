use redis::{AsyncCommands, Client};

use super::{ClickEvent, SessionStore};
use crate::storage::StoreResult;

/// Creates a Redis client for the session store
///
/// The client connects lazily, so an unreachable Redis surfaces on the first
/// request (and in the health probe) instead of at startup.
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

fn session_key(session_id: &str) -> String {
    format!("session:{}", session_id)
}

/// Redis-backed session store
///
/// Each session is a list of JSON encoded [`ClickEvent`]s under `session:{id}`.
/// Redis enforces the TTL, so an idle session simply disappears.
#[derive(Clone)]
pub struct RedisSessionStore {
    redis_client: Client,
    window: usize,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    pub fn new(redis_client: Client, window: usize, ttl_seconds: u64) -> Self {
        Self {
            redis_client,
            window,
            ttl_seconds,
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn record_click(&self, session_id: &str, item_id: &str) -> StoreResult<()> {
        let key = session_key(session_id);
        let event = serde_json::to_string(&ClickEvent::now(item_id))?;
        let keep_from = -(self.window as isize);

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        // Append, trim to the window and restart the TTL in one round trip
        let _: () = redis::pipe()
            .atomic()
            .rpush(&key, event)
            .ignore()
            .ltrim(&key, keep_from, -1)
            .ignore()
            .expire(&key, self.ttl_seconds as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Redis session write failed");
                e
            })?;

        tracing::debug!(session_id = %session_id, item_id = %item_id, "Recorded click");

        Ok(())
    }

    async fn get_history(&self, session_id: &str) -> StoreResult<Vec<String>> {
        let key = session_key(session_id);
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let raw: Vec<String> = conn.lrange(&key, 0, -1).await.map_err(|e| {
            tracing::warn!(error = %e, "Redis session read failed");
            e
        })?;

        let history = raw
            .iter()
            .filter_map(|json| match serde_json::from_str::<ClickEvent>(json) {
                Ok(event) => Some(event.item_id),
                Err(e) => {
                    tracing::warn!(error = %e, session_id = %session_id, "Skipping malformed click event");
                    None
                }
            })
            .collect::<Vec<_>>();

        // LTRIM already bounds the list; this guards against a smaller configured window
        let skip = history.len().saturating_sub(self.window);
        Ok(history.into_iter().skip(skip).collect())
    }

    async fn delete_session(&self, session_id: &str) -> StoreResult<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(session_key(session_id)).await?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let mut conn = match self.redis_client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Redis health check could not connect");
                return false;
            }
        };

        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
