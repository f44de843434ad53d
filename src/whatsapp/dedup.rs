// Processed message ids
//
// Webhooks are delivered at least once. A message id is claimed atomically
// before any other side effect; a claim that loses means the message was
// already handled.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db::StoreError;

/// Ids remembered in process when the durable store cannot be reached
const RECENT_IDS_CAPACITY: usize = 10_000;

#[async_trait]
pub trait ProcessedMessageStore: Send + Sync {
    /// `true` if this call recorded the id, `false` if it was already there
    async fn claim(&self, message_id: &str) -> Result<bool, StoreError>;
}

pub struct PgProcessedMessages {
    pool: PgPool,
}

impl PgProcessedMessages {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedMessageStore for PgProcessedMessages {
    async fn claim(&self, message_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO processed_messages (message_id) VALUES ($1) ON CONFLICT (message_id) DO NOTHING",
        )
        .bind(message_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

/// Redis keys with a TTL: `{prefix}:processed:{message_id}`
pub struct RedisProcessedMessages {
    conn: ConnectionManager,
    ttl: Duration,
    key_prefix: String,
}

impl RedisProcessedMessages {
    pub async fn new(url: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!("Connected to Redis for processed message ids");

        Ok(Self {
            conn,
            ttl,
            key_prefix: "delivery".to_string(),
        })
    }
}

#[async_trait]
impl ProcessedMessageStore for RedisProcessedMessages {
    async fn claim(&self, message_id: &str) -> Result<bool, StoreError> {
        let key = format!("{}:processed:{}", self.key_prefix, message_id);
        let mut conn = self.conn.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }
}

/// Bounded insertion-ordered set; the oldest id is evicted first
#[derive(Debug, Default)]
pub struct RecentIds {
    inner: Mutex<RecentIdsInner>,
}

#[derive(Debug, Default)]
struct RecentIdsInner {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl RecentIds {
    /// `true` if the id was not present
    pub fn insert(&self, id: &str) -> bool {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if inner.ids.contains(id) {
            return false;
        }
        if inner.order.len() >= RECENT_IDS_CAPACITY {
            if let Some(oldest) = inner.order.pop_front() {
                inner.ids.remove(&oldest);
            }
        }
        inner.order.push_back(id.to_string());
        inner.ids.insert(id.to_string());
        true
    }

    #[cfg(test)]
    fn remembered(&self) -> usize {
        self.inner.lock().map(|inner| inner.ids.len()).unwrap_or(0)
    }
}

/// Durable claim with an in-process fallback
///
/// Ids are always remembered locally as well, so a message first seen while
/// the store was down is still recognized once the store is back.
pub struct MessageDeduplicator {
    store: Arc<dyn ProcessedMessageStore>,
    recent: RecentIds,
}

impl MessageDeduplicator {
    pub fn new(store: Arc<dyn ProcessedMessageStore>) -> Self {
        Self {
            store,
            recent: RecentIds::default(),
        }
    }

    /// `true` when the caller owns the message and must process it
    pub async fn claim(&self, message_id: &str) -> bool {
        let first_seen_locally = self.recent.insert(message_id);

        match self.store.claim(message_id).await {
            Ok(claimed) => claimed && first_seen_locally,
            Err(e) => {
                tracing::warn!(
                    "Processed-message store unavailable, using in-process ids for {}: {}",
                    message_id,
                    e
                );
                first_seen_locally
            }
        }
    }
}
