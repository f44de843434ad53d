// Scheduled follow-up messages
//
// Follow-ups (menu button, product image) are rows with a `deliver_at`
// timestamp, drained by a background worker. A failed send stays pending
// until it has been attempted MAX_FOLLOW_UP_ATTEMPTS times.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use std::time::Duration;

use crate::db::StoreError;
use crate::whatsapp::conversation::ConversationStore;
use crate::whatsapp::outbox::{OutboundContent, Outbox};

pub const MAX_FOLLOW_UP_ATTEMPTS: i32 = 3;

/// Due rows fetched per tick
const FOLLOW_UP_BATCH: i64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FollowUpAction {
    MenuButton { body: String, label: String, url: String },
    Image { url: String, caption: Option<String> },
}

impl FollowUpAction {
    pub fn to_content(&self) -> OutboundContent {
        match self {
            FollowUpAction::MenuButton { body, label, url } => OutboundContent::MenuButton {
                body: body.clone(),
                label: label.clone(),
                url: url.clone(),
            },
            FollowUpAction::Image { url, caption } => OutboundContent::Image {
                url: url.clone(),
                caption: caption.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FollowUpStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FollowUp {
    pub id: i64,
    pub phone: String,
    pub conversation_id: Option<i64>,
    pub action: Json<FollowUpAction>,
    pub deliver_at: DateTime<Utc>,
    pub status: FollowUpStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFollowUp {
    pub phone: String,
    pub conversation_id: Option<i64>,
    pub action: FollowUpAction,
    pub deliver_at: DateTime<Utc>,
}

#[async_trait]
pub trait FollowUpQueue: Send + Sync {
    async fn enqueue(&self, follow_up: &NewFollowUp) -> Result<i64, StoreError>;

    /// Pending rows with `deliver_at <= now`, oldest first
    async fn due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FollowUp>, StoreError>;

    async fn mark_sent(&self, id: i64) -> Result<(), StoreError>;

    /// Counts the attempt; the row becomes `failed` once attempts run out
    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), StoreError>;
}

pub struct PgFollowUpQueue {
    pool: PgPool,
}

impl PgFollowUpQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FollowUpQueue for PgFollowUpQueue {
    async fn enqueue(&self, follow_up: &NewFollowUp) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO follow_ups (phone, conversation_id, action, deliver_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&follow_up.phone)
        .bind(follow_up.conversation_id)
        .bind(Json(&follow_up.action))
        .bind(follow_up.deliver_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FollowUp>, StoreError> {
        let rows = sqlx::query_as::<_, FollowUp>(
            r#"
            SELECT id, phone, conversation_id, action, deliver_at, status, attempts, last_error
            FROM follow_ups
            WHERE status = 'pending' AND deliver_at <= $1
            ORDER BY deliver_at, id
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_sent(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE follow_ups SET status = 'sent', attempts = attempts + 1, last_error = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE follow_ups
               SET attempts = attempts + 1,
                   last_error = $2,
                   status = CASE WHEN attempts + 1 >= $3 THEN 'failed' ELSE 'pending' END
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(MAX_FOLLOW_UP_ATTEMPTS)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Drains due follow-ups through the outbox
#[derive(Clone)]
pub struct FollowUpWorker {
    queue: Arc<dyn FollowUpQueue>,
    conversations: Arc<dyn ConversationStore>,
    outbox: Outbox,
}

impl FollowUpWorker {
    pub fn new(queue: Arc<dyn FollowUpQueue>, conversations: Arc<dyn ConversationStore>, outbox: Outbox) -> Self {
        Self {
            queue,
            conversations,
            outbox,
        }
    }

    /// Sends everything due at `now`; returns how many were delivered
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let due = self.queue.due(now, FOLLOW_UP_BATCH).await?;
        let mut delivered = 0;

        for follow_up in due {
            let conversation_id = match follow_up.conversation_id {
                Some(id) => Some(id),
                None => self
                    .conversations
                    .upsert_conversation(&follow_up.phone, None)
                    .await
                    .map(|(conversation, _)| conversation.id)
                    .ok(),
            };

            let content = follow_up.action.0.to_content();
            match self.outbox.deliver(conversation_id, &follow_up.phone, &content).await {
                Ok(()) => {
                    self.queue.mark_sent(follow_up.id).await?;
                    delivered += 1;
                }
                Err(e) => {
                    self.queue.mark_failed(follow_up.id, &e.to_string()).await?;
                }
            }
        }

        Ok(delivered)
    }

    /// Ticks forever on a fixed interval
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!("Follow-up worker started (every {}s)", interval.as_secs());

        loop {
            ticker.tick().await;
            match self.tick(Utc::now()).await {
                Ok(0) => {}
                Ok(delivered) => tracing::info!("Delivered {} follow-up messages", delivered),
                Err(e) => tracing::warn!("Follow-up tick failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{InMemoryConversations, InMemoryFollowUps, RecordingMessaging};
    use crate::whatsapp::messaging::MessagingError;
    use crate::whatsapp::metrics::GatewayMetrics;

    const PHONE: &str = "5511999990000";

    fn setup() -> (FollowUpWorker, Arc<InMemoryFollowUps>, Arc<RecordingMessaging>) {
        let queue = Arc::new(InMemoryFollowUps::default());
        let conversations = Arc::new(InMemoryConversations::default());
        let messaging = Arc::new(RecordingMessaging::default());
        let outbox = Outbox::new(conversations.clone(), messaging.clone(), GatewayMetrics::new());
        (
            FollowUpWorker::new(queue.clone(), conversations, outbox),
            queue,
            messaging,
        )
    }

    fn menu_button(deliver_at: DateTime<Utc>) -> NewFollowUp {
        NewFollowUp {
            phone: PHONE.into(),
            conversation_id: None,
            action: FollowUpAction::MenuButton {
                body: "Peça pelo nosso cardápio online".into(),
                label: "Ver cardápio".into(),
                url: "https://loja.example".into(),
            },
            deliver_at,
        }
    }

    #[tokio::test]
    async fn test_only_due_follow_ups_are_sent() {
        let (worker, queue, messaging) = setup();
        let now = Utc::now();
        queue.enqueue(&menu_button(now - chrono::Duration::seconds(1))).await.unwrap();
        queue.enqueue(&menu_button(now + chrono::Duration::seconds(60))).await.unwrap();

        assert_eq!(worker.tick(now).await.unwrap(), 1);
        assert_eq!(messaging.sent().len(), 1);
        assert_eq!(queue.with_status(FollowUpStatus::Pending).len(), 1);
        assert_eq!(queue.with_status(FollowUpStatus::Sent).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_follow_up_retried_then_given_up() {
        let (worker, queue, messaging) = setup();
        messaging.fail_with(MessagingError::Network("timeout".into()));
        let now = Utc::now();
        queue.enqueue(&menu_button(now)).await.unwrap();

        for _ in 0..MAX_FOLLOW_UP_ATTEMPTS {
            assert_eq!(worker.tick(now).await.unwrap(), 0);
        }
        let failed = queue.with_status(FollowUpStatus::Failed);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].attempts, MAX_FOLLOW_UP_ATTEMPTS);
        assert!(failed[0].last_error.as_deref().unwrap_or_default().contains("timeout"));

        // nothing left to try
        assert_eq!(worker.tick(now).await.unwrap(), 0);
        assert_eq!(messaging.attempts(), MAX_FOLLOW_UP_ATTEMPTS as usize);
    }

    #[test]
    fn test_action_serializes_with_type_tag() {
        let action = FollowUpAction::Image {
            url: "https://cdn.example/x.png".into(),
            caption: Some("X-Burger".into()),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(action.to_content().kind(), crate::whatsapp::conversation::MessageKind::Image);
    }
}
