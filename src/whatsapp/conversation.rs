// Conversations and their message history
//
// One conversation per phone (unique constraint, upsert). Messages are
// appended in arrival order; outbound ones start `pending` and end `sent` or
// `failed`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::db::StoreError;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Conversation {
    pub id: i64,
    pub phone: String,
    pub customer_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Interactive,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Received,
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ConversationMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub direction: MessageDirection,
    pub kind: MessageKind,
    pub body: String,
    pub status: DeliveryStatus,
    pub wa_message_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewConversationMessage {
    pub conversation_id: i64,
    pub direction: MessageDirection,
    pub kind: MessageKind,
    pub body: String,
    pub status: DeliveryStatus,
    pub wa_message_id: Option<String>,
}

impl NewConversationMessage {
    pub fn inbound(conversation_id: i64, body: &str, wa_message_id: &str) -> Self {
        Self {
            conversation_id,
            direction: MessageDirection::In,
            kind: MessageKind::Text,
            body: body.to_string(),
            status: DeliveryStatus::Received,
            wa_message_id: Some(wa_message_id.to_string()),
        }
    }

    pub fn outbound(conversation_id: i64, kind: MessageKind, body: &str) -> Self {
        Self {
            conversation_id,
            direction: MessageDirection::Out,
            kind,
            body: body.to_string(),
            status: DeliveryStatus::Pending,
            wa_message_id: None,
        }
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Returns the conversation and whether this call created it
    async fn upsert_conversation(
        &self,
        phone: &str,
        customer_name: Option<&str>,
    ) -> Result<(Conversation, bool), StoreError>;

    async fn append_message(&self, message: &NewConversationMessage) -> Result<ConversationMessage, StoreError>;

    async fn mark_sent(&self, message_id: i64, wa_message_id: Option<&str>) -> Result<(), StoreError>;

    async fn mark_failed(&self, message_id: i64, error: &str) -> Result<(), StoreError>;

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Conversation>, StoreError>;
}

pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct UpsertedConversation {
    #[sqlx(flatten)]
    conversation: Conversation,
    inserted: bool,
}

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, direction, kind, body, status, wa_message_id, error, created_at";

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn upsert_conversation(
        &self,
        phone: &str,
        customer_name: Option<&str>,
    ) -> Result<(Conversation, bool), StoreError> {
        // xmax is 0 only for a freshly inserted tuple
        let row = sqlx::query_as::<_, UpsertedConversation>(
            r#"
            INSERT INTO conversations (phone, customer_name)
            VALUES ($1, $2)
            ON CONFLICT (phone) DO UPDATE
               SET customer_name = COALESCE(EXCLUDED.customer_name, conversations.customer_name),
                   last_message_at = NOW()
            RETURNING id, phone, customer_name, created_at, last_message_at, (xmax = 0) AS inserted
            "#,
        )
        .bind(phone)
        .bind(customer_name)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.conversation, row.inserted))
    }

    async fn append_message(&self, message: &NewConversationMessage) -> Result<ConversationMessage, StoreError> {
        let query = format!(
            r#"
            INSERT INTO conversation_messages (conversation_id, direction, kind, body, status, wa_message_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            MESSAGE_COLUMNS
        );
        let stored = sqlx::query_as::<_, ConversationMessage>(&query)
            .bind(message.conversation_id)
            .bind(message.direction)
            .bind(message.kind)
            .bind(&message.body)
            .bind(message.status)
            .bind(&message.wa_message_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }

    async fn mark_sent(&self, message_id: i64, wa_message_id: Option<&str>) -> Result<(), StoreError> {
        sqlx::query("UPDATE conversation_messages SET status = 'sent', wa_message_id = $2, error = NULL WHERE id = $1")
            .bind(message_id)
            .bind(wa_message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, message_id: i64, error: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE conversation_messages SET status = 'failed', error = $2 WHERE id = $1")
            .bind(message_id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Conversation>, StoreError> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, phone, customer_name, created_at, last_message_at FROM conversations WHERE phone = $1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(conversation)
    }
}
