use std::sync::Arc;

use crate::whatsapp::conversation::{ConversationStore, MessageKind, NewConversationMessage};
use crate::whatsapp::messaging::{MessagingError, MessagingGateway, SentMessage};
use crate::whatsapp::metrics::GatewayMetrics;

/// Something the bot sends to a customer
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundContent {
    Text(String),
    MenuButton { body: String, label: String, url: String },
    Image { url: String, caption: Option<String> },
}

impl OutboundContent {
    pub fn kind(&self) -> MessageKind {
        match self {
            OutboundContent::Text(_) => MessageKind::Text,
            OutboundContent::MenuButton { .. } => MessageKind::Interactive,
            OutboundContent::Image { .. } => MessageKind::Image,
        }
    }

    /// Text stored in the conversation history
    pub fn history_body(&self) -> String {
        match self {
            OutboundContent::Text(body) => body.clone(),
            OutboundContent::MenuButton { body, url, .. } => format!("{}\n{}", body, url),
            OutboundContent::Image { url, caption } => match caption {
                Some(caption) => format!("{}\n{}", caption, url),
                None => url.clone(),
            },
        }
    }
}

/// Persist as pending, send, then record the outcome
///
/// A failed send is already stored with its error and counted when the
/// error is returned; callers only need it to reschedule. Without a
/// conversation the message is sent but not recorded.
#[derive(Clone)]
pub struct Outbox {
    conversations: Arc<dyn ConversationStore>,
    messaging: Arc<dyn MessagingGateway>,
    metrics: GatewayMetrics,
}

impl Outbox {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messaging: Arc<dyn MessagingGateway>,
        metrics: GatewayMetrics,
    ) -> Self {
        Self {
            conversations,
            messaging,
            metrics,
        }
    }

    pub async fn deliver(
        &self,
        conversation_id: Option<i64>,
        to: &str,
        content: &OutboundContent,
    ) -> Result<(), MessagingError> {
        let stored_id = match conversation_id {
            Some(conversation_id) => self.persist_pending(conversation_id, to, content).await,
            None => None,
        };

        match self.send(to, content).await {
            Ok(sent) => {
                self.metrics.record_delivery_sent();
                if let Some(id) = stored_id {
                    if let Err(e) = self.conversations.mark_sent(id, sent.wa_message_id.as_deref()).await {
                        tracing::warn!("Failed to mark message {} as sent: {}", id, e);
                    }
                }
                tracing::debug!("Delivered {:?} message to {}", content.kind(), to);
                Ok(())
            }
            Err(e) => {
                let error = e.to_string();
                if e.is_credential_expired() {
                    tracing::error!("WhatsApp access token rejected: {}", error);
                } else {
                    tracing::warn!("Delivery to {} failed: {}", to, error);
                }
                self.metrics.record_delivery_failed(&error, e.is_credential_expired());
                if let Some(id) = stored_id {
                    if let Err(store_error) = self.conversations.mark_failed(id, &error).await {
                        tracing::warn!("Failed to mark message {} as failed: {}", id, store_error);
                    }
                }
                Err(e)
            }
        }
    }

    async fn persist_pending(&self, conversation_id: i64, to: &str, content: &OutboundContent) -> Option<i64> {
        let record = NewConversationMessage::outbound(conversation_id, content.kind(), &content.history_body());
        match self.conversations.append_message(&record).await {
            Ok(stored) => Some(stored.id),
            Err(e) => {
                tracing::warn!("Failed to persist outbound message for {}: {}", to, e);
                None
            }
        }
    }

    async fn send(&self, to: &str, content: &OutboundContent) -> Result<SentMessage, MessagingError> {
        match content {
            OutboundContent::Text(body) => self.messaging.send_text(to, body).await,
            OutboundContent::MenuButton { body, label, url } => {
                self.messaging.send_interactive_cta(to, body, label, url).await
            }
            OutboundContent::Image { url, caption } => self.messaging.send_image(to, url, caption.as_deref()).await,
        }
    }
}
