// Conversational Gateway
//
// Handles every inbound WhatsApp message end to end:
// claim the message id, serialize per phone, record the conversation, pick a
// reply (complaint intake, order tracking or the assistant), deliver it and
// schedule follow-ups. Every dependency failure degrades to a smaller reply;
// nothing here returns an error to the webhook.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::catalog::{CatalogRepository, MenuSnapshot};
use crate::orders::{OrderError, OrderService};
use crate::settings::SettingsService;
use crate::whatsapp::complaint::{acknowledgment, detect_complaint, ComplaintFlow, ComplaintStep, ComplaintStore, NewComplaint};
use crate::whatsapp::conversation::{Conversation, ConversationStore, NewConversationMessage};
use crate::whatsapp::dedup::MessageDeduplicator;
use crate::whatsapp::followup::{FollowUpAction, FollowUpQueue, NewFollowUp};
use crate::whatsapp::llm::{reply_or_fallback, ReplyGenerator};
use crate::whatsapp::media::ImageResolver;
use crate::whatsapp::metrics::GatewayMetrics;
use crate::whatsapp::outbox::{OutboundContent, Outbox};
use crate::whatsapp::payload::{ReceivedMessage, WebhookPayload};
use crate::whatsapp::prompt::{build_system_prompt, wants_image, wants_menu, PromptContext};
use crate::whatsapp::tracking::{ask_for_number, classify, number_not_found, status_reply, TrackingIntent};

const MENU_BUTTON_LABEL: &str = "Ver cardápio";
const MENU_BUTTON_BODY: &str = "Faça seu pedido pelo nosso cardápio online 👇";

/// Everything the gateway talks to
pub struct GatewayParts {
    pub dedup: MessageDeduplicator,
    pub conversations: Arc<dyn ConversationStore>,
    pub complaints: Arc<dyn ComplaintStore>,
    pub orders: OrderService,
    pub catalog: Arc<dyn CatalogRepository>,
    pub settings: Arc<SettingsService>,
    pub llm: Arc<dyn ReplyGenerator>,
    pub outbox: Outbox,
    pub follow_ups: Arc<dyn FollowUpQueue>,
    pub images: ImageResolver,
    pub metrics: GatewayMetrics,
    /// Used when the settings have no menu URL
    pub menu_url: Option<String>,
    pub menu_follow_up_delay: Duration,
}

/// Which branch produced the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyRoute {
    Complaint,
    Tracking,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Duplicate,
    NonText,
    Replied(ReplyRoute),
}

/// Per-envelope tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookSummary {
    pub received: usize,
    pub processed: usize,
    pub duplicates: usize,
    pub ignored: usize,
}

pub struct ConversationalGateway {
    dedup: MessageDeduplicator,
    conversations: Arc<dyn ConversationStore>,
    complaint_flow: ComplaintFlow,
    complaints: Arc<dyn ComplaintStore>,
    orders: OrderService,
    catalog: Arc<dyn CatalogRepository>,
    settings: Arc<SettingsService>,
    llm: Arc<dyn ReplyGenerator>,
    outbox: Outbox,
    follow_ups: Arc<dyn FollowUpQueue>,
    images: ImageResolver,
    metrics: GatewayMetrics,
    menu_url: Option<String>,
    menu_follow_up_delay: Duration,
    phone_locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Facts about the current turn shared by the reply branches
struct Turn<'a> {
    phone: &'a str,
    text: &'a str,
    customer_name: Option<String>,
    conversation_id: Option<i64>,
    first_interaction: bool,
    now: DateTime<Utc>,
}

impl ConversationalGateway {
    pub fn new(parts: GatewayParts) -> Self {
        Self {
            dedup: parts.dedup,
            conversations: parts.conversations,
            complaint_flow: ComplaintFlow::new(),
            complaints: parts.complaints,
            orders: parts.orders,
            catalog: parts.catalog,
            settings: parts.settings,
            llm: parts.llm,
            outbox: parts.outbox,
            follow_ups: parts.follow_ups,
            images: parts.images,
            metrics: parts.metrics,
            menu_url: parts.menu_url,
            menu_follow_up_delay: parts.menu_follow_up_delay,
            phone_locks: DashMap::new(),
        }
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    /// Process every message of a webhook envelope in order
    pub async fn handle_payload(&self, payload: &WebhookPayload) -> WebhookSummary {
        let mut summary = WebhookSummary::default();
        if !payload.is_business_account() {
            tracing::debug!("Ignoring webhook for object '{}'", payload.object);
            return summary;
        }

        self.complaint_flow.purge_expired(Utc::now());

        for received in payload.messages() {
            summary.received += 1;
            match self.handle_message(&received).await {
                MessageOutcome::Duplicate => summary.duplicates += 1,
                MessageOutcome::NonText => summary.ignored += 1,
                MessageOutcome::Replied(_) => summary.processed += 1,
            }
        }
        summary
    }

    pub async fn handle_message(&self, received: &ReceivedMessage) -> MessageOutcome {
        self.metrics.record_received();
        let message = &received.message;

        let Some(text) = message.text_body() else {
            tracing::debug!("Skipping {} message {}", message.kind, message.id);
            self.metrics.record_non_text();
            return MessageOutcome::NonText;
        };

        if !self.dedup.claim(&message.id).await {
            tracing::debug!("Message {} already processed", message.id);
            self.metrics.record_duplicate();
            return MessageOutcome::Duplicate;
        }

        let phone = message.from.as_str();
        let lock = self.lock_for(phone);
        let route = {
            let _guard = lock.lock().await;
            self.process(received, text).await
        };
        drop(lock);
        self.release_lock(phone);

        MessageOutcome::Replied(route)
    }

    async fn process(&self, received: &ReceivedMessage, text: &str) -> ReplyRoute {
        let message = &received.message;
        let phone = message.from.as_str();
        let now = Utc::now();

        let conversation = self.record_inbound(received, text).await;
        let mut turn = Turn {
            phone,
            text,
            customer_name: received
                .contact_name
                .clone()
                .or_else(|| conversation.as_ref().and_then(|(c, _)| c.customer_name.clone())),
            conversation_id: conversation.as_ref().map(|(c, _)| c.id),
            first_interaction: conversation.as_ref().is_some_and(|(_, created)| *created),
            now,
        };

        match self.complaint_flow.advance(phone, text, now) {
            Some(ComplaintStep::Reply(reply)) | Some(ComplaintStep::Abandoned(reply)) => {
                self.reply(&turn, OutboundContent::Text(reply)).await;
                return ReplyRoute::Complaint;
            }
            Some(ComplaintStep::Completed(draft)) => {
                let complaint = NewComplaint {
                    conversation_id: turn.conversation_id,
                    draft,
                };
                match self.complaints.record(&complaint).await {
                    Ok(id) => {
                        tracing::info!("Recorded complaint {} from {}", id, phone);
                        self.metrics.record_complaint_recorded();
                    }
                    Err(e) => tracing::warn!("Failed to record complaint from {}: {}", phone, e),
                }
                self.reply(&turn, OutboundContent::Text(acknowledgment(&complaint.draft))).await;
                turn.first_interaction = false;
            }
            None => {
                if detect_complaint(text) {
                    let offer = self.complaint_flow.open(phone, now);
                    self.metrics.record_complaint_opened();
                    self.reply(&turn, OutboundContent::Text(offer)).await;
                    return ReplyRoute::Complaint;
                }
            }
        }

        if let Some(intent) = classify(text) {
            let reply = self.tracking_reply(phone, intent).await;
            self.metrics.record_tracking_reply();
            self.reply(&turn, OutboundContent::Text(reply)).await;
            return ReplyRoute::Tracking;
        }

        self.assistant_reply(&turn).await;
        ReplyRoute::Assistant
    }

    /// Upsert the conversation and store the inbound message
    async fn record_inbound(&self, received: &ReceivedMessage, text: &str) -> Option<(Conversation, bool)> {
        let message = &received.message;
        let conversation = match self
            .conversations
            .upsert_conversation(&message.from, received.contact_name.as_deref())
            .await
        {
            Ok(conversation) => conversation,
            Err(e) => {
                tracing::warn!("Conversation store unavailable for {}: {}", message.from, e);
                return None;
            }
        };

        let inbound = NewConversationMessage::inbound(conversation.0.id, text, &message.id);
        if let Err(e) = self.conversations.append_message(&inbound).await {
            tracing::warn!("Failed to persist inbound message {}: {}", message.id, e);
        }
        Some(conversation)
    }

    async fn tracking_reply(&self, phone: &str, intent: TrackingIntent) -> String {
        match intent {
            TrackingIntent::Number(number) => match self.orders.get_by_number(&number).await {
                Ok(found) => status_reply(&found.order),
                Err(OrderError::NotFound(_)) => number_not_found(&number),
                Err(e) => {
                    tracing::warn!("Order lookup for #{} failed: {}", number, e);
                    ask_for_number()
                }
            },
            TrackingIntent::Keywords => match self.orders.latest_active_for_phone(phone).await {
                Ok(Some(order)) => status_reply(&order),
                Ok(None) => ask_for_number(),
                Err(e) => {
                    tracing::warn!("Active order lookup for {} failed: {}", phone, e);
                    ask_for_number()
                }
            },
        }
    }

    async fn assistant_reply(&self, turn: &Turn<'_>) {
        let menu = match MenuSnapshot::load(self.catalog.as_ref()).await {
            Ok(menu) => menu,
            Err(e) => {
                tracing::warn!("Menu unavailable for assistant prompt: {}", e);
                MenuSnapshot::default()
            }
        };
        let menu_url = self.menu_url().await;

        let context = PromptContext {
            menu_text: menu.to_prompt_text(),
            customer_name: turn.customer_name.clone(),
            first_interaction: turn.first_interaction,
            menu_requested: wants_menu(turn.text),
            image_requested: wants_image(turn.text),
            menu_url: menu_url.clone(),
        };
        let system_prompt = build_system_prompt(&context);

        let outcome = {
            let _timer = self.metrics.start_llm_call();
            reply_or_fallback(self.llm.as_ref(), &system_prompt, turn.text).await
        };
        self.metrics.record_llm_reply(outcome.fell_back);
        self.reply(turn, OutboundContent::Text(outcome.text.clone())).await;

        if context.first_interaction && context.menu_requested {
            match menu_url {
                Some(url) => {
                    let action = FollowUpAction::MenuButton {
                        body: MENU_BUTTON_BODY.to_string(),
                        label: MENU_BUTTON_LABEL.to_string(),
                        url,
                    };
                    let deliver_at = turn.now
                        + chrono::Duration::from_std(self.menu_follow_up_delay).unwrap_or_else(|_| chrono::Duration::zero());
                    self.schedule(turn, action, deliver_at).await;
                }
                None => tracing::debug!("No menu URL configured, skipping menu button"),
            }
        }

        if context.image_requested && !outcome.fell_back {
            if let Some(item) = menu.item_with_image_named_in(&outcome.text) {
                let stored = item.image.clone().unwrap_or_default();
                match self.images.public_url(&stored).await {
                    Ok(url) => {
                        let action = FollowUpAction::Image {
                            url,
                            caption: Some(item.name.clone()),
                        };
                        self.schedule(turn, action, turn.now).await;
                    }
                    Err(e) => tracing::warn!("Image for '{}' unavailable: {}", item.name, e),
                }
            }
        }
    }

    async fn menu_url(&self) -> Option<String> {
        match self.settings.get().await {
            Ok(settings) => settings.menu_url.or_else(|| self.menu_url.clone()),
            Err(e) => {
                tracing::warn!("Settings unavailable, using configured menu URL: {}", e);
                self.menu_url.clone()
            }
        }
    }

    async fn reply(&self, turn: &Turn<'_>, content: OutboundContent) {
        // failures are persisted and counted by the outbox
        let _ = self.outbox.deliver(turn.conversation_id, turn.phone, &content).await;
    }

    async fn schedule(&self, turn: &Turn<'_>, action: FollowUpAction, deliver_at: DateTime<Utc>) {
        let follow_up = NewFollowUp {
            phone: turn.phone.to_string(),
            conversation_id: turn.conversation_id,
            action,
            deliver_at,
        };
        match self.follow_ups.enqueue(&follow_up).await {
            Ok(id) => tracing::debug!("Scheduled follow-up {} for {}", id, turn.phone),
            Err(e) => tracing::warn!("Failed to schedule follow-up for {}: {}", turn.phone, e),
        }
    }

    fn lock_for(&self, phone: &str) -> Arc<Mutex<()>> {
        self.phone_locks
            .entry(phone.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the phone's lock once nobody holds or waits on it
    fn release_lock(&self, phone: &str) {
        self.phone_locks
            .remove_if(phone, |_, lock| Arc::strong_count(lock) == 1);
    }
}
