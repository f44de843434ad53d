// WhatsApp conversational gateway

pub mod complaint;
pub mod conversation;
pub mod dedup;
pub mod followup;
pub mod gateway;
pub mod handlers;
pub mod llm;
pub mod media;
pub mod messaging;
pub mod metrics;
pub mod outbox;
pub mod payload;
pub mod prompt;
pub mod text;
pub mod tracking;

pub use complaint::PgComplaintStore;
pub use conversation::PgConversationStore;
pub use dedup::{MessageDeduplicator, PgProcessedMessages, ProcessedMessageStore, RedisProcessedMessages};
pub use followup::{FollowUpWorker, PgFollowUpQueue};
pub use gateway::{ConversationalGateway, GatewayParts};
pub use llm::{DisabledReplyGenerator, OpenAiCompatibleClient, ReplyGenerator};
pub use media::{ImageResolver, ObjectStorage, SupabaseStorage};
pub use messaging::{DisabledMessaging, MessagingGateway, WhatsAppCloudClient};
pub use metrics::{GatewayHealth, GatewayMetrics};
pub use outbox::Outbox;
