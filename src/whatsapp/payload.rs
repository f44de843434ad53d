use serde::{Deserialize, Serialize};

/// `object` value of envelopes sent by the WhatsApp Business platform
pub const BUSINESS_ACCOUNT_OBJECT: &str = "whatsapp_business_account";

/// Webhook envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    /// Delivery receipts for outbound messages; acknowledged, not processed
    #[serde(default)]
    pub statuses: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub text: Option<TextBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBody {
    pub body: String,
}

impl InboundMessage {
    /// Text body for `text` messages, `None` for anything else
    pub fn text_body(&self) -> Option<&str> {
        if self.kind != "text" {
            return None;
        }
        self.text.as_ref().map(|t| t.body.as_str())
    }
}

/// A message together with the sender's profile name, when the envelope has one
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message: InboundMessage,
    pub contact_name: Option<String>,
}

impl WebhookPayload {
    pub fn is_business_account(&self) -> bool {
        self.object == BUSINESS_ACCOUNT_OBJECT
    }

    /// Every message of the envelope in delivery order
    pub fn messages(&self) -> Vec<ReceivedMessage> {
        self.entry
            .iter()
            .flat_map(|entry| entry.changes.iter())
            .flat_map(|change| {
                let value = &change.value;
                value.messages.iter().map(move |message| ReceivedMessage {
                    message: message.clone(),
                    contact_name: value
                        .contacts
                        .iter()
                        .find(|c| c.wa_id == message.from)
                        .and_then(|c| c.profile.as_ref())
                        .and_then(|p| p.name.clone()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn text_payload(from: &str, id: &str, body: &str) -> WebhookPayload {
    serde_json::from_value(serde_json::json!({
        "object": BUSINESS_ACCOUNT_OBJECT,
        "entry": [{
            "id": "WABA",
            "changes": [{
                "field": "messages",
                "value": {
                    "contacts": [{ "wa_id": from, "profile": { "name": "Maria" } }],
                    "messages": [{
                        "from": from,
                        "id": id,
                        "timestamp": "1700000000",
                        "type": "text",
                        "text": { "body": body }
                    }]
                }
            }]
        }]
    }))
    .unwrap()
}
