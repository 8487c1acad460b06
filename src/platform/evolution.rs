//! Evolution API (WhatsApp) webhook payloads.
//!
//! Only `messages.upsert` events carry chat messages; everything else is
//! ignored by the webhook endpoint.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::platform::{InboundMessage, MEDIA_PLACEHOLDER, UNKNOWN_SENDER};

pub const MESSAGES_UPSERT: &str = "messages.upsert";

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    pub data: Option<MessageData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub key: Option<MessageKey>,
    pub push_name: Option<String>,
    pub message: Option<MessageContent>,
    pub message_timestamp: Option<Timestamp>,
}

/// Unix seconds; some Evolution builds send them as a JSON string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Seconds(i64),
    Text(String),
    Other(serde_json::Value),
}

impl Timestamp {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let seconds = match self {
            Timestamp::Seconds(seconds) => *seconds,
            Timestamp::Text(text) => text.trim().parse().ok()?,
            Timestamp::Other(value) => value.as_f64()? as i64,
        };
        DateTime::from_timestamp(seconds, 0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub remote_jid: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    pub conversation: Option<String>,
    pub extended_text_message: Option<ExtendedText>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendedText {
    pub text: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

impl MessageContent {
    /// Plain text first, then extended text; `None` for media-only messages.
    fn text(&self) -> Option<&str> {
        non_empty(self.conversation.as_ref()).or_else(|| {
            self.extended_text_message
                .as_ref()
                .and_then(|ext| non_empty(ext.text.as_ref()))
        })
    }
}

impl WebhookEvent {
    /// Normalize a `messages.upsert` event into an `InboundMessage`.
    ///
    /// Returns `None` for other event types and for payloads missing the
    /// group or message id.
    pub fn into_inbound(self, now: DateTime<Utc>) -> Option<InboundMessage> {
        if self.event != MESSAGES_UPSERT {
            return None;
        }
        let data = self.data?;
        let key = data.key?;
        let source_id = key.remote_jid.filter(|s| !s.is_empty())?;
        let message_id = key.id.filter(|s| !s.is_empty())?;

        let text = data
            .message
            .as_ref()
            .and_then(MessageContent::text)
            .unwrap_or(MEDIA_PLACEHOLDER)
            .to_string();

        let sender_name = data
            .push_name
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string());

        let received_at = data
            .message_timestamp
            .as_ref()
            .and_then(Timestamp::to_datetime)
            .unwrap_or(now);

        Some(InboundMessage {
            source_id,
            message_id,
            sender_name,
            text,
            received_at,
        })
    }
}
