pub mod evolution;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::relay::EvolutionSettings;

/// Display name used when the source platform does not supply one
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Text used for messages that carry no text (images, stickers, audio, ...)
pub const MEDIA_PLACEHOLDER: &str = "Media message";

/// A chat message received from the source platform, normalized
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Group/channel the message was posted in
    pub source_id: String,
    /// Platform-unique message id, used for deduplication
    pub message_id: String,
    /// Display name of the author
    pub sender_name: String,
    /// The message text, or `MEDIA_PLACEHOLDER`
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// Subscribes this service to the source platform's message events.
#[async_trait]
pub trait WebhookRegistrar: Send + Sync {
    async fn register_webhook(&self, settings: &EvolutionSettings, webhook_url: &str) -> Result<()>;
}
