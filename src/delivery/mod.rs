pub mod evolution;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

pub use evolution::EvolutionClient;
pub use telegram::TelegramDelivery;

/// Where and with which credentials an adapter sends a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Addressing {
    /// Base URL of the provider API, when the platform needs one
    pub endpoint: Option<String>,
    /// API key or bot token
    pub token: String,
    /// Recipient on the destination platform
    pub target: String,
}

/// Sends an already formatted message to one destination platform.
///
/// Any error is a per-destination failure; the engine reports it and moves on.
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, addressing: &Addressing, text: &str) -> Result<()>;
}
