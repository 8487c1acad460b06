use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::delivery::DeliveryAdapter;
use crate::platform::InboundMessage;
use crate::relay::dedup::DeduplicationStore;
use crate::relay::rewriter;
use crate::relay::{
    Destination, DeliveryOutcome, DestinationConfig, RelayConfig, RelayResult, SkipReason,
};

pub const DEFAULT_HEADER: &str = "📨 Relayed message";
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Relays inbound messages to every enabled destination.
///
/// Holds no per-call state: the config is passed into each `ingest`, and the
/// only thing remembered between calls is the dedup store.
pub struct RelayEngine {
    dedup: DeduplicationStore,
    adapters: HashMap<Destination, Arc<dyn DeliveryAdapter>>,
    delivery_timeout: Duration,
    header: String,
}

impl RelayEngine {
    pub fn new(dedup: DeduplicationStore) -> Self {
        Self {
            dedup,
            adapters: HashMap::new(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            header: DEFAULT_HEADER.to_string(),
        }
    }

    pub fn with_adapter(mut self, platform: Destination, adapter: Arc<dyn DeliveryAdapter>) -> Self {
        self.adapters.insert(platform, adapter);
        self
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Build the outbound text for one destination.
    pub fn format_payload(&self, event: &InboundMessage, text: &str) -> String {
        format!(
            "{}\n\n👤 {}:\n{}\n\n⏰ {}",
            self.header,
            event.sender_name,
            text,
            event.received_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }

    /// Process one inbound event against a config snapshot.
    pub async fn ingest(&self, event: &InboundMessage, config: &RelayConfig) -> RelayResult {
        if !config.is_active {
            debug!("Relay inactive, ignoring message {}", event.message_id);
            return RelayResult::skipped(SkipReason::Inactive);
        }

        if event.source_id != config.source_id {
            debug!(
                "Ignoring message {} from unconfigured source {}",
                event.message_id, event.source_id
            );
            return RelayResult::skipped(SkipReason::ForeignSource);
        }

        if !self
            .dedup
            .should_process(&event.source_id, &event.message_id)
            .await
        {
            debug!("Duplicate message {}, skipping", event.message_id);
            return RelayResult::skipped(SkipReason::Duplicate);
        }

        // join_all keeps input order, so outcomes follow the declared
        // destination order regardless of which delivery finishes first.
        let attempts = config
            .enabled_destinations()
            .map(|destination| self.attempt(event, destination, config));
        let deliveries = join_all(attempts).await;

        let delivered = deliveries.iter().filter(|d| d.success).count();
        info!(
            "Relayed message {} from {}: {}/{} deliveries succeeded",
            event.message_id,
            event.sender_name,
            delivered,
            deliveries.len()
        );

        RelayResult {
            accepted: true,
            deliveries,
            skipped: None,
        }
    }

    async fn attempt(
        &self,
        event: &InboundMessage,
        destination: &DestinationConfig,
        config: &RelayConfig,
    ) -> DeliveryOutcome {
        let Some(adapter) = self.adapters.get(&destination.platform) else {
            warn!("No delivery adapter registered for {}", destination.platform);
            return DeliveryOutcome::failed(
                destination,
                format!("no delivery adapter registered for {}", destination.platform),
            );
        };

        let text = rewriter::rewrite_text(&event.text, destination.platform, &config.rules);
        let payload = self.format_payload(event, &text);
        let addressing = config.addressing(destination);

        match tokio::time::timeout(self.delivery_timeout, adapter.deliver(&addressing, &payload))
            .await
        {
            Ok(Ok(())) => {
                debug!(
                    "Delivered message {} via {} to {}",
                    event.message_id,
                    adapter.name(),
                    destination.target
                );
                DeliveryOutcome::delivered(destination)
            }
            Ok(Err(e)) => {
                warn!(
                    "Delivery of message {} to {} ({}) failed: {:#}",
                    event.message_id, destination.platform, destination.target, e
                );
                DeliveryOutcome::failed(destination, format!("{e:#}"))
            }
            Err(_) => {
                warn!(
                    "Delivery of message {} to {} ({}) timed out",
                    event.message_id, destination.platform, destination.target
                );
                DeliveryOutcome::failed(
                    destination,
                    format!("timed out after {:?}", self.delivery_timeout),
                )
            }
        }
    }
}
