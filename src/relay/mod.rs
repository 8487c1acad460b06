pub mod dedup;
pub mod engine;
pub mod rewriter;

use serde::{Deserialize, Serialize};

use crate::delivery::Addressing;

pub use dedup::DeduplicationStore;
pub use engine::RelayEngine;

/// Platforms a relayed message can be delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    WhatsApp,
    Telegram,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::WhatsApp => write!(f, "whatsapp"),
            Destination::Telegram => write!(f, "telegram"),
        }
    }
}

/// One literal or a set of literals a rule matches against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pattern {
    One(String),
    Many(Vec<String>),
}

impl Pattern {
    pub fn literals(&self) -> &[String] {
        match self {
            Pattern::One(literal) => std::slice::from_ref(literal),
            Pattern::Many(literals) => literals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Substitute every occurrence with the given text
    Replace(String),
    /// Delete every occurrence plus the whitespace that follows it
    Remove,
}

/// A literal-pattern rewrite scoped to a single destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub destination: Destination,
    pub pattern: Pattern,
    pub action: RuleAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationConfig {
    pub platform: Destination,
    /// WhatsApp number/group JID, or Telegram chat id / @channel
    pub target: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvolutionSettings {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl EvolutionSettings {
    pub fn is_configured(&self) -> bool {
        !self.api_url.is_empty() && !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default)]
    pub bot_token: String,
    /// Custom Bot API server; the public one is used when unset
    #[serde(default)]
    pub api_url: Option<String>,
}

/// The relay configuration read by every ingestion.
///
/// Never mutated in place: the control surface builds a new value and swaps
/// it in whole, so an ingestion always sees one consistent snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelayConfig {
    pub is_active: bool,
    pub source_id: String,
    pub destinations: Vec<DestinationConfig>,
    pub rules: Vec<RewriteRule>,
    pub evolution: EvolutionSettings,
    pub telegram: TelegramSettings,
}

impl RelayConfig {
    pub fn enabled_destinations(&self) -> impl Iterator<Item = &DestinationConfig> {
        self.destinations.iter().filter(|d| d.enabled)
    }

    /// Build the addressing tuple an adapter needs for `destination`.
    pub fn addressing(&self, destination: &DestinationConfig) -> Addressing {
        match destination.platform {
            Destination::WhatsApp => Addressing {
                endpoint: Some(self.evolution.api_url.clone()),
                token: self.evolution.api_key.clone(),
                target: destination.target.clone(),
            },
            Destination::Telegram => Addressing {
                endpoint: self.telegram.api_url.clone(),
                token: self.telegram.bot_token.clone(),
                target: destination.target.clone(),
            },
        }
    }
}

/// Result of one delivery attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryOutcome {
    pub destination: Destination,
    pub target: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn delivered(destination: &DestinationConfig) -> Self {
        Self {
            destination: destination.platform,
            target: destination.target.clone(),
            success: true,
            error: None,
        }
    }

    pub fn failed(destination: &DestinationConfig, error: impl Into<String>) -> Self {
        Self {
            destination: destination.platform,
            target: destination.target.clone(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Why an inbound event was not relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
    ForeignSource,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayResult {
    pub accepted: bool,
    pub deliveries: Vec<DeliveryOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
}

impl RelayResult {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            accepted: false,
            deliveries: Vec::new(),
            skipped: Some(reason),
        }
    }

    pub fn all_delivered(&self) -> bool {
        self.deliveries.iter().all(|d| d.success)
    }
}
