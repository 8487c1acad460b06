use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::error::{ConfigError, ControlError};
use crate::platform::WebhookRegistrar;
use crate::relay::rewriter::{self, RewriteOutcome};
use crate::relay::{Destination, DestinationConfig, RelayConfig, RewriteRule};

const REDACTED: &str = "***";

/// Partial update accepted by `updateConfig`. Absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub source_id: Option<String>,
    pub evolution_api_url: Option<String>,
    pub evolution_api_key: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_api_url: Option<String>,
    pub destinations: Option<Vec<DestinationConfig>>,
    pub rules: Option<Vec<RewriteRule>>,
}

/// Read-only view of the relay configuration with secrets redacted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: &'static str,
    pub is_active: bool,
    pub source_id: String,
    pub evolution_api_url: String,
    pub evolution_api_key: String,
    pub telegram_bot_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_api_url: Option<String>,
    pub destinations: Vec<DestinationConfig>,
    pub rules: Vec<RewriteRule>,
}

#[derive(Debug, Serialize)]
pub struct RewritePreview {
    pub destination: Destination,
    pub text: String,
    pub replaced: bool,
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        REDACTED.to_string()
    }
}

/// Sample message exercising every configured literal, for rewrite previews.
pub fn sample_text(config: &RelayConfig) -> String {
    let mut text = String::from("Check out these offers:\n");
    for rule in &config.rules {
        for literal in rule.pattern.literals() {
            text.push_str(literal);
            text.push('\n');
        }
    }
    text.push_str("Visit our site: https://example.com");
    text
}

/// Reject rules that could never match (or would match everywhere).
pub fn validate_rules(rules: &[RewriteRule]) -> Result<(), ConfigError> {
    for (index, rule) in rules.iter().enumerate() {
        let literals = rule.pattern.literals();
        if literals.is_empty() || literals.iter().any(|l| l.trim().is_empty()) {
            return Err(ConfigError::EmptyPattern { index });
        }
        rewriter::check_rule(rule).map_err(|source| ConfigError::InvalidPattern { index, source })?;
    }
    Ok(())
}

pub fn validate_destinations(destinations: &[DestinationConfig]) -> Result<(), ConfigError> {
    match destinations.iter().position(|d| d.target.trim().is_empty()) {
        Some(index) => Err(ConfigError::EmptyTarget { index }),
        None => Ok(()),
    }
}

/// Checks that must pass before ingestion may be switched on.
pub fn validate_activation(config: &RelayConfig) -> Result<(), ConfigError> {
    if config.source_id.is_empty() {
        return Err(ConfigError::MissingSource);
    }
    if config.enabled_destinations().next().is_none() {
        return Err(ConfigError::NoDestinations);
    }
    // Inbound events arrive through Evolution, so it is required even for
    // Telegram-only relays.
    if !config.evolution.is_configured() {
        return Err(ConfigError::MissingEvolutionCredentials);
    }
    Ok(())
}

/// Merge `update` into a copy of `current`.
pub fn apply_update(current: &RelayConfig, update: ConfigUpdate) -> Result<RelayConfig, ConfigError> {
    let mut next = current.clone();

    if let Some(source_id) = update.source_id {
        next.source_id = source_id;
    }
    if let Some(api_url) = update.evolution_api_url {
        next.evolution.api_url = api_url;
    }
    if let Some(api_key) = update.evolution_api_key {
        next.evolution.api_key = api_key;
    }
    if let Some(bot_token) = update.telegram_bot_token {
        next.telegram.bot_token = bot_token;
    }
    if let Some(api_url) = update.telegram_api_url {
        next.telegram.api_url = Some(api_url).filter(|u| !u.is_empty());
    }
    if let Some(destinations) = update.destinations {
        validate_destinations(&destinations)?;
        next.destinations = destinations;
    }
    if let Some(rules) = update.rules {
        validate_rules(&rules)?;
        next.rules = rules;
    }

    if next.is_active {
        validate_activation(&next)?;
    }
    Ok(next)
}

/// Owner of the single live `RelayConfig`.
///
/// Readers take an `Arc` snapshot; writers build a complete new config under
/// the write lock and swap it in, so no reader ever sees a half-applied update.
/// `start` and `stop` are serialized through `lifecycle`, so a stop issued while
/// the webhook is being registered takes effect after that start completes.
pub struct RelayControl {
    current: RwLock<Arc<RelayConfig>>,
    lifecycle: Mutex<()>,
    webhook_url: String,
}

impl RelayControl {
    pub fn new(initial: RelayConfig, webhook_url: impl Into<String>) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            lifecycle: Mutex::new(()),
            webhook_url: webhook_url.into(),
        }
    }

    pub async fn snapshot(&self) -> Arc<RelayConfig> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn update(&self, update: ConfigUpdate) -> Result<Arc<RelayConfig>, ConfigError> {
        let mut current = self.current.write().await;
        let next = Arc::new(apply_update(&current, update)?);
        *current = Arc::clone(&next);
        info!("Relay configuration updated");
        Ok(next)
    }

    /// Validate, register the inbound webhook, then switch ingestion on.
    ///
    /// Nothing changes if validation or registration fails. The config is
    /// validated again when the flag flips, since updates may land while the
    /// registration call is in flight.
    pub async fn start(&self, registrar: &dyn WebhookRegistrar) -> Result<(), ControlError> {
        let _lifecycle = self.lifecycle.lock().await;

        let config = self.snapshot().await;
        validate_activation(&config)?;

        registrar
            .register_webhook(&config.evolution, &self.webhook_url)
            .await
            .map_err(ControlError::Registration)?;

        let mut current = self.current.write().await;
        validate_activation(&current)?;
        let mut next = RelayConfig::clone(&current);
        next.is_active = true;
        *current = Arc::new(next);

        info!("Relay started for source {}", current.source_id);
        Ok(())
    }

    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        let mut current = self.current.write().await;
        let mut next = RelayConfig::clone(&current);
        next.is_active = false;
        *current = Arc::new(next);

        info!("Relay stopped");
    }

    pub async fn status(&self) -> StatusSnapshot {
        let config = self.snapshot().await;
        StatusSnapshot {
            status: if config.is_active { "active" } else { "inactive" },
            is_active: config.is_active,
            source_id: config.source_id.clone(),
            evolution_api_url: config.evolution.api_url.clone(),
            evolution_api_key: redact(&config.evolution.api_key),
            telegram_bot_token: redact(&config.telegram.bot_token),
            telegram_api_url: config.telegram.api_url.clone(),
            destinations: config.destinations.clone(),
            rules: config.rules.clone(),
        }
    }

    /// Show what `text` would look like on each platform under the current rules.
    pub async fn preview(&self, text: &str) -> Vec<RewritePreview> {
        let config = self.snapshot().await;
        [Destination::WhatsApp, Destination::Telegram]
            .into_iter()
            .map(|destination| {
                let RewriteOutcome { text, replaced } =
                    rewriter::rewrite(text, destination, &config.rules);
                RewritePreview {
                    destination,
                    text,
                    replaced,
                }
            })
            .collect()
    }
}
