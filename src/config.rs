use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::control::{validate_activation, validate_destinations, validate_rules};
use crate::relay::dedup::DEFAULT_CAPACITY;
use crate::relay::engine::DEFAULT_HEADER;
use crate::relay::{DestinationConfig, EvolutionSettings, RelayConfig, RewriteRule, TelegramSettings};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub evolution: EvolutionSettings,
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default = "default_relay_settings")]
    pub relay: RelaySettings,
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub rules: Vec<RewriteRule>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally reachable base URL, used when registering the webhook
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourceConfig {
    /// WhatsApp group JID whose messages are relayed (e.g. "1203...@g.us")
    #[serde(default)]
    pub group_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    /// Start relaying immediately instead of waiting for a `start` call
    #[serde(default)]
    pub active: bool,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,
    #[serde(default = "default_header")]
    pub header: String,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_dedup_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_delivery_timeout_secs() -> u64 {
    5
}

fn default_header() -> String {
    DEFAULT_HEADER.to_string()
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        bind: default_bind(),
        public_url: default_public_url(),
    }
}

fn default_relay_settings() -> RelaySettings {
    RelaySettings {
        active: false,
        dedup_capacity: default_dedup_capacity(),
        delivery_timeout_secs: default_delivery_timeout_secs(),
        header: default_header(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;

        validate_rules(&config.rules)?;
        validate_destinations(&config.destinations)?;
        if config.relay.active {
            validate_activation(&config.relay_config())
                .context("relay.active is set but the relay cannot be activated")?;
        }

        Ok(config)
    }

    /// The relay configuration the service starts with.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            is_active: self.relay.active,
            source_id: self.source.group_id.clone(),
            destinations: self.destinations.clone(),
            rules: self.rules.clone(),
            evolution: self.evolution.clone(),
            telegram: self.telegram.clone(),
        }
    }

    /// Where the source platform should POST message events.
    pub fn webhook_url(&self) -> String {
        format!("{}/api/webhook", self.server.public_url.trim_end_matches('/'))
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.relay.delivery_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{Destination, Pattern, RuleAction};

    const SAMPLE: &str = r#"
[server]
bind = "127.0.0.1:8080"
public_url = "https://relay.example/"

[source]
group_id = "120363000000000000@g.us"

[evolution]
api_url = "https://evo.example"
api_key = "evo-key"

[telegram]
bot_token = "123:abc"

[relay]
dedup_capacity = 500
header = "NEWS"

[[destinations]]
platform = "whatsapp"
target = "120363111111111111@g.us"

[[destinations]]
platform = "telegram"
target = "-1001234"
enabled = false

[[rules]]
destination = "whatsapp"
pattern = ["https://aff.example/x?afp=WPP", "https://promo.example/"]
action = { replace = "https://mine.example" }

[[rules]]
destination = "telegram"
pattern = "http://t.me/some_bot"
action = "remove"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.webhook_url(), "https://relay.example/api/webhook");
        assert_eq!(config.relay.dedup_capacity, 500);
        assert_eq!(config.relay.header, "NEWS");
        assert_eq!(config.delivery_timeout(), Duration::from_secs(5));
        assert!(!config.relay.active);

        assert_eq!(config.destinations.len(), 2);
        assert_eq!(config.destinations[0].platform, Destination::WhatsApp);
        assert!(config.destinations[0].enabled);
        assert!(!config.destinations[1].enabled);

        assert_eq!(
            config.rules[0].pattern,
            Pattern::Many(vec![
                "https://aff.example/x?afp=WPP".to_string(),
                "https://promo.example/".to_string()
            ])
        );
        assert_eq!(
            config.rules[0].action,
            RuleAction::Replace("https://mine.example".to_string())
        );
        assert_eq!(config.rules[1].pattern, Pattern::One("http://t.me/some_bot".to_string()));
        assert_eq!(config.rules[1].action, RuleAction::Remove);
    }

    #[test]
    fn test_relay_config_from_file() {
        let relay = Config::parse(SAMPLE).unwrap().relay_config();
        assert!(!relay.is_active);
        assert_eq!(relay.source_id, "120363000000000000@g.us");
        assert_eq!(relay.evolution.api_key, "evo-key");
        assert_eq!(relay.telegram.bot_token, "123:abc");
        assert_eq!(relay.enabled_destinations().count(), 1);
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.relay.dedup_capacity, DEFAULT_CAPACITY);
        assert_eq!(config.relay.header, DEFAULT_HEADER);
        assert!(config.destinations.is_empty());
        assert!(config.rules.is_empty());
    }

    #[test]
    fn test_empty_pattern_rejected_on_load() {
        let content = r#"
[[rules]]
destination = "telegram"
pattern = ""
action = "remove"
"#;
        assert!(Config::parse(content).is_err());
    }

    #[test]
    fn test_active_without_destinations_rejected() {
        let content = r#"
[source]
group_id = "g@g.us"

[evolution]
api_url = "https://evo.example"
api_key = "k"

[relay]
active = true
"#;
        let err = Config::parse(content).unwrap_err();
        assert!(format!("{err:#}").contains("no enabled destinations"));
    }
}
