use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::Recipient;
use tokio::sync::Mutex;
use tracing::debug;

use crate::delivery::{Addressing, DeliveryAdapter};

/// Parse a configured Telegram target: numeric ids are chats, anything else
/// a public channel username.
fn recipient(target: &str) -> Recipient {
    let target = target.trim();
    match target.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if target.starts_with('@') => Recipient::ChannelUsername(target.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{target}")),
    }
}

/// Delivers relayed text through the Telegram Bot API.
///
/// Bots are built lazily per (token, api url), since the token can change at
/// runtime through the control surface.
pub struct TelegramDelivery {
    bots: Mutex<HashMap<(String, Option<String>), Bot>>,
}

impl TelegramDelivery {
    pub fn new() -> Self {
        Self {
            bots: Mutex::new(HashMap::new()),
        }
    }

    async fn bot(&self, addressing: &Addressing) -> Result<Bot> {
        let key = (addressing.token.clone(), addressing.endpoint.clone());
        let mut bots = self.bots.lock().await;
        if let Some(bot) = bots.get(&key) {
            return Ok(bot.clone());
        }

        let mut bot = Bot::new(&addressing.token);
        if let Some(api_url) = addressing.endpoint.as_deref().filter(|u| !u.is_empty()) {
            let url: reqwest::Url = api_url
                .parse()
                .with_context(|| format!("Invalid Telegram API URL: {}", api_url))?;
            bot = bot.set_api_url(url);
        }
        bots.insert(key, bot.clone());
        Ok(bot)
    }
}

impl Default for TelegramDelivery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryAdapter for TelegramDelivery {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, addressing: &Addressing, text: &str) -> Result<()> {
        if addressing.token.is_empty() {
            anyhow::bail!("Telegram bot token is not configured");
        }

        let bot = self.bot(addressing).await?;
        debug!("Sending message to Telegram chat {}", addressing.target);

        bot.send_message(recipient(&addressing.target), text.to_string())
            .await
            .with_context(|| format!("Failed to send message to Telegram chat {}", addressing.target))?;

        Ok(())
    }
}
