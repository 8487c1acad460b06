use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::delivery::{Addressing, DeliveryAdapter};
use crate::platform::WebhookRegistrar;
use crate::relay::EvolutionSettings;

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

/// HTTP client for the Evolution API (WhatsApp).
///
/// Sends relayed text to the target group and registers the inbound webhook.
pub struct EvolutionClient {
    client: reqwest::Client,
}

impl EvolutionClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for EvolutionClient {
    fn default() -> Self {
        Self::new()
    }
}

fn endpoint_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

#[async_trait]
impl DeliveryAdapter for EvolutionClient {
    fn name(&self) -> &str {
        "evolution"
    }

    async fn deliver(&self, addressing: &Addressing, text: &str) -> Result<()> {
        let base = addressing
            .endpoint
            .as_deref()
            .filter(|url| !url.is_empty())
            .context("Evolution API URL is not configured")?;
        let url = endpoint_url(base, "message/sendText");

        debug!("Sending message to Evolution API: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", addressing.token))
            .header("Content-Type", "application/json")
            .json(&SendTextRequest {
                number: &addressing.target,
                text,
            })
            .send()
            .await
            .context("Failed to send request to Evolution API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Evolution API error ({}): {}", status, error_body);
        }

        Ok(())
    }
}

#[async_trait]
impl WebhookRegistrar for EvolutionClient {
    async fn register_webhook(&self, settings: &EvolutionSettings, webhook_url: &str) -> Result<()> {
        let url = endpoint_url(&settings.api_url, "webhook/set");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", settings.api_key))
            .header("Content-Type", "application/json")
            .json(&json!({
                "webhook": {
                    "url": webhook_url,
                    "events": ["messages.upsert"]
                }
            }))
            .send()
            .await
            .context("Failed to send webhook registration to Evolution API")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Evolution webhook registration failed ({}): {}", status, error_body);
        }

        info!("Webhook registered with Evolution API: {}", webhook_url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn addressing(server: &MockServer) -> Addressing {
        Addressing {
            endpoint: Some(server.uri()),
            token: "test_key".to_string(),
            target: "target@g.us".to_string(),
        }
    }

    #[tokio::test]
    async fn test_deliver_posts_send_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText"))
            .and(header("Authorization", "Bearer test_key"))
            .and(body_json(json!({"number": "target@g.us", "text": "hello"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"key": {"id": "x"}})))
            .expect(1)
            .mount(&server)
            .await;

        EvolutionClient::new()
            .deliver(&addressing(&server), "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deliver_trims_trailing_slash() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut addressing = addressing(&server);
        addressing.endpoint = Some(format!("{}/", server.uri()));
        EvolutionClient::new()
            .deliver(&addressing, "hello")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deliver_error_status_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message/sendText"))
            .respond_with(ResponseTemplate::new(500).set_body_string("instance offline"))
            .mount(&server)
            .await;

        let err = EvolutionClient::new()
            .deliver(&addressing(&server), "hello")
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("500"));
        assert!(msg.contains("instance offline"));
    }

    #[tokio::test]
    async fn test_deliver_without_endpoint_fails() {
        let addressing = Addressing {
            endpoint: Some(String::new()),
            token: "k".to_string(),
            target: "t".to_string(),
        };
        let err = EvolutionClient::new()
            .deliver(&addressing, "hello")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn test_register_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook/set"))
            .and(header("Authorization", "Bearer test_key"))
            .and(body_json(json!({
                "webhook": {
                    "url": "https://relay.example/api/webhook",
                    "events": ["messages.upsert"]
                }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let settings = EvolutionSettings {
            api_url: server.uri(),
            api_key: "test_key".to_string(),
        };
        EvolutionClient::new()
            .register_webhook(&settings, "https://relay.example/api/webhook")
            .await
            .unwrap();
    }
}
