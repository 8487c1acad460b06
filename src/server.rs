//! HTTP surface: the inbound webhook and the relay control endpoint.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::control::{self, ConfigUpdate, RelayControl};
use crate::error::ControlError;
use crate::platform::evolution::WebhookEvent;
use crate::platform::WebhookRegistrar;
use crate::relay::{RelayEngine, SkipReason};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RelayEngine>,
    pub control: Arc<RelayControl>,
    pub registrar: Arc<dyn WebhookRegistrar>,
}

/// Actions accepted by `POST /api/transfer`, tagged by the `action` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum TransferAction {
    UpdateConfig(ConfigUpdate),
    Start,
    Stop,
    TestLinkReplacement {
        #[serde(default)]
        text: Option<String>,
    },
}

type Reply = (StatusCode, Json<Value>);

fn error_reply(status: StatusCode, message: impl std::fmt::Display) -> Reply {
    (status, Json(json!({ "error": message.to_string() })))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/webhook", get(webhook_status).post(receive_webhook))
        .route("/api/transfer", get(transfer_status).post(transfer_action))
        .with_state(state)
}

async fn receive_webhook(State(state): State<AppState>, Json(event): Json<WebhookEvent>) -> Json<Value> {
    let Some(inbound) = event.into_inbound(Utc::now()) else {
        return Json(json!({ "status": "ignored" }));
    };

    let config = state.control.snapshot().await;
    let result = state.engine.ingest(&inbound, &config).await;

    match result.skipped {
        Some(SkipReason::Duplicate) => Json(json!({ "status": "duplicate" })),
        Some(_) => Json(json!({ "status": "ignored" })),
        None => Json(json!({
            "status": "forwarded",
            "messageId": inbound.message_id,
            "originalMessage": inbound.text,
            "allDelivered": result.all_delivered(),
            "deliveries": result.deliveries,
        })),
    }
}

async fn webhook_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "Webhook endpoint active",
        "config": state.control.status().await,
    }))
}

async fn transfer_status(State(state): State<AppState>) -> Json<Value> {
    let status = state.control.status().await;
    Json(json!({
        "status": status.status,
        "config": status,
    }))
}

async fn transfer_action(State(state): State<AppState>, Json(body): Json<Value>) -> Reply {
    let action: TransferAction = match serde_json::from_value(body) {
        Ok(action) => action,
        Err(e) => {
            warn!("Rejected control request: {}", e);
            return error_reply(StatusCode::BAD_REQUEST, format!("Invalid action: {e}"));
        }
    };

    match action {
        TransferAction::UpdateConfig(update) => match state.control.update(update).await {
            Ok(_) => (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "message": "Configuration updated",
                    "config": state.control.status().await,
                })),
            ),
            Err(e) => error_reply(StatusCode::BAD_REQUEST, e),
        },
        TransferAction::Start => match state.control.start(state.registrar.as_ref()).await {
            Ok(()) => (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "message": "Transfer service started",
                    "isActive": true,
                })),
            ),
            Err(e @ ControlError::Invalid(_)) => error_reply(StatusCode::BAD_REQUEST, e),
            Err(e @ ControlError::Registration(_)) => {
                error!("{}", e);
                error_reply(StatusCode::INTERNAL_SERVER_ERROR, e)
            }
        },
        TransferAction::Stop => {
            state.control.stop().await;
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "message": "Transfer service stopped",
                    "isActive": false,
                })),
            )
        }
        TransferAction::TestLinkReplacement { text } => {
            let text = match text {
                Some(text) => text,
                None => control::sample_text(&*state.control.snapshot().await),
            };
            let results = state.control.preview(&text).await;
            (
                StatusCode::OK,
                Json(json!({
                    "status": "success",
                    "original": text,
                    "results": results,
                })),
            )
        }
    }
}

/// Serve the router until Ctrl-C.
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;

    info!("Listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
