//! # Webhook Server Module
//!
//! Axum router for webhook transport: teloxide mounts the update endpoint,
//! and this module adds the management surface next to it:
//!
//! - `GET /` — liveness probe
//! - `POST /set_webhook` — (re)register the webhook with Telegram
//! - `GET /get_webhook_info` — current webhook status from Telegram
//! - `POST /delete_webhook` — unregister the webhook
//!
//! Management endpoints require the `x-admin-token` header to match the
//! configured secret.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, Url};
use tracing::{info, warn};

use crate::config::WebhookConfig;

/// Shared state for the management endpoints
#[derive(Clone)]
pub struct AdminState {
    bot: Bot,
    admin_token: String,
    webhook_url: Url,
}

/// Build the management router to merge with teloxide's webhook router
pub fn admin_router(bot: Bot, config: &WebhookConfig) -> anyhow::Result<Router> {
    let webhook_url: Url = config
        .url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("Webhook URL not configured"))?
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid webhook URL: {e}"))?;

    let state = AdminState {
        bot,
        admin_token: config.admin_token.clone().unwrap_or_default(),
        webhook_url,
    };

    Ok(Router::new()
        .route("/", get(liveness))
        .route("/set_webhook", post(set_webhook))
        .route("/get_webhook_info", get(get_webhook_info))
        .route("/delete_webhook", post(delete_webhook))
        .with_state(state))
}

async fn liveness() -> &'static str {
    "OK"
}

fn authorized(state: &AdminState, headers: &HeaderMap) -> bool {
    let provided = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    !state.admin_token.is_empty() && provided == state.admin_token
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "ok": false, "description": "missing or invalid x-admin-token" })),
    )
        .into_response()
}

async fn set_webhook(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }

    let result = state
        .bot
        .set_webhook(state.webhook_url.clone())
        .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
        .await;

    match result {
        Ok(_) => {
            info!(url = %state.webhook_url, "Webhook registered with Telegram");
            Json(json!({ "ok": true, "url": state.webhook_url.as_str() })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to set webhook");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "ok": false, "description": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn get_webhook_info(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }

    match state.bot.get_webhook_info().await {
        Ok(webhook_info) => Json(json!({ "ok": true, "result": webhook_info })).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to fetch webhook info");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "ok": false, "description": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn delete_webhook(State(state): State<AdminState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return unauthorized();
    }

    match state.bot.delete_webhook().await {
        Ok(_) => {
            info!("Webhook deleted from Telegram");
            Json(json!({ "ok": true })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Failed to delete webhook");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "ok": false, "description": e.to_string() })),
            )
                .into_response()
        }
    }
}
