use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use teloxide::types::Update;
use teloxide::Bot;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::platform::telegram;
use crate::platform::IncomingMessage;

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Shared, read-only state behind every webhook call
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub bot: Bot,
    pub webhook_secret: Option<String>,
}

pub fn router(state: Arc<AppState>, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(receive_update))
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
}

/// Serve the webhook on `0.0.0.0:port` until Ctrl-C.
pub async fn serve(state: Arc<AppState>, port: u16, webhook_path: &str) -> Result<()> {
    let app = router(state, webhook_path);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Webhook listening on http://{}{}", addr, webhook_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}

/// Acknowledge right away; the actual work runs in its own task.
async fn receive_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(expected) = &state.webhook_secret {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            warn!("Rejected webhook call with a missing or wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            // Still 200: Telegram would otherwise keep redelivering the same body.
            warn!("Ignoring malformed update: {}", e);
            return StatusCode::OK;
        }
    };

    let Some(incoming) = telegram::incoming_from_update(&update) else {
        debug!("Ignoring update {:?}: not a text message", update.id);
        return StatusCode::OK;
    };

    info!(
        "Message from {} ({}) in chat {}: {}",
        incoming.sender_name, incoming.sender_id, incoming.chat_id, incoming.text
    );

    tokio::spawn(process(state, incoming));
    StatusCode::OK
}

async fn process(state: Arc<AppState>, incoming: IncomingMessage) {
    let Some(text) = state.dispatcher.handle(&incoming).await else {
        return;
    };

    if let Err(e) =
        telegram::send_reply(&state.bot, incoming.chat_id, incoming.message_id, &text).await
    {
        error!("{:#}", e);
    }
}
