mod addressing;
mod comments;
mod config;
mod dispatcher;
mod error;
mod llm;
mod platform;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::comments::CommentStore;
use crate::config::Config;
use crate::dispatcher::{DispatchSettings, Dispatcher};
use crate::llm::LlmClient;
use crate::platform::telegram;
use crate::webhook::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatterbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional TOML file; environment variables override it
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(Some(config_path.as_path()))
        .with_context(|| format!("Failed to load config (file: {})", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Model: {}", config.llm.model);
    info!("  Endpoint: {}", config.llm.base_url);
    info!("  Reply on reply: {}", config.bot.reply_on_reply);
    info!("  Comment probability: {}", config.bot.comment_probability);

    let comments = CommentStore::load(&config.bot.comments_file)?;

    let bot = Bot::new(&config.telegram.bot_token);
    let identity =
        telegram::resolve_identity(&bot, config.telegram.bot_username.as_deref()).await?;

    let llm = LlmClient::new(config.llm.clone())?;
    let dispatcher = Dispatcher::new(
        identity,
        llm,
        comments,
        DispatchSettings::from(&config.bot),
    );
    info!("  Bot handle: @{}", dispatcher.identity().username);

    match config.server.webhook_url() {
        Some(url) => {
            telegram::register_webhook(&bot, &url, config.server.webhook_secret.as_deref())
                .await?
        }
        None => warn!("PUBLIC_URL is not set; skipping webhook registration"),
    }

    let state = Arc::new(AppState {
        dispatcher,
        bot,
        webhook_secret: config.server.webhook_secret.clone(),
    });

    info!("Bot is starting...");
    webhook::serve(state, config.server.port, &config.server.webhook_path).await?;

    Ok(())
}
