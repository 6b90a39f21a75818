use anyhow::{Context, Result};
use teloxide::payloads::{SendMessageSetters, SetWebhookSetters};
use teloxide::prelude::*;
use teloxide::types::{MessageId, ReplyParameters, UpdateKind};
use tracing::info;

use crate::addressing::BotIdentity;
use crate::platform::{normalize_text, ChatKind, IncomingMessage, ReplyRef};

/// Telegram caps messages at 4096 UTF-16 code units; stay well below it.
pub const MAX_MESSAGE_UTF16: usize = 3500;

/// Convert a raw update into our message model. Anything that is not a new
/// text message from a user yields `None`.
pub fn incoming_from_update(update: &Update) -> Option<IncomingMessage> {
    let msg = match &update.kind {
        UpdateKind::Message(msg) => msg,
        _ => return None,
    };
    let user = msg.from.as_ref()?;
    let text = normalize_text(msg.text()?);

    let chat_kind = if msg.chat.is_group() || msg.chat.is_supergroup() {
        ChatKind::Group
    } else {
        ChatKind::Private
    };

    let reply_to = msg.reply_to_message().map(|replied| ReplyRef {
        message_id: replied.id.0,
        author_id: replied.from.as_ref().map(|u| u.id.0),
        author_username: replied.from.as_ref().and_then(|u| u.username.clone()),
    });

    Some(IncomingMessage {
        message_id: msg.id.0,
        chat_id: msg.chat.id.0,
        chat_kind,
        sender_id: user.id.0,
        sender_name: user.first_name.clone(),
        text,
        reply_to,
    })
}

/// Clip `text` to `max_units` UTF-16 code units (the unit Telegram counts in),
/// cutting at the last space and appending `…`.
pub fn fit_message(text: &str, max_units: usize) -> String {
    let mut units = 0;
    let mut end = None;
    for (idx, c) in text.char_indices() {
        units += c.len_utf16();
        if units > max_units {
            end = Some(idx);
            break;
        }
    }
    let Some(end) = end else {
        return text.to_string();
    };

    let head = &text[..end];
    let cut = head.rfind(char::is_whitespace).unwrap_or(end);
    format!("{}…", head[..cut].trim_end())
}

/// Post `text` into `chat_id` as a reply to `reply_to`.
pub async fn send_reply(bot: &Bot, chat_id: i64, reply_to: i32, text: &str) -> Result<()> {
    bot.send_message(ChatId(chat_id), text)
        .reply_parameters(ReplyParameters::new(MessageId(reply_to)))
        .await
        .with_context(|| format!("Failed to send message to chat {}", chat_id))?;
    Ok(())
}

/// Resolve the bot's identity, asking Telegram only when no username is configured.
pub async fn resolve_identity(bot: &Bot, configured: Option<&str>) -> Result<BotIdentity> {
    if let Some(username) = configured {
        return Ok(BotIdentity::new(username, None));
    }

    let me = bot.get_me().await.context("Failed to call getMe")?;
    let username = me
        .user
        .username
        .clone()
        .context("Telegram returned a bot without a username")?;
    info!("Running as @{} ({})", username, me.user.id.0);
    Ok(BotIdentity::new(username, Some(me.user.id.0)))
}

/// Point Telegram at our webhook, dropping anything queued while we were down.
pub async fn register_webhook(bot: &Bot, url: &str, secret: Option<&str>) -> Result<()> {
    let url = reqwest::Url::parse(url).with_context(|| format!("Invalid webhook URL: {url}"))?;

    let mut request = bot.set_webhook(url.clone()).drop_pending_updates(true);
    if let Some(secret) = secret {
        request = request.secret_token(secret.to_string());
    }
    request.await.context("Failed to register webhook")?;

    info!("Webhook registered at {}", url);
    Ok(())
}
