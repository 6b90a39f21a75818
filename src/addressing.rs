use crate::platform::{normalize_text, IncomingMessage, ReplyRef};

/// The bot's own identity, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    /// Username without the leading `@`
    pub username: String,
    pub id: Option<u64>,
}

impl BotIdentity {
    pub fn new(username: impl Into<String>, id: Option<u64>) -> Self {
        let username = username.into();
        Self {
            username: username.trim_start_matches('@').to_string(),
            id,
        }
    }

    /// `@username`, or `None` when the username is unknown
    fn handle(&self) -> Option<String> {
        if self.username.is_empty() {
            None
        } else {
            Some(format!("@{}", self.username))
        }
    }
}

/// Byte offset of the first `handle` at or after `from`, ignoring ASCII case.
/// Only ASCII bytes are folded, so a match always ends on a char boundary of `text`.
fn find_handle(text: &str, handle: &str, from: usize) -> Option<usize> {
    let needle = handle.as_bytes();
    text[from..]
        .char_indices()
        .map(|(i, _)| from + i)
        .find(|&i| {
            text.as_bytes()
                .get(i..i + needle.len())
                .is_some_and(|bytes| bytes.eq_ignore_ascii_case(needle))
        })
}

/// Why (or whether) a message is directed at the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    Mention,
    ReplyToBot,
    None,
}

impl Addressing {
    pub fn is_addressed(self) -> bool {
        !matches!(self, Addressing::None)
    }
}

/// Decide whether `message` is addressed to the bot.
///
/// A mention wins over a reply. Replies only count when `reply_on_reply`
/// is enabled.
pub fn resolve(
    message: &IncomingMessage,
    identity: &BotIdentity,
    reply_on_reply: bool,
) -> Addressing {
    if let Some(handle) = identity.handle() {
        if find_handle(&message.text, &handle, 0).is_some() {
            return Addressing::Mention;
        }
    }

    if reply_on_reply {
        if let Some(reply) = &message.reply_to {
            if is_own_message(reply, identity) {
                return Addressing::ReplyToBot;
            }
        }
    }

    Addressing::None
}

fn is_own_message(reply: &ReplyRef, identity: &BotIdentity) -> bool {
    if let (Some(author), Some(own)) = (reply.author_id, identity.id) {
        return author == own;
    }
    match &reply.author_username {
        Some(name) if !identity.username.is_empty() => {
            name.trim_start_matches('@').eq_ignore_ascii_case(&identity.username)
        }
        _ => false,
    }
}

/// Remove every `@username` occurrence (any case) so the prompt reads naturally.
pub fn strip_mention(text: &str, identity: &BotIdentity) -> String {
    let Some(handle) = identity.handle() else {
        return normalize_text(text);
    };

    let mut out = String::with_capacity(text.len());
    let mut rest = 0;
    while let Some(start) = find_handle(text, &handle, rest) {
        out.push_str(&text[rest..start]);
        rest = start + handle.len();
    }
    out.push_str(&text[rest..]);
    normalize_text(&out)
}
