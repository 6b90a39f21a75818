pub mod telegram;

/// Kind of chat a message was posted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
}

/// The message a reply points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyRef {
    pub message_id: i32,
    pub author_id: Option<u64>,
    pub author_username: Option<String>,
}

/// A text message received from the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Platform message id, used to thread our answer under it
    pub message_id: i32,
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub sender_id: u64,
    /// Display (first) name of the sender
    pub sender_name: String,
    /// Whitespace-normalized message text
    pub text: String,
    pub reply_to: Option<ReplyRef>,
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
