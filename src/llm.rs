use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::BotError;

/// Longest slice of the user's text forwarded to the model
const MAX_PROMPT_CHARS: usize = 800;
/// How much of an error body we keep for logs
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Single-shot client for an OpenAI-compatible chat-completions endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build LLM HTTP client")?;
        Ok(Self { client, config })
    }

    /// Send `prompt` as a single user turn and return the first completion.
    ///
    /// No history is kept between calls and nothing is retried.
    pub async fn complete(&self, prompt: &str) -> Result<String, BotError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage::system(self.config.system_prompt.as_str()),
                ChatMessage::user(prompt),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        debug!("Sending chat completion request to {} (model {})", url, self.config.model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BotError::Upstream {
                status,
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let body = response.text().await?;
        extract_reply(&body)
    }
}

/// Pull `choices[0].message.content` out of a chat-completions body.
fn extract_reply(body: &str) -> Result<String, BotError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| BotError::Parse(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BotError::Parse("response has no choices".to_string()))?
        .message
        .content
        .map(|c| c.trim().to_string())
        .ok_or_else(|| BotError::Parse("first choice has no message content".to_string()))
}

/// Wrap what the user asked into the instruction sent to the model.
pub fn build_prompt(user_text: &str, sender_name: &str) -> String {
    let asked = truncate_chars(user_text.trim(), MAX_PROMPT_CHARS);
    format!(
        "You are a bot in a Telegram group chat. Reply in 1-4 sentences and be helpful and clear.\n\n\
         {sender_name} is addressing you directly and asked:\n\
         {asked}\n\n\
         Reply:"
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
