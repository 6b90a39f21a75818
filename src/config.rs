use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LLM_BASE_URL: &str = "https://router.huggingface.co/v1";
const DEFAULT_LLM_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub bot: BotConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// When unset the username is looked up with `getMe` at startup
    pub bot_username: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    /// Externally reachable base URL the webhook is registered under
    pub public_url: Option<String>,
    pub webhook_path: String,
    pub webhook_secret: Option<String>,
}

impl ServerConfig {
    pub fn webhook_url(&self) -> Option<String> {
        self.public_url
            .as_deref()
            .map(|base| format!("{}{}", base.trim_end_matches('/'), self.webhook_path))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_token: String,
    pub model: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub reply_on_reply: bool,
    /// Chance in `0..=1` of posting a canned comment on an unaddressed message
    pub comment_probability: f64,
    pub comments_file: PathBuf,
    /// Sent when the LLM call fails; `None` keeps the bot silent
    pub fallback_reply: Option<String>,
    pub allow_private: bool,
}

// ── TOML file layer (every field optional, env fills the gaps) ─────────────────

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    telegram: RawTelegram,
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    bot: RawBot,
}

#[derive(Debug, Deserialize, Default)]
struct RawTelegram {
    bot_token: Option<String>,
    bot_username: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawServer {
    port: Option<u16>,
    public_url: Option<String>,
    webhook_path: Option<String>,
    webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawLlm {
    base_url: Option<String>,
    api_token: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawBot {
    reply_on_reply: Option<bool>,
    comment_probability: Option<f64>,
    comments_file: Option<PathBuf>,
    fallback_reply: Option<String>,
    allow_private: Option<bool>,
}

fn default_system_prompt() -> String {
    "You are a friendly bot in a Telegram group chat. \
     Reply in 1-4 sentences and be helpful and clear."
        .to_string()
}

impl Config {
    /// Load the optional TOML file at `path`, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let raw = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            _ => RawConfig::default(),
        };

        Self::resolve(raw, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with an environment lookup; the environment wins.
    fn resolve<F>(raw: RawConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup(&env, &["BOT_TOKEN"])
            .or(raw.telegram.bot_token)
            .context("BOT_TOKEN is not set")?;
        let bot_username = lookup(&env, &["BOT_USERNAME"]).or(raw.telegram.bot_username);

        let port = match lookup(&env, &["PORT"]) {
            Some(v) => v.trim().parse().with_context(|| format!("Invalid PORT: {v}"))?,
            None => raw.server.port.unwrap_or(10000),
        };
        let public_url =
            lookup(&env, &["PUBLIC_URL", "RENDER_EXTERNAL_URL"]).or(raw.server.public_url);
        let mut webhook_path = lookup(&env, &["WEBHOOK_PATH"])
            .or(raw.server.webhook_path)
            .unwrap_or_else(|| "/webhook".to_string());
        if !webhook_path.starts_with('/') {
            webhook_path.insert(0, '/');
        }
        let webhook_secret = lookup(&env, &["WEBHOOK_SECRET"]).or(raw.server.webhook_secret);

        let api_token = lookup(&env, &["LLM_API_TOKEN", "HF_API_TOKEN"])
            .or(raw.llm.api_token)
            .context("LLM_API_TOKEN is not set")?;
        let model = lookup(&env, &["LLM_MODEL", "HF_MODEL"])
            .or(raw.llm.model)
            .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string());
        let base_url = lookup(&env, &["LLM_BASE_URL"])
            .or(raw.llm.base_url)
            .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string());
        let max_tokens = match lookup(&env, &["LLM_MAX_TOKENS"]) {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("Invalid LLM_MAX_TOKENS: {v}"))?,
            None => raw.llm.max_tokens.unwrap_or(250),
        };
        let timeout_secs = match lookup(&env, &["LLM_TIMEOUT_SECS"]) {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("Invalid LLM_TIMEOUT_SECS: {v}"))?,
            None => raw.llm.timeout_secs.unwrap_or(20),
        };
        if timeout_secs == 0 {
            bail!("LLM timeout must be at least one second");
        }

        let reply_on_reply = match lookup(&env, &["REPLY_ON_REPLY"]) {
            Some(v) => parse_bool(&v).with_context(|| format!("Invalid REPLY_ON_REPLY: {v}"))?,
            None => raw.bot.reply_on_reply.unwrap_or(true),
        };
        let comment_probability = match lookup(&env, &["COMMENT_PROBABILITY"]) {
            Some(v) => v
                .trim()
                .parse()
                .with_context(|| format!("Invalid COMMENT_PROBABILITY: {v}"))?,
            None => raw.bot.comment_probability.unwrap_or(0.02),
        };
        if !(0.0..=1.0).contains(&comment_probability) {
            bail!("COMMENT_PROBABILITY must be between 0 and 1, got {comment_probability}");
        }
        let comments_file = lookup(&env, &["COMMENTS_FILE", "ROAST_FILE"])
            .map(PathBuf::from)
            .or(raw.bot.comments_file)
            .unwrap_or_else(|| PathBuf::from("comments.txt"));
        let fallback_reply =
            lookup(&env, &["LLM_FALLBACK_REPLY"]).or(raw.bot.fallback_reply);
        let allow_private = match lookup(&env, &["ALLOW_PRIVATE"]) {
            Some(v) => parse_bool(&v).with_context(|| format!("Invalid ALLOW_PRIVATE: {v}"))?,
            None => raw.bot.allow_private.unwrap_or(false),
        };

        Ok(Config {
            telegram: TelegramConfig {
                bot_token,
                bot_username,
            },
            server: ServerConfig {
                port,
                public_url,
                webhook_path,
                webhook_secret,
            },
            llm: LlmConfig {
                base_url,
                api_token,
                model,
                system_prompt: raw.llm.system_prompt.unwrap_or_else(default_system_prompt),
                max_tokens,
                temperature: raw.llm.temperature.unwrap_or(0.7),
                top_p: raw.llm.top_p.unwrap_or(0.9),
                timeout: Duration::from_secs(timeout_secs),
            },
            bot: BotConfig {
                reply_on_reply,
                comment_probability,
                comments_file,
                fallback_reply,
                allow_private,
            },
        })
    }
}

/// First non-blank value among `keys`.
fn lookup<F>(env: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .find_map(|&key| env(key).filter(|v| !v.trim().is_empty()))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{other}'"),
    }
}
