use rand::Rng;
use tracing::{debug, info, warn};

use crate::addressing::{self, Addressing, BotIdentity};
use crate::comments::CommentStore;
use crate::config::BotConfig;
use crate::llm::{self, LlmClient};
use crate::platform::telegram::{fit_message, MAX_MESSAGE_UTF16};
use crate::platform::{ChatKind, IncomingMessage};

/// Sent instead of an empty completion, which Telegram would reject.
const EMPTY_REPLY: &str = "Sorry, I didn't catch that. Ask me again, please.";

/// What to do with one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Forward this prompt to the LLM
    Ask(String),
    /// Post this canned comment
    Comment(String),
    Silent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub reply_on_reply: bool,
    pub comment_probability: f64,
    pub fallback_reply: Option<String>,
    pub allow_private: bool,
}

impl From<&BotConfig> for DispatchSettings {
    fn from(config: &BotConfig) -> Self {
        Self {
            reply_on_reply: config.reply_on_reply,
            comment_probability: config.comment_probability,
            fallback_reply: config.fallback_reply.clone(),
            allow_private: config.allow_private,
        }
    }
}

/// Decides, per message, between an LLM answer, a random comment and silence.
/// Everything inside is read-only after startup.
pub struct Dispatcher {
    identity: BotIdentity,
    llm: LlmClient,
    comments: CommentStore,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        identity: BotIdentity,
        llm: LlmClient,
        comments: CommentStore,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            identity,
            llm,
            comments,
            settings,
        }
    }

    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    /// Pure decision step; the only randomness comes from `rng`.
    pub fn plan<R: Rng + ?Sized>(&self, message: &IncomingMessage, rng: &mut R) -> Plan {
        if message.text.is_empty() || message.text.starts_with('/') {
            return Plan::Silent;
        }
        if message.chat_kind == ChatKind::Private && !self.settings.allow_private {
            return Plan::Silent;
        }

        let addressing =
            addressing::resolve(message, &self.identity, self.settings.reply_on_reply);
        if addressing.is_addressed() {
            debug!("Message {} addressed to bot ({:?})", message.message_id, addressing);
            let question = match addressing {
                Addressing::Mention => addressing::strip_mention(&message.text, &self.identity),
                _ => message.text.clone(),
            };
            return Plan::Ask(llm::build_prompt(&question, &message.sender_name));
        }

        if rng.random::<f64>() < self.settings.comment_probability {
            match self.comments.pick_random(rng) {
                Ok(line) => return Plan::Comment(format!("{} {}", message.sender_name, line)),
                Err(e) => warn!("Skipping random comment: {}", e),
            }
        }

        Plan::Silent
    }

    /// Produce at most one outbound text for `message`, clipped to what Telegram
    /// accepts. Never fails: upstream errors are logged and turn into the
    /// fallback reply (or silence).
    pub async fn handle(&self, message: &IncomingMessage) -> Option<String> {
        let plan = self.plan(message, &mut rand::rng());

        let text = match plan {
            Plan::Silent => None,
            Plan::Comment(line) => {
                info!("Posting random comment in chat {}", message.chat_id);
                Some(line)
            }
            Plan::Ask(prompt) => match self.llm.complete(&prompt).await {
                Ok(reply) if reply.is_empty() => {
                    warn!("LLM returned an empty reply for chat {}", message.chat_id);
                    Some(EMPTY_REPLY.to_string())
                }
                Ok(reply) => {
                    info!(
                        "LLM replied in chat {} ({} chars)",
                        message.chat_id,
                        reply.chars().count()
                    );
                    Some(reply)
                }
                Err(e) => {
                    warn!("LLM call failed for chat {}: {}", message.chat_id, e);
                    self.settings.fallback_reply.clone()
                }
            },
        };

        text.map(|t| fit_message(&t, MAX_MESSAGE_UTF16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::platform::ReplyRef;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::time::Duration;

    fn llm_client(base_url: &str) -> LlmClient {
        LlmClient::new(LlmConfig {
            base_url: base_url.to_string(),
            api_token: "hf_test".to_string(),
            model: "test/model".to_string(),
            system_prompt: "Be nice.".to_string(),
            max_tokens: 250,
            temperature: 0.7,
            top_p: 0.9,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn settings(comment_probability: f64) -> DispatchSettings {
        DispatchSettings {
            reply_on_reply: true,
            comment_probability,
            fallback_reply: None,
            allow_private: false,
        }
    }

    fn dispatcher(base_url: &str, settings: DispatchSettings) -> Dispatcher {
        Dispatcher::new(
            BotIdentity::new("SophiaBot", Some(4242)),
            llm_client(base_url),
            CommentStore::from_lines(["needs a nap", "is at it again"]),
            settings,
        )
    }

    fn message(text: &str) -> IncomingMessage {
        IncomingMessage {
            message_id: 11,
            chat_id: -1001,
            chat_kind: ChatKind::Group,
            sender_id: 7,
            sender_name: "Alice".to_string(),
            text: text.to_string(),
            reply_to: None,
        }
    }

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_mention_is_answered_by_llm_verbatim() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(mockito::Matcher::Regex("tell me a joke".to_string()))
            .with_status(200)
            .with_body(completion("Why did the crab never share? Because it was shellfish."))
            .expect(1)
            .create_async()
            .await;

        let d = dispatcher(&server.url(), settings(0.0));
        let reply = d.handle(&message("@SophiaBot tell me a joke")).await;

        assert_eq!(
            reply.as_deref(),
            Some("Why did the crab never share? Because it was shellfish.")
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unaddressed_with_zero_probability_is_silent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .expect(0)
            .create_async()
            .await;

        let d = dispatcher(&server.url(), settings(0.0));
        assert_eq!(d.handle(&message("nice weather today")).await, None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reply_to_bot_goes_to_llm() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion("You're welcome!"))
            .create_async()
            .await;

        let d = dispatcher(&server.url(), settings(0.0));
        let mut msg = message("thanks");
        msg.reply_to = Some(ReplyRef {
            message_id: 3,
            author_id: Some(4242),
            author_username: Some("SophiaBot".to_string()),
        });

        assert_eq!(d.handle(&msg).await.as_deref(), Some("You're welcome!"));
    }

    #[tokio::test]
    async fn test_llm_failure_is_silent_by_default() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .create_async()
            .await;

        let d = dispatcher(&server.url(), settings(0.0));
        assert_eq!(d.handle(&message("@SophiaBot hi")).await, None);
    }

    #[tokio::test]
    async fn test_llm_failure_uses_fallback_when_configured() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"unexpected":true}"#)
            .create_async()
            .await;

        let mut s = settings(0.0);
        s.fallback_reply = Some("Oops, my brain froze. Try again?".to_string());
        let d = dispatcher(&server.url(), s);

        assert_eq!(
            d.handle(&message("@SophiaBot hi")).await.as_deref(),
            Some("Oops, my brain froze. Try again?")
        );
    }

    #[tokio::test]
    async fn test_empty_completion_is_replaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion("   "))
            .create_async()
            .await;

        let d = dispatcher(&server.url(), settings(0.0));
        assert_eq!(
            d.handle(&message("@SophiaBot hi")).await.as_deref(),
            Some(EMPTY_REPLY)
        );
    }

    #[tokio::test]
    async fn test_long_completion_is_clipped() {
        let long = "word ".repeat(2000);
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(completion(&long))
            .create_async()
            .await;

        let d = dispatcher(&server.url(), settings(0.0));
        let reply = d.handle(&message("@SophiaBot ramble")).await.unwrap();

        assert!(reply.encode_utf16().count() <= MAX_MESSAGE_UTF16 + 1);
        assert!(reply.ends_with("word…"));
    }

    #[test]
    fn test_plan_strips_mention_from_prompt() {
        let d = dispatcher("http://unused", settings(0.0));
        let mut rng = StdRng::seed_from_u64(0);
        match d.plan(&message("@SophiaBot tell me a joke"), &mut rng) {
            Plan::Ask(prompt) => {
                assert!(prompt.contains("tell me a joke"));
                assert!(!prompt.contains("@SophiaBot"));
                assert!(prompt.contains("Alice"));
            }
            other => panic!("expected Ask, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_ignores_commands_and_private_chats() {
        let d = dispatcher("http://unused", settings(1.0));
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(d.plan(&message("/start@SophiaBot"), &mut rng), Plan::Silent);

        let mut private = message("@SophiaBot hi");
        private.chat_kind = ChatKind::Private;
        assert_eq!(d.plan(&private, &mut rng), Plan::Silent);

        let mut s = settings(1.0);
        s.allow_private = true;
        let d = dispatcher("http://unused", s);
        assert!(matches!(d.plan(&private, &mut rng), Plan::Ask(_)));
    }

    #[test]
    fn test_plan_comment_always_with_probability_one() {
        let d = dispatcher("http://unused", settings(1.0));
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            match d.plan(&message("nice weather today"), &mut rng) {
                Plan::Comment(line) => assert!(
                    line == "Alice needs a nap" || line == "Alice is at it again",
                    "{line}"
                ),
                other => panic!("expected Comment, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_comment_rate_converges_to_probability() {
        let d = dispatcher("http://unused", settings(0.25));
        let mut rng = StdRng::seed_from_u64(2024);
        let trials = 20_000;
        let comments = (0..trials)
            .filter(|_| matches!(d.plan(&message("nice weather today"), &mut rng), Plan::Comment(_)))
            .count();

        let rate = comments as f64 / trials as f64;
        assert!((rate - 0.25).abs() < 0.02, "observed rate {rate}");
    }

    #[test]
    fn test_empty_store_degrades_to_silence() {
        let d = Dispatcher::new(
            BotIdentity::new("SophiaBot", None),
            llm_client("http://unused"),
            CommentStore::default(),
            settings(1.0),
        );
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(d.plan(&message("nice weather today"), &mut rng), Plan::Silent);
    }
}
