use thiserror::Error;

/// Failures of a single message round trip. None of these are fatal: the
/// dispatcher logs them and falls back to silence (or the configured
/// fallback reply).
#[derive(Debug, Error)]
pub enum BotError {
    /// Upstream answered with a non-2xx status.
    #[error("upstream returned {status}: {body}")]
    Upstream {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Upstream answered 2xx but the body was not what we expected.
    #[error("malformed upstream response: {0}")]
    Parse(String),

    #[error("upstream did not answer in time")]
    Timeout,

    #[error("failed to reach upstream: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("no comments loaded")]
    EmptyStore,
}

impl From<reqwest::Error> for BotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BotError::Timeout
        } else {
            BotError::Transport(err)
        }
    }
}
