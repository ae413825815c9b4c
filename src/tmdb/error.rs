//! Failures of a single remote request.

/// Why a remote request produced no usable value.
///
/// Each variant is recovered by whoever issued the request; none of them
/// stops the engine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The client cannot issue requests at all, e.g. no API key.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection failure, timeout, or an HTTP error without an API error body.
    #[error("Network error: {0}")]
    Transport(String),

    /// The body did not have the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The service answered with its own `status_code`/`status_message` body.
    #[error("API error {code}: {message}")]
    RemoteApi { code: i64, message: String },
}

impl FetchError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {}", err.without_url()))
        } else {
            Self::Transport(err.without_url().to_string())
        }
    }
}
