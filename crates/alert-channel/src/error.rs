//! Error types for the alert channel.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors surfaced by channel configuration and connection setup.
///
/// Runtime failures (dropped sockets, bad frames, failing observers) are not
/// returned to callers; they are logged and absorbed by the channel driver.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Access token expired at {0}")]
    TokenExpired(chrono::DateTime<chrono::Utc>),

    #[error("Malformed access token: {0}")]
    MalformedToken(String),
}

impl ChannelError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn malformed_token(msg: impl Into<String>) -> Self {
        Self::MalformedToken(msg.into())
    }

    /// Whether retrying the connection could ever succeed. The driver stops
    /// for good on the first error for which this is false.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Configuration(_)
                | Self::InvalidUrl(_)
                | Self::TokenExpired(_)
                | Self::MalformedToken(_)
                | Self::WebSocket(tokio_tungstenite::tungstenite::Error::Url(_))
        )
    }
}

/// Errors raised while decoding an inbound frame.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("frame has no string `type` field")]
    MissingTag,

    #[error("invalid `{tag}` payload: {source}")]
    InvalidPayload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by a desktop notification backend.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification backend error: {0}")]
    Backend(String),
}

impl NotifyError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(!ChannelError::config("bad").is_retryable());
        assert!(!ChannelError::malformed_token("nope").is_retryable());
        assert!(!ChannelError::TokenExpired(chrono::Utc::now()).is_retryable());
        assert!(
            !ChannelError::WebSocket(tokio_tungstenite::tungstenite::Error::Url(
                tokio_tungstenite::tungstenite::error::UrlError::TlsFeatureNotEnabled
            ))
            .is_retryable()
        );
        assert!(
            ChannelError::WebSocket(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
                .is_retryable()
        );
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert!(ChannelError::WebSocket(refused.into()).is_retryable());
    }
}
