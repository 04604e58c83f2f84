use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Channel error: {0}")]
    Channel(#[from] alert_channel::ChannelError),

    #[error("Stream server error: {0}")]
    Stream(#[from] alert_stream::StreamError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Gave up on {url} after {attempts} reconnect attempts")]
    ChannelStopped { url: String, attempts: u32 },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
