use std::io;
use std::time::Duration;

/// Errors raised by the CRCON API and log-stream clients.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A well-formed API response with `failed=true`.
    #[error("{command} command failed, error={message}")]
    Api {
        command: String,
        message: String,
        version: String,
    },

    /// A log-stream response carrying a non-empty `error` field.
    #[error("log stream error from server: {0}")]
    LogStreamMessage(String),

    /// The server rejected the websocket upgrade outright. Not retryable;
    /// usually a bad API key or missing permissions.
    #[error("websocket connection refused: {0}")]
    ConnectionRefused(String),

    #[error("dns lookup failed for {host}: {source}")]
    Dns {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    #[error("API key must not be blank")]
    BlankApiKey,

    #[error("http error: {0}")]
    Http(String),

    #[error("http status {0}")]
    Status(u16),

    #[error("{command} returned no result")]
    MissingResult { command: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("maximum reconnection attempts reached")]
    ReconnectExhausted,

    #[error("log queue closed")]
    QueueClosed,
}

impl Error {
    pub fn api(command: impl Into<String>, message: impl Into<String>, version: impl Into<String>) -> Self {
        Error::Api {
            command: command.into(),
            message: message.into(),
            version: version.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
