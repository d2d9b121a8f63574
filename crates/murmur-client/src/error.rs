use thiserror::Error;

use murmur_types::ChatError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("could not decode server payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("server answered {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("gateway protocol violation: {0}")]
    Protocol(String),
}
