//! Error types for the fruit arena server.

use thiserror::Error;

/// Why an inbound WebSocket frame was refused.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame of {0} bytes exceeds the {1} byte limit")]
    Oversized(usize, usize),

    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("binary frames are not part of the protocol")]
    UnexpectedBinary,
}

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
