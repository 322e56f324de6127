//! Error types for the shardline-proto crate.

use thiserror::Error;

/// Errors that can occur while encoding or decoding gateway packets.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a packet.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a packet or payload.
    #[error("decoding error: {0}")]
    Decoding(String),
}

impl ProtoError {
    pub(crate) fn decoding(err: &serde_json::Error) -> Self {
        Self::Decoding(err.to_string())
    }
}
