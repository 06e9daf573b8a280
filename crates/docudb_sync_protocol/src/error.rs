//! Protocol errors.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding, decoding or validating messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A message could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// Bytes could not be decoded into the expected message.
    #[error("decode error: {0}")]
    Decode(String),

    /// A decoded message violates the protocol.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The peer speaks another protocol version.
    #[error("protocol version mismatch: local={local}, remote={remote}")]
    VersionMismatch {
        /// Our version.
        local: u16,
        /// The peer's version.
        remote: u16,
    },
}

impl ProtocolError {
    /// Creates an invalid message error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidMessage(message.into())
    }
}

impl<T: std::fmt::Debug> From<ciborium::ser::Error<T>> for ProtocolError {
    fn from(err: ciborium::ser::Error<T>) -> Self {
        Self::Encode(err.to_string())
    }
}

impl<T: std::fmt::Debug> From<ciborium::de::Error<T>> for ProtocolError {
    fn from(err: ciborium::de::Error<T>) -> Self {
        Self::Decode(err.to_string())
    }
}
