//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Timeout")]
    Timeout,

    #[error("Receiver lagged, {0} frames lost")]
    Lagged(u64),

    #[error("Transport not supported: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// Whether this is a plain receive timeout rather than a bus fault
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}
