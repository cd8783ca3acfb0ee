//! Diagnostic protocol errors

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiagnosticError {
    #[error("Unsupported service 0x{0:02X}")]
    UnsupportedService(u8),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("No response from 0x{0:03X}")]
    Timeout(u32),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type DiagnosticResult<T> = Result<T, DiagnosticError>;
