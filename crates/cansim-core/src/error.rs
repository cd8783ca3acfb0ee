//! Core error types

use thiserror::Error;

/// Errors raised while constructing core value types
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// CAN identifier does not fit in 29 bits
    #[error("invalid CAN ID: 0x{0:X}")]
    InvalidId(u32),

    /// Payload longer than a classic CAN frame allows
    #[error("payload too long: {0} bytes (max 8)")]
    PayloadTooLong(usize),

    /// DLC outside 0..=8
    #[error("invalid DLC: {0}")]
    InvalidDlc(u8),

    /// DTC text not in `<letter><4 hex digits>` form
    #[error("invalid DTC format: {0}")]
    InvalidDtcFormat(String),

    /// DTC numeric part does not fit in 14 bits
    #[error("DTC numeric value 0x{0:04X} exceeds 0x3FFF")]
    DtcOutOfRange(u16),

    /// The all-zero code is reserved for "no active fault"
    #[error("DTC P0000 is reserved for \"no active fault\"")]
    ReservedDtc,

    /// Error-model thresholds are inconsistent
    #[error("invalid error thresholds: {0}")]
    InvalidThresholds(String),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
