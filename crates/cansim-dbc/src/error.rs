//! Error types for the signal database and codec

use cansim_core::CoreError;
use thiserror::Error;

/// Errors raised by a single encode call
///
/// Decoding never fails: unknown messages decode to an empty map.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Message id not registered in the database
    #[error("unknown message: 0x{0:03X}")]
    UnknownMessage(u32),

    /// A signal of the message has no value in the input map
    #[error("missing signal {signal} for message 0x{message:03X}")]
    MissingSignal { message: u32, signal: String },

    /// Physical value cannot be represented in the signal's bit width
    #[error("value {value} for signal {signal} not in [{min}, {max}]")]
    EncodingRange {
        signal: String,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Frame could not be built from the encoded payload
    #[error("invalid frame: {0}")]
    Frame(#[from] CoreError),
}

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while building or loading a database
///
/// All of these are configuration mistakes and are fatal at startup.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Two definitions share the same message id
    #[error("duplicate message id: 0x{0:03X}")]
    DuplicateMessage(u32),

    /// Message id does not fit in 29 bits
    #[error("invalid message id: 0x{0:X}")]
    InvalidId(u32),

    /// Message id string could not be parsed
    #[error("invalid message id format: {0}")]
    InvalidIdFormat(String),

    /// A signal descriptor is malformed
    #[error("invalid signal {signal} in message 0x{message:03X}: {reason}")]
    InvalidSignal {
        message: u32,
        signal: String,
        reason: String,
    },

    /// Two signals of one message share a name
    #[error("duplicate signal {signal} in message 0x{message:03X}")]
    DuplicateSignal { message: u32, signal: String },

    /// Two signals of one message claim the same payload bits
    #[error("signals {first} and {second} overlap in message 0x{message:03X}")]
    OverlappingSignals {
        message: u32,
        first: String,
        second: String,
    },

    /// YAML parsing error
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for database construction
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Parse a message id string (hex)
///
/// Accepts formats: "100", "0x100", "0X100", "7e8"
pub fn parse_can_id(s: &str) -> DatabaseResult<u32> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16).map_err(|_| DatabaseError::InvalidIdFormat(s.to_string()))
}

/// Format a message id as hex string (uppercase, at least three digits)
pub fn format_can_id(id: u32) -> String {
    format!("0x{:03X}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_can_id() {
        assert_eq!(parse_can_id("100").unwrap(), 0x100);
        assert_eq!(parse_can_id("0x7E8").unwrap(), 0x7E8);
        assert_eq!(parse_can_id("0X7e8").unwrap(), 0x7E8);
        assert_eq!(parse_can_id("  18DAF110 ").unwrap(), 0x18DA_F110);
        assert!(parse_can_id("engine").is_err());
        assert!(parse_can_id("").is_err());
    }

    #[test]
    fn test_format_can_id() {
        assert_eq!(format_can_id(0x100), "0x100");
        assert_eq!(format_can_id(0x7E8), "0x7E8");
        assert_eq!(format_can_id(0x12), "0x012");
    }

    #[test]
    fn test_error_messages() {
        let err = CodecError::MissingSignal {
            message: 0x100,
            signal: "RPM".to_string(),
        };
        assert_eq!(err.to_string(), "missing signal RPM for message 0x100");
        assert_eq!(
            CodecError::UnknownMessage(0x7FF).to_string(),
            "unknown message: 0x7FF"
        );
    }
}
