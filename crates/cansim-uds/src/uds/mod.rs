//! UDS-style fault code diagnostics
//!
//! Two services are implemented on single CAN frames, one request/response
//! identifier pair per node:
//!
//! | Service  | Request                  | Positive response               |
//! |----------|--------------------------|---------------------------------|
//! | ReadDTC  | `19 sub`                 | `59 sub hi lo status` (DLC 5)   |
//! | ClearDTC | `14 sub`                 | `54 sub` (DLC 2)                |
//!
//! `hi lo` is the two-byte DTC encoding; all zero means no active fault.
//! Any other service is dropped without a response.

mod error;
mod message;
mod service;
mod tester;

pub use error::{DiagnosticError, DiagnosticResult};
pub use message::{DiagnosticRequest, DiagnosticResponse};
pub use service::{DiagnosticOutcome, DiagnosticService};
pub use tester::{DiagnosticTarget, DiagnosticTester, SweepEntry};

use std::fmt;

/// ReadDTCInformation sub-function: report DTCs by status mask
pub const REPORT_DTC_BY_STATUS_MASK: u8 = 0x02;

/// ClearDiagnosticInformation group: all groups
pub const CLEAR_ALL_GROUPS: u8 = 0xFF;

/// Added to a service id to form its positive response id
pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;

/// Status byte sent with every ReadDTC response
pub const DTC_STATUS_NONE: u8 = 0x00;

/// Supported services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceId {
    /// ClearDiagnosticInformation
    ClearDtc = 0x14,
    /// ReadDTCInformation
    ReadDtc = 0x19,
}

impl ServiceId {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x14 => Some(ServiceId::ClearDtc),
            0x19 => Some(ServiceId::ReadDtc),
            _ => None,
        }
    }

    /// Positive response service id from a response byte
    pub fn from_response_byte(byte: u8) -> Option<Self> {
        byte.checked_sub(POSITIVE_RESPONSE_OFFSET)
            .and_then(Self::from_byte)
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn response_byte(self) -> u8 {
        self.as_byte() + POSITIVE_RESPONSE_OFFSET
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceId::ClearDtc => write!(f, "ClearDTC (0x14)"),
            ServiceId::ReadDtc => write!(f, "ReadDTC (0x19)"),
        }
    }
}
