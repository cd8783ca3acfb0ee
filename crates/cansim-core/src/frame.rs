//! Classic CAN frame

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Maximum data length code for classic CAN
pub const MAX_DLC: u8 = 8;
/// Highest 11-bit identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;
/// Highest 29-bit identifier
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// A classic CAN frame with a fixed 8-byte payload buffer
///
/// Only the first `dlc` bytes of `payload` are meaningful. Bytes beyond
/// `dlc` are kept at zero by every constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Frame {
    /// Arbitration identifier
    pub id: u32,
    /// Whether the identifier uses the 29-bit format
    pub extended: bool,
    /// Number of valid payload bytes
    pub dlc: u8,
    /// Payload buffer
    pub payload: [u8; 8],
}

impl Frame {
    /// Build a frame from a data slice
    ///
    /// Identifiers above 0x7FF are marked extended automatically.
    pub fn new(id: u32, data: &[u8]) -> CoreResult<Self> {
        if id > MAX_EXTENDED_ID {
            return Err(CoreError::InvalidId(id));
        }
        if data.len() > MAX_DLC as usize {
            return Err(CoreError::PayloadTooLong(data.len()));
        }

        let mut payload = [0u8; 8];
        payload[..data.len()].copy_from_slice(data);

        Ok(Self {
            id,
            extended: id > MAX_STANDARD_ID,
            dlc: data.len() as u8,
            payload,
        })
    }

    /// Build a frame from a full payload buffer and explicit DLC
    pub fn with_payload(id: u32, dlc: u8, payload: [u8; 8]) -> CoreResult<Self> {
        if dlc > MAX_DLC {
            return Err(CoreError::InvalidDlc(dlc));
        }
        Self::new(id, &payload[..dlc as usize])
    }

    /// Force the 29-bit identifier format
    pub fn into_extended(mut self) -> Self {
        self.extended = true;
        self
    }

    /// Valid payload bytes
    ///
    /// A `dlc` above 8 (only possible by writing the field directly or
    /// deserializing) is treated as 8.
    pub fn data(&self) -> &[u8] {
        &self.payload[..self.dlc.min(MAX_DLC) as usize]
    }

    /// Payload as lowercase hex (valid bytes only)
    pub fn data_hex(&self) -> String {
        hex::encode(self.data())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "0x{:08X}", self.id)?;
        } else {
            write!(f, "0x{:03X}", self.id)?;
        }
        write!(f, " [{}]", self.dlc)?;
        for byte in self.data() {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}
