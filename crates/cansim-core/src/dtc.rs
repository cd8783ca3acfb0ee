//! DTC (Diagnostic Trouble Code) handling
//!
//! A DTC is carried on the wire as two bytes: the top two bits of the first
//! byte select the category, the remaining 14 bits hold the numeric code.
//! The text form is the category letter followed by four hex digits
//! (e.g. `P0217`). An all-zero pair means "no active fault".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, CoreResult};

/// Largest numeric part that fits in the two-byte encoding
pub const MAX_NUMERIC: u16 = 0x3FFF;

/// DTC category, encoded in the top two bits of the high byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtcCategory {
    /// P codes - Powertrain (engine, transmission)
    Powertrain,
    /// C codes - Chassis (ABS, suspension)
    Chassis,
    /// B codes - Body (airbags, climate control)
    Body,
    /// U codes - Network (communication)
    Network,
}

impl DtcCategory {
    /// Get category from its two-bit value (higher bits are ignored)
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => DtcCategory::Powertrain,
            1 => DtcCategory::Chassis,
            2 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }

    /// Two-bit wire value
    pub fn bits(&self) -> u8 {
        match self {
            DtcCategory::Powertrain => 0,
            DtcCategory::Chassis => 1,
            DtcCategory::Body => 2,
            DtcCategory::Network => 3,
        }
    }

    /// Get category prefix character
    pub fn prefix(&self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }

    /// Parse a prefix character (case-insensitive)
    pub fn from_prefix(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'P' => Some(DtcCategory::Powertrain),
            'C' => Some(DtcCategory::Chassis),
            'B' => Some(DtcCategory::Body),
            'U' => Some(DtcCategory::Network),
            _ => None,
        }
    }
}

impl fmt::Display for DtcCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DtcCategory::Powertrain => "powertrain",
            DtcCategory::Chassis => "chassis",
            DtcCategory::Body => "body",
            DtcCategory::Network => "network",
        };
        f.write_str(s)
    }
}

/// A diagnostic trouble code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DtcCode {
    category: DtcCategory,
    numeric: u16,
}

impl DtcCode {
    /// Create a code, rejecting numeric parts wider than 14 bits
    ///
    /// `P0000` encodes as the all-zero pair and is reserved for "no fault".
    pub fn new(category: DtcCategory, numeric: u16) -> CoreResult<Self> {
        if numeric > MAX_NUMERIC {
            return Err(CoreError::DtcOutOfRange(numeric));
        }
        let code = Self { category, numeric };
        if code.is_none_marker() {
            return Err(CoreError::ReservedDtc);
        }
        Ok(code)
    }

    /// Whether this code encodes as the all-zero "no active fault" pair
    pub fn is_none_marker(&self) -> bool {
        self.to_bytes() == [0, 0]
    }

    /// Powertrain code; bits above the 14-bit numeric field are dropped
    pub const fn powertrain(numeric: u16) -> Self {
        Self::masked(DtcCategory::Powertrain, numeric)
    }

    /// Chassis code; bits above the 14-bit numeric field are dropped
    pub const fn chassis(numeric: u16) -> Self {
        Self::masked(DtcCategory::Chassis, numeric)
    }

    const fn masked(category: DtcCategory, numeric: u16) -> Self {
        Self {
            category,
            numeric: numeric & MAX_NUMERIC,
        }
    }

    pub fn category(&self) -> DtcCategory {
        self.category
    }

    pub fn numeric(&self) -> u16 {
        self.numeric
    }

    /// Encode to the two-byte wire form
    pub fn to_bytes(&self) -> [u8; 2] {
        let high = (self.category.bits() << 6) | ((self.numeric >> 8) as u8 & 0x3F);
        let low = (self.numeric & 0xFF) as u8;
        [high, low]
    }

    /// Decode from the two-byte wire form
    ///
    /// Returns `None` for the all-zero pair, which means no active fault.
    pub fn from_bytes(high: u8, low: u8) -> Option<Self> {
        if high == 0 && low == 0 {
            return None;
        }
        Some(Self {
            category: DtcCategory::from_bits(high >> 6),
            numeric: (((high & 0x3F) as u16) << 8) | low as u16,
        })
    }

    /// Human-readable description from the built-in table
    pub fn description(&self) -> &'static str {
        describe(self)
    }
}

impl fmt::Display for DtcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04X}", self.category.prefix(), self.numeric)
    }
}

impl FromStr for DtcCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let category = chars
            .next()
            .and_then(DtcCategory::from_prefix)
            .ok_or_else(|| CoreError::InvalidDtcFormat(s.to_string()))?;

        let digits = chars.as_str();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidDtcFormat(s.to_string()));
        }
        let numeric = u16::from_str_radix(digits, 16)
            .map_err(|_| CoreError::InvalidDtcFormat(s.to_string()))?;

        Self::new(category, numeric)
    }
}

impl Serialize for DtcCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DtcCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Look up the description of a known code
pub fn describe(code: &DtcCode) -> &'static str {
    match (code.category, code.numeric) {
        (DtcCategory::Powertrain, 0x0128) => "Low Engine Temp",
        (DtcCategory::Powertrain, 0x0217) => "Engine Overheat",
        (DtcCategory::Powertrain, 0x0700) => "Transmission System Fault",
        (DtcCategory::Chassis, 0x1234) => "ABS Wheel Speed Sensor Fault",
        (DtcCategory::Network, 0x0100) => "Lost Communication With ECM",
        _ => "Unknown Fault",
    }
}
