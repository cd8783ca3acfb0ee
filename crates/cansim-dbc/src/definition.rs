//! Message and signal definitions
//!
//! A signal occupies `bit_length` consecutive payload bits starting at
//! `start_bit`, little-endian: bit `p` lives in byte `p / 8` at position
//! `p % 8`. Physical value = raw * scale + offset.

use serde::{Deserialize, Deserializer, Serialize};

use cansim_core::{MAX_EXTENDED_ID, MAX_DLC};

use crate::error::{parse_can_id, DatabaseError, DatabaseResult};

/// Number of payload bits in a classic frame
pub const PAYLOAD_BITS: u32 = MAX_DLC as u32 * 8;

/// Widest raw value the codec handles
pub const MAX_SIGNAL_BITS: u32 = 32;

/// Placement and scaling of one named quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDescriptor {
    pub name: String,
    pub start_bit: u32,
    pub bit_length: u32,

    /// Scale factor: physical = raw * scale + offset
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Offset: physical = raw * scale + offset
    #[serde(default)]
    pub offset: f64,

    /// Unit string (e.g., "degC", "rpm", "V")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,
}

fn default_scale() -> f64 {
    1.0
}

impl SignalDescriptor {
    /// Create an unscaled signal
    pub fn new(name: impl Into<String>, start_bit: u32, bit_length: u32) -> Self {
        Self {
            name: name.into(),
            start_bit,
            bit_length,
            scale: 1.0,
            offset: 0.0,
            unit: String::new(),
        }
    }

    /// Add scale/offset
    pub fn with_scale(mut self, scale: f64, offset: f64) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    /// Add a unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// One past the highest payload bit used
    pub fn end_bit(&self) -> u32 {
        self.start_bit + self.bit_length
    }

    /// Largest raw value that fits in the bit width
    pub fn max_raw(&self) -> u64 {
        (1u64 << self.bit_length) - 1
    }

    /// Physical values of raw 0 and raw max, ordered low to high
    pub fn physical_range(&self) -> (f64, f64) {
        let a = self.offset;
        let b = self.max_raw() as f64 * self.scale + self.offset;
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Whether two signals claim any common payload bit
    pub fn overlaps(&self, other: &SignalDescriptor) -> bool {
        self.start_bit < other.end_bit() && other.start_bit < self.end_bit()
    }

    fn validate(&self, message: u32) -> DatabaseResult<()> {
        let invalid = |reason: String| DatabaseError::InvalidSignal {
            message,
            signal: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("empty name".to_string()));
        }
        if self.bit_length == 0 || self.bit_length > MAX_SIGNAL_BITS {
            return Err(invalid(format!(
                "bit length {} not in 1..={}",
                self.bit_length, MAX_SIGNAL_BITS
            )));
        }
        if self.end_bit() > PAYLOAD_BITS {
            return Err(invalid(format!(
                "bits {}..{} exceed the {}-bit payload",
                self.start_bit,
                self.end_bit(),
                PAYLOAD_BITS
            )));
        }
        if !self.scale.is_finite() || self.scale == 0.0 {
            return Err(invalid(format!("scale {} must be finite and non-zero", self.scale)));
        }
        if !self.offset.is_finite() {
            return Err(invalid(format!("offset {} must be finite", self.offset)));
        }
        Ok(())
    }
}

/// Layout of one frame identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDefinition {
    /// Frame identifier (integer, or hex string such as "0x100")
    #[serde(deserialize_with = "deserialize_can_id")]
    pub id: u32,

    /// Human-readable name (e.g., "Engine")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Signals in payload order
    #[serde(default)]
    pub signals: Vec<SignalDescriptor>,
}

impl MessageDefinition {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            name: None,
            signals: Vec::new(),
        }
    }

    /// Add a display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a signal
    pub fn with_signal(mut self, signal: SignalDescriptor) -> Self {
        self.signals.push(signal);
        self
    }

    /// Find a signal by name
    pub fn signal(&self, name: &str) -> Option<&SignalDescriptor> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// Display label: the name if set, otherwise the hex id
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("0x{:03X}", self.id),
        }
    }

    /// Number of payload bytes covered by the highest signal bit
    pub fn dlc(&self) -> u8 {
        let bits = self.signals.iter().map(|s| s.end_bit()).max().unwrap_or(0);
        bits.div_ceil(8) as u8
    }

    /// Check id range, every descriptor, name uniqueness and bit overlap
    pub fn validate(&self) -> DatabaseResult<()> {
        if self.id > MAX_EXTENDED_ID {
            return Err(DatabaseError::InvalidId(self.id));
        }

        for (i, signal) in self.signals.iter().enumerate() {
            signal.validate(self.id)?;

            for earlier in &self.signals[..i] {
                if earlier.name == signal.name {
                    return Err(DatabaseError::DuplicateSignal {
                        message: self.id,
                        signal: signal.name.clone(),
                    });
                }
                if earlier.overlaps(signal) {
                    return Err(DatabaseError::OverlappingSignals {
                        message: self.id,
                        first: earlier.name.clone(),
                        second: signal.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CanIdRepr {
    Number(u32),
    Text(String),
}

/// Accept either a plain integer or a hex string for a message id
pub fn deserialize_can_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    match CanIdRepr::deserialize(deserializer)? {
        CanIdRepr::Number(id) => Ok(id),
        CanIdRepr::Text(s) => parse_can_id(&s).map_err(serde::de::Error::custom),
    }
}
