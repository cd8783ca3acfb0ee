//! Encoding physical values into frame payloads

use std::collections::HashMap;

use tracing::warn;

use crate::definition::{MessageDefinition, SignalDescriptor};
use crate::error::{CodecError, CodecResult};

/// What to do with a value that does not fit the signal's bit width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangePolicy {
    /// Saturate to the nearest representable raw value
    Clamp,
    /// Fail the encode call with `EncodingRange`
    Reject,
}

/// Write `raw` into `bit_length` payload bits starting at `start_bit`
///
/// Bits are placed least-significant first; bit `p` of the payload is bit
/// `p % 8` of byte `p / 8`. Other payload bits are left untouched.
pub(crate) fn insert_bits(payload: &mut [u8; 8], start_bit: u32, bit_length: u32, raw: u64) {
    let mask = ((1u64 << bit_length) - 1) << start_bit;
    let word = u64::from_le_bytes(*payload);
    let word = (word & !mask) | ((raw << start_bit) & mask);
    *payload = word.to_le_bytes();
}

/// Convert a physical value to the raw integer for a signal
pub(crate) fn to_raw(signal: &SignalDescriptor, value: f64, policy: RangePolicy) -> CodecResult<u64> {
    let out_of_range = || {
        let (min, max) = signal.physical_range();
        CodecError::EncodingRange {
            signal: signal.name.clone(),
            value,
            min,
            max,
        }
    };

    if !value.is_finite() {
        return Err(out_of_range());
    }

    let raw = ((value - signal.offset) / signal.scale).round();
    let max_raw = signal.max_raw() as f64;

    if (0.0..=max_raw).contains(&raw) {
        return Ok(raw as u64);
    }

    match policy {
        RangePolicy::Reject => Err(out_of_range()),
        RangePolicy::Clamp => {
            let clamped = raw.clamp(0.0, max_raw);
            warn!(
                signal = %signal.name,
                value,
                raw = clamped,
                "Value out of range, clamped"
            );
            Ok(clamped as u64)
        }
    }
}

/// Encode every signal of a message into a payload buffer
///
/// Every signal must have a value; extra entries in `values` are ignored.
/// The definition must already have passed [`MessageDefinition::validate`].
pub(crate) fn encode_message(
    message: &MessageDefinition,
    values: &HashMap<String, f64>,
    policy: RangePolicy,
) -> CodecResult<[u8; 8]> {
    let mut payload = [0u8; 8];

    for signal in &message.signals {
        let value = values
            .get(&signal.name)
            .copied()
            .ok_or_else(|| CodecError::MissingSignal {
                message: message.id,
                signal: signal.name.clone(),
            })?;
        let raw = to_raw(signal, value, policy)?;
        insert_bits(&mut payload, signal.start_bit, signal.bit_length, raw);
    }

    Ok(payload)
}
