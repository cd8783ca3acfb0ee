//! Decoding frame payloads into physical values

use std::collections::HashMap;

use cansim_core::Frame;

use crate::definition::MessageDefinition;
use crate::precision::round_for_signal;

/// Read `bit_length` payload bits starting at `start_bit`
///
/// Same bit order as [`crate::encode::insert_bits`].
pub(crate) fn extract_bits(payload: &[u8; 8], start_bit: u32, bit_length: u32) -> u64 {
    let mask = (1u64 << bit_length) - 1;
    (u64::from_le_bytes(*payload) >> start_bit) & mask
}

/// Decode the signals of a message from a frame
///
/// Signals extending past the frame's DLC are skipped. The definition must
/// already have passed [`MessageDefinition::validate`].
pub(crate) fn decode_message(message: &MessageDefinition, frame: &Frame) -> HashMap<String, f64> {
    let valid_bits = frame.dlc as u32 * 8;

    message
        .signals
        .iter()
        .filter(|signal| signal.end_bit() <= valid_bits)
        .map(|signal| {
            let raw = extract_bits(&frame.payload, signal.start_bit, signal.bit_length);
            let physical = raw as f64 * signal.scale + signal.offset;
            (signal.name.clone(), round_for_signal(physical, signal))
        })
        .collect()
}
