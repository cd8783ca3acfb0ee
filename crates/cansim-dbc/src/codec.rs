//! Frame codec over a shared signal database

use std::collections::HashMap;
use std::sync::Arc;

use cansim_core::Frame;
use tracing::trace;

use crate::database::SignalDatabase;
use crate::decode::decode_message;
use crate::encode::{encode_message, RangePolicy};
use crate::error::CodecResult;

/// Encodes named physical values into frames and back
///
/// Cheap to clone; every clone shares the same database.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    database: Arc<SignalDatabase>,
}

impl FrameCodec {
    pub fn new(database: Arc<SignalDatabase>) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &SignalDatabase {
        &self.database
    }

    /// Encode a message, clamping values that exceed a signal's bit width
    ///
    /// Fails with `UnknownMessage` or `MissingSignal`; non-finite values
    /// fail with `EncodingRange`.
    pub fn encode(&self, message_id: u32, values: &HashMap<String, f64>) -> CodecResult<Frame> {
        self.encode_with(message_id, values, RangePolicy::Clamp)
    }

    /// Encode a message, rejecting any value that does not fit
    pub fn encode_strict(
        &self,
        message_id: u32,
        values: &HashMap<String, f64>,
    ) -> CodecResult<Frame> {
        self.encode_with(message_id, values, RangePolicy::Reject)
    }

    fn encode_with(
        &self,
        message_id: u32,
        values: &HashMap<String, f64>,
        policy: RangePolicy,
    ) -> CodecResult<Frame> {
        let message = self.database.lookup(message_id)?;
        let payload = encode_message(message, values, policy)?;
        Ok(Frame::with_payload(message_id, message.dlc(), payload)?)
    }

    /// Decode a frame into named physical values
    ///
    /// Unregistered ids decode to an empty map.
    pub fn decode(&self, frame: &Frame) -> HashMap<String, f64> {
        match self.database.get(frame.id) {
            Some(message) => decode_message(message, frame),
            None => {
                trace!(can_id = format!("0x{:03X}", frame.id), "No definition for frame");
                HashMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CodecError, DatabaseError};
    use crate::definition::{MessageDefinition, SignalDescriptor};
    use pretty_assertions::assert_eq;

    fn codec() -> FrameCodec {
        let db = SignalDatabase::new(vec![
            MessageDefinition::new(0x100)
                .with_name("Engine")
                .with_signal(SignalDescriptor::new("EngineTemp", 0, 16).with_scale(0.01, 0.0))
                .with_signal(SignalDescriptor::new("BatteryVolt", 16, 16).with_scale(0.01, 0.0))
                .with_signal(SignalDescriptor::new("RPM", 32, 32)),
            MessageDefinition::new(0x120)
                .with_name("Transmission")
                .with_signal(SignalDescriptor::new("Gear", 0, 4))
                .with_signal(SignalDescriptor::new("OutputSpeed", 4, 12))
                .with_signal(SignalDescriptor::new("FluidTemp", 16, 8).with_scale(1.0, -40.0)),
        ])
        .unwrap();
        FrameCodec::new(Arc::new(db))
    }

    fn values(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_engine_frame_layout() {
        let codec = codec();
        let frame = codec
            .encode(
                0x100,
                &values(&[("EngineTemp", 95.5), ("BatteryVolt", 13.2), ("RPM", 3000.0)]),
            )
            .unwrap();

        // 9550 = 0x254E, 1320 = 0x0528, 3000 = 0x0BB8
        assert_eq!(frame.id, 0x100);
        assert_eq!(frame.dlc, 8);
        assert!(!frame.extended);
        assert_eq!(frame.payload, [0x4E, 0x25, 0x28, 0x05, 0xB8, 0x0B, 0x00, 0x00]);

        let decoded = codec.decode(&frame);
        assert!((decoded["EngineTemp"] - 95.5).abs() <= 0.01);
        assert!((decoded["BatteryVolt"] - 13.2).abs() <= 0.01);
        assert_eq!(decoded["RPM"], 3000.0);
    }

    #[test]
    fn test_non_byte_aligned_fields() {
        let codec = codec();
        let input = values(&[("Gear", 5.0), ("OutputSpeed", 2748.0), ("FluidTemp", 92.0)]);
        let frame = codec.encode_strict(0x120, &input).unwrap();

        // Gear in the low nibble, OutputSpeed 0xABC above it
        assert_eq!(frame.dlc, 3);
        assert_eq!(frame.data(), &[0xC5, 0xAB, 132]);

        let decoded = codec.decode(&frame);
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_round_trip_within_quantization() {
        let codec = codec();
        for (temp, volt, rpm) in [(0.0, 0.0, 0.0), (110.37, 14.49, 7250.0), (655.35, 9.99, 1.0)] {
            let input = values(&[("EngineTemp", temp), ("BatteryVolt", volt), ("RPM", rpm)]);
            let decoded = codec.decode(&codec.encode_strict(0x100, &input).unwrap());
            for (name, value) in &input {
                assert!(
                    (decoded[name] - value).abs() <= 0.01,
                    "{} decoded as {} from {}",
                    name,
                    decoded[name],
                    value
                );
            }
        }
    }

    #[test]
    fn test_unknown_message() {
        let codec = codec();
        assert_eq!(
            codec.encode(0x7FF, &HashMap::new()),
            Err(CodecError::UnknownMessage(0x7FF))
        );

        let frame = Frame::new(0x7FF, &[1, 2, 3]).unwrap();
        assert!(codec.decode(&frame).is_empty());
    }

    #[test]
    fn test_missing_signal() {
        let codec = codec();
        let err = codec
            .encode(0x100, &values(&[("EngineTemp", 90.0), ("RPM", 900.0)]))
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::MissingSignal {
                message: 0x100,
                signal: "BatteryVolt".to_string(),
            }
        );
    }

    #[test]
    fn test_clamp_versus_strict() {
        let codec = codec();
        let input = values(&[("Gear", 9.0), ("OutputSpeed", 5000.0), ("FluidTemp", 50.0)]);

        let frame = codec.encode(0x120, &input).unwrap();
        assert_eq!(codec.decode(&frame)["OutputSpeed"], 4095.0);

        assert!(matches!(
            codec.encode_strict(0x120, &input),
            Err(CodecError::EncodingRange { ref signal, .. }) if signal == "OutputSpeed"
        ));
    }

    #[test]
    fn test_codec_only_sees_validated_layouts() {
        // Bits 60..68 would run off the end of the payload
        let result = SignalDatabase::new(vec![MessageDefinition::new(0x300)
            .with_signal(SignalDescriptor::new("Tail", 60, 8))]);
        assert!(matches!(
            result,
            Err(DatabaseError::InvalidSignal { message: 0x300, .. })
        ));
    }

    #[test]
    fn test_extended_id_frame() {
        let db = SignalDatabase::new(vec![MessageDefinition::new(0x18FE_F100)
            .with_signal(SignalDescriptor::new("Speed", 8, 16).with_scale(1.0 / 256.0, 0.0))])
        .unwrap();
        let codec = FrameCodec::new(Arc::new(db));

        let frame = codec
            .encode(0x18FE_F100, &values(&[("Speed", 88.5)]))
            .unwrap();
        assert!(frame.extended);
        assert_eq!(frame.dlc, 3);
        assert_eq!(codec.decode(&frame)["Speed"], 88.5);
    }
}
