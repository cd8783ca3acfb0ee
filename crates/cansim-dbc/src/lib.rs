//! cansim-dbc - Signal database and frame codec
//!
//! A minimal DBC-style database: each frame id maps to an ordered list of
//! signals packed little-endian at bit granularity, with
//! `physical = raw * scale + offset`.
//!
//! # Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use cansim_dbc::{FrameCodec, MessageDefinition, SignalDatabase, SignalDescriptor};
//!
//! let db = SignalDatabase::new(vec![MessageDefinition::new(0x100)
//!     .with_name("Engine")
//!     .with_signal(SignalDescriptor::new("EngineTemp", 0, 16).with_scale(0.01, 0.0))
//!     .with_signal(SignalDescriptor::new("RPM", 16, 16))])
//! .unwrap();
//! let codec = FrameCodec::new(Arc::new(db));
//!
//! let values = HashMap::from([
//!     ("EngineTemp".to_string(), 92.5),
//!     ("RPM".to_string(), 1800.0),
//! ]);
//! let frame = codec.encode(0x100, &values).unwrap();
//! assert_eq!(frame.data(), &[0x22, 0x24, 0x08, 0x07]);
//! assert_eq!(codec.decode(&frame), values);
//! ```
//!
//! # Definition Files
//!
//! ```yaml
//! meta:
//!   name: Demo vehicle
//!
//! messages:
//!   - id: "0x120"
//!     name: Transmission
//!     signals:
//!       - { name: Gear, start_bit: 0, bit_length: 4 }
//!       - { name: FluidTemp, start_bit: 16, bit_length: 8, offset: -40.0, unit: degC }
//! ```
//!
//! The same layout is accepted as TOML (`[[messages]]` tables).

pub mod codec;
pub mod database;
pub mod decode;
pub mod definition;
pub mod encode;
pub mod error;
pub mod precision;

pub use codec::FrameCodec;
pub use database::{DatabaseMeta, SignalDatabase};
pub use definition::{MessageDefinition, SignalDescriptor, MAX_SIGNAL_BITS, PAYLOAD_BITS};
pub use encode::RangePolicy;
pub use error::{
    format_can_id, parse_can_id, CodecError, CodecResult, DatabaseError, DatabaseResult,
};
