//! cansim-core - Core types for the CAN vehicle simulator
//!
//! This crate provides the value types and state machines shared by every
//! other simulator crate. It has no knowledge of transports or signal
//! databases.
//!
//! # Modules
//!
//! - [`frame`] - Classic CAN frame value type
//! - [`dtc`] - Diagnostic trouble codes (two-byte wire layout, `P0217` text form)
//! - [`error_model`] - Per-node transmit/receive error counters and bus state
//! - [`node_state`] - Mutable per-node record and its published snapshot
//! - [`events`] - Structured simulation events and sinks
//! - [`busload`] - Bus load accounting

pub mod busload;
pub mod dtc;
pub mod error;
pub mod error_model;
pub mod events;
pub mod frame;
pub mod node_state;

pub use busload::{frame_bits, BusLoadMeter, DEFAULT_BITRATE};
pub use dtc::{describe, DtcCategory, DtcCode};
pub use error::{CoreError, CoreResult};
pub use error_model::{
    BusState, ErrorCounterModel, ErrorThresholds, StateTransition, RX_COUNTER_LIMIT,
    TX_COUNTER_LIMIT,
};
pub use events::{
    ChannelSink, EventKind, EventSink, FanoutSink, JsonLinesSink, NodeEvent, TracingSink,
};
pub use frame::{Frame, MAX_DLC, MAX_EXTENDED_ID, MAX_STANDARD_ID};
pub use node_state::{NodeState, NodeStatus};
