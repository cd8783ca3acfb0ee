//! Integration tests for the CAN vehicle simulator
//!
//! Everything runs on the in-process virtual bus under tokio's paused clock,
//! so no CAN hardware or vcan interface is needed.
//!
//! ```bash
//! cargo test -p cansim-tests
//! ```
//!
//! # Test Structure
//!
//! - `bus_off_test.rs` - Error counters, bus-off and timed recovery over the bus
//! - `diagnostics_test.rs` - Tester/node fault code exchange
//! - `vehicle_test.rs` - Whole vehicle with tester, monitor and event log
//!
//! This library only holds shared fixtures.

use std::sync::Arc;
use std::time::Duration;

use cansim_core::{EventKind, NodeEvent};
use cansim_dbc::{FrameCodec, MessageDefinition, SignalDatabase, SignalDescriptor};
use cansim_node::{FaultConfig, VehicleConfig};
use tokio::sync::mpsc::UnboundedReceiver;

/// Engine telemetry message used by single-node tests
pub const ENGINE_ID: u32 = 0x100;
pub const ENGINE_REQUEST_ID: u32 = 0x7E0;
pub const ENGINE_RESPONSE_ID: u32 = 0x7E8;

/// Codec knowing only the engine message
pub fn engine_codec() -> FrameCodec {
    let message = MessageDefinition::new(ENGINE_ID)
        .with_name("Engine")
        .with_signal(SignalDescriptor::new("EngineTemp", 0, 16).with_scale(0.01, 0.0))
        .with_signal(SignalDescriptor::new("BatteryVolt", 16, 16).with_scale(0.01, 0.0))
        .with_signal(SignalDescriptor::new("RPM", 32, 32));
    match SignalDatabase::new([message]) {
        Ok(database) => FrameCodec::new(Arc::new(database)),
        Err(e) => panic!("engine database rejected: {e}"),
    }
}

/// Built-in vehicle with injected transport failures removed
pub fn quiet_vehicle() -> VehicleConfig {
    let mut config = VehicleConfig::default();
    for node in &mut config.nodes {
        node.faults = FaultConfig::default();
    }
    config
}

/// Tester pacing short enough for a few sweeps per simulated second
pub fn fast_tester(config: &mut VehicleConfig) {
    config.tester.node_interval_ms = 50;
    config.tester.sweep_interval_ms = 100;
}

/// Everything emitted so far
pub fn drain(events: &mut UnboundedReceiver<NodeEvent>) -> Vec<NodeEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Events of one kind for one node
pub fn events_for<'a>(
    events: &'a [NodeEvent],
    node: &'a str,
    matches: impl Fn(&EventKind) -> bool + 'a,
) -> impl Iterator<Item = &'a NodeEvent> + 'a {
    events
        .iter()
        .filter(move |event| event.node_id == node && matches(&event.event))
}

/// Simulated time between two telemetry frames of a 100 ms node
pub const PERIOD: Duration = Duration::from_millis(100);
