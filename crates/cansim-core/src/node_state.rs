//! Per-node mutable state
//!
//! A `NodeState` is owned by exactly one node task. Other parties only ever
//! see [`NodeStatus`] snapshots published by that task.

use std::time::Instant;

use serde::Serialize;

use crate::dtc::DtcCode;
use crate::error_model::{BusState, ErrorCounterModel, ErrorThresholds};

/// Mutable record of one simulated ECU
#[derive(Debug, Clone, Default)]
pub struct NodeState {
    /// Transmit/receive error counters and bus state
    pub errors: ErrorCounterModel,
    active_dtc: Option<DtcCode>,
    frames_sent: u64,
    frames_received: u64,
}

impl NodeState {
    pub fn new(thresholds: ErrorThresholds) -> Self {
        Self {
            errors: ErrorCounterModel::new(thresholds),
            active_dtc: None,
            frames_sent: 0,
            frames_received: 0,
        }
    }

    pub fn state(&self) -> BusState {
        self.errors.state()
    }

    pub fn active_dtc(&self) -> Option<DtcCode> {
        self.active_dtc
    }

    /// Record a detected fault
    ///
    /// Returns `true` when the active code changed.
    pub fn raise_dtc(&mut self, code: DtcCode) -> bool {
        let changed = self.active_dtc != Some(code);
        self.active_dtc = Some(code);
        changed
    }

    /// Clear the active fault, returning the code that was active
    pub fn clear_dtc(&mut self) -> Option<DtcCode> {
        self.active_dtc.take()
    }

    pub fn record_sent(&mut self) {
        self.frames_sent += 1;
    }

    pub fn record_received(&mut self) {
        self.frames_received += 1;
    }

    /// Build a read-only snapshot for observers
    pub fn snapshot(&self, node_id: &str) -> NodeStatus {
        NodeStatus {
            node_id: node_id.to_string(),
            tx_errors: self.errors.tx_errors(),
            rx_errors: self.errors.rx_errors(),
            state: self.errors.state(),
            bus_off: self.errors.bus_off_since().is_some(),
            active_dtc: self.active_dtc,
            frames_sent: self.frames_sent,
            frames_received: self.frames_received,
        }
    }

    /// Whether a bus-off node is past its recovery deadline
    pub fn recovery_due(&self, now: Instant) -> bool {
        self.errors
            .recovery_deadline()
            .is_some_and(|deadline| now >= deadline)
    }
}

/// Snapshot of a node's state published after every update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub tx_errors: u16,
    pub rx_errors: u16,
    pub state: BusState,
    pub bus_off: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_dtc: Option<DtcCode>,
    pub frames_sent: u64,
    pub frames_received: u64,
}

impl NodeStatus {
    /// Initial snapshot for a node that has not run yet
    pub fn initial(node_id: &str) -> Self {
        NodeState::default().snapshot(node_id)
    }
}
