//! Structured simulation events
//!
//! Nodes, the diagnostic tester and the bus monitor describe what happens on
//! the bus as [`NodeEvent`] values. Formatting and persistence are left to an
//! [`EventSink`]; the simulator itself never prints.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dtc::DtcCode;
use crate::error_model::BusState;

/// One structured event
#[derive(Debug, Clone, Serialize)]
pub struct NodeEvent {
    pub timestamp: DateTime<Utc>,
    pub node_id: String,
    pub event: EventKind,
}

impl NodeEvent {
    /// Create an event stamped with the current wall-clock time
    pub fn now(node_id: impl Into<String>, event: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            node_id: node_id.into(),
            event,
        }
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    /// Telemetry frame put on the bus
    FrameSent { can_id: u32, dlc: u8 },
    /// Transmission attempt failed at the transport
    TransmitFailed { reason: String },
    /// Telemetry skipped because the node is bus-off
    TransmitSuppressed,
    /// Receive error at the transport
    ReceiveFailed { reason: String },
    /// Bus state changed
    StateChanged {
        from: BusState,
        to: BusState,
        tx_errors: u16,
        rx_errors: u16,
    },
    /// Automatic recovery from bus-off completed
    BusOffRecovered,
    /// A node detected a fault and made the code active
    DtcRaised { code: DtcCode, description: String },
    /// A node's active fault was cleared by a diagnostic request
    DtcCleared { code: Option<DtcCode> },
    /// Diagnostic request answered
    DiagnosticServed { service_id: u8, sub_function: u8 },
    /// Diagnostic request dropped without a response
    DiagnosticDropped { service_id: u8, reason: String },
    /// Tester observed an active fault on a node
    FaultReported { code: DtcCode, description: String },
    /// Tester observed that a node's fault was cleared
    FaultCleared,
    /// Tester got no answer from a node
    DiagnosticTimeout { request_id: u32 },
    /// Bus monitor decoded a registered message
    SignalsDecoded {
        can_id: u32,
        values: BTreeMap<String, f64>,
    },
    /// Bus monitor saw a frame with no registered definition
    FrameDropped { can_id: u32, data: String },
    /// Periodic bus load report
    BusLoad { percent: f64, frames: u64 },
}

/// Consumer of simulation events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: NodeEvent);
}

/// Renders events as `tracing` log lines
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: NodeEvent) {
        let node = event.node_id.as_str();
        match &event.event {
            EventKind::FrameSent { can_id, dlc } => {
                debug!(node, can_id = format!("0x{:03X}", can_id), dlc, "Frame sent")
            }
            EventKind::TransmitFailed { reason } => warn!(node, %reason, "Transmit failed"),
            EventKind::TransmitSuppressed => debug!(node, "Transmit suppressed (bus-off)"),
            EventKind::ReceiveFailed { reason } => warn!(node, %reason, "Receive failed"),
            EventKind::StateChanged {
                from,
                to,
                tx_errors,
                rx_errors,
            } => {
                if *to == BusState::BusOff {
                    error!(node, %from, %to, tx_errors, rx_errors, "Bus state changed");
                } else {
                    info!(node, %from, %to, tx_errors, rx_errors, "Bus state changed");
                }
            }
            EventKind::BusOffRecovered => info!(node, "Recovered from bus-off"),
            EventKind::DtcRaised { code, description } => {
                warn!(node, %code, %description, "DTC raised")
            }
            EventKind::DtcCleared { code } => match code {
                Some(code) => info!(node, %code, "DTC cleared"),
                None => debug!(node, "DTC clear requested with no active fault"),
            },
            EventKind::DiagnosticServed {
                service_id,
                sub_function,
            } => debug!(
                node,
                service_id = format!("0x{:02X}", service_id),
                sub_function = format!("0x{:02X}", sub_function),
                "Diagnostic request served"
            ),
            EventKind::DiagnosticDropped { service_id, reason } => debug!(
                node,
                service_id = format!("0x{:02X}", service_id),
                %reason,
                "Diagnostic request dropped"
            ),
            EventKind::FaultReported { code, description } => {
                warn!(node, %code, %description, "[FAULT]")
            }
            EventKind::FaultCleared => info!(node, "[RECOVERY] Fault cleared successfully"),
            EventKind::DiagnosticTimeout { request_id } => warn!(
                node,
                request_id = format!("0x{:03X}", request_id),
                "No diagnostic response"
            ),
            EventKind::SignalsDecoded { can_id, values } => debug!(
                node,
                can_id = format!("0x{:03X}", can_id),
                ?values,
                "Decoded"
            ),
            EventKind::FrameDropped { can_id, data } => debug!(
                node,
                can_id = format!("0x{:03X}", can_id),
                %data,
                "Dropped unknown frame"
            ),
            EventKind::BusLoad { percent, frames } => {
                info!(node, percent = format!("{:.2}", percent), frames, "Bus load")
            }
        }
    }
}

/// Forwards events into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<NodeEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NodeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: NodeEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

/// Appends events as JSON objects, one per line
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open (or create) the file in append mode
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().flush()
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&self, event: NodeEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                error!(?e, "Failed to serialize event");
                return;
            }
        };

        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{}", line) {
            error!(?e, "Failed to write event");
        }
    }
}

impl Drop for JsonLinesSink {
    fn drop(&mut self) {
        let _ = self.writer.get_mut().flush();
    }
}

/// Delivers every event to several sinks
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: NodeEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
