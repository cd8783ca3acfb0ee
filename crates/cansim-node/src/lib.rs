//! cansim-node - Simulated ECUs and the vehicle that runs them
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐ ┌──────────────┐ ┌──────────┐
//!  │  engine  │ │ transmission │ │   abs    │   NodeSimulator tasks
//!  └────┬─────┘ └──────┬───────┘ └────┬─────┘
//!       │              │              │
//!  ═════╪══════════════╪══════════════╪════════════ bus (virtual / SocketCAN)
//!       │              │
//!  ┌────┴─────────┐ ┌──┴─────────┐
//!  │ DiagnosticTe │ │ BusMonitor │
//!  │ ster         │ │ (read-only)│
//!  └──────────────┘ └────────────┘
//! ```
//!
//! Each node samples its signals, encodes them with the shared
//! [`cansim_dbc::FrameCodec`] and tracks its own error counters. The tester
//! polls every node for fault codes and clears them; the monitor decodes all
//! traffic and reports bus load. Everything is described as
//! [`cansim_core::NodeEvent`]s delivered to an [`cansim_core::EventSink`].

pub mod catalog;
pub mod config;
pub mod error;
pub mod fault;
pub mod monitor;
pub mod node;
pub mod sampler;
pub mod vehicle;

pub use catalog::DtcCatalog;
pub use config::{MonitorConfig, NodeConfig, VehicleConfig, DIAGNOSTIC_RESPONSE_OFFSET};
pub use error::{ConfigError, VehicleError};
pub use fault::{FaultConfig, FaultPolicy, FaultRule, NoFaults, RandomFaults, ScriptedFaults};
pub use monitor::{BusMonitor, MONITOR_ID};
pub use node::{NodeHandle, NodeSimulator};
pub use sampler::{RandomSampler, Sample, SampleSource, ScriptedSampler, SignalRange};
pub use vehicle::Vehicle;

/// Current time for the error model and bus load meter
///
/// Read through tokio's clock so a paused test runtime controls it.
pub(crate) fn clock() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}
