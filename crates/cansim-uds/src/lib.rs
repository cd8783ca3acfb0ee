//! cansim-uds - Bus transports and fault code diagnostics
//!
//! This crate connects simulated nodes to a bus and implements the
//! diagnostic exchange that runs over it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐            ┌──────────────────────────────┐
//! │ DiagnosticTester │  19 02 ──▶ │ node task                    │
//! │ (round robin)    │            │  DiagnosticService::handle   │
//! │                  │ ◀── 59 02  │  (reads/clears NodeState)    │
//! └────────┬─────────┘            └──────────────┬───────────────┘
//!          │                                     │
//!          └──────────────┬──────────────────────┘
//!                    ┌────┴──────┐
//!                    │BusAdapter │
//!                    │(virtual / │
//!                    │ SocketCAN)│
//!                    └───────────┘
//! ```

pub mod config;
pub mod transport;
pub mod uds;

pub use config::{SocketCanConfig, TesterConfig, TransportConfig, VirtualBusConfig};
pub use transport::{Bus, BusAdapter, TransportError, VirtualBus, VirtualBusPort};
pub use uds::{
    DiagnosticError, DiagnosticOutcome, DiagnosticRequest, DiagnosticResponse, DiagnosticResult,
    DiagnosticService, DiagnosticTarget, DiagnosticTester, ServiceId, SweepEntry,
};

// Re-export for convenience
pub use cansim_core::{DtcCode, Frame};
