//! Transport layer for simulated bus traffic
//!
//! This module provides the adapters nodes use to reach the bus:
//! - Virtual bus (in-process broadcast, the default)
//! - SocketCAN adapter for raw CAN frames (Linux only, `socketcan` feature)
//!
//! # Example
//!
//! ```ignore
//! use cansim_uds::config::TransportConfig;
//! use cansim_uds::transport::Bus;
//!
//! let bus = Bus::from_config(&TransportConfig::default())?;
//! let engine = bus.connect("engine")?;
//! engine.send(&frame).await?;
//! ```

mod adapter;
pub mod error;
pub mod virtual_bus;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use adapter::BusAdapter;
pub use error::TransportError;
pub use virtual_bus::{VirtualBus, VirtualBusPort};

use std::sync::Arc;

use crate::config::TransportConfig;

/// A bus that nodes can be attached to
#[derive(Debug, Clone)]
pub enum Bus {
    Virtual(VirtualBus),
    #[cfg(all(target_os = "linux", feature = "socketcan"))]
    SocketCan { interface: String },
}

impl Bus {
    /// Create a bus based on configuration
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        match config {
            TransportConfig::Virtual(cfg) => Ok(Bus::Virtual(VirtualBus::new(cfg))),
            #[cfg(all(target_os = "linux", feature = "socketcan"))]
            TransportConfig::SocketCan(cfg) => Ok(Bus::SocketCan {
                interface: cfg.interface.clone(),
            }),
            #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
            TransportConfig::SocketCan(_) => Err(TransportError::Unsupported(
                "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
            )),
        }
    }

    /// Attach a named participant
    pub fn connect(&self, name: &str) -> Result<Arc<dyn BusAdapter>, TransportError> {
        match self {
            Bus::Virtual(bus) => Ok(Arc::new(bus.connect(name))),
            #[cfg(all(target_os = "linux", feature = "socketcan"))]
            Bus::SocketCan { interface } => {
                let adapter = socketcan::SocketCanAdapter::open(interface, name)?;
                Ok(Arc::new(adapter))
            }
        }
    }
}
