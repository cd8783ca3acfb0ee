//! Transport and tester configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::uds::{CLEAR_ALL_GROUPS, REPORT_DTC_BY_STATUS_MASK};

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// In-process broadcast bus
    Virtual(VirtualBusConfig),
    /// Raw CAN on a SocketCAN interface (Linux only)
    SocketCan(SocketCanConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Virtual(VirtualBusConfig::default())
    }
}

impl TransportConfig {
    /// Nominal bitrate used for bus load computation
    pub fn bitrate(&self) -> u32 {
        match self {
            TransportConfig::Virtual(cfg) => cfg.bitrate,
            TransportConfig::SocketCan(cfg) => cfg.bitrate,
        }
    }
}

/// In-process bus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualBusConfig {
    /// Frames buffered per receiver before it starts losing frames
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Nominal bitrate
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
}

impl Default for VirtualBusConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            bitrate: default_bitrate(),
        }
    }
}

fn default_capacity() -> usize {
    1024
}

fn default_bitrate() -> u32 {
    cansim_core::DEFAULT_BITRATE
}

/// SocketCAN configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketCanConfig {
    /// CAN interface name (e.g., "vcan0")
    pub interface: String,
    /// CAN bus bitrate
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
}

/// Diagnostic tester timing and sub-functions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TesterConfig {
    /// Whether the tester runs at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// How long to wait for each response
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Pause after each node before moving to the next
    #[serde(default = "default_node_interval_ms")]
    pub node_interval_ms: u64,
    /// Pause between full sweeps
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Sub-function sent with ReadDTC
    #[serde(default = "default_read_sub_function")]
    pub read_sub_function: u8,
    /// Sub-function sent with ClearDTC
    #[serde(default = "default_clear_sub_function")]
    pub clear_sub_function: u8,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            response_timeout_ms: default_response_timeout_ms(),
            node_interval_ms: default_node_interval_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            read_sub_function: default_read_sub_function(),
            clear_sub_function: default_clear_sub_function(),
        }
    }
}

impl TesterConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn node_interval(&self) -> Duration {
        Duration::from_millis(self.node_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_response_timeout_ms() -> u64 {
    200
}

fn default_node_interval_ms() -> u64 {
    2000
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_read_sub_function() -> u8 {
    REPORT_DTC_BY_STATUS_MASK
}

fn default_clear_sub_function() -> u8 {
    CLEAR_ALL_GROUPS
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_transport_config_tagged() {
        let cfg: TransportConfig = toml::from_str(
            r#"
type = "socketcan"
interface = "vcan0"
"#,
        )
        .unwrap();
        assert_eq!(
            cfg,
            TransportConfig::SocketCan(SocketCanConfig {
                interface: "vcan0".to_string(),
                bitrate: 500_000,
            })
        );

        let cfg: TransportConfig = toml::from_str("type = \"virtual\"\ncapacity = 64").unwrap();
        assert_eq!(cfg.bitrate(), 500_000);
        assert!(matches!(cfg, TransportConfig::Virtual(VirtualBusConfig { capacity: 64, .. })));
    }

    #[test]
    fn test_tester_defaults() {
        let cfg: TesterConfig = toml::from_str("response_timeout_ms = 50").unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.response_timeout(), Duration::from_millis(50));
        assert_eq!(cfg.node_interval(), Duration::from_secs(2));
        assert_eq!(cfg.read_sub_function, 0x02);
        assert_eq!(cfg.clear_sub_function, 0xFF);
    }
}
