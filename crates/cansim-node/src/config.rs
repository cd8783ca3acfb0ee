//! Vehicle configuration
//!
//! A vehicle is a set of message definitions plus the nodes that transmit
//! them. Configuration is loaded once at startup from TOML and validated as a
//! whole; any inconsistency is fatal.
//!
//! ```toml
//! name = "Demo vehicle"
//!
//! [transport]
//! type = "virtual"
//!
//! [[messages]]
//! id = "0x100"
//! name = "Engine"
//! signals = [
//!     { name = "EngineTemp", start_bit = 0, bit_length = 16, scale = 0.01 },
//! ]
//!
//! [[nodes]]
//! name = "engine"
//! message_id = "0x100"
//! request_id = "0x7E0"
//! samples = [{ signal = "EngineTemp", min = 65.0, max = 121.0 }]
//! fault_rules = [{ signal = "EngineTemp", above = 115.0, dtc = "P0217" }]
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use cansim_core::{DtcCode, ErrorThresholds, MAX_EXTENDED_ID};
use cansim_dbc::definition::deserialize_can_id;
use cansim_dbc::{parse_can_id, MessageDefinition, SignalDatabase, SignalDescriptor};
use cansim_uds::{DiagnosticService, DiagnosticTarget, TesterConfig, TransportConfig};
use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::DtcCatalog;
use crate::error::ConfigError;
use crate::fault::{FaultConfig, FaultRule};
use crate::sampler::SignalRange;

/// Response id = request id + 8 unless configured otherwise
pub const DIAGNOSTIC_RESPONSE_OFFSET: u32 = 8;

/// Complete vehicle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Error-counter limits shared by every node
    #[serde(default)]
    pub thresholds: ErrorThresholds,

    #[serde(default)]
    pub tester: TesterConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Extra or replacement DTC descriptions, keyed by code text
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dtc_descriptions: BTreeMap<String, String>,

    #[serde(default)]
    pub messages: Vec<MessageDefinition>,

    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

fn default_name() -> String {
    "vehicle".to_string()
}

/// One simulated ECU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,

    /// Telemetry message this node transmits
    #[serde(deserialize_with = "deserialize_can_id")]
    pub message_id: u32,

    /// Diagnostic request id the node answers on
    #[serde(deserialize_with = "deserialize_can_id")]
    pub request_id: u32,

    /// Diagnostic response id (defaults to request id + 8)
    #[serde(
        default,
        deserialize_with = "deserialize_optional_can_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_id: Option<u32>,

    /// Telemetry period
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Sample range for every signal of the message
    #[serde(default)]
    pub samples: Vec<SignalRange>,

    /// Fault detection rules, first match wins
    #[serde(default)]
    pub fault_rules: Vec<FaultRule>,

    /// Injected transport failures
    #[serde(default)]
    pub faults: FaultConfig,
}

fn default_period_ms() -> u64 {
    100
}

impl NodeConfig {
    pub fn new(name: impl Into<String>, message_id: u32, request_id: u32) -> Self {
        Self {
            name: name.into(),
            message_id,
            request_id,
            response_id: None,
            period_ms: default_period_ms(),
            samples: Vec::new(),
            fault_rules: Vec::new(),
            faults: FaultConfig::default(),
        }
    }

    pub fn with_period_ms(mut self, period_ms: u64) -> Self {
        self.period_ms = period_ms;
        self
    }

    pub fn with_sample(mut self, signal: &str, min: f64, max: f64) -> Self {
        self.samples.push(SignalRange::new(signal, min, max));
        self
    }

    pub fn with_rule(mut self, rule: FaultRule) -> Self {
        self.fault_rules.push(rule);
        self
    }

    pub fn with_faults(mut self, faults: FaultConfig) -> Self {
        self.faults = faults;
        self
    }

    pub fn response_id(&self) -> u32 {
        self.response_id
            .unwrap_or_else(|| self.request_id.saturating_add(DIAGNOSTIC_RESPONSE_OFFSET))
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Responder for this node's identifier pair
    pub fn service(&self) -> DiagnosticService {
        DiagnosticService::new(self.request_id, self.response_id())
    }

    /// The same pair as seen from the tester
    pub fn target(&self) -> DiagnosticTarget {
        DiagnosticTarget::new(self.name.clone(), self.request_id, self.response_id())
    }

    fn validate(&self, database: &SignalDatabase) -> Result<(), ConfigError> {
        let node = || self.name.clone();

        if self.period_ms == 0 {
            return Err(ConfigError::InvalidPeriod { node: node() });
        }
        if !self.faults.is_valid() {
            return Err(ConfigError::InvalidProbability { node: node() });
        }

        if self.request_id > MAX_EXTENDED_ID {
            return Err(ConfigError::InvalidCanId {
                node: node(),
                id: self.request_id,
            });
        }
        let response_id = match self.response_id {
            Some(id) => id,
            None => self
                .request_id
                .checked_add(DIAGNOSTIC_RESPONSE_OFFSET)
                .ok_or(ConfigError::InvalidCanId {
                    node: node(),
                    id: self.request_id,
                })?,
        };
        if response_id > MAX_EXTENDED_ID {
            return Err(ConfigError::InvalidCanId {
                node: node(),
                id: response_id,
            });
        }

        let message = database
            .get(self.message_id)
            .ok_or_else(|| ConfigError::UnknownMessage {
                node: node(),
                message_id: self.message_id,
            })?;

        for range in &self.samples {
            if message.signal(&range.signal).is_none() {
                return Err(ConfigError::UnknownSignal {
                    node: node(),
                    signal: range.signal.clone(),
                });
            }
            if !range.is_valid() {
                return Err(ConfigError::InvalidSampleRange {
                    node: node(),
                    signal: range.signal.clone(),
                });
            }
        }
        for signal in &message.signals {
            if !self.samples.iter().any(|range| range.signal == signal.name) {
                return Err(ConfigError::MissingSampleRange {
                    node: node(),
                    signal: signal.name.clone(),
                });
            }
        }

        for rule in &self.fault_rules {
            if message.signal(&rule.signal).is_none() {
                return Err(ConfigError::UnknownSignal {
                    node: node(),
                    signal: rule.signal.clone(),
                });
            }
            if rule.above.is_none() && rule.below.is_none() {
                return Err(ConfigError::InvalidRule {
                    node: node(),
                    signal: rule.signal.clone(),
                });
            }
            if rule.dtc.is_none_marker() {
                return Err(ConfigError::ReservedDtc {
                    node: node(),
                    signal: rule.signal.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Bus monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between bus load reports
    #[serde(default = "default_load_report_ms")]
    pub load_report_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            load_report_ms: default_load_report_ms(),
        }
    }
}

impl MonitorConfig {
    pub fn load_report_interval(&self) -> Duration {
        Duration::from_millis(self.load_report_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_load_report_ms() -> u64 {
    1000
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(u32),
    Text(String),
}

fn deserialize_optional_can_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u32>, D::Error> {
    match Option::<IdRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(IdRepr::Number(id)) => Ok(Some(id)),
        Some(IdRepr::Text(s)) => parse_can_id(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

impl VehicleConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the whole configuration for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        let database = self.database()?;
        self.catalog()?;

        let mut names = HashSet::new();
        for node in &self.nodes {
            if !names.insert(node.name.as_str()) {
                return Err(ConfigError::DuplicateNode(node.name.clone()));
            }
            node.validate(&database)?;
        }

        self.check_id_collisions(&database)
    }

    /// Signal database built from the message definitions
    pub fn database(&self) -> Result<SignalDatabase, ConfigError> {
        Ok(SignalDatabase::new(self.messages.iter().cloned())?)
    }

    /// DTC descriptions with this vehicle's overrides
    pub fn catalog(&self) -> Result<DtcCatalog, ConfigError> {
        self.dtc_descriptions
            .iter()
            .try_fold(DtcCatalog::new(), |catalog, (code, description)| {
                let code: DtcCode = code
                    .parse()
                    .map_err(|_| ConfigError::InvalidDescription(code.clone()))?;
                Ok(catalog.with_description(code, description.clone()))
            })
    }

    /// Tester view of every node
    pub fn targets(&self) -> Vec<DiagnosticTarget> {
        self.nodes.iter().map(NodeConfig::target).collect()
    }

    pub fn node(&self, name: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|node| node.name == name)
    }

    fn check_id_collisions(&self, database: &SignalDatabase) -> Result<(), ConfigError> {
        let mut owners: HashMap<u32, String> = database
            .messages()
            .map(|message| (message.id, format!("message {}", message.label())))
            .collect();
        let mut transmitters: HashMap<u32, &str> = HashMap::new();

        for node in &self.nodes {
            if let Some(first) = transmitters.insert(node.message_id, node.name.as_str()) {
                return Err(ConfigError::IdCollision {
                    id: node.message_id,
                    first: first.to_string(),
                    second: node.name.clone(),
                });
            }
            for (id, role) in [
                (node.request_id, "requests"),
                (node.response_id(), "responses"),
            ] {
                let owner = format!("{} {}", node.name, role);
                if let Some(first) = owners.insert(id, owner.clone()) {
                    return Err(ConfigError::IdCollision {
                        id,
                        first,
                        second: owner,
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for VehicleConfig {
    /// Engine, transmission and ABS on a virtual bus
    fn default() -> Self {
        let engine = MessageDefinition::new(0x100)
            .with_name("Engine")
            .with_signal(
                SignalDescriptor::new("EngineTemp", 0, 16)
                    .with_scale(0.01, 0.0)
                    .with_unit("degC"),
            )
            .with_signal(
                SignalDescriptor::new("BatteryVolt", 16, 16)
                    .with_scale(0.01, 0.0)
                    .with_unit("V"),
            )
            .with_signal(SignalDescriptor::new("RPM", 32, 32).with_unit("rpm"));

        let transmission = MessageDefinition::new(0x120)
            .with_name("Transmission")
            .with_signal(SignalDescriptor::new("Gear", 0, 4))
            .with_signal(SignalDescriptor::new("OutputSpeed", 4, 12).with_unit("rpm"))
            .with_signal(
                SignalDescriptor::new("FluidTemp", 16, 8)
                    .with_scale(1.0, -40.0)
                    .with_unit("degC"),
            );

        let abs = ["FL", "FR", "RL", "RR"]
            .iter()
            .enumerate()
            .fold(MessageDefinition::new(0x200).with_name("ABS"), |msg, (i, wheel)| {
                msg.with_signal(
                    SignalDescriptor::new(format!("WheelSpeed{}", wheel), i as u32 * 16, 16)
                        .with_scale(0.01, 0.0)
                        .with_unit("km/h"),
                )
            });

        let (p0217, p0128, p0700, c1234) = (
            DtcCode::powertrain(0x0217),
            DtcCode::powertrain(0x0128),
            DtcCode::powertrain(0x0700),
            DtcCode::chassis(0x1234),
        );

        let engine_node = NodeConfig::new("engine", 0x100, 0x7E0)
            .with_period_ms(100)
            .with_sample("EngineTemp", 65.0, 121.0)
            .with_sample("BatteryVolt", 12.0, 14.5)
            .with_sample("RPM", 800.0, 1800.0)
            .with_rule(FaultRule::above("EngineTemp", 115.0, p0217))
            .with_rule(FaultRule::below("EngineTemp", 66.0, p0128))
            .with_faults(FaultConfig::new(0.35, 0.05));

        let transmission_node = NodeConfig::new("transmission", 0x120, 0x7E1)
            .with_period_ms(120)
            .with_sample("Gear", 0.0, 5.0)
            .with_sample("OutputSpeed", 0.0, 4000.0)
            .with_sample("FluidTemp", 40.0, 130.0)
            .with_rule(FaultRule::above("FluidTemp", 125.0, p0700));

        let abs_node = ["FL", "FR", "RL", "RR"]
            .iter()
            .fold(
                NodeConfig::new("abs", 0x200, 0x7E2).with_period_ms(150),
                |node, wheel| node.with_sample(&format!("WheelSpeed{}", wheel), 30.0, 250.0),
            )
            .with_rule(FaultRule::below("WheelSpeedFL", 32.0, c1234));

        Self {
            name: "Demo vehicle".to_string(),
            transport: TransportConfig::default(),
            thresholds: ErrorThresholds::default(),
            tester: TesterConfig::default(),
            monitor: MonitorConfig::default(),
            dtc_descriptions: BTreeMap::new(),
            messages: vec![engine, transmission, abs],
            nodes: vec![engine_node, transmission_node, abs_node],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"
        name = "Bench"

        [thresholds]
        warning_limit = 100

        [tester]
        node_interval_ms = 500

        [dtc_descriptions]
        P0219 = "Engine Overspeed"

        [[messages]]
        id = "0x100"
        name = "Engine"
        signals = [
            { name = "EngineTemp", start_bit = 0, bit_length = 16, scale = 0.01 },
            { name = "RPM", start_bit = 16, bit_length = 16 },
        ]

        [[nodes]]
        name = "engine"
        message_id = "0x100"
        request_id = "0x7E0"
        samples = [
            { signal = "EngineTemp", min = 65.0, max = 121.0 },
            { signal = "RPM", min = 800.0, max = 1800.0 },
        ]
        fault_rules = [{ signal = "RPM", above = 1700.0, dtc = "P0219" }]
    "#;

    #[test]
    fn test_default_vehicle_is_valid() {
        let config = VehicleConfig::default();
        config.validate().unwrap();

        let database = config.database().unwrap();
        assert_eq!(database.ids(), vec![0x100, 0x120, 0x200]);
        assert_eq!(
            config
                .targets()
                .iter()
                .map(|t| (t.request_id, t.response_id))
                .collect::<Vec<_>>(),
            vec![(0x7E0, 0x7E8), (0x7E1, 0x7E9), (0x7E2, 0x7EA)]
        );
        assert_eq!(config.node("abs").unwrap().period_ms, 150);
    }

    #[test]
    fn test_parse_minimal() {
        let config = VehicleConfig::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.name, "Bench");
        assert_eq!(config.thresholds.warning_limit, 100);
        assert_eq!(config.thresholds.bus_off_limit, 255);
        assert_eq!(config.tester.node_interval_ms, 500);
        assert_eq!(config.tester.response_timeout_ms, 200);
        assert_eq!(config.transport, TransportConfig::default());

        let engine = config.node("engine").unwrap();
        assert_eq!(engine.response_id(), 0x7E8);
        assert_eq!(engine.period(), Duration::from_millis(100));

        let catalog = config.catalog().unwrap();
        assert_eq!(
            catalog.describe(&"P0219".parse().unwrap()),
            "Engine Overspeed"
        );
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = VehicleConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(VehicleConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vehicle.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = VehicleConfig::load(&path).unwrap();
        assert_eq!(config.nodes.len(), 1);
        assert!(VehicleConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_rejects_unknown_rule_signal() {
        let mut config = VehicleConfig::default();
        config.nodes[0]
            .fault_rules
            .push(FaultRule::above("OilPressure", 5.0, "P0520".parse().unwrap()));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownSignal { .. })
        ));
    }

    #[test]
    fn test_rejects_missing_sample_range() {
        let mut config = VehicleConfig::default();
        config.nodes[1].samples.retain(|range| range.signal != "Gear");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSampleRange { .. })
        ));
    }

    #[test]
    fn test_rejects_overlapping_signals() {
        let mut config = VehicleConfig::default();
        config.messages[0]
            .signals
            .push(SignalDescriptor::new("Torque", 8, 8));
        assert!(matches!(config.validate(), Err(ConfigError::Database(_))));
    }

    #[test]
    fn test_rejects_id_collisions() {
        let mut config = VehicleConfig::default();
        // abs answers where transmission already answers
        config.nodes[2].request_id = 0x7E1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IdCollision { id: 0x7E1, .. })
        ));

        let mut config = VehicleConfig::default();
        config.nodes[2].response_id = Some(0x100);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IdCollision { id: 0x100, .. })
        ));
    }

    #[test]
    fn test_rejects_ids_outside_29_bits() {
        let text = MINIMAL.replace(r#"request_id = "0x7E0""#, r#"request_id = "0x3FFFFFF0""#);
        assert!(matches!(
            VehicleConfig::from_toml_str(&text),
            Err(ConfigError::InvalidCanId { id: 0x3FFF_FFF0, .. })
        ));

        // The derived response id would overflow u32
        let text = MINIMAL.replace(r#"request_id = "0x7E0""#, r#"request_id = "0xFFFFFFFF""#);
        assert!(matches!(
            VehicleConfig::from_toml_str(&text),
            Err(ConfigError::InvalidCanId { id: 0xFFFF_FFFF, .. })
        ));

        // Request fits, derived response does not
        let mut config = VehicleConfig::default();
        config.nodes[0].request_id = MAX_EXTENDED_ID;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCanId { id, .. }) if id == MAX_EXTENDED_ID + 8
        ));

        let mut config = VehicleConfig::default();
        config.nodes[0].response_id = Some(0x2000_0000);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidCanId { id: 0x2000_0000, .. })
        ));
    }

    #[test]
    fn test_rejects_reserved_rule_code() {
        let text = MINIMAL.replace(r#"dtc = "P0219""#, r#"dtc = "P0000""#);
        assert!(matches!(
            VehicleConfig::from_toml_str(&text),
            Err(ConfigError::Toml(_))
        ));

        let mut config = VehicleConfig::default();
        config.nodes[0].fault_rules[0].dtc = DtcCode::powertrain(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ReservedDtc { .. })
        ));
    }

    #[test]
    fn test_rejects_duplicate_node_and_bad_probability() {
        let mut config = VehicleConfig::default();
        config.nodes[1].name = "engine".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateNode(_))
        ));

        let mut config = VehicleConfig::default();
        config.nodes[0].faults = FaultConfig::new(1.2, 0.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidProbability { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_description_code() {
        let mut config = VehicleConfig::default();
        config
            .dtc_descriptions
            .insert("X9999".to_string(), "Nope".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDescription(_))
        ));
    }
}
