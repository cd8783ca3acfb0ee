//! Simulator error types

use cansim_core::CoreError;
use cansim_dbc::DatabaseError;
use cansim_uds::TransportError;
use thiserror::Error;

/// Problems found while loading or validating a vehicle configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("invalid message definitions: {0}")]
    Database(#[from] DatabaseError),

    #[error("invalid configuration value: {0}")]
    Core(#[from] CoreError),

    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("node {node}: message 0x{message_id:03X} is not defined")]
    UnknownMessage { node: String, message_id: u32 },

    #[error("node {node}: signal {signal} is not part of its message")]
    UnknownSignal { node: String, signal: String },

    #[error("node {node}: signal {signal} has no sample range")]
    MissingSampleRange { node: String, signal: String },

    #[error("node {node}: invalid sample range for {signal}")]
    InvalidSampleRange { node: String, signal: String },

    #[error("node {node}: fault rule on {signal} needs `above` or `below`")]
    InvalidRule { node: String, signal: String },

    #[error("node {node}: fault rule on {signal} uses P0000, which means no fault")]
    ReservedDtc { node: String, signal: String },

    #[error("node {node}: CAN ID 0x{id:X} does not fit in 29 bits")]
    InvalidCanId { node: String, id: u32 },

    #[error("node {node}: failure probabilities must be within 0.0..=1.0")]
    InvalidProbability { node: String },

    #[error("node {node}: period must be positive")]
    InvalidPeriod { node: String },

    #[error("CAN ID 0x{id:03X} used by both {first} and {second}")]
    IdCollision {
        id: u32,
        first: String,
        second: String,
    },

    #[error("invalid DTC in description table: {0}")]
    InvalidDescription(String),
}

/// Errors while starting a vehicle
#[derive(Debug, Error)]
pub enum VehicleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("bus unavailable: {0}")]
    Transport(#[from] TransportError),
}
