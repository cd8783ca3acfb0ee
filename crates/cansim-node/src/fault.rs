//! Fault injection and fault detection rules
//!
//! A [`FaultPolicy`] decides whether a transmission or reception fails at the
//! transport level. A [`FaultRule`] turns a sampled value into an active DTC.

use std::collections::VecDeque;

use cansim_core::DtcCode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::sampler::Sample;

/// Decides which bus operations fail
pub trait FaultPolicy: Send {
    /// Whether the next transmission fails before reaching the bus
    fn transmit_fails(&mut self) -> bool;

    /// Whether the next received frame is corrupted
    fn receive_fails(&mut self) -> bool;
}

/// Every operation succeeds
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

impl FaultPolicy for NoFaults {
    fn transmit_fails(&mut self) -> bool {
        false
    }

    fn receive_fails(&mut self) -> bool {
        false
    }
}

/// Fails operations with fixed probabilities
pub struct RandomFaults {
    tx_probability: f64,
    rx_probability: f64,
    rng: StdRng,
}

impl RandomFaults {
    /// Probabilities are clamped to `0.0..=1.0`
    pub fn new(tx_probability: f64, rx_probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            tx_probability: tx_probability.clamp(0.0, 1.0),
            rx_probability: rx_probability.clamp(0.0, 1.0),
            rng,
        }
    }
}

impl FaultPolicy for RandomFaults {
    fn transmit_fails(&mut self) -> bool {
        self.rng.gen_bool(self.tx_probability)
    }

    fn receive_fails(&mut self) -> bool {
        self.rng.gen_bool(self.rx_probability)
    }
}

/// Replays fixed outcomes; succeeds once a queue runs dry
#[derive(Debug, Default, Clone)]
pub struct ScriptedFaults {
    transmit: VecDeque<bool>,
    receive: VecDeque<bool>,
}

impl ScriptedFaults {
    pub fn new(
        transmit: impl IntoIterator<Item = bool>,
        receive: impl IntoIterator<Item = bool>,
    ) -> Self {
        Self {
            transmit: transmit.into_iter().collect(),
            receive: receive.into_iter().collect(),
        }
    }

    /// `count` consecutive transmit failures, receptions untouched
    pub fn failing_transmits(count: usize) -> Self {
        Self::new(std::iter::repeat(true).take(count), [])
    }
}

impl FaultPolicy for ScriptedFaults {
    fn transmit_fails(&mut self) -> bool {
        self.transmit.pop_front().unwrap_or(false)
    }

    fn receive_fails(&mut self) -> bool {
        self.receive.pop_front().unwrap_or(false)
    }
}

/// Injected failure probabilities for one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultConfig {
    #[serde(default)]
    pub tx_failure_probability: f64,
    #[serde(default)]
    pub rx_failure_probability: f64,
}

impl FaultConfig {
    pub fn new(tx_failure_probability: f64, rx_failure_probability: f64) -> Self {
        Self {
            tx_failure_probability,
            rx_failure_probability,
        }
    }

    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.tx_failure_probability)
            && (0.0..=1.0).contains(&self.rx_failure_probability)
    }

    /// Policy implementing these probabilities
    pub fn policy(&self, seed: Option<u64>) -> Box<dyn FaultPolicy> {
        if self.tx_failure_probability == 0.0 && self.rx_failure_probability == 0.0 {
            Box::new(NoFaults)
        } else {
            Box::new(RandomFaults::new(
                self.tx_failure_probability,
                self.rx_failure_probability,
                seed,
            ))
        }
    }
}

/// Raises `dtc` when a signal leaves its allowed band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultRule {
    pub signal: String,
    /// Fires when the value is strictly above this limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above: Option<f64>,
    /// Fires when the value is strictly below this limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below: Option<f64>,
    pub dtc: DtcCode,
}

impl FaultRule {
    pub fn above(signal: impl Into<String>, limit: f64, dtc: DtcCode) -> Self {
        Self {
            signal: signal.into(),
            above: Some(limit),
            below: None,
            dtc,
        }
    }

    pub fn below(signal: impl Into<String>, limit: f64, dtc: DtcCode) -> Self {
        Self {
            signal: signal.into(),
            above: None,
            below: Some(limit),
            dtc,
        }
    }

    /// Whether the sample violates this rule; a missing signal never does
    pub fn is_triggered(&self, sample: &Sample) -> bool {
        let Some(&value) = sample.get(&self.signal) else {
            return false;
        };
        self.above.is_some_and(|limit| value > limit)
            || self.below.is_some_and(|limit| value < limit)
    }
}

/// First rule the sample violates, in configuration order
pub fn first_triggered<'a>(rules: &'a [FaultRule], sample: &Sample) -> Option<&'a FaultRule> {
    rules.iter().find(|rule| rule.is_triggered(sample))
}
