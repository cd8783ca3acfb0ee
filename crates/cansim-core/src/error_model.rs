//! Bus error-state model
//!
//! Tracks the transmit (TEC) and receive (REC) error counters of one node and
//! derives its bus state from them:
//!
//! ```text
//!   tx >= bus_off_limit                      -> BusOff
//!   tx >= warning_limit || rx >= warning_limit -> Warning
//!   otherwise                                -> Normal
//! ```
//!
//! A node in `BusOff` may not transmit. Once `recovery_ms` has elapsed since
//! entering `BusOff`, [`ErrorCounterModel::poll_recovery`] resets both counters
//! and returns the node to `Normal`.
//!
//! The model takes timestamps as arguments and never reads a clock, so an
//! identical event sequence always yields an identical trajectory.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Operational state of a node on the bus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusState {
    /// Error-active, counters below the warning limit
    #[default]
    Normal,
    /// At least one counter reached the warning limit
    Warning,
    /// Transmit counter reached the bus-off limit; transmission suspended
    BusOff,
}

impl fmt::Display for BusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BusState::Normal => "normal",
            BusState::Warning => "warning",
            BusState::BusOff => "bus-off",
        };
        f.write_str(s)
    }
}

/// Counter limits and penalties
///
/// The defaults follow the usual controller values (127/255). Some setups
/// use a lower warning limit such as 100, so every value is configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorThresholds {
    /// Counter value at which the node enters `Warning`
    #[serde(default = "default_warning_limit")]
    pub warning_limit: u16,

    /// Transmit counter value at which the node enters `BusOff`
    #[serde(default = "default_bus_off_limit")]
    pub bus_off_limit: u16,

    /// Increment applied on a transmit failure
    #[serde(default = "default_tx_penalty")]
    pub tx_penalty: u16,

    /// Increment applied on a receive failure
    #[serde(default = "default_rx_penalty")]
    pub rx_penalty: u16,

    /// Cap for the transmit counter
    #[serde(default = "default_tx_max")]
    pub tx_max: u16,

    /// Cap for the receive counter
    #[serde(default = "default_rx_max")]
    pub rx_max: u16,

    /// Quiescent interval before automatic bus-off recovery (milliseconds)
    #[serde(default = "default_recovery_ms")]
    pub recovery_ms: u64,
}

/// Largest value the transmit error counter can hold
pub const TX_COUNTER_LIMIT: u16 = 255;

/// Largest value the receive error counter can hold
pub const RX_COUNTER_LIMIT: u16 = 127;

fn default_warning_limit() -> u16 {
    127
}

fn default_bus_off_limit() -> u16 {
    255
}

fn default_tx_penalty() -> u16 {
    8
}

fn default_rx_penalty() -> u16 {
    1
}

fn default_tx_max() -> u16 {
    TX_COUNTER_LIMIT
}

fn default_rx_max() -> u16 {
    RX_COUNTER_LIMIT
}

fn default_recovery_ms() -> u64 {
    2000
}

impl Default for ErrorThresholds {
    fn default() -> Self {
        Self {
            warning_limit: default_warning_limit(),
            bus_off_limit: default_bus_off_limit(),
            tx_penalty: default_tx_penalty(),
            rx_penalty: default_rx_penalty(),
            tx_max: default_tx_max(),
            rx_max: default_rx_max(),
            recovery_ms: default_recovery_ms(),
        }
    }
}

impl ErrorThresholds {
    /// Recovery interval as a `Duration`
    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_ms)
    }

    /// Check that the limits describe a reachable state machine
    pub fn validate(&self) -> CoreResult<()> {
        if self.warning_limit == 0 {
            return Err(CoreError::InvalidThresholds(
                "warning_limit must be greater than zero".to_string(),
            ));
        }
        if self.warning_limit >= self.bus_off_limit {
            return Err(CoreError::InvalidThresholds(format!(
                "warning_limit ({}) must be below bus_off_limit ({})",
                self.warning_limit, self.bus_off_limit
            )));
        }
        if self.tx_max > TX_COUNTER_LIMIT {
            return Err(CoreError::InvalidThresholds(format!(
                "tx_max ({}) exceeds the counter range 0..={}",
                self.tx_max, TX_COUNTER_LIMIT
            )));
        }
        if self.rx_max > RX_COUNTER_LIMIT {
            return Err(CoreError::InvalidThresholds(format!(
                "rx_max ({}) exceeds the counter range 0..={}",
                self.rx_max, RX_COUNTER_LIMIT
            )));
        }
        if self.bus_off_limit > self.tx_max {
            return Err(CoreError::InvalidThresholds(format!(
                "bus_off_limit ({}) is unreachable with tx_max ({})",
                self.bus_off_limit, self.tx_max
            )));
        }
        if self.tx_penalty == 0 || self.rx_penalty == 0 {
            return Err(CoreError::InvalidThresholds(
                "penalties must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Derive the bus state from a pair of counters
    pub fn classify(&self, tx_errors: u16, rx_errors: u16) -> BusState {
        if tx_errors >= self.bus_off_limit {
            BusState::BusOff
        } else if tx_errors >= self.warning_limit || rx_errors >= self.warning_limit {
            BusState::Warning
        } else {
            BusState::Normal
        }
    }
}

/// A change of bus state produced by a counter update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: BusState,
    pub to: BusState,
}

/// Transmit/receive error counters of one node
#[derive(Debug, Clone)]
pub struct ErrorCounterModel {
    thresholds: ErrorThresholds,
    tx_errors: u16,
    rx_errors: u16,
    state: BusState,
    bus_off_since: Option<Instant>,
}

impl Default for ErrorCounterModel {
    fn default() -> Self {
        Self::new(ErrorThresholds::default())
    }
}

impl ErrorCounterModel {
    pub fn new(thresholds: ErrorThresholds) -> Self {
        Self {
            thresholds,
            tx_errors: 0,
            rx_errors: 0,
            state: BusState::Normal,
            bus_off_since: None,
        }
    }

    pub fn thresholds(&self) -> &ErrorThresholds {
        &self.thresholds
    }

    pub fn tx_errors(&self) -> u16 {
        self.tx_errors
    }

    pub fn rx_errors(&self) -> u16 {
        self.rx_errors
    }

    pub fn state(&self) -> BusState {
        self.state
    }

    /// When the node entered `BusOff`, if it is currently bus-off
    pub fn bus_off_since(&self) -> Option<Instant> {
        self.bus_off_since
    }

    /// Whether the node may put frames on the bus
    pub fn can_transmit(&self) -> bool {
        self.state != BusState::BusOff
    }

    /// Instant at which a bus-off node becomes eligible for recovery
    pub fn recovery_deadline(&self) -> Option<Instant> {
        self.bus_off_since
            .map(|since| since + self.thresholds.recovery_interval())
    }

    /// A frame was transmitted successfully
    ///
    /// Ignored while bus-off, since no transmission can take place.
    pub fn on_transmit_success(&mut self, now: Instant) -> Option<StateTransition> {
        if self.state == BusState::BusOff {
            return None;
        }
        self.tx_errors = self.tx_errors.saturating_sub(1);
        self.update_state(now)
    }

    /// A transmission failed (or was counted as a stress event)
    ///
    /// Ignored while bus-off.
    pub fn on_transmit_failure(&mut self, now: Instant) -> Option<StateTransition> {
        if self.state == BusState::BusOff {
            return None;
        }
        self.tx_errors = self
            .tx_errors
            .saturating_add(self.thresholds.tx_penalty)
            .min(self.thresholds.tx_max);
        self.update_state(now)
    }

    /// A frame was received without error
    pub fn on_receive_success(&mut self, now: Instant) -> Option<StateTransition> {
        self.rx_errors = self.rx_errors.saturating_sub(1);
        self.update_state(now)
    }

    /// A receive error was detected
    pub fn on_receive_failure(&mut self, now: Instant) -> Option<StateTransition> {
        self.rx_errors = self
            .rx_errors
            .saturating_add(self.thresholds.rx_penalty)
            .min(self.thresholds.rx_max);
        self.update_state(now)
    }

    /// Recover from bus-off once the quiescent interval has elapsed
    pub fn poll_recovery(&mut self, now: Instant) -> Option<StateTransition> {
        let deadline = self.recovery_deadline()?;
        if self.state != BusState::BusOff || now < deadline {
            return None;
        }

        self.tx_errors = 0;
        self.rx_errors = 0;
        self.update_state(now)
    }

    fn update_state(&mut self, now: Instant) -> Option<StateTransition> {
        let next = self.thresholds.classify(self.tx_errors, self.rx_errors);
        let previous = self.state;

        match (previous, next) {
            (BusState::BusOff, BusState::BusOff) => {}
            (_, BusState::BusOff) => self.bus_off_since = Some(now),
            _ => self.bus_off_since = None,
        }

        self.state = next;
        (previous != next).then_some(StateTransition {
            from: previous,
            to: next,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn failures(model: &mut ErrorCounterModel, count: usize, now: Instant) {
        for _ in 0..count {
            model.on_transmit_failure(now);
        }
    }

    #[test]
    fn test_five_failures_stay_normal() {
        let mut model = ErrorCounterModel::default();
        failures(&mut model, 5, Instant::now());

        assert_eq!(model.tx_errors(), 40);
        assert_eq!(model.state(), BusState::Normal);
    }

    #[test]
    fn test_escalation_to_bus_off() {
        let mut model = ErrorCounterModel::default();
        let now = Instant::now();

        // 16 * 8 = 128
        failures(&mut model, 16, now);
        assert_eq!(model.tx_errors(), 128);
        assert_eq!(model.state(), BusState::Warning);

        // 31 * 8 = 248, 32nd failure caps at 255
        failures(&mut model, 15, now);
        assert_eq!(model.state(), BusState::Warning);
        let transition = model.on_transmit_failure(now);

        assert_eq!(model.tx_errors(), 255);
        assert_eq!(model.state(), BusState::BusOff);
        assert_eq!(
            transition,
            Some(StateTransition {
                from: BusState::Warning,
                to: BusState::BusOff
            })
        );
        assert_eq!(model.bus_off_since(), Some(now));
        assert!(!model.can_transmit());
    }

    #[test]
    fn test_counters_clamped() {
        let mut model = ErrorCounterModel::default();
        let now = Instant::now();

        for _ in 0..500 {
            model.on_receive_failure(now);
        }
        assert_eq!(model.rx_errors(), 127);
        assert_eq!(model.state(), BusState::Warning);

        model.on_transmit_success(now);
        assert_eq!(model.tx_errors(), 0);

        for _ in 0..200 {
            model.on_receive_success(now);
        }
        assert_eq!(model.rx_errors(), 0);
        assert_eq!(model.state(), BusState::Normal);
    }

    #[test]
    fn test_receive_errors_never_force_bus_off() {
        let mut model = ErrorCounterModel::default();
        let now = Instant::now();
        for _ in 0..1000 {
            model.on_receive_failure(now);
        }
        assert_eq!(model.state(), BusState::Warning);
        assert!(model.can_transmit());
    }

    #[test]
    fn test_bus_off_recovery_after_interval() {
        let mut model = ErrorCounterModel::default();
        let t0 = Instant::now();
        failures(&mut model, 32, t0);
        assert_eq!(model.state(), BusState::BusOff);

        // Transmit events are ignored while bus-off
        assert_eq!(model.on_transmit_success(t0), None);
        assert_eq!(model.tx_errors(), 255);

        assert_eq!(model.poll_recovery(t0 + Duration::from_millis(1999)), None);
        assert_eq!(model.state(), BusState::BusOff);

        let transition = model.poll_recovery(t0 + Duration::from_secs(2));
        assert_eq!(
            transition,
            Some(StateTransition {
                from: BusState::BusOff,
                to: BusState::Normal
            })
        );
        assert_eq!(model.tx_errors(), 0);
        assert_eq!(model.rx_errors(), 0);
        assert_eq!(model.bus_off_since(), None);
        assert!(model.can_transmit());
    }

    #[test]
    fn test_bus_off_since_not_overwritten() {
        let mut model = ErrorCounterModel::default();
        let t0 = Instant::now();
        failures(&mut model, 32, t0);

        let later = t0 + Duration::from_millis(500);
        model.on_receive_failure(later);
        assert_eq!(model.bus_off_since(), Some(t0));
    }

    #[test]
    fn test_deterministic_trajectory() {
        let t0 = Instant::now();
        let run = || {
            let mut model = ErrorCounterModel::default();
            for i in 0..100u64 {
                let now = t0 + Duration::from_millis(i * 100);
                match i % 5 {
                    0 | 1 | 2 => model.on_transmit_failure(now),
                    3 => model.on_receive_failure(now),
                    _ => model.on_transmit_success(now),
                };
                model.poll_recovery(now);
            }
            (model.tx_errors(), model.rx_errors(), model.state())
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn test_configurable_warning_limit() {
        let thresholds = ErrorThresholds {
            warning_limit: 100,
            ..Default::default()
        };
        assert_eq!(thresholds.classify(100, 0), BusState::Warning);
        assert_eq!(thresholds.classify(99, 99), BusState::Normal);
        assert_eq!(thresholds.classify(255, 0), BusState::BusOff);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(ErrorThresholds::default().validate().is_ok());

        let inverted = ErrorThresholds {
            warning_limit: 255,
            bus_off_limit: 127,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let unreachable = ErrorThresholds {
            tx_max: 200,
            ..Default::default()
        };
        assert!(unreachable.validate().is_err());
    }

    #[rstest]
    #[case::tx_above_range(1000, 127, 1000)]
    #[case::tx_just_above_range(256, 127, 256)]
    #[case::rx_above_range(255, 128, 255)]
    fn test_counter_caps_outside_range_rejected(
        #[case] tx_max: u16,
        #[case] rx_max: u16,
        #[case] bus_off_limit: u16,
    ) {
        let thresholds = ErrorThresholds {
            tx_max,
            rx_max,
            bus_off_limit,
            ..Default::default()
        };
        assert!(matches!(
            thresholds.validate(),
            Err(CoreError::InvalidThresholds(_))
        ));
    }

    #[rstest]
    #[case::full_range(255, 127)]
    #[case::narrower(200, 100)]
    fn test_counter_caps_inside_range_accepted(#[case] tx_max: u16, #[case] rx_max: u16) {
        let thresholds = ErrorThresholds {
            tx_max,
            rx_max,
            bus_off_limit: tx_max,
            warning_limit: 100,
            ..Default::default()
        };
        assert!(thresholds.validate().is_ok());
    }

    #[test]
    fn test_thresholds_partial_deserialize() {
        let thresholds: ErrorThresholds =
            serde_json::from_str(r#"{ "warning_limit": 100 }"#).unwrap();
        assert_eq!(thresholds.warning_limit, 100);
        assert_eq!(thresholds.bus_off_limit, 255);
        assert_eq!(thresholds.recovery_interval(), Duration::from_secs(2));
    }
}
