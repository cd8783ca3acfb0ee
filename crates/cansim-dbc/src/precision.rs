//! Floating point precision handling
//!
//! Avoids values like 13.200000000000001 by rounding decoded values to the
//! number of decimals implied by the signal's scale and offset.

use crate::definition::SignalDescriptor;

const MAX_DECIMALS: u8 = 6;

/// Decimal places needed to represent a factor exactly
///
/// # Examples
/// - 1.0 → 0
/// - 0.1 → 1
/// - 0.25 → 2
/// - -40.5 → 1
pub fn decimals(value: f64) -> u8 {
    if !value.is_finite() {
        return MAX_DECIMALS;
    }

    let mut temp = value.abs().fract();
    let mut precision = 0u8;

    while precision < MAX_DECIMALS {
        if (temp - temp.round()).abs() < 1e-9 {
            break;
        }
        temp *= 10.0;
        precision += 1;
    }

    precision
}

/// Round a value to the specified number of decimal places
pub fn round_to_precision(value: f64, precision: u8) -> f64 {
    if precision == 0 {
        value.round()
    } else {
        let factor = 10_f64.powi(precision as i32);
        (value * factor).round() / factor
    }
}

/// Round a decoded physical value for a signal
pub fn round_for_signal(value: f64, signal: &SignalDescriptor) -> f64 {
    let precision = decimals(signal.scale).max(decimals(signal.offset));
    round_to_precision(value, precision)
}
