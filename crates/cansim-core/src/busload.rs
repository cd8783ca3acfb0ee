//! Bus load accounting
//!
//! Frame size is approximated without bit stuffing: 47 overhead bits for a
//! standard frame (SOF, ID, control, CRC, ACK, EOF, IFS), 67 for extended,
//! plus eight bits per payload byte.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::frame::Frame;

/// Default nominal bitrate (500 kbit/s)
pub const DEFAULT_BITRATE: u32 = 500_000;

const STANDARD_OVERHEAD_BITS: u32 = 47;
const EXTENDED_OVERHEAD_BITS: u32 = 67;

/// Approximate on-wire size of a frame in bits
pub fn frame_bits(frame: &Frame) -> u32 {
    let overhead = if frame.extended {
        EXTENDED_OVERHEAD_BITS
    } else {
        STANDARD_OVERHEAD_BITS
    };
    overhead + 8 * frame.dlc as u32
}

/// Sliding-window bus load meter
///
/// Owned by a single observer; it only reads frames and never feeds back
/// into the nodes.
#[derive(Debug)]
pub struct BusLoadMeter {
    bitrate: u32,
    window: Duration,
    samples: VecDeque<(Instant, u32)>,
    window_bits: u64,
    total_bits: u64,
    total_frames: u64,
}

impl BusLoadMeter {
    /// Meter with a one-second window
    pub fn new(bitrate: u32) -> Self {
        Self::with_window(bitrate, Duration::from_secs(1))
    }

    pub fn with_window(bitrate: u32, window: Duration) -> Self {
        Self {
            bitrate: bitrate.max(1),
            window,
            samples: VecDeque::new(),
            window_bits: 0,
            total_bits: 0,
            total_frames: 0,
        }
    }

    /// Account for one observed frame
    pub fn record(&mut self, now: Instant, frame: &Frame) {
        let bits = frame_bits(frame);
        self.samples.push_back((now, bits));
        self.window_bits += bits as u64;
        self.total_bits += bits as u64;
        self.total_frames += 1;
        self.expire(now);
    }

    /// Load over the current window as a percentage of the bitrate
    pub fn load_percent(&mut self, now: Instant) -> f64 {
        self.expire(now);
        let capacity = self.bitrate as f64 * self.window.as_secs_f64();
        if capacity <= 0.0 {
            return 0.0;
        }
        self.window_bits as f64 / capacity * 100.0
    }

    pub fn total_bits(&self) -> u64 {
        self.total_bits
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&(at, bits)) = self.samples.front() {
            if now.saturating_duration_since(at) < self.window {
                break;
            }
            self.samples.pop_front();
            self.window_bits -= bits as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bits() {
        let standard = Frame::new(0x100, &[0; 8]).unwrap();
        assert_eq!(frame_bits(&standard), 111);

        let empty = Frame::new(0x100, &[]).unwrap();
        assert_eq!(frame_bits(&empty), 47);

        let extended = Frame::new(0x18DAF100, &[0; 2]).unwrap();
        assert_eq!(frame_bits(&extended), 83);
    }

    #[test]
    fn test_load_over_window() {
        let mut meter = BusLoadMeter::new(1_000);
        let t0 = Instant::now();
        let frame = Frame::new(0x100, &[0; 8]).unwrap();

        meter.record(t0, &frame);
        meter.record(t0 + Duration::from_millis(500), &frame);

        // 222 bits in a 1000 bit/s window
        let load = meter.load_percent(t0 + Duration::from_millis(600));
        assert!((load - 22.2).abs() < 1e-9);

        // First frame ages out
        let load = meter.load_percent(t0 + Duration::from_millis(1200));
        assert!((load - 11.1).abs() < 1e-9);

        assert_eq!(meter.total_frames(), 2);
        assert_eq!(meter.total_bits(), 222);
    }

    #[test]
    fn test_idle_bus_is_zero() {
        let mut meter = BusLoadMeter::new(DEFAULT_BITRATE);
        assert_eq!(meter.load_percent(Instant::now()), 0.0);
    }
}
