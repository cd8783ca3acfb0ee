//! Telemetry sample sources

use std::collections::{HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// One set of physical values, keyed by signal name
pub type Sample = HashMap<String, f64>;

/// Supplies the physical values a node transmits on each tick
pub trait SampleSource: Send {
    fn sample(&mut self) -> Sample;
}

/// Uniform range for one signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRange {
    pub signal: String,
    pub min: f64,
    pub max: f64,
}

impl SignalRange {
    pub fn new(signal: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            signal: signal.into(),
            min,
            max,
        }
    }

    /// Both bounds finite and ordered
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Draws every signal uniformly from its configured range
pub struct RandomSampler {
    ranges: Vec<SignalRange>,
    rng: StdRng,
}

impl RandomSampler {
    /// A fixed seed makes the sequence reproducible
    pub fn new(ranges: Vec<SignalRange>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { ranges, rng }
    }
}

impl SampleSource for RandomSampler {
    fn sample(&mut self) -> Sample {
        self.ranges
            .iter()
            .map(|range| {
                let value = if range.min < range.max {
                    self.rng.gen_range(range.min..=range.max)
                } else {
                    range.min
                };
                (range.signal.clone(), value)
            })
            .collect()
    }
}

/// Replays a fixed list of samples, then repeats the last one
#[derive(Debug, Default)]
pub struct ScriptedSampler {
    queue: VecDeque<Sample>,
    last: Sample,
}

impl ScriptedSampler {
    pub fn new(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            queue: samples.into_iter().collect(),
            last: Sample::new(),
        }
    }

    /// Samples not yet handed out
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl SampleSource for ScriptedSampler {
    fn sample(&mut self) -> Sample {
        if let Some(next) = self.queue.pop_front() {
            self.last = next;
        }
        self.last.clone()
    }
}

/// Build a sample from `(name, value)` pairs
pub fn sample_of<'a>(values: impl IntoIterator<Item = (&'a str, f64)>) -> Sample {
    values
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
