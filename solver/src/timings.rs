//! Per-phase wall clock measurements.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use gauss_types::PhaseStats;

pub const DISTRIBUTION: &str = "distribution";
pub const PIVOT_SEARCH: &str = "pivot_search";
pub const ELIMINATION: &str = "elimination";
pub const BACK_SUBSTITUTION: &str = "back_substitution";

#[derive(Debug, Clone, Default)]
pub struct Timings {
    samples: BTreeMap<String, Vec<f64>>,
}

impl Timings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, phase: &str, elapsed: Duration) {
        self.samples
            .entry(phase.to_string())
            .or_default()
            .push(elapsed.as_secs_f64() * 1000.0);
    }

    /// Records the time elapsed since `started`.
    pub fn record_since(&mut self, phase: &str, started: Instant) {
        self.record(phase, started.elapsed());
    }

    pub fn total_ms(&self, phase: &str) -> f64 {
        self.samples.get(phase).map_or(0.0, |s| s.iter().sum())
    }

    pub fn stats(&self) -> BTreeMap<String, PhaseStats> {
        self.samples
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(phase, s)| {
                let total: f64 = s.iter().sum();
                let stats = PhaseStats {
                    count: s.len(),
                    total_ms: total,
                    min_ms: s.iter().copied().fold(f64::INFINITY, f64::min),
                    max_ms: s.iter().copied().fold(0.0, f64::max),
                    average_ms: total / s.len() as f64,
                };
                (phase.clone(), stats)
            })
            .collect()
    }
}
