use crate::{Decision, Verdict};
use std::collections::VecDeque;

/// Number of trailing latency samples kept for the rolling view.
pub const LATENCY_WINDOW: usize = 50;

const FAST_LATENCY_MS: u64 = 50;
const MODERATE_LATENCY_MS: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LatencyWindow {
    samples: VecDeque<u64>,
}

impl LatencyWindow {
    fn push(&mut self, latency_ms: u64) {
        self.samples.push_back(latency_ms);
        while self.samples.len() > LATENCY_WINDOW {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest sample first.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.samples.iter().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyBand {
    Fast,
    Moderate,
    Slow,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stats {
    pub allowed: u64,
    pub denied: u64,
    pub total_latency: u64,
    pub avg_latency: u64,
    /// `None` until the first decision arrives.
    pub min_latency: Option<u64>,
    pub max_latency: u64,
    pub latencies: LatencyWindow,
}

impl Stats {
    pub fn total(&self) -> u64 {
        self.allowed + self.denied
    }

    /// Returns the statistics after folding in `decision`. `self` is left untouched.
    pub fn with_decision(&self, decision: &Decision) -> Stats {
        let latency = decision.latency_ms;
        let mut next = self.clone();
        match decision.verdict {
            Verdict::Allow => next.allowed += 1,
            Verdict::Deny => next.denied += 1,
        }
        next.total_latency = self.total_latency.saturating_add(latency);
        next.avg_latency = rounded_mean(next.total_latency, next.total());
        next.min_latency = Some(match self.min_latency {
            Some(current) => current.min(latency),
            None => latency,
        });
        next.max_latency = self.max_latency.max(latency);
        next.latencies.push(latency);
        next
    }

    pub fn latency_band(&self) -> Option<LatencyBand> {
        if self.total() == 0 {
            return None;
        }
        Some(if self.avg_latency < FAST_LATENCY_MS {
            LatencyBand::Fast
        } else if self.avg_latency < MODERATE_LATENCY_MS {
            LatencyBand::Moderate
        } else {
            LatencyBand::Slow
        })
    }
}

// Half-up rounding of sum / count.
fn rounded_mean(sum: u64, count: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    let sum = u128::from(sum);
    let count = u128::from(count);
    ((2 * sum + count) / (2 * count)) as u64
}
