//! Fixed-bucket latency histogram used for report percentiles.

use std::time::Duration;

/// Bucket boundaries in microseconds: 10us up to 5s.
const LATENCY_BUCKETS_US: [u64; 14] = [
    10, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000,
    5_000_000,
];

/// Latency histogram with approximate percentiles.
///
/// Each observation lands in the first bucket whose boundary it does not
/// exceed; values above the last boundary are counted in the last bucket.
#[derive(Debug, Clone)]
pub struct Histogram {
    counts: [u64; LATENCY_BUCKETS_US.len()],
    count: u64,
    max_us: u64,
}

impl Histogram {
    pub fn latency() -> Self {
        Self {
            counts: [0; LATENCY_BUCKETS_US.len()],
            count: 0,
            max_us: 0,
        }
    }

    pub fn observe(&mut self, value: Duration) {
        let value_us = u64::try_from(value.as_micros()).unwrap_or(u64::MAX);
        self.count += 1;
        self.max_us = self.max_us.max(value_us);

        let slot = LATENCY_BUCKETS_US
            .iter()
            .position(|&boundary| value_us <= boundary)
            .unwrap_or(LATENCY_BUCKETS_US.len() - 1);
        self.counts[slot] += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Approximate percentile (e.g. 0.50 for P50).
    ///
    /// Returns the upper boundary of the bucket holding the target rank,
    /// capped at the largest observed value.
    pub fn percentile(&self, p: f64) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }

        let target = ((self.count as f64 * p).ceil() as u64).max(1);
        let mut cumulative = 0u64;
        for (slot, count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let bound = LATENCY_BUCKETS_US[slot].min(self.max_us);
                return Duration::from_micros(bound);
            }
        }
        Duration::from_micros(self.max_us)
    }

    pub fn p50(&self) -> Duration {
        self.percentile(0.50)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(0.99)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::latency()
    }
}
