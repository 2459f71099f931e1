//! Online nearest-value clustering
//!
//! Used to quantize ticks and durations of merged recordings: every observed
//! value either joins the nearest bucket (moving it by a running weighted
//! average) or starts a bucket of its own.

use std::collections::BTreeMap;

/// Sentinel buckets so floor/ceiling lookups always find a neighbour
const SENTINEL: i64 = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct Cluster {
    /// bucket value -> number of samples merged into it
    buckets: BTreeMap<i64, u64>,
}

impl Default for Cluster {
    fn default() -> Self {
        Self::new()
    }
}

impl Cluster {
    pub fn new() -> Self {
        let mut buckets = BTreeMap::new();
        buckets.insert(-SENTINEL, 1);
        buckets.insert(SENTINEL, 1);
        Self { buckets }
    }

    /// How far a value may sit from a bucket and still merge into it
    pub fn threshold(value: i64) -> i64 {
        match value.abs() {
            v if v < 50 => 10,
            v if v < 100 => 20,
            v if v < 300 => 40,
            _ => 50,
        }
    }

    /// Feed one observation
    pub fn train(&mut self, value: i64) {
        if let Some(samples) = self.buckets.get_mut(&value) {
            *samples += 1;
            return;
        }

        let closest = self.get(value);
        if closest.abs() != SENTINEL && (closest - value).abs() < Self::threshold(value) {
            let samples = self.buckets.remove(&closest).unwrap_or(1);
            let merged = (closest * samples as i64 + value) / (samples as i64 + 1);
            *self.buckets.entry(merged).or_insert(0) += samples + 1;
        } else {
            self.buckets.insert(value, 1);
        }
    }

    /// Nearest bucket value; ties go to the lower bucket
    pub fn get(&self, value: i64) -> i64 {
        let floor = self.buckets.range(..=value).next_back().map(|(k, _)| *k);
        let ceiling = self.buckets.range(value..).next().map(|(k, _)| *k);
        match (floor, ceiling) {
            (Some(f), Some(c)) => {
                if value - f <= c - value {
                    f
                } else {
                    c
                }
            }
            (Some(f), None) => f,
            (None, Some(c)) => c,
            (None, None) => value,
        }
    }

    /// Number of samples merged into `bucket`
    pub fn samples(&self, bucket: i64) -> u64 {
        self.buckets.get(&bucket).copied().unwrap_or(0)
    }

    /// Real (non-sentinel) bucket values in ascending order
    pub fn buckets(&self) -> Vec<i64> {
        self.buckets
            .keys()
            .copied()
            .filter(|k| k.abs() != SENTINEL)
            .collect()
    }
}
