//! Streaming latency quantiles
//!
//! A thin wrapper over a DDSketch. Bucket counts are plain counters, so the
//! sketch does not depend on insertion order. Quantiles use nearest rank:
//! the `q` quantile of `n` observations is the `ceil(q * n)`-th smallest,
//! which makes p99 of a handful of calls the slowest one.

use sketches_ddsketch::{Config, DDSketch, DDSketchError};
use std::fmt;

/// Values below this (milliseconds) are counted as zero
const MIN_INDEXABLE_MS: f64 = 0.001;

/// Default relative accuracy (1%)
pub const DEFAULT_RELATIVE_ACCURACY: f64 = 0.01;

/// Default bucket budget
pub const DEFAULT_MAX_BUCKETS: usize = 2048;

/// Quantiles compared when checking two sketches for equality
const COMPARED_QUANTILES: [f64; 7] = [0.1, 0.25, 0.5, 0.75, 0.9, 0.95, 0.99];

/// Bounded-memory quantile estimator over latencies in milliseconds
#[derive(Clone)]
pub struct LatencySketch {
    inner: DDSketch,
}

impl Default for LatencySketch {
    fn default() -> Self {
        Self::new(DEFAULT_RELATIVE_ACCURACY, DEFAULT_MAX_BUCKETS)
    }
}

impl LatencySketch {
    /// Create a sketch. `relative_accuracy` must be in (0, 1).
    pub fn new(relative_accuracy: f64, max_buckets: usize) -> Self {
        let alpha = relative_accuracy.clamp(1e-6, 0.5);
        let bins = u32::try_from(max_buckets.max(1)).unwrap_or(u32::MAX);
        Self {
            inner: DDSketch::new(Config::new(alpha, bins, MIN_INDEXABLE_MS)),
        }
    }

    /// Record one latency observation. Negative and non-finite values count as 0.
    pub fn insert(&mut self, value_ms: f64) {
        let value = if value_ms.is_finite() {
            value_ms.max(0.0)
        } else {
            0.0
        };
        self.inner.add(value);
    }

    /// Fold another sketch built with the same parameters into this one
    pub fn merge(&mut self, other: &LatencySketch) -> Result<(), DDSketchError> {
        self.inner.merge(&other.inner)
    }

    /// Number of observations
    pub fn count(&self) -> u64 {
        self.inner.count() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn min(&self) -> Option<f64> {
        self.inner.min()
    }

    pub fn max(&self) -> Option<f64> {
        self.inner.max()
    }

    /// Estimate the `q` quantile (0.0..=1.0); None when empty
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let n = self.count();
        if n == 0 {
            return None;
        }

        let rank = ((q.clamp(0.0, 1.0) * n as f64).ceil() as u64).clamp(1, n);
        if rank == n {
            return self.inner.max();
        }
        if rank == 1 {
            return self.inner.min();
        }

        // The sketch resolves `floor(q' * (n - 1))` as a zero-based rank;
        // aim halfway into the wanted slot so rounding cannot slip a bucket.
        let target = (rank as f64 - 0.5) / (n - 1) as f64;
        self.inner.quantile(target).ok().flatten()
    }
}

impl PartialEq for LatencySketch {
    fn eq(&self, other: &Self) -> bool {
        self.count() == other.count()
            && self.min() == other.min()
            && self.max() == other.max()
            && COMPARED_QUANTILES
                .iter()
                .all(|q| self.quantile(*q) == other.quantile(*q))
    }
}

impl fmt::Debug for LatencySketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencySketch")
            .field("count", &self.count())
            .field("min", &self.min())
            .field("max", &self.max())
            .field("p50", &self.quantile(0.5))
            .field("p99", &self.quantile(0.99))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn within(actual: f64, expected: f64, alpha: f64) -> bool {
        (actual - expected).abs() <= alpha * expected + 1e-9
    }

    #[test]
    fn test_empty_sketch() {
        let sketch = LatencySketch::default();
        assert!(sketch.is_empty());
        assert_eq!(sketch.quantile(0.95), None);
    }

    #[test]
    fn test_quantiles_within_relative_accuracy() {
        let mut sketch = LatencySketch::default();
        for v in 1..=1000 {
            sketch.insert(v as f64);
        }

        assert_eq!(sketch.count(), 1000);
        assert!(within(sketch.quantile(0.95).unwrap(), 950.0, 0.01));
        assert!(within(sketch.quantile(0.99).unwrap(), 990.0, 0.01));
        assert!(within(sketch.quantile(0.5).unwrap(), 500.0, 0.01));
    }

    #[test]
    fn test_small_sample_high_quantiles_reach_slowest_call() {
        let mut sketch = LatencySketch::default();
        for v in [10.0, 20.0, 30.0] {
            sketch.insert(v);
        }

        assert!(within(sketch.quantile(0.95).unwrap(), 30.0, 0.01));
        assert!(within(sketch.quantile(0.99).unwrap(), 30.0, 0.01));
        assert!(within(sketch.quantile(0.5).unwrap(), 20.0, 0.01));
        assert!(within(sketch.quantile(0.0).unwrap(), 10.0, 0.01));

        let mut single = LatencySketch::default();
        single.insert(42.0);
        assert!(within(single.quantile(0.5).unwrap(), 42.0, 0.01));
        assert!(within(single.quantile(0.99).unwrap(), 42.0, 0.01));
    }

    #[test]
    fn test_outlier_does_not_drag_p95() {
        let mut sketch = LatencySketch::default();
        for _ in 0..99 {
            sketch.insert(10.0);
        }
        sketch.insert(60_000.0);

        assert!(within(sketch.quantile(0.95).unwrap(), 10.0, 0.01));
        assert!(within(sketch.quantile(1.0).unwrap(), 60_000.0, 0.01));
    }

    #[test]
    fn test_zero_and_negative_latencies() {
        let mut sketch = LatencySketch::default();
        sketch.insert(0.0);
        sketch.insert(-5.0);
        sketch.insert(f64::NAN);
        assert_eq!(sketch.count(), 3);
        assert_eq!(sketch.quantile(0.99), Some(0.0));
    }

    #[test]
    fn test_insertion_order_independent() {
        let values = [5.0, 120.0, 0.0, 33.3, 7.25, 9000.0, 14.0];
        let mut forward = LatencySketch::default();
        let mut backward = LatencySketch::default();
        for v in values {
            forward.insert(v);
        }
        for v in values.iter().rev() {
            backward.insert(*v);
        }
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_small_bucket_budget_keeps_high_quantiles() {
        let mut sketch = LatencySketch::new(0.01, 16);
        for i in 0..2000 {
            sketch.insert(1.0 + i as f64 * 3.0);
        }
        assert_eq!(sketch.count(), 2000);
        assert!(within(sketch.quantile(1.0).unwrap(), 5998.0, 0.01));
        assert!(within(sketch.quantile(0.999).unwrap(), 5992.0, 0.01));
    }

    #[test]
    fn test_merge_matches_single_stream() {
        let mut a = LatencySketch::default();
        let mut b = LatencySketch::default();
        let mut all = LatencySketch::default();
        for v in 1..=50 {
            a.insert(v as f64);
            all.insert(v as f64);
        }
        for v in 51..=100 {
            b.insert(v as f64);
            all.insert(v as f64);
        }
        a.merge(&b).unwrap();
        assert_eq!(a, all);
    }
}
