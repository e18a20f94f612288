//! Query-range windowing.
//!
//! Classifies fetch-query ranges into eight time buckets and tracks, per
//! query key, which buckets that key has been fetched with. The spread
//! report answers "how many distinct window sizes does each key use".

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Upper bounds (inclusive, seconds) of buckets 1 through 7.
const BUCKET_BOUNDS: [f64; 7] = [600.0, 3600.0, 7200.0, 21600.0, 43200.0, 86400.0, 259200.0];

/// Number of the bucket `t` falls into, 1..=8.
///
/// Bucket 1 is `0 <= t <= 600`; each later bucket is a half-open interval
/// closed at its upper bound. Anything beyond 259200, or negative, is 8.
pub fn bucket(t: f64) -> u8 {
    if t < 0.0 {
        return 8;
    }
    BUCKET_BOUNDS
        .iter()
        .position(|&upper| t <= upper)
        .map(|i| i as u8 + 1)
        .unwrap_or(8)
}

/// Tally occurrences of each value.
pub fn count<T, I>(values: I) -> BTreeMap<T, usize>
where
    T: Ord,
    I: IntoIterator<Item = T>,
{
    let mut cnt = BTreeMap::new();
    for v in values {
        *cnt.entry(v).or_insert(0) += 1;
    }
    cnt
}

/// Per-key bucket sets plus every range observed, in order.
#[derive(Debug, Default)]
pub struct WindowTracker {
    ranges: Vec<f64>,
    windows: HashMap<String, BTreeSet<u8>>,
}

impl WindowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: &str, range: f64) {
        self.ranges.push(range);
        self.windows
            .entry(key.to_string())
            .or_default()
            .insert(bucket(range));
    }

    pub fn ranges(&self) -> &[f64] {
        &self.ranges
    }

    /// Distinct keys seen.
    pub fn keys(&self) -> usize {
        self.windows.len()
    }

    pub fn mean_range(&self) -> Option<f64> {
        if self.ranges.is_empty() {
            None
        } else {
            Some(self.ranges.iter().sum::<f64>() / self.ranges.len() as f64)
        }
    }

    /// Map of "number of distinct buckets" to "number of keys with that many".
    pub fn bucket_spread(&self) -> BTreeMap<usize, usize> {
        count(self.windows.values().map(|set| set.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_boundaries() {
        assert_eq!(bucket(0.0), 1);
        assert_eq!(bucket(600.0), 1);
        assert_eq!(bucket(601.0), 2);
        assert_eq!(bucket(3600.0), 2);
        assert_eq!(bucket(3600.5), 3);
        assert_eq!(bucket(7200.0), 3);
        assert_eq!(bucket(21600.0), 4);
        assert_eq!(bucket(43200.0), 5);
        assert_eq!(bucket(86400.0), 6);
        assert_eq!(bucket(259200.0), 7);
        assert_eq!(bucket(259201.0), 8);
    }

    #[test]
    fn bucket_negative_and_nan_fall_through() {
        assert_eq!(bucket(-1.0), 8);
        assert_eq!(bucket(f64::NAN), 8);
    }

    #[test]
    fn count_tallies() {
        let c = count(vec!["a", "b", "a", "c", "a"]);
        assert_eq!(c.get("a"), Some(&3));
        assert_eq!(c.get("b"), Some(&1));
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn count_empty() {
        assert!(count(Vec::<u8>::new()).is_empty());
    }

    #[test]
    fn tracker_dedups_buckets_per_key() {
        let mut w = WindowTracker::new();
        w.record("cpu", 300.0);
        w.record("cpu", 500.0);
        w.record("cpu", 3600.0);
        w.record("mem", 86400.0);
        assert_eq!(w.keys(), 2);
        assert_eq!(
            w.windows["cpu"].iter().copied().collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(w.ranges().len(), 4);
    }

    #[test]
    fn spread_counts_keys_per_set_size() {
        let mut w = WindowTracker::new();
        w.record("a", 10.0);
        w.record("a", 1000.0);
        w.record("b", 10.0);
        w.record("c", 10.0);
        w.record("c", 5000.0);
        w.record("c", 300000.0);
        w.record("d", 20.0);
        let spread = w.bucket_spread();
        assert_eq!(spread.get(&1), Some(&2)); // b, d
        assert_eq!(spread.get(&2), Some(&1)); // a
        assert_eq!(spread.get(&3), Some(&1)); // c
    }

    #[test]
    fn mean_range() {
        let mut w = WindowTracker::new();
        assert_eq!(w.mean_range(), None);
        w.record("k", 100.0);
        w.record("k", 300.0);
        assert_eq!(w.mean_range(), Some(200.0));
    }
}
