//! Fixed-capacity append-only history.
//!
//! Every per-worker series in fleetwatch (health checks, metric entries,
//! cost entries, monitor snapshots) is a `BoundedHistory`: once full, each
//! push evicts the oldest entry.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Anything carrying the time it was recorded.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

/// FIFO buffer that never grows past its capacity.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// Create an empty history. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append an entry, returning the evicted oldest entry if full.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest-first iteration.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl DoubleEndedIterator<Item = &T> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }
}

impl<T: Clone> BoundedHistory<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }

    /// The last `n` entries, cloned, oldest first.
    pub fn recent_vec(&self, n: usize) -> Vec<T> {
        self.recent(n).cloned().collect()
    }
}

impl<T: Timestamped + Clone> BoundedHistory<T> {
    /// Entries with `timestamp >= cutoff`, oldest first.
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<T> {
        self.entries
            .iter()
            .filter(|e| e.timestamp() >= cutoff)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[derive(Debug, Clone, PartialEq)]
    struct Stamp(DateTime<Utc>);

    impl Timestamped for Stamp {
        fn timestamp(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn push_under_capacity_keeps_everything() {
        let mut h = BoundedHistory::new(3);
        assert_eq!(h.push(1), None);
        assert_eq!(h.push(2), None);
        assert_eq!(h.len(), 2);
        assert_eq!(h.latest(), Some(&2));
    }

    #[test]
    fn evicts_oldest_first() {
        let mut h = BoundedHistory::new(3);
        for i in 0..3 {
            h.push(i);
        }
        assert_eq!(h.push(3), Some(0));
        assert_eq!(h.push(4), Some(1));
        assert_eq!(h.to_vec(), vec![2, 3, 4]);
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut h = BoundedHistory::new(1000);
        for i in 0..5000 {
            h.push(i);
            assert!(h.len() <= 1000);
        }
        assert_eq!(h.len(), 1000);
        assert_eq!(h.iter().next(), Some(&4000));
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut h = BoundedHistory::new(0);
        h.push("a");
        h.push("b");
        assert_eq!(h.capacity(), 1);
        assert_eq!(h.to_vec(), vec!["b"]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut h = BoundedHistory::new(10);
        for i in 0..6 {
            h.push(i);
        }
        assert_eq!(h.recent_vec(3), vec![3, 4, 5]);
        assert_eq!(h.recent_vec(20), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn since_filters_inclusive_cutoff() {
        let base = Utc::now();
        let mut h = BoundedHistory::new(10);
        h.push(Stamp(base - TimeDelta::minutes(90)));
        h.push(Stamp(base - TimeDelta::minutes(60)));
        h.push(Stamp(base - TimeDelta::minutes(5)));

        let cutoff = base - TimeDelta::minutes(60);
        let kept = h.since(cutoff);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].0, cutoff);
    }
}
