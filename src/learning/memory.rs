//! Bounded experience memory
//!
//! Holds at most `capacity` [`Experience`]s. On overflow the entry with the
//! lowest `performance_metric` is evicted, the oldest one among equals. The
//! store is a min-heap keyed on `(performance_metric, sequence)`, so eviction
//! is `O(log K)`.

use crate::error::EngineError;
use crate::types::SignalSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// One tick's learning record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub input_summary: SignalSummary,
    pub output_summary: SignalSummary,
    /// In [0, 1]
    pub performance_metric: f64,
    pub timestamp: DateTime<Utc>,
    /// Insertion counter assigned by the memory; breaks ties by age
    #[serde(default)]
    pub sequence: u64,
}

impl Experience {
    pub fn new(
        input_summary: SignalSummary,
        output_summary: SignalSummary,
        performance_metric: f64,
    ) -> Self {
        Self {
            input_summary,
            output_summary,
            performance_metric,
            timestamp: Utc::now(),
            sequence: 0,
        }
    }
}

/// Heap entry ordered by performance, then age
#[derive(Debug, Clone)]
struct Ranked(Experience);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .performance_metric
            .total_cmp(&other.0.performance_metric)
            .then(self.0.sequence.cmp(&other.0.sequence))
    }
}

#[derive(Debug, Clone)]
pub struct ExperienceMemory {
    heap: BinaryHeap<Reverse<Ranked>>,
    capacity: usize,
    next_sequence: u64,
}

impl ExperienceMemory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            heap: BinaryHeap::with_capacity(capacity + 1),
            capacity,
            next_sequence: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store an experience, returning the evicted entry if the memory was full.
    ///
    /// The performance metric is clamped into [0, 1] (NaN becomes 0) and the
    /// sequence number is assigned here.
    pub fn adapt(&mut self, mut experience: Experience) -> Option<Experience> {
        experience.performance_metric = if experience.performance_metric.is_nan() {
            0.0
        } else {
            experience.performance_metric.clamp(0.0, 1.0)
        };
        experience.sequence = self.next_sequence;
        self.next_sequence += 1;

        self.heap.push(Reverse(Ranked(experience)));
        let evicted = if self.heap.len() > self.capacity {
            self.heap.pop().map(|Reverse(Ranked(e))| e)
        } else {
            None
        };
        self.enforce_capacity();
        evicted
    }

    /// Top `n` by performance, newest first among equals
    pub fn get_best_experiences(&self, n: usize) -> Vec<Experience> {
        let mut all: Vec<&Experience> = self.heap.iter().map(|Reverse(Ranked(e))| e).collect();
        all.sort_by(|a, b| {
            b.performance_metric
                .total_cmp(&a.performance_metric)
                .then(b.sequence.cmp(&a.sequence))
        });
        all.into_iter().take(n).cloned().collect()
    }

    /// Next entry to be evicted
    pub fn worst(&self) -> Option<&Experience> {
        self.heap.peek().map(|Reverse(Ranked(e))| e)
    }

    /// All entries, oldest first
    pub fn snapshot(&self) -> Vec<Experience> {
        let mut all: Vec<Experience> = self
            .heap
            .iter()
            .map(|Reverse(Ranked(e))| e.clone())
            .collect();
        all.sort_by_key(|e| e.sequence);
        all
    }

    /// Replace the contents with `entries`, keeping their sequence numbers.
    /// Overflow is evicted with the usual policy.
    pub fn restore(&mut self, entries: Vec<Experience>) {
        self.heap.clear();
        self.next_sequence = entries.iter().map(|e| e.sequence + 1).max().unwrap_or(0);
        for e in entries {
            self.heap.push(Reverse(Ranked(e)));
            if self.heap.len() > self.capacity {
                self.heap.pop();
            }
        }
        self.enforce_capacity();
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Fatal in debug builds; truncates with an error log in release.
    fn enforce_capacity(&mut self) {
        if self.heap.len() <= self.capacity {
            return;
        }
        let err = EngineError::CapacityInvariantViolation {
            len: self.heap.len(),
            capacity: self.capacity,
        };
        if cfg!(debug_assertions) {
            panic!("{}", err);
        }
        tracing::error!("{}, truncating", err);
        while self.heap.len() > self.capacity {
            self.heap.pop();
        }
    }
}
