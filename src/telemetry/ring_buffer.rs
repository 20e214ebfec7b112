//! Fixed-capacity sample storage for a watched variable
//!
//! [`SampleRingBuffer`] enforces its own capacity: every insertion that would
//! exceed it evicts from the front, so no caller can grow the buffer past
//! `capacity`. Timestamps are kept in non-decreasing order; a sample older
//! than the newest stored one is rejected and counted.
//!
//! Running statistics are maintained incrementally with O(1) updates. After
//! evictions, min/max can drift (an evicted sample may have been the extreme),
//! so they are recalculated exactly every [`STATS_RECALC_INTERVAL`] evictions
//! and on demand via [`SampleRingBuffer::recalculate_statistics`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How often to recalculate exact min/max (every N evictions)
pub const STATS_RECALC_INTERVAL: u32 = 1000;

/// A single timestamped value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Milliseconds on the target's telemetry clock
    #[serde(rename = "timestamp")]
    pub timestamp_ms: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp_ms: f64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value,
        }
    }
}

/// Incremental statistics tracker
#[derive(Debug, Clone)]
pub struct IncrementalStats {
    /// Current count of values
    pub count: u64,
    /// Running sum for average calculation
    pub sum: f64,
    /// Current minimum value
    pub min: f64,
    /// Current maximum value
    pub max: f64,
}

impl Default for IncrementalStats {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalStats {
    /// Create a new empty stats tracker
    pub fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::MAX,
            max: f64::MIN,
        }
    }

    /// Add a new value to the statistics
    #[inline]
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Remove a value from the statistics (when evicting from the buffer)
    ///
    /// min/max become approximate until the next recalculation.
    #[inline]
    pub fn pop(&mut self, value: f64) {
        if self.count > 0 {
            self.count -= 1;
            self.sum -= value;
        }
    }

    /// Get the current average
    #[inline]
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Get statistics as (min, max, avg) tuple
    #[inline]
    pub fn as_tuple(&self) -> (f64, f64, f64) {
        if self.count == 0 {
            (0.0, 0.0, 0.0)
        } else {
            (self.min, self.max, self.average())
        }
    }

    /// Reset the statistics
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn recalculate_minmax<'a>(&mut self, values: impl Iterator<Item = &'a Sample>) {
        self.min = f64::MAX;
        self.max = f64::MIN;
        for s in values {
            self.min = self.min.min(s.value);
            self.max = self.max.max(s.value);
        }
    }
}

/// Bounded FIFO of samples in timestamp order
#[derive(Debug, Clone)]
pub struct SampleRingBuffer {
    capacity: usize,
    samples: VecDeque<Sample>,
    stats: IncrementalStats,
    evicted: u64,
    rejected: u64,
    recalc_counter: u32,
}

impl SampleRingBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            // Large buffers grow on demand instead of reserving up front
            samples: VecDeque::with_capacity(capacity.min(4096)),
            stats: IncrementalStats::new(),
            evicted: 0,
            rejected: 0,
            recalc_counter: 0,
        }
    }

    /// Append a sample, evicting the oldest ones if the buffer is full
    ///
    /// Returns `false` (and stores nothing) if the sample is older than the
    /// newest stored sample or its timestamp is not a finite number.
    pub fn push(&mut self, sample: Sample) -> bool {
        if !sample.timestamp_ms.is_finite() {
            self.rejected += 1;
            return false;
        }
        if let Some(last) = self.samples.back() {
            if sample.timestamp_ms < last.timestamp_ms {
                self.rejected += 1;
                return false;
            }
        }

        self.samples.push_back(sample);
        self.stats.push(sample.value);

        while self.samples.len() > self.capacity {
            if let Some(old) = self.samples.pop_front() {
                self.stats.pop(old.value);
                self.evicted += 1;
                self.recalc_counter += 1;
            }
        }

        if self.recalc_counter >= STATS_RECALC_INTERVAL {
            self.recalc_counter = 0;
            self.stats.recalculate_minmax(self.samples.iter());
        }
        true
    }

    /// Maximum number of samples retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Iterate samples oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample> + ExactSizeIterator {
        self.samples.iter()
    }

    /// Copy of the stored samples, oldest first
    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.front()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Samples whose timestamp lies in `[start, end]`
    pub fn range(&self, start: f64, end: f64) -> impl Iterator<Item = &Sample> {
        // Timestamps are sorted, so binary search the left edge
        let from = self.samples.partition_point(|s| s.timestamp_ms < start);
        self.samples
            .range(from..)
            .take_while(move |s| s.timestamp_ms <= end)
    }

    /// Timestamp span of the stored samples
    pub fn time_range(&self) -> Option<(f64, f64)> {
        Some((self.first()?.timestamp_ms, self.last()?.timestamp_ms))
    }

    /// Statistics: (min, max, average) over the retained samples
    #[inline]
    pub fn statistics(&self) -> (f64, f64, f64) {
        self.stats.as_tuple()
    }

    /// Force recalculation of exact statistics from all retained samples
    pub fn recalculate_statistics(&mut self) -> (f64, f64, f64) {
        self.stats.reset();
        for s in &self.samples {
            self.stats.push(s.value);
        }
        self.recalc_counter = 0;
        self.stats.as_tuple()
    }

    /// Number of samples evicted since creation or the last clear
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Number of out-of-order or invalid samples rejected
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Remove all samples and reset statistics and counters
    pub fn clear(&mut self) {
        self.samples.clear();
        self.stats.reset();
        self.evicted = 0;
        self.rejected = 0;
        self.recalc_counter = 0;
    }

    /// Change the capacity, keeping the newest samples that still fit
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            if let Some(old) = self.samples.pop_front() {
                self.stats.pop(old.value);
                self.evicted += 1;
            }
        }
        self.recalculate_statistics();
    }
}
