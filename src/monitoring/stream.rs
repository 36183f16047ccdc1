//! Bounded Metric Streams
//!
//! Ring buffers pruned by both a retention window and a hard count cap. Pruning
//! runs on every write and on every read, so a stream never reports samples
//! older than its retention even when nothing has been written for a while.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A record that knows when it was captured
pub trait Timestamped {
    /// Monotonic capture time used for retention pruning
    fn recorded_at(&self) -> Instant;
}

/// Time- and count-bounded buffer safe for concurrent appends
pub struct BoundedStream<T> {
    records: Mutex<VecDeque<T>>,
    max_len: usize,
    retention: Duration,
}

impl<T: Timestamped + Clone> BoundedStream<T> {
    /// Create a stream holding at most `max_len` records younger than `retention`
    pub fn new(max_len: usize, retention: Duration) -> Self {
        let max_len = max_len.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_len.min(1024))),
            max_len,
            retention,
        }
    }

    /// Append a record, pruning afterwards
    pub fn push(&self, record: T) {
        let mut records = self.records.lock();
        records.push_back(record);
        self.prune(&mut records, Instant::now());
    }

    /// Copy of all retained records, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        let mut records = self.records.lock();
        self.prune(&mut records, Instant::now());
        records.iter().cloned().collect()
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        let mut records = self.records.lock();
        self.prune(&mut records, Instant::now());
        records.len()
    }

    /// Check if the stream holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of retained records captured within `window` of now
    pub fn count_since(&self, window: Duration) -> usize {
        let now = Instant::now();
        let mut records = self.records.lock();
        self.prune(&mut records, now);
        records
            .iter()
            .rev()
            .take_while(|r| now.duration_since(r.recorded_at()) <= window)
            .count()
    }

    /// Drop every record
    pub fn clear(&self) {
        self.records.lock().clear();
    }

    /// Configured count cap
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Configured retention window
    pub fn retention(&self) -> Duration {
        self.retention
    }

    fn prune(&self, records: &mut VecDeque<T>, now: Instant) {
        while let Some(front) = records.front() {
            if now.duration_since(front.recorded_at()) > self.retention {
                records.pop_front();
            } else {
                break;
            }
        }
        while records.len() > self.max_len {
            records.pop_front();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
