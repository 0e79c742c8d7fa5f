use std::collections::VecDeque;
use std::ops::RangeInclusive;

/// One accelerometer reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    /// Epoch milliseconds
    pub timestamp_ms: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MotionSample {
    pub fn new(timestamp_ms: i64, x: f64, y: f64, z: f64) -> Self {
        Self { timestamp_ms, x, y, z }
    }
}

/// Fixed-capacity buffer keeping the most recent samples; oldest are overwritten
#[derive(Debug, Clone)]
pub struct RingBuffer {
    capacity: usize,
    samples: VecDeque<MotionSample>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: MotionSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Samples whose timestamp falls in `range`, oldest first
    pub fn samples_in_range(&self, range: RangeInclusive<i64>) -> Vec<MotionSample> {
        self.samples
            .iter()
            .filter(|s| range.contains(&s.timestamp_ms))
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
