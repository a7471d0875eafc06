/// Batching of decoded readings and trimmed-mean smoothing
use thiserror::Error;

use crate::config::MIN_SAMPLE_COUNT;
use crate::models::Reading;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchError {
    #[error("batch capacity must be at least 3, got {0}")]
    Capacity(usize),

    #[error("batch is full")]
    Full(Reading),
}

/// Fixed-capacity collection of successful reads.
///
/// Storage is allocated once at construction and reused across cycles.
#[derive(Debug, Clone)]
pub struct Batch {
    readings: Vec<Reading>,
    capacity: usize,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Result<Self, BatchError> {
        if capacity < MIN_SAMPLE_COUNT {
            return Err(BatchError::Capacity(capacity));
        }
        Ok(Self {
            readings: Vec::with_capacity(capacity),
            capacity,
        })
    }

    /// Append a reading. A full batch hands the reading back.
    pub fn push(&mut self, reading: Reading) -> Result<(), BatchError> {
        if self.is_full() {
            return Err(BatchError::Full(reading));
        }
        self.readings.push(reading);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.readings.len() == self.capacity
    }

    /// Aggregate and empty the batch once it is full.
    ///
    /// A partially filled batch is left untouched and yields `None`.
    pub fn take_aggregate(&mut self) -> Option<Reading> {
        if !self.is_full() {
            return None;
        }
        let mean = aggregate(&self.readings);
        self.readings.clear();
        mean
    }
}

/// Smooth a set of readings into one.
///
/// Each channel is sorted independently, its minimum and maximum are
/// dropped, and the remaining values are averaged. This rejects a single
/// transient spike per channel. Returns `None` for fewer than three readings.
pub fn aggregate(readings: &[Reading]) -> Option<Reading> {
    if readings.len() < MIN_SAMPLE_COUNT {
        return None;
    }

    let temperature = trimmed_mean(readings.iter().map(|r| r.temperature).collect());
    let humidity = trimmed_mean(readings.iter().map(|r| r.humidity).collect());

    Some(Reading::new(temperature, humidity))
}

/// Mean of `values` without its smallest and largest element.
fn trimmed_mean(mut values: Vec<f32>) -> f32 {
    values.sort_by(f32::total_cmp);

    let kept = &values[1..values.len() - 1];
    kept.iter().sum::<f32>() / kept.len() as f32
}
