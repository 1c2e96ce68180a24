//! Read notifications.
//!
//! Observers are called after every successful full read, in the order they
//! were registered, with the unified buffer. An observer error is logged by
//! the meter and the remaining observers still run.

use crate::meter::schema::ReadBuffer;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("observer failed: {0}")]
pub struct ObserverError(pub String);

/// Handle returned when an observer is registered with a meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

pub trait MeterObserver: Send {
    fn update(&mut self, buffer: &ReadBuffer) -> Result<(), ObserverError>;
}

/// Counts reads and keeps the unified buffer of every `interval`th one.
#[derive(Debug, Clone)]
pub struct IntervalObserver {
    interval: usize,
    seen: usize,
    summary: Option<ReadBuffer>,
}

impl IntervalObserver {
    pub fn new(interval: usize) -> Self {
        IntervalObserver {
            interval: interval.max(1),
            seen: 0,
            summary: None,
        }
    }

    pub fn reads_seen(&self) -> usize {
        self.seen
    }

    /// The most recently sampled buffer.
    pub fn summary(&self) -> Option<&ReadBuffer> {
        self.summary.as_ref()
    }
}

impl MeterObserver for IntervalObserver {
    fn update(&mut self, buffer: &ReadBuffer) -> Result<(), ObserverError> {
        self.seen += 1;
        if self.seen % self.interval == 0 {
            self.summary = Some(buffer.clone());
        }
        Ok(())
    }
}
