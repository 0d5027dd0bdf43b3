use std::sync::atomic::{AtomicI64, Ordering};

use crate::clock::Clock;

/// Timestamp (Unix millis) of the most recent accepted mutation.
///
/// Only ever moves forward. Lives in memory: a restart resets it to the
/// process start time.
#[derive(Debug)]
pub struct SyncWatermark {
    value: AtomicI64,
}

impl SyncWatermark {
    pub fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    pub fn starting_now(clock: &dyn Clock) -> Self {
        Self::new(clock.now_millis())
    }

    /// Raise the watermark to `candidate` if it is newer. Returns the value
    /// after the update.
    pub fn advance(&self, candidate: i64) -> i64 {
        let previous = self.value.fetch_max(candidate, Ordering::AcqRel);
        previous.max(candidate)
    }

    pub fn read(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }
}
