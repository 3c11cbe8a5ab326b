//! Write timestamps.
//!
//! Every version carries a wall-clock reading taken at write submission.
//! `SystemTime` alone can repeat under coarse clocks or move backwards, so
//! the clock pairs it with an atomic high-water mark and always hands out a
//! strictly increasing value. Timestamp `0` is reserved as the
//! read-the-latest sentinel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch, adjusted to be strictly increasing.
pub type Timestamp = u64;

/// Snapshot sentinel: read the newest version regardless of its time.
pub const TS_LATEST: Timestamp = 0;

/// Strictly monotonic wall clock shared by all writers of one database.
#[derive(Debug)]
pub(crate) struct Clock {
    last: AtomicU64,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Returns a timestamp greater than every previous return value and no
    /// earlier than the current wall clock.
    pub(crate) fn now(&self) -> Timestamp {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }
}
