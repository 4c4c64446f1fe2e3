//! Stall detection for transfers.

use std::time::{Duration, Instant};

/// Fires when the byte counter stops moving for longer than the limit.
///
/// This is separate from a request's total timeout: a slow but steady
/// transfer never trips it.
#[derive(Debug, Clone)]
pub struct Watchdog {
    limit: Option<Duration>,
    last_bytes: u64,
    last_progress: Instant,
}

impl Watchdog {
    /// A watchdog with no limit never fires.
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            limit: limit.filter(|l| !l.is_zero()),
            last_bytes: 0,
            last_progress: Instant::now(),
        }
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    /// Record the current byte count; returns true once the limit is exceeded.
    pub fn observe(&mut self, bytes: u64) -> bool {
        self.observe_at(bytes, Instant::now())
    }

    pub fn observe_at(&mut self, bytes: u64, now: Instant) -> bool {
        let Some(limit) = self.limit else {
            return false;
        };
        if bytes != self.last_bytes {
            self.last_bytes = bytes;
            self.last_progress = now;
            return false;
        }
        now.saturating_duration_since(self.last_progress) > limit
    }
}
