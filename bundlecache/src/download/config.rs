//! Configuration for the download center.

use std::time::Duration;

/// Default number of concurrently active transfers.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Default number of pending transfers promoted per tick.
pub const DEFAULT_MAX_REQUESTS_PER_TICK: usize = 5;

/// Default size from which transfers resume partial temp files (1 MB).
pub const DEFAULT_RESUME_MIN_SIZE: u64 = 1024 * 1024;

/// Default number of retries after a failed download.
pub const DEFAULT_FAILED_TRY_AGAIN: u32 = 3;

/// Default pause between download retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Scheduling and transfer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    /// Maximum active transfers.
    pub max_concurrency: usize,

    /// Maximum pending transfers started in a single tick.
    pub max_requests_per_tick: usize,

    /// Abort a transfer when no bytes arrive for this long. `None` disables.
    pub watchdog_time: Option<Duration>,

    /// Bundles at least this large use the resumable downloader.
    pub resume_min_size: u64,

    /// HTTP codes after which a partial resume file is discarded.
    pub resume_response_codes: Vec<u16>,

    /// Retries after a failed download before giving up.
    pub failed_try_again: u32,

    /// Pause between retries.
    pub retry_delay: Duration,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_requests_per_tick: DEFAULT_MAX_REQUESTS_PER_TICK,
            watchdog_time: None,
            resume_min_size: DEFAULT_RESUME_MIN_SIZE,
            resume_response_codes: vec![416],
            failed_try_again: DEFAULT_FAILED_TRY_AGAIN,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl DownloadSettings {
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_max_requests_per_tick(mut self, max: usize) -> Self {
        self.max_requests_per_tick = max.max(1);
        self
    }

    pub fn with_watchdog_time(mut self, watchdog: Option<Duration>) -> Self {
        self.watchdog_time = watchdog;
        self
    }

    pub fn with_resume_min_size(mut self, size: u64) -> Self {
        self.resume_min_size = size;
        self
    }

    pub fn with_resume_response_codes(mut self, codes: Vec<u16>) -> Self {
        self.resume_response_codes = codes;
        self
    }

    pub fn with_failed_try_again(mut self, count: u32) -> Self {
        self.failed_try_again = count;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = DownloadSettings::default();
        assert_eq!(settings.max_concurrency, 10);
        assert_eq!(settings.max_requests_per_tick, 5);
        assert!(settings.watchdog_time.is_none());
        assert_eq!(settings.resume_response_codes, vec![416]);
    }

    #[test]
    fn test_builder_clamps_limits() {
        let settings = DownloadSettings::default()
            .with_max_concurrency(0)
            .with_max_requests_per_tick(0)
            .with_watchdog_time(Some(Duration::from_secs(30)))
            .with_retry_delay(Duration::ZERO);

        assert_eq!(settings.max_concurrency, 1);
        assert_eq!(settings.max_requests_per_tick, 1);
        assert_eq!(settings.watchdog_time, Some(Duration::from_secs(30)));
        assert_eq!(settings.retry_delay, Duration::ZERO);
    }
}
