//! Tunables for the analysis worker manager.

use super::WorkerManagerError;
use crate::analysis::domain::DEFAULT_MAX_RETRIES;
use std::time::Duration;

/// Worker pool, retry and timeout settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerManagerConfig {
    max_workers: usize,
    default_max_retries: u32,
    retry_base_delay: Duration,
    max_retry_delay: Duration,
    step_timeout: Duration,
    failure_threshold_percent: u8,
    auto_retry: bool,
    event_capacity: usize,
    shutdown_timeout: Duration,
    pending_rescan_interval: Option<Duration>,
    estimated_seconds_per_response: u32,
}

impl Default for WorkerManagerConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            default_max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_secs(5),
            max_retry_delay: Duration::from_secs(300),
            step_timeout: Duration::from_secs(120),
            failure_threshold_percent: 50,
            auto_retry: true,
            event_capacity: 256,
            shutdown_timeout: Duration::from_secs(30),
            pending_rescan_interval: None,
            estimated_seconds_per_response: 15,
        }
    }
}

impl WorkerManagerConfig {
    /// Sets the worker pool size.
    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the attempt budget given to new tasks.
    #[must_use]
    pub const fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Sets the delay before the first automatic retry.
    #[must_use]
    pub const fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Sets the upper bound on retry delays.
    #[must_use]
    pub const fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    /// Sets the bound on each AI backend call.
    #[must_use]
    pub const fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Sets the share of failed response analyses, in percent, above which
    /// the whole task fails.
    #[must_use]
    pub const fn with_failure_threshold_percent(mut self, percent: u8) -> Self {
        self.failure_threshold_percent = percent;
        self
    }

    /// Enables or disables automatic retries after failures.
    #[must_use]
    pub const fn with_auto_retry(mut self, auto_retry: bool) -> Self {
        self.auto_retry = auto_retry;
        self
    }

    /// Sets the buffer size of the event channel.
    #[must_use]
    pub const fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Sets how long shutdown waits for busy workers.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enables periodic pickup of `pending` tasks written by other
    /// processes.
    #[must_use]
    pub const fn with_pending_rescan_interval(mut self, interval: Option<Duration>) -> Self {
        self.pending_rescan_interval = interval;
        self
    }

    /// Sets the per-response estimate used for expected completion times.
    #[must_use]
    pub const fn with_estimated_seconds_per_response(mut self, seconds: u32) -> Self {
        self.estimated_seconds_per_response = seconds;
        self
    }

    /// Returns the worker pool size.
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Returns the attempt budget given to new tasks.
    #[must_use]
    pub const fn default_max_retries(&self) -> u32 {
        self.default_max_retries
    }

    /// Returns the bound on each AI backend call.
    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Returns the failure threshold in percent.
    #[must_use]
    pub const fn failure_threshold_percent(&self) -> u8 {
        self.failure_threshold_percent
    }

    /// Returns whether failures are retried automatically.
    #[must_use]
    pub const fn auto_retry(&self) -> bool {
        self.auto_retry
    }

    /// Returns the event channel buffer size.
    #[must_use]
    pub const fn event_capacity(&self) -> usize {
        self.event_capacity
    }

    /// Returns how long shutdown waits for busy workers.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns the pending rescan interval, if enabled.
    #[must_use]
    pub const fn pending_rescan_interval(&self) -> Option<Duration> {
        self.pending_rescan_interval
    }

    /// Returns the per-response completion estimate in seconds.
    #[must_use]
    pub const fn estimated_seconds_per_response(&self) -> u32 {
        self.estimated_seconds_per_response
    }

    /// Returns the delay before re-enqueueing a task that has failed
    /// `retry_count` times: `base * 2^(retry_count - 1)`, capped.
    #[must_use]
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry_count.saturating_sub(1));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.max_retry_delay)
    }

    /// Checks the configuration for values the manager cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerManagerError::InvalidConfig`] for a zero-sized pool,
    /// a zero event capacity or a threshold above 100 percent.
    pub fn validate(&self) -> Result<(), WorkerManagerError> {
        if self.max_workers == 0 {
            return Err(WorkerManagerError::InvalidConfig(
                "max_workers must be at least 1".to_owned(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(WorkerManagerError::InvalidConfig(
                "event_capacity must be at least 1".to_owned(),
            ));
        }
        if self.failure_threshold_percent > 100 {
            return Err(WorkerManagerError::InvalidConfig(format!(
                "failure_threshold_percent must be at most 100, got {}",
                self.failure_threshold_percent
            )));
        }
        Ok(())
    }
}
