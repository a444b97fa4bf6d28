//! Retry policy for failed steps.
//!
//! A failed step is retried at the same position after a fixed backoff. Jitter
//! only ever lengthens the delay, so a retry is never scheduled earlier than
//! `backoff_secs` after the failure.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before a failed step is attempted again (in seconds).
    ///
    /// Values below one second are treated as one second.
    ///
    /// Default: 300 seconds (5 minutes)
    #[serde(default = "defaults::backoff_secs")]
    pub backoff_secs: u64,

    /// Extra random delay, as a fraction of `backoff_secs` (0.0 to 1.0).
    ///
    /// Default: 0.0 (no jitter)
    #[serde(default = "defaults::jitter_factor")]
    pub jitter_factor: f64,

    /// Consecutive failures at one step before the run is flagged for
    /// operator review. 0 disables flagging.
    ///
    /// Default: 3
    #[serde(default = "defaults::review_after_failures")]
    pub review_after_failures: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_secs: defaults::backoff_secs(),
            jitter_factor: defaults::jitter_factor(),
            review_after_failures: defaults::review_after_failures(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before the next attempt
    #[must_use]
    pub fn backoff(&self) -> Duration {
        let base = self.backoff_secs.max(1);

        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let jitter = if self.jitter_factor > 0.0 {
            let range = (base as f64) * self.jitter_factor.min(1.0);
            rand::rng().random_range(0.0..=range) as u64
        } else {
            0
        };

        i64::try_from(base.saturating_add(jitter))
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    /// When a step that failed at `failed_at` should be attempted again
    #[must_use]
    pub fn next_retry_at(&self, failed_at: DateTime<Utc>) -> DateTime<Utc> {
        failed_at
            .checked_add_signed(self.backoff())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Whether `consecutive_failures` warrants operator review
    #[must_use]
    pub const fn should_flag(&self, consecutive_failures: u32) -> bool {
        self.review_after_failures > 0 && consecutive_failures >= self.review_after_failures
    }
}

mod defaults {
    pub const fn backoff_secs() -> u64 {
        300 // 5 minutes
    }

    pub const fn jitter_factor() -> f64 {
        0.0
    }

    pub const fn review_after_failures() -> u32 {
        3
    }
}
