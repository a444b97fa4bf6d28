//! Scheduler orchestration

mod tick;

use std::{sync::Arc, time::Duration};

use cadence_common::{Clock, Signal, internal};
use cadence_content::{Tracker, TrackingConfig};
use cadence_store::Repositories;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
pub use tick::TickReport;

use crate::{adapter::AdapterRegistry, error::DeliveryError, policy::RetryPolicy};

const fn default_interval() -> u64 {
    60
}

const fn default_enabled() -> bool {
    true
}

const fn default_send_timeout() -> u64 {
    30
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// How often to tick (in seconds)
    ///
    /// Default: 60 seconds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Whether the interval driver ticks at all
    ///
    /// Default: `true`
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Upper bound on a single send adapter call (in seconds)
    ///
    /// Default: 30 seconds
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub tracking: TrackingConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            enabled: default_enabled(),
            send_timeout_secs: default_send_timeout(),
            retry: RetryPolicy::default(),
            tracking: TrackingConfig::default(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Decides what to send to whom, one tick at a time
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    repos: Repositories,
    adapters: AdapterRegistry,
    clock: Arc<dyn Clock>,
    tracker: Tracker,
    last_tick: Mutex<Option<DateTime<Utc>>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        config: SchedulerConfig,
        repos: Repositories,
        adapters: AdapterRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let tracker = Tracker::new(config.tracking.clone());

        Self {
            config,
            repos,
            adapters,
            clock,
            tracker,
            last_tick: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// When the last tick finished, for liveness checks
    #[must_use]
    pub fn last_tick(&self) -> Option<DateTime<Utc>> {
        *self.last_tick.lock()
    }

    /// Run the interval driver
    ///
    /// Ticks every `interval_secs` until a shutdown signal is received. A tick
    /// is always awaited to completion before the next one can start, and
    /// before a shutdown is acted upon; ticks missed while one is running are
    /// skipped, not queued.
    ///
    /// # Errors
    ///
    /// Currently infallible; per-run failures are reported by each tick
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
    pub async fn serve(
        &self,
        mut shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        if !self.config.enabled {
            internal!(level = INFO, "Scheduler disabled, waiting for shutdown");
            let _ = shutdown.recv().await;
            return Ok(());
        }

        internal!(
            level = INFO,
            "Scheduler starting, ticking every {}s",
            self.config.interval_secs
        );

        let mut timer = tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let report = self.tick().await;

                    if report.errors > 0 {
                        tracing::warn!(
                            selected = report.selected,
                            errors = report.errors,
                            "Tick finished with errors"
                        );
                    } else {
                        tracing::debug!(
                            selected = report.selected,
                            sent = report.sent,
                            failed = report.failed,
                            skipped = report.skipped,
                            deferred = report.deferred,
                            "Tick finished"
                        );
                    }
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            internal!(level = INFO, "Scheduler received shutdown signal");
                            break;
                        }
                        Err(e) => {
                            tracing::error!("Scheduler shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        internal!(level = INFO, "Scheduler shutdown complete");

        Ok(())
    }
}
