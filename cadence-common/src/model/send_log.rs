use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SequenceRun;
use crate::{CampaignId, ContactId, RunId, SendLogId, StepId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Sent,
    Failed,
    Skipped,
}

/// Why a step was recorded as skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Outside the campaign's operating window; retried next hour
    QuietHours,
    Suppressed,
    Replied,
    MissingAddress,
    MissingContact,
    /// The run names a campaign that no longer exists
    MissingCampaign,
    /// A wait step elapsed
    Wait,
    /// A manual task was surfaced to an operator
    ManualTask,
    /// An operator completed a manual task
    TaskCompleted,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QuietHours => "quiet-hours",
            Self::Suppressed => "suppressed",
            Self::Replied => "replied",
            Self::MissingAddress => "missing-address",
            Self::MissingContact => "missing-contact",
            Self::MissingCampaign => "missing-campaign",
            Self::Wait => "wait",
            Self::ManualTask => "manual-task",
            Self::TaskCompleted => "task-completed",
        }
    }

    /// Whether a skip with this reason finishes its step
    #[must_use]
    pub const fn completes_step(self) -> bool {
        matches!(self, Self::Wait | Self::TaskCompleted)
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An append-only record of one attempt at one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendLog {
    pub id: SendLogId,
    pub campaign_id: Option<CampaignId>,
    pub run_id: RunId,
    pub contact_id: ContactId,
    pub step_id: StepId,
    pub step_index: usize,

    /// A/B variant label
    pub variant: Option<String>,

    pub provider_message_id: Option<String>,
    pub thread_id: Option<String>,
    pub tracking_id: Option<String>,

    pub at: DateTime<Utc>,
    pub status: SendStatus,
    pub skip_reason: Option<SkipReason>,
    pub error: Option<String>,

    pub opens: u32,
    pub clicks: u32,
    pub replied: bool,
    pub unsubscribed: bool,
    pub dry_run: bool,
}

impl SendLog {
    fn for_step(run: &SequenceRun, at: DateTime<Utc>, status: SendStatus) -> Self {
        let step_id = run
            .current_step()
            .map_or_else(|| StepId::new(""), |step| step.id.clone());

        Self {
            id: SendLogId::generate(),
            campaign_id: run.campaign_id.clone(),
            run_id: run.id.clone(),
            contact_id: run.contact_id.clone(),
            step_id,
            step_index: run.current_step_index,
            variant: None,
            provider_message_id: None,
            thread_id: None,
            tracking_id: None,
            at,
            status,
            skip_reason: None,
            error: None,
            opens: 0,
            clicks: 0,
            replied: false,
            unsubscribed: false,
            dry_run: false,
        }
    }

    /// A successful send of the run's current step
    #[must_use]
    pub fn sent(run: &SequenceRun, at: DateTime<Utc>, provider_id: impl Into<String>) -> Self {
        let mut log = Self::for_step(run, at, SendStatus::Sent);
        log.provider_message_id = Some(provider_id.into());
        log
    }

    /// A failed attempt at the run's current step
    #[must_use]
    pub fn failed(run: &SequenceRun, at: DateTime<Utc>, error: impl Into<String>) -> Self {
        let mut log = Self::for_step(run, at, SendStatus::Failed);
        log.error = Some(error.into());
        log
    }

    /// A skipped attempt at the run's current step
    #[must_use]
    pub fn skipped(run: &SequenceRun, at: DateTime<Utc>, reason: SkipReason) -> Self {
        let mut log = Self::for_step(run, at, SendStatus::Skipped);
        log.skip_reason = Some(reason);
        log
    }

    #[must_use]
    pub fn with_tracking_id(mut self, tracking_id: Option<String>) -> Self {
        self.tracking_id = tracking_id;
        self
    }

    #[must_use]
    pub fn with_variant(mut self, variant: Option<String>) -> Self {
        self.variant = variant;
        self
    }

    #[must_use]
    pub fn with_thread_id(mut self, thread_id: Option<String>) -> Self {
        self.thread_id = thread_id;
        self
    }

    #[must_use]
    pub const fn simulated(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Whether this entry finished its step
    #[must_use]
    pub fn completes_step(&self) -> bool {
        match self.status {
            SendStatus::Sent => true,
            SendStatus::Failed => false,
            SendStatus::Skipped => self.skip_reason.is_some_and(SkipReason::completes_step),
        }
    }
}
