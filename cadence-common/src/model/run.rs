use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{SkipReason, Step};
use crate::{AccountId, CampaignId, ContactId, RunId, SequenceId, StepId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Paused,
    Stopped,
}

/// Why a run is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HoldReason {
    /// Paused by an operator
    Operator,
    /// Waiting for a human to complete a manual task
    ManualTask,
    /// Repeated failures that need a human to look at them
    NeedsReview,
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    /// Every step completed
    Completed,
    Suppressed,
    Replied,
    MissingAddress,
    MissingContact,
    MissingCampaign,
    Operator,
}

/// Broad class of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The step's template does not exist
    TemplateMissing,
    Transport,
    Rejected,
    Timeout,
    /// The run's account cannot send
    Configuration,
}

impl FailureKind {
    /// Whether retrying without outside intervention can succeed
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transport | Self::Timeout)
    }
}

/// What happened when a step was attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Sent { provider_id: String, dry_run: bool },
    Failed { kind: FailureKind, error: String },
    Skipped { reason: SkipReason },
}

/// One entry of a run's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAttempt {
    pub step_index: usize,
    pub step_id: StepId,
    pub at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

/// A single contact's progress through a sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRun {
    pub id: RunId,
    pub sequence_id: SequenceId,
    pub contact_id: ContactId,
    pub account_id: AccountId,
    pub campaign_id: Option<CampaignId>,

    /// Index into `steps` of the next step to perform
    pub current_step_index: usize,
    pub status: RunStatus,
    pub hold: Option<HoldReason>,
    pub stop: Option<StopReason>,

    /// When the current step comes due. `None` means immediately.
    pub next_send_at: Option<DateTime<Utc>>,

    /// Template values, layered over the contact's own values
    pub variables: BTreeMap<String, String>,

    pub history: Vec<StepAttempt>,

    /// The sequence's steps as they were when the contact was enrolled
    pub steps: Vec<Step>,

    /// Failures since the last completed step
    pub consecutive_failures: u32,
    pub flagged_for_review: bool,

    pub enrolled_at: DateTime<Utc>,
}

impl SequenceRun {
    /// The step this run will perform next, if any remain
    #[must_use]
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current_step_index)
    }

    /// Whether the scheduler should pick this run up at `now`
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RunStatus::Running && self.next_send_at.is_none_or(|at| at <= now)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.status == RunStatus::Stopped
    }

    /// Number of attempts recorded for the current step that failed
    #[must_use]
    pub fn failed_attempts_at_current_step(&self) -> u32 {
        let failed = self
            .history
            .iter()
            .filter(|attempt| {
                attempt.step_index == self.current_step_index
                    && matches!(attempt.outcome, AttemptOutcome::Failed { .. })
            })
            .count();

        u32::try_from(failed).unwrap_or(u32::MAX)
    }

    /// The most recent history entry
    #[must_use]
    pub fn last_attempt(&self) -> Option<&StepAttempt> {
        self.history.last()
    }
}
