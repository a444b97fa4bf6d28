//! The sequence run state machine
//!
//! [`transition`] is the only way the scheduler changes a run's position. It
//! is a pure function of the run, the outcome of one attempt, the time and the
//! retry policy, so every rule below is unit-testable without a store.
//!
//! ```text
//! running --sent/waited--> running (next step) | stopped (completed)
//! running --failed-------> running (same step, after backoff) | paused (needs review)
//! running --quiet hours--> running (same step, next hour)
//! running --manual task--> paused (manual task)
//! running --suppressed/replied/missing--> stopped
//! running <--operator--> paused
//! ```

use cadence_common::{
    StepId,
    model::{
        AttemptOutcome, HoldReason, RunStatus, SequenceRun, SkipReason, Step, StepAttempt,
        StopReason,
    },
};
use chrono::{DateTime, Days, Utc};

use crate::{
    error::{DeliveryError, StepFailure},
    policy::RetryPolicy,
};

/// The result of one attempt at a run's current step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The message was accepted by an adapter
    Sent { provider_id: String, dry_run: bool },
    /// A wait step elapsed
    Waited,
    /// An operator finished the manual task at the current step
    TaskCompleted,
    Failed(StepFailure),
    /// Outside the operating window
    QuietHours { resume_at: DateTime<Utc> },
    /// A manual task was surfaced to an operator
    ManualTask,
    Suppressed,
    Replied,
    MissingAddress,
    MissingContact,
    MissingCampaign,
}

impl Outcome {
    /// The skip reason this outcome is recorded with, if it is a skip
    #[must_use]
    pub const fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Sent { .. } | Self::Failed(_) => None,
            Self::Waited => Some(SkipReason::Wait),
            Self::TaskCompleted => Some(SkipReason::TaskCompleted),
            Self::QuietHours { .. } => Some(SkipReason::QuietHours),
            Self::ManualTask => Some(SkipReason::ManualTask),
            Self::Suppressed => Some(SkipReason::Suppressed),
            Self::Replied => Some(SkipReason::Replied),
            Self::MissingAddress => Some(SkipReason::MissingAddress),
            Self::MissingContact => Some(SkipReason::MissingContact),
            Self::MissingCampaign => Some(SkipReason::MissingCampaign),
        }
    }

    const fn stop_reason(&self) -> Option<StopReason> {
        match self {
            Self::Suppressed => Some(StopReason::Suppressed),
            Self::Replied => Some(StopReason::Replied),
            Self::MissingAddress => Some(StopReason::MissingAddress),
            Self::MissingContact => Some(StopReason::MissingContact),
            Self::MissingCampaign => Some(StopReason::MissingCampaign),
            _ => None,
        }
    }
}

/// When `step` comes due, counting from `from`.
///
/// `from + day_offset` days; with a time of day, that date at that time,
/// moved a day later if it would fall before `from`. A date past the end of
/// the calendar saturates at [`DateTime::MAX_UTC`].
#[must_use]
pub fn schedule(step: &Step, from: DateTime<Utc>) -> DateTime<Utc> {
    let later = |at: DateTime<Utc>, days: u32| {
        at.checked_add_days(Days::new(u64::from(days)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    };
    let base = later(from, step.day_offset);

    match step.time_of_day {
        None => base,
        Some(time) => {
            let at = base.date_naive().and_time(time).and_utc();
            if at < from { later(at, 1) } else { at }
        }
    }
}

/// Apply `outcome` to `run`
#[must_use]
pub fn transition(
    run: &SequenceRun,
    outcome: &Outcome,
    now: DateTime<Utc>,
    retry: &RetryPolicy,
) -> SequenceRun {
    let mut next = run.clone();

    let recorded = match outcome {
        Outcome::Sent {
            provider_id,
            dry_run,
        } => AttemptOutcome::Sent {
            provider_id: provider_id.clone(),
            dry_run: *dry_run,
        },
        Outcome::Failed(failure) => AttemptOutcome::Failed {
            kind: failure.kind(),
            error: failure.to_string(),
        },
        skipped => AttemptOutcome::Skipped {
            reason: skipped.skip_reason().unwrap_or(SkipReason::Wait),
        },
    };
    next.history.push(StepAttempt {
        step_index: run.current_step_index,
        step_id: run
            .current_step()
            .map_or_else(|| StepId::new(""), |step| step.id.clone()),
        at: now,
        outcome: recorded,
    });

    match outcome {
        Outcome::Sent { .. } | Outcome::Waited => advance(&mut next, now),
        Outcome::TaskCompleted => {
            next.status = RunStatus::Running;
            next.hold = None;
            advance(&mut next, now);
        }
        Outcome::Failed(failure) => {
            let repeated = !failure.is_retryable()
                && run.consecutive_failures > 0
                && run.last_attempt().is_some_and(|last| {
                    last.step_index == run.current_step_index
                        && matches!(last.outcome, AttemptOutcome::Failed { kind, .. } if !kind.is_retryable())
                });

            next.consecutive_failures = run.consecutive_failures.saturating_add(1);
            next.next_send_at = Some(retry.next_retry_at(now));

            if retry.should_flag(next.consecutive_failures) {
                next.flagged_for_review = true;
            }

            // One automatic retry for failures that need a human to fix
            if repeated {
                next.status = RunStatus::Paused;
                next.hold = Some(HoldReason::NeedsReview);
                next.flagged_for_review = true;
            }
        }
        Outcome::QuietHours { resume_at } => {
            next.next_send_at = Some(*resume_at);
        }
        Outcome::ManualTask => {
            next.status = RunStatus::Paused;
            next.hold = Some(HoldReason::ManualTask);
        }
        terminal => {
            if let Some(reason) = terminal.stop_reason() {
                stop_with(&mut next, reason);
            }
        }
    }

    next
}

fn advance(run: &mut SequenceRun, now: DateTime<Utc>) {
    run.current_step_index += 1;
    run.consecutive_failures = 0;
    run.flagged_for_review = false;

    match run.current_step().map(|step| schedule(step, now)) {
        Some(at) => run.next_send_at = Some(at),
        None => stop_with(run, StopReason::Completed),
    }
}

fn stop_with(run: &mut SequenceRun, reason: StopReason) {
    run.status = RunStatus::Stopped;
    run.stop = Some(reason);
    run.hold = None;
    run.next_send_at = None;
}

/// Operator pause of a running run
///
/// # Errors
/// If the run is not running
pub fn pause(run: &SequenceRun) -> Result<SequenceRun, DeliveryError> {
    if run.status != RunStatus::Running {
        return Err(DeliveryError::InvalidState(format!(
            "run {} is {:?}, only running runs can be paused",
            run.id, run.status
        )));
    }

    let mut next = run.clone();
    next.status = RunStatus::Paused;
    next.hold = Some(HoldReason::Operator);
    Ok(next)
}

/// Return a paused run to running, keeping its `next_send_at`.
///
/// Resuming a run held for review gives it a fresh failure count. Runs held
/// on a manual task resume through [`complete_manual_task`] instead.
///
/// # Errors
/// If the run is not paused, or is waiting on a manual task
pub fn resume(run: &SequenceRun) -> Result<SequenceRun, DeliveryError> {
    match (run.status, run.hold) {
        (RunStatus::Paused, Some(HoldReason::ManualTask)) => Err(DeliveryError::InvalidState(
            format!("run {} is waiting on a manual task", run.id),
        )),
        (RunStatus::Paused, hold) => {
            let mut next = run.clone();
            next.status = RunStatus::Running;
            next.hold = None;
            if hold == Some(HoldReason::NeedsReview) {
                next.consecutive_failures = 0;
                next.flagged_for_review = false;
            }
            Ok(next)
        }
        (status, _) => Err(DeliveryError::InvalidState(format!(
            "run {} is {status:?}, only paused runs can be resumed",
            run.id
        ))),
    }
}

/// Operator stop
///
/// # Errors
/// If the run is already stopped
pub fn stop(run: &SequenceRun) -> Result<SequenceRun, DeliveryError> {
    if run.is_stopped() {
        return Err(DeliveryError::InvalidState(format!(
            "run {} is already stopped",
            run.id
        )));
    }

    let mut next = run.clone();
    stop_with(&mut next, StopReason::Operator);
    Ok(next)
}

/// Finish the manual task a run is held on, and move to the next step
///
/// # Errors
/// If the run is not held on a manual task
pub fn complete_manual_task(
    run: &SequenceRun,
    now: DateTime<Utc>,
    retry: &RetryPolicy,
) -> Result<SequenceRun, DeliveryError> {
    if run.status != RunStatus::Paused || run.hold != Some(HoldReason::ManualTask) {
        return Err(DeliveryError::InvalidState(format!(
            "run {} is not waiting on a manual task",
            run.id
        )));
    }

    Ok(transition(run, &Outcome::TaskCompleted, now, retry))
}
