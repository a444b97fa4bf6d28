//! Campaign gating
//!
//! Everything here decides whether a step may be performed *now*; none of it
//! touches a store. The scheduler supplies the counts it needs.

use cadence_common::model::{CampaignPolicy, SendLog, Step, StepKind};
use chrono::{DateTime, Timelike, Utc};

use crate::error::PolicyError;

/// Longest delay a step may ask for, in days
pub const MAX_DAY_OFFSET: u32 = 36_500;

/// Check a campaign's policy before it is activated
///
/// # Errors
/// If the quiet-hours window is out of range or empty, a throttle is zero, or a
/// step waits longer than [`MAX_DAY_OFFSET`]
pub fn validate(policy: &CampaignPolicy, steps: &[Step]) -> Result<(), PolicyError> {
    if let Some(window) = policy.quiet_hours {
        for hour in [window.start_hour, window.end_hour] {
            if hour >= 24 {
                return Err(PolicyError::HourOutOfRange(hour));
            }
        }

        if window.start_hour == window.end_hour {
            return Err(PolicyError::EmptyWindow(window.start_hour));
        }
    }

    if policy.throttle_per_hour == Some(0) {
        return Err(PolicyError::ZeroThrottle);
    }

    if let Some(step) = steps.iter().find(|step| step.throttle_override == Some(0)) {
        return Err(PolicyError::ZeroStepThrottle(step.id.clone()));
    }

    if let Some(step) = steps.iter().find(|step| step.day_offset > MAX_DAY_OFFSET) {
        return Err(PolicyError::DayOffsetTooLarge(
            step.id.clone(),
            step.day_offset,
        ));
    }

    Ok(())
}

/// Number of steps `history` shows as finished
#[must_use]
pub fn completed_steps(history: &[SendLog]) -> usize {
    history.iter().filter(|log| log.completes_step()).count()
}

/// The step a contact should receive next, by position in `history`.
///
/// `None` when the contact replied, is `suppressed`, or has finished every
/// step.
#[must_use]
pub fn eligible_step<'a>(
    steps: &'a [Step],
    history: &[SendLog],
    suppressed: bool,
) -> Option<(usize, &'a Step)> {
    if suppressed || history.iter().any(|log| log.replied) {
        return None;
    }

    let position = completed_steps(history);
    steps.get(position).map(|step| (position, step))
}

/// Start of the clock hour containing `now`
#[must_use]
pub fn hour_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let seconds = now.timestamp();
    DateTime::from_timestamp(seconds - seconds.rem_euclid(3600), 0).unwrap_or(now)
}

/// Start of the clock hour after the one containing `now`
#[must_use]
pub fn next_hour_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    hour_start(now)
        .checked_add_signed(chrono::Duration::hours(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Whether `now` falls inside the campaign's operating window
#[must_use]
pub fn in_operating_window(policy: &CampaignPolicy, now: DateTime<Utc>) -> bool {
    policy
        .quiet_hours
        .is_none_or(|window| window.allows_hour(now.hour()))
}

/// Per-hour send cap applying to `step`
#[must_use]
pub fn throttle_cap(policy: &CampaignPolicy, step: &Step) -> Option<u32> {
    step.throttle_override.or(policy.throttle_per_hour)
}

/// Verdict of the campaign gate for one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    /// Outside the operating window; try again at `resume_at`
    QuietHours { resume_at: DateTime<Utc> },
    /// The hourly cap is used up; leave the run alone
    Throttled,
}

/// Decide whether `step` may be sent at `now`, given the campaign already sent
/// `sent_this_hour` messages in the current clock hour.
///
/// Only email steps are gated.
#[must_use]
pub fn gate(policy: &CampaignPolicy, step: &Step, now: DateTime<Utc>, sent_this_hour: u32) -> Gate {
    if !matches!(step.kind, StepKind::Email { .. }) {
        return Gate::Open;
    }

    if !in_operating_window(policy, now) {
        return Gate::QuietHours {
            resume_at: next_hour_boundary(now),
        };
    }

    match throttle_cap(policy, step) {
        Some(cap) if sent_this_hour >= cap => Gate::Throttled,
        _ => Gate::Open,
    }
}
