//! One scheduler tick
//!
//! A tick selects every due run and processes them one after another. Each
//! selected run ends the tick with exactly one recorded outcome, or is left
//! untouched when its campaign is inactive or throttled.

use cadence_common::{
    OutboxId, RunId, TemplateId,
    audit::{log_send_attempt, log_send_failure, log_send_skipped, log_send_success, log_suppression},
    internal,
    model::{
        Campaign, CampaignMetrics, Contact, OutboxMessage, OutboxStatus, RunStatus, SendLog,
        SequenceRun, Step, StepKind, StopReason, SuppressionReason,
    },
};
use cadence_content::render;
use chrono::{DateTime, Utc};

use super::Scheduler;
use crate::{
    adapter::SendReceipt,
    error::{DeliveryError, SendError, StepFailure},
    policy::{
        Gate,
        campaign::{self, completed_steps, hour_start},
        eligible_step,
    },
    run_state::{self, Outcome, schedule},
};

/// Totals for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Runs that were due when the tick started
    pub selected: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Left untouched: campaign inactive or throttled
    pub deferred: usize,
    /// Fast-forwarded to match the send log instead of re-sending
    pub reconciled: usize,
    /// Runs whose processing failed
    pub errors: usize,
}

/// How one selected run was disposed of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Sent,
    Failed,
    Skipped,
    Deferred,
    Reconciled,
    /// No longer due when reloaded
    Unchanged,
}

/// The email about to be sent for a run
struct Delivery<'a> {
    run: &'a SequenceRun,
    contact: &'a Contact,
    campaign: Option<&'a Campaign>,
    email: &'a str,
    template: TemplateId,
    variant: Option<String>,
}

impl Scheduler {
    /// Process every due run once
    pub async fn tick(&self) -> TickReport {
        let now = self.clock.now();
        let mut report = TickReport::default();

        let due = match self.repos.runs.due_runs(now).await {
            Ok(due) => due,
            Err(e) => {
                tracing::error!("Failed to select due runs: {e}");
                report.errors += 1;
                *self.last_tick.lock() = Some(now);
                return report;
            }
        };

        report.selected = due.len();
        internal!("Tick at {now}: {} runs due", due.len());

        for run in due {
            match self.process(&run.id, now).await {
                Ok(Disposition::Sent) => report.sent += 1,
                Ok(Disposition::Failed) => report.failed += 1,
                Ok(Disposition::Skipped) => report.skipped += 1,
                Ok(Disposition::Deferred) => report.deferred += 1,
                Ok(Disposition::Reconciled) => report.reconciled += 1,
                Ok(Disposition::Unchanged) => {}
                Err(e) => {
                    tracing::error!(run_id = %run.id, "Failed to process run: {e}");
                    report.errors += 1;
                }
            }
        }

        *self.last_tick.lock() = Some(now);

        report
    }

    async fn process(&self, id: &RunId, now: DateTime<Utc>) -> Result<Disposition, DeliveryError> {
        // Operators may have paused or stopped the run since selection
        let run = self.repos.runs.get_run(id).await?;
        if !run.is_due(now) {
            return Ok(Disposition::Unchanged);
        }

        let contact = match self.repos.contacts.get_contact(&run.contact_id).await {
            Ok(contact) => contact,
            Err(e) if e.is_not_found() => {
                return self.skip(&run, None, Outcome::MissingContact, now).await;
            }
            Err(e) => return Err(e.into()),
        };
        let email = contact
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty());

        if let Some(outcome) = self.engagement_stop(&run, &contact, email, now).await? {
            return self.skip(&run, None, outcome, now).await;
        }

        let history = self.repos.send_log.logs_for_run(&run.id).await?;
        if let Some(reconciled) = Self::reconcile(&run, &history) {
            self.repos.runs.update_run(&reconciled).await?;
            internal!(
                level = WARN,
                "Run {} fast-forwarded from step {} to {}",
                run.id,
                run.current_step_index,
                reconciled.current_step_index
            );
            return Ok(Disposition::Reconciled);
        }

        let Some(step) = run.current_step().cloned() else {
            let mut completed = run.clone();
            completed.status = RunStatus::Stopped;
            completed.stop = Some(StopReason::Completed);
            completed.next_send_at = None;
            self.repos.runs.update_run(&completed).await?;
            return Ok(Disposition::Reconciled);
        };

        let campaign = match &run.campaign_id {
            Some(id) => match self.repos.campaigns.get_campaign(id).await {
                Ok(campaign) => Some(campaign),
                Err(e) if e.is_not_found() => {
                    internal!(level = WARN, "Run {} names missing campaign {id}", run.id);
                    return self.skip(&run, None, Outcome::MissingCampaign, now).await;
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        if campaign.as_ref().is_some_and(|campaign| !campaign.is_running()) {
            return Ok(Disposition::Deferred);
        }

        let template = match &step.kind {
            StepKind::Wait => return self.skip(&run, campaign.as_ref(), Outcome::Waited, now).await,
            StepKind::ManualTask { instructions } => {
                internal!(
                    level = INFO,
                    "Run {} waiting on manual task: {instructions}",
                    run.id
                );
                return self
                    .skip(&run, campaign.as_ref(), Outcome::ManualTask, now)
                    .await;
            }
            StepKind::Email { .. } => Self::pick_template(&run, &step),
        };

        let Some(email) = email else {
            return self
                .skip(&run, campaign.as_ref(), Outcome::MissingAddress, now)
                .await;
        };

        if let Some(campaign) = &campaign {
            let sent_this_hour = self
                .repos
                .send_log
                .count_sent_since(&campaign.id, hour_start(now))
                .await?;

            match campaign::gate(&campaign.policy, &step, now, sent_this_hour) {
                Gate::Open => {}
                Gate::Throttled => {
                    tracing::debug!(run_id = %run.id, campaign_id = %campaign.id, "Throttled");
                    return Ok(Disposition::Deferred);
                }
                Gate::QuietHours { resume_at } => {
                    return self
                        .skip(&run, Some(campaign), Outcome::QuietHours { resume_at }, now)
                        .await;
                }
            }
        }

        let (template, variant) = template;
        self.deliver(
            Delivery {
                run: &run,
                contact: &contact,
                campaign: campaign.as_ref(),
                email,
                template,
                variant,
            },
            now,
        )
        .await
    }

    /// Apply replies and unsubscribes found in the send log, then the
    /// suppression registry. Returns the outcome that ends the run, if any.
    async fn engagement_stop(
        &self,
        run: &SequenceRun,
        contact: &Contact,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Outcome>, DeliveryError> {
        let log = &self.repos.send_log;

        let observed = if log.has_reply(&contact.id, run.campaign_id.as_ref()).await? {
            Some((SuppressionReason::Replied, Outcome::Replied))
        } else if log.has_unsubscribe(&contact.id).await? {
            Some((SuppressionReason::Unsubscribed, Outcome::Suppressed))
        } else {
            None
        };

        if let Some((reason, outcome)) = observed {
            if let Some(email) = email
                && self.repos.suppression.suppress(email, reason, now).await?
            {
                log_suppression(email, reason.as_str());
            }
            return Ok(Some(outcome));
        }

        if let Some(email) = email
            && self.repos.suppression.is_suppressed(email).await?
        {
            return Ok(Some(Outcome::Suppressed));
        }

        Ok(None)
    }

    /// A copy of `run` moved to where `history` says it is, when the log shows
    /// more completed steps than the run
    fn reconcile(run: &SequenceRun, history: &[SendLog]) -> Option<SequenceRun> {
        let completed = completed_steps(history);
        if completed <= run.current_step_index {
            return None;
        }

        let last_completed_at = history
            .iter()
            .filter(|log| log.completes_step())
            .map(|log| log.at)
            .max()?;

        let mut next = run.clone();
        next.current_step_index = completed;
        next.consecutive_failures = 0;
        next.flagged_for_review = false;

        match eligible_step(&run.steps, history, false) {
            Some((_, step)) => next.next_send_at = Some(schedule(step, last_completed_at)),
            None if completed >= run.steps.len() => {
                next.status = RunStatus::Stopped;
                next.stop = Some(StopReason::Completed);
                next.next_send_at = None;
            }
            // Replied; the next tick stops the run
            None => {}
        }

        Some(next)
    }

    /// The template for an email step, and its A/B label when the step has
    /// variants. A run always gets the same variant of a step.
    fn pick_template(run: &SequenceRun, step: &Step) -> (TemplateId, Option<String>) {
        let StepKind::Email { template, variants } = &step.kind else {
            return (TemplateId::new(""), None);
        };

        if variants.is_empty() {
            return (template.clone(), None);
        }

        let choices: Vec<&TemplateId> = std::iter::once(template).chain(variants).collect();
        let seed = run
            .id
            .as_str()
            .bytes()
            .map(usize::from)
            .sum::<usize>()
            .wrapping_add(run.current_step_index);
        let chosen = choices[seed % choices.len()].clone();

        (chosen.clone(), Some(chosen.to_string()))
    }

    /// Render, track, send and record one email
    async fn deliver(&self, delivery: Delivery<'_>, now: DateTime<Utc>) -> Result<Disposition, DeliveryError> {
        let Delivery {
            run,
            contact,
            campaign,
            email,
            template,
            variant,
        } = delivery;

        let lookup = self.repos.templates.get_template(&template).await;
        let template = match lookup {
            Ok(template) => template,
            Err(e) if e.is_not_found() => {
                let failure = StepFailure::TemplateMissing(template);
                let log = SendLog::failed(run, now, failure.to_string()).with_variant(variant);
                return self.fail(run, campaign, email, log, failure, now).await;
            }
            Err(e) => return Err(e.into()),
        };

        let mut variables = campaign.map(|c| c.variables.clone()).unwrap_or_default();
        variables.extend(contact.template_variables());
        variables.extend(run.variables.clone());

        let rendered = render(&template, &variables);
        let tracked = self.tracker.track(&rendered.html);
        let tracking_id = tracked.tracking_id.map(String::from);

        let (from, adapter) = match self.adapters.resolve(&run.account_id) {
            Ok((account, adapter)) => (account.from.clone(), Ok(adapter)),
            Err(e) => (None, Err(e)),
        };

        let mut message = OutboxMessage {
            id: OutboxId::generate(),
            run_id: run.id.clone(),
            from,
            to: vec![email.to_string()],
            subject: rendered.subject,
            html: tracked.html,
            text: rendered.text,
            tracking_id: tracking_id.clone(),
            status: OutboxStatus::Pending,
            provider_id: None,
            thread_id: None,
            error: None,
            created_at: now,
        };
        self.repos.outbox.insert_outbox(&message).await?;

        // A suppression may have arrived since the run was selected
        if self.repos.suppression.is_suppressed(email).await? {
            message.status = OutboxStatus::Failed;
            message.error = Some("recipient suppressed".to_string());
            self.repos.outbox.update_outbox(&message).await?;
            return self.skip(run, campaign, Outcome::Suppressed, now).await;
        }

        let attempt = run.failed_attempts_at_current_step() + 1;
        log_send_attempt(run.id.as_str(), email, run.current_step_index, attempt);

        let result = match adapter {
            Ok(adapter) => {
                let timeout = self.config.send_timeout();
                tokio::time::timeout(timeout, adapter.send(&message))
                    .await
                    .unwrap_or_else(|_| Err(SendError::Timeout(timeout)))
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(SendReceipt {
                provider_id,
                thread_id,
                simulated,
            }) => {
                message.status = if simulated {
                    OutboxStatus::Scheduled
                } else {
                    OutboxStatus::Sent
                };
                message.provider_id = Some(provider_id.clone());
                message.thread_id.clone_from(&thread_id);
                self.repos.outbox.update_outbox(&message).await?;

                let log = SendLog::sent(run, now, provider_id.clone())
                    .with_tracking_id(tracking_id)
                    .with_variant(variant)
                    .with_thread_id(thread_id)
                    .simulated(simulated);
                self.repos.send_log.append_log(&log).await?;
                log_send_success(run.id.as_str(), email, &provider_id, simulated);

                self.add_metrics(
                    campaign,
                    CampaignMetrics {
                        sent: 1,
                        delivered: u64::from(!simulated),
                        ..CampaignMetrics::default()
                    },
                )
                .await?;

                let outcome = Outcome::Sent {
                    provider_id,
                    dry_run: simulated,
                };
                self.persist(run, &outcome, now).await?;

                Ok(Disposition::Sent)
            }
            Err(e) => {
                message.status = OutboxStatus::Failed;
                message.error = Some(e.to_string());
                self.repos.outbox.update_outbox(&message).await?;

                let log = SendLog::failed(run, now, e.to_string())
                    .with_tracking_id(tracking_id)
                    .with_variant(variant);
                self.fail(run, campaign, email, log, e.into(), now).await
            }
        }
    }

    async fn fail(
        &self,
        run: &SequenceRun,
        campaign: Option<&Campaign>,
        email: &str,
        log: SendLog,
        failure: StepFailure,
        now: DateTime<Utc>,
    ) -> Result<Disposition, DeliveryError> {
        self.repos.send_log.append_log(&log).await?;
        log_send_failure(
            run.id.as_str(),
            email,
            &failure.to_string(),
            run.failed_attempts_at_current_step() + 1,
        );

        self.add_metrics(
            campaign,
            CampaignMetrics {
                failed: 1,
                ..CampaignMetrics::default()
            },
        )
        .await?;

        self.persist(run, &Outcome::Failed(failure), now).await?;

        Ok(Disposition::Failed)
    }

    /// Record a skip and apply it to the run
    async fn skip(
        &self,
        run: &SequenceRun,
        campaign: Option<&Campaign>,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<Disposition, DeliveryError> {
        let reason = outcome
            .skip_reason()
            .ok_or_else(|| DeliveryError::InvalidState(format!("{outcome:?} is not a skip")))?;

        self.repos
            .send_log
            .append_log(&SendLog::skipped(run, now, reason))
            .await?;
        log_send_skipped(run.id.as_str(), run.current_step_index, reason.as_str());

        // Skips taken before the campaign was loaded count against the run's
        // campaign id, which may no longer have a record
        let metrics = CampaignMetrics {
            skipped: 1,
            ..CampaignMetrics::default()
        };
        match (campaign, &run.campaign_id) {
            (Some(campaign), _) => self.add_metrics(Some(campaign), metrics).await?,
            (None, Some(id)) => {
                if let Err(e) = self.repos.campaigns.add_campaign_metrics(id, &metrics).await
                    && !e.is_not_found()
                {
                    return Err(e.into());
                }
            }
            (None, None) => {}
        }

        self.persist(run, &outcome, now).await?;

        Ok(Disposition::Skipped)
    }

    async fn add_metrics(
        &self,
        campaign: Option<&Campaign>,
        delta: CampaignMetrics,
    ) -> Result<(), DeliveryError> {
        if let Some(campaign) = campaign {
            self.repos
                .campaigns
                .add_campaign_metrics(&campaign.id, &delta)
                .await?;
        }
        Ok(())
    }

    /// Apply `outcome` and store the run.
    ///
    /// An operator pause or stop recorded while the step was in flight wins
    /// over the status the outcome would give; the step's progress is kept.
    async fn persist(
        &self,
        run: &SequenceRun,
        outcome: &Outcome,
        now: DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        let mut next = run_state::transition(run, outcome, now, &self.config.retry);

        let stored = self.repos.runs.get_run(&run.id).await?;
        if stored.is_stopped() {
            next.status = stored.status;
            next.stop = stored.stop;
            next.hold = None;
            next.next_send_at = None;
        } else if stored.status == RunStatus::Paused && !next.is_stopped() {
            next.status = stored.status;
            next.hold = stored.hold;
        }

        tracing::debug!(
            run_id = %next.id,
            step_index = next.current_step_index,
            status = ?next.status,
            next_send_at = ?next.next_send_at,
            "Run updated"
        );

        self.repos.runs.update_run(&next).await?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use cadence_common::model::{RunStatus, SkipReason};
    use chrono::TimeZone;

    use super::*;

    fn run(id: &str, steps: Vec<Step>) -> SequenceRun {
        SequenceRun {
            id: id.into(),
            sequence_id: "seq".into(),
            contact_id: "contact".into(),
            account_id: "acct".into(),
            campaign_id: None,
            current_step_index: 0,
            status: RunStatus::Running,
            hold: None,
            stop: None,
            next_send_at: None,
            variables: BTreeMap::new(),
            history: Vec::new(),
            steps,
            consecutive_failures: 0,
            flagged_for_review: false,
            enrolled_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_variant_is_stable_per_run() {
        let step = Step::email("s1", "a", 0).with_variant("b").with_variant("c");
        let first = run("run-1", vec![step.clone()]);

        let (template, label) = Scheduler::pick_template(&first, &step);
        assert_eq!(Scheduler::pick_template(&first, &step).0, template);
        assert_eq!(label.as_deref(), Some(template.as_str()));

        let picked: std::collections::BTreeSet<_> = (0..30)
            .map(|i| Scheduler::pick_template(&run(&format!("run-{i}"), vec![step.clone()]), &step).0)
            .collect();
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn test_no_variants_means_no_label() {
        let step = Step::email("s1", "a", 0);
        let (template, label) = Scheduler::pick_template(&run("r", vec![step.clone()]), &step);

        assert_eq!(template.as_str(), "a");
        assert!(label.is_none());
    }

    #[test]
    fn test_reconcile_fast_forwards() {
        let steps = vec![Step::email("s1", "t1", 0), Step::email("s2", "t2", 2)];
        let current = run("r", steps);
        let sent_at = Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap();

        assert!(Scheduler::reconcile(&current, &[]).is_none());

        let history = vec![SendLog::sent(&current, sent_at, "p1")];
        let next = Scheduler::reconcile(&current, &history).unwrap();
        assert_eq!(next.current_step_index, 1);
        assert_eq!(next.next_send_at, Some(sent_at + chrono::Duration::days(2)));

        let mut finished = next.clone();
        let history = vec![
            history[0].clone(),
            SendLog::sent(&finished, sent_at, "p2"),
        ];
        finished.current_step_index = 0;
        let done = Scheduler::reconcile(&finished, &history).unwrap();
        assert_eq!(done.status, RunStatus::Stopped);
        assert_eq!(done.stop, Some(StopReason::Completed));

        let skipped = vec![SendLog::skipped(&current, sent_at, SkipReason::QuietHours)];
        assert!(Scheduler::reconcile(&current, &skipped).is_none());
    }
}
