//! Campaign and run operations
//!
//! These are the operator-facing entry points. None of them sends anything;
//! changes are picked up by the scheduler on its next tick.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use cadence_common::{
    AccountId, CampaignId, Clock, ContactId, RunId, SequenceId, internal,
    model::{CampaignPolicy, CampaignStatus, RunStatus, SendLog, SequenceRun, SkipReason, Step},
};
use cadence_store::Repositories;
use chrono::{DateTime, Utc};

use crate::{
    error::DeliveryError,
    policy::{RetryPolicy, validate},
    run_state::{self, schedule},
};

#[derive(Debug, Clone)]
pub struct CampaignManager {
    repos: Repositories,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl CampaignManager {
    #[must_use]
    pub fn new(repos: Repositories, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        Self {
            repos,
            clock,
            retry,
        }
    }

    /// Validate a campaign, enroll every member of its list that is not
    /// already enrolled, and set it running.
    ///
    /// Returns the number of runs created. Activating a running campaign again
    /// enrolls contacts added to the list since.
    ///
    /// # Errors
    /// If the campaign or its sequence does not exist, the sequence has no
    /// steps, or the policy is invalid
    pub async fn activate(&self, id: &CampaignId) -> Result<usize, DeliveryError> {
        let mut campaign = self
            .repos
            .campaigns
            .get_campaign(id)
            .await
            .map_err(DeliveryError::from_lookup)?;

        let sequence = self
            .repos
            .sequences
            .get_sequence(&campaign.sequence_id)
            .await
            .map_err(DeliveryError::from_lookup)?;
        if sequence.steps.is_empty() {
            return Err(DeliveryError::EmptySequence(sequence.id));
        }

        validate(&campaign.policy, &sequence.steps)?;

        let enrolled: BTreeSet<ContactId> = self
            .repos
            .runs
            .runs_for_campaign(id)
            .await?
            .into_iter()
            .map(|run| run.contact_id)
            .collect();

        let now = self.clock.now();
        let mut created = 0;
        for contact in self.repos.contacts.list_members(&campaign.list_id).await? {
            if enrolled.contains(&contact.id) {
                continue;
            }

            let run = new_run(
                contact.id,
                &sequence.id,
                &sequence.steps,
                &campaign.account_id,
                Some(id),
                BTreeMap::new(),
                now,
            );
            self.repos.runs.insert_run(&run).await?;
            created += 1;
        }

        campaign.status = CampaignStatus::Running;
        self.repos.campaigns.put_campaign(&campaign).await?;

        internal!(
            level = INFO,
            "Campaign {id} activated, {created} contacts enrolled"
        );

        Ok(created)
    }

    /// Stop a running campaign from sending. Its runs are left as they are.
    ///
    /// # Errors
    /// If the campaign does not exist or is not running
    pub async fn pause(&self, id: &CampaignId) -> Result<(), DeliveryError> {
        self.set_status(id, CampaignStatus::Running, CampaignStatus::Paused)
            .await
    }

    /// # Errors
    /// If the campaign does not exist or is not paused
    pub async fn resume(&self, id: &CampaignId) -> Result<(), DeliveryError> {
        self.set_status(id, CampaignStatus::Paused, CampaignStatus::Running)
            .await
    }

    async fn set_status(
        &self,
        id: &CampaignId,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<(), DeliveryError> {
        let mut campaign = self
            .repos
            .campaigns
            .get_campaign(id)
            .await
            .map_err(DeliveryError::from_lookup)?;

        if campaign.status != from {
            return Err(DeliveryError::InvalidState(format!(
                "campaign {id} is {:?}, expected {from:?}",
                campaign.status
            )));
        }

        campaign.status = to;
        self.repos.campaigns.put_campaign(&campaign).await?;

        internal!(level = INFO, "Campaign {id} is now {to:?}");

        Ok(())
    }

    /// Start `contact` on `sequence`, outside of any list activation
    ///
    /// A run enrolled with a `campaign` is gated by that campaign's policy.
    ///
    /// # Errors
    /// If the contact, sequence or campaign does not exist, the sequence has
    /// no steps, or the policy is invalid for them
    pub async fn enroll(
        &self,
        contact: &ContactId,
        sequence: &SequenceId,
        account: &AccountId,
        campaign: Option<&CampaignId>,
        variables: BTreeMap<String, String>,
    ) -> Result<SequenceRun, DeliveryError> {
        let contact = self
            .repos
            .contacts
            .get_contact(contact)
            .await
            .map_err(DeliveryError::from_lookup)?;

        let sequence = self
            .repos
            .sequences
            .get_sequence(sequence)
            .await
            .map_err(DeliveryError::from_lookup)?;
        if sequence.steps.is_empty() {
            return Err(DeliveryError::EmptySequence(sequence.id));
        }

        let policy = match campaign {
            Some(id) => {
                self.repos
                    .campaigns
                    .get_campaign(id)
                    .await
                    .map_err(DeliveryError::from_lookup)?
                    .policy
            }
            None => CampaignPolicy::default(),
        };
        validate(&policy, &sequence.steps)?;

        let run = new_run(
            contact.id,
            &sequence.id,
            &sequence.steps,
            account,
            campaign,
            variables,
            self.clock.now(),
        );
        self.repos.runs.insert_run(&run).await?;

        internal!(
            level = DEBUG,
            "Run {} enrolled contact {} on sequence {}, first step due {:?}",
            run.id,
            run.contact_id,
            run.sequence_id,
            run.next_send_at
        );

        Ok(run)
    }

    /// # Errors
    /// If the run does not exist or is not running
    pub async fn pause_run(&self, id: &RunId) -> Result<SequenceRun, DeliveryError> {
        self.update_run(id, run_state::pause).await
    }

    /// # Errors
    /// If the run does not exist, is not paused, or waits on a manual task
    pub async fn resume_run(&self, id: &RunId) -> Result<SequenceRun, DeliveryError> {
        self.update_run(id, run_state::resume).await
    }

    /// # Errors
    /// If the run does not exist or is already stopped
    pub async fn stop_run(&self, id: &RunId) -> Result<SequenceRun, DeliveryError> {
        self.update_run(id, run_state::stop).await
    }

    /// Mark the manual task a run is held on as done. The run moves to its
    /// next step and resumes.
    ///
    /// # Errors
    /// If the run does not exist or is not held on a manual task
    pub async fn complete_manual_task(&self, id: &RunId) -> Result<SequenceRun, DeliveryError> {
        let run = self.load_run(id).await?;
        let now = self.clock.now();

        let next = run_state::complete_manual_task(&run, now, &self.retry)?;

        self.repos
            .send_log
            .append_log(&SendLog::skipped(&run, now, SkipReason::TaskCompleted))
            .await?;
        self.repos.runs.update_run(&next).await?;

        Ok(next)
    }

    async fn update_run(
        &self,
        id: &RunId,
        apply: fn(&SequenceRun) -> Result<SequenceRun, DeliveryError>,
    ) -> Result<SequenceRun, DeliveryError> {
        let run = self.load_run(id).await?;
        let next = apply(&run)?;
        self.repos.runs.update_run(&next).await?;

        internal!(
            level = INFO,
            "Run {id} changed from {:?} to {:?}",
            run.status,
            next.status
        );

        Ok(next)
    }

    async fn load_run(&self, id: &RunId) -> Result<SequenceRun, DeliveryError> {
        self.repos
            .runs
            .get_run(id)
            .await
            .map_err(DeliveryError::from_lookup)
    }
}

/// A fresh run at the first step of `steps`, which must not be empty
fn new_run(
    contact_id: ContactId,
    sequence_id: &SequenceId,
    steps: &[Step],
    account_id: &AccountId,
    campaign_id: Option<&CampaignId>,
    variables: BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> SequenceRun {
    SequenceRun {
        id: RunId::generate(),
        sequence_id: sequence_id.clone(),
        contact_id,
        account_id: account_id.clone(),
        campaign_id: campaign_id.cloned(),
        current_step_index: 0,
        status: RunStatus::Running,
        hold: None,
        stop: None,
        next_send_at: steps.first().map(|step| schedule(step, now)),
        variables,
        history: Vec::new(),
        steps: steps.to_vec(),
        consecutive_failures: 0,
        flagged_for_review: false,
        enrolled_at: now,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cadence_common::{
        ManualClock,
        model::{Campaign, CampaignPolicy, Contact, HoldReason, QuietHours, Sequence, StopReason},
    };
    use cadence_store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::PolicyError;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
    }

    async fn manager() -> (CampaignManager, Repositories) {
        let repos = Repositories::from_store(&Arc::new(MemoryStore::new()));

        repos
            .sequences
            .put_sequence(&Sequence::new(
                "seq",
                vec![Step::email("s1", "t1", 1), Step::manual_task("s2", "Call them", 0)],
            ))
            .await
            .unwrap();
        repos
            .sequences
            .put_sequence(&Sequence::new("empty", Vec::new()))
            .await
            .unwrap();

        for id in ["c1", "c2"] {
            repos
                .contacts
                .put_contact(&Contact::new(id, id, Some("x@example.com")).in_list("list"))
                .await
                .unwrap();
        }

        repos
            .campaigns
            .put_campaign(&Campaign::new("camp", "seq", "list", "acct"))
            .await
            .unwrap();

        let manager = CampaignManager::new(
            repos.clone(),
            Arc::new(ManualClock::new(t0())),
            RetryPolicy::default(),
        );

        (manager, repos)
    }

    #[tokio::test]
    async fn test_activate_enrolls_list_once() {
        let (manager, repos) = manager().await;
        let id = CampaignId::new("camp");

        assert_eq!(manager.activate(&id).await.unwrap(), 2);

        let runs = repos.runs.runs_for_campaign(&id).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|run| run.next_send_at == Some(t0() + Duration::days(1))));
        assert!(runs.iter().all(|run| run.steps.len() == 2));

        let campaign = repos.campaigns.get_campaign(&id).await.unwrap();
        assert!(campaign.is_running());

        // A late joiner is picked up by a second activation
        repos
            .contacts
            .put_contact(&Contact::new("c3", "c3", Some("y@example.com")).in_list("list"))
            .await
            .unwrap();
        assert_eq!(manager.activate(&id).await.unwrap(), 1);
        assert_eq!(repos.runs.runs_for_campaign(&id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_activate_rejects_bad_configuration() {
        let (manager, repos) = manager().await;

        let bad_policy = Campaign::new("bad", "seq", "list", "acct").with_policy(CampaignPolicy {
            throttle_per_hour: None,
            quiet_hours: Some(QuietHours::new(25, 3)),
        });
        repos.campaigns.put_campaign(&bad_policy).await.unwrap();
        assert!(matches!(
            manager.activate(&CampaignId::new("bad")).await,
            Err(DeliveryError::Policy(PolicyError::HourOutOfRange(25)))
        ));

        let empty = Campaign::new("empty", "empty", "list", "acct");
        repos.campaigns.put_campaign(&empty).await.unwrap();
        assert!(matches!(
            manager.activate(&CampaignId::new("empty")).await,
            Err(DeliveryError::EmptySequence(_))
        ));

        assert!(matches!(
            manager.activate(&CampaignId::new("missing")).await,
            Err(DeliveryError::NotFound(_))
        ));

        // Nothing was enrolled or started
        let bad = repos.campaigns.get_campaign(&CampaignId::new("bad")).await.unwrap();
        assert_eq!(bad.status, CampaignStatus::Draft);
        assert!(repos.runs.list_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pause_and_resume_campaign() {
        let (manager, repos) = manager().await;
        let id = CampaignId::new("camp");

        assert!(manager.pause(&id).await.is_err());

        manager.activate(&id).await.unwrap();
        manager.pause(&id).await.unwrap();
        assert_eq!(
            repos.campaigns.get_campaign(&id).await.unwrap().status,
            CampaignStatus::Paused
        );
        assert!(manager.pause(&id).await.is_err());

        manager.resume(&id).await.unwrap();
        assert!(repos.campaigns.get_campaign(&id).await.unwrap().is_running());
    }

    #[tokio::test]
    async fn test_enroll_and_run_controls() {
        let (manager, repos) = manager().await;

        let variables = BTreeMap::from([("offer".to_string(), "20%".to_string())]);
        let run = manager
            .enroll(
                &ContactId::new("c1"),
                &SequenceId::new("seq"),
                &AccountId::new("acct"),
                None,
                variables,
            )
            .await
            .unwrap();
        assert_eq!(run.variables["offer"], "20%");
        assert_eq!(run.enrolled_at, t0());

        assert!(matches!(
            manager
                .enroll(
                    &ContactId::new("c1"),
                    &SequenceId::new("empty"),
                    &AccountId::new("acct"),
                    None,
                    BTreeMap::new(),
                )
                .await,
            Err(DeliveryError::EmptySequence(_))
        ));

        let paused = manager.pause_run(&run.id).await.unwrap();
        assert_eq!(paused.hold, Some(HoldReason::Operator));
        let resumed = manager.resume_run(&run.id).await.unwrap();
        assert_eq!(resumed.next_send_at, run.next_send_at);

        let stopped = manager.stop_run(&run.id).await.unwrap();
        assert_eq!(stopped.stop, Some(StopReason::Operator));
        assert_eq!(repos.runs.get_run(&run.id).await.unwrap(), stopped);
        assert!(manager.resume_run(&run.id).await.is_err());
    }

    #[tokio::test]
    async fn test_enroll_checks_the_campaign() {
        let (manager, repos) = manager().await;
        let enroll = |sequence: &'static str, campaign: &'static str| {
            let manager = manager.clone();
            async move {
                manager
                    .enroll(
                        &ContactId::new("c1"),
                        &SequenceId::new(sequence),
                        &AccountId::new("acct"),
                        Some(&CampaignId::new(campaign)),
                        BTreeMap::new(),
                    )
                    .await
            }
        };

        assert!(matches!(
            enroll("seq", "missing").await,
            Err(DeliveryError::NotFound(_))
        ));

        let zero = Campaign::new("zero", "seq", "list", "acct").with_policy(CampaignPolicy {
            throttle_per_hour: Some(0),
            quiet_hours: None,
        });
        repos.campaigns.put_campaign(&zero).await.unwrap();
        assert!(matches!(
            enroll("seq", "zero").await,
            Err(DeliveryError::Policy(PolicyError::ZeroThrottle))
        ));

        repos
            .sequences
            .put_sequence(&Sequence::new(
                "far",
                vec![Step::email("s1", "t1", 0), Step::email("s2", "t2", u32::MAX)],
            ))
            .await
            .unwrap();
        assert!(matches!(
            enroll("far", "camp").await,
            Err(DeliveryError::Policy(PolicyError::DayOffsetTooLarge(_, u32::MAX)))
        ));

        assert!(repos.runs.list_runs().await.unwrap().is_empty());
        assert!(enroll("seq", "camp").await.is_ok());
    }

    #[tokio::test]
    async fn test_complete_manual_task_logs_completion() {
        let (manager, repos) = manager().await;
        let run = manager
            .enroll(
                &ContactId::new("c1"),
                &SequenceId::new("seq"),
                &AccountId::new("acct"),
                None,
                BTreeMap::new(),
            )
            .await
            .unwrap();

        assert!(manager.complete_manual_task(&run.id).await.is_err());

        let mut held = run.clone();
        held.current_step_index = 1;
        held.status = RunStatus::Paused;
        held.hold = Some(HoldReason::ManualTask);
        repos.runs.update_run(&held).await.unwrap();

        let done = manager.complete_manual_task(&run.id).await.unwrap();
        assert_eq!(done.status, RunStatus::Stopped);
        assert_eq!(done.stop, Some(StopReason::Completed));

        let logs = repos.send_log.logs_for_run(&run.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].skip_reason, Some(SkipReason::TaskCompleted));
        assert_eq!(logs[0].step_index, 1);
    }
}
