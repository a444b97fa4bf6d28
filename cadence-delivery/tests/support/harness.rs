//! A scheduler wired to an in-memory store and a hand-moved clock
#![allow(dead_code)] // Test utility module - not all methods used in every test
#![allow(clippy::unwrap_used)]

use std::{collections::BTreeMap, sync::Arc};

use cadence_common::{
    CampaignId, ContactId, ManualClock,
    model::{Account, Campaign, Contact, Sequence, SequenceRun, SendLog, Step, Template},
};
use cadence_delivery::{
    AdapterRegistry, CampaignManager, EngagementRecorder, Scheduler, SchedulerConfig, TickReport,
};
use cadence_store::{MemoryStore, Repositories};
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::{FaultyLog, ScriptedAdapter};

/// Monday 2024-06-03 10:00 UTC
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
}

pub struct Harness {
    pub repos: Repositories,
    pub clock: ManualClock,
    pub adapter: Arc<ScriptedAdapter>,
    /// The send log every repository user sees
    pub log: Arc<FaultyLog>,
    pub scheduler: Scheduler,
    pub campaigns: CampaignManager,
    pub engagement: EngagementRecorder,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Accounts: `acct` sends through the scripted adapter, `dry` is a dry-run
    /// account.
    pub fn with_config(config: SchedulerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(FaultyLog::new(store.clone()));
        let mut repos = Repositories::from_store(&store);
        repos.send_log = log.clone();
        let clock = ManualClock::new(t0());
        let adapter = Arc::new(ScriptedAdapter::default());
        adapter.attach(repos.clone());

        let mut sender = Account::new("acct");
        sender.from = Some("sales@example.com".to_string());
        let adapters = AdapterRegistry::new(adapter.clone())
            .with_account(sender)
            .with_account(Account::new("dry").dry_run());

        let campaigns =
            CampaignManager::new(repos.clone(), Arc::new(clock.clone()), config.retry.clone());
        let engagement = EngagementRecorder::new(repos.clone(), Arc::new(clock.clone()));
        let scheduler = Scheduler::new(config, repos.clone(), adapters, Arc::new(clock.clone()));

        Self {
            repos,
            clock,
            adapter,
            log,
            scheduler,
            campaigns,
            engagement,
        }
    }

    pub async fn template(&self, id: &str, subject: &str, body: &str) {
        self.repos
            .templates
            .put_template(&Template::new(id, subject, body))
            .await
            .unwrap();
    }

    pub async fn sequence(&self, id: &str, steps: Vec<Step>) {
        self.repos
            .sequences
            .put_sequence(&Sequence::new(id, steps))
            .await
            .unwrap();
    }

    /// A contact on list `list`
    pub async fn contact(&self, id: &str, email: Option<&str>) {
        self.repos
            .contacts
            .put_contact(&Contact::new(id, format!("Contact {id}"), email).in_list("list"))
            .await
            .unwrap();
    }

    /// Store `campaign` and activate it
    pub async fn launch(&self, campaign: Campaign) -> usize {
        let id = campaign.id.clone();
        self.repos.campaigns.put_campaign(&campaign).await.unwrap();
        self.campaigns.activate(&id).await.unwrap()
    }

    /// Enroll `contact` on `sequence` outside any campaign
    pub async fn enroll(&self, contact: &str, sequence: &str, account: &str) -> SequenceRun {
        self.campaigns
            .enroll(
                &contact.into(),
                &sequence.into(),
                &account.into(),
                None,
                BTreeMap::new(),
            )
            .await
            .unwrap()
    }

    pub async fn tick(&self) -> TickReport {
        self.scheduler.tick().await
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn campaign(&self, id: &str) -> Campaign {
        self.repos
            .campaigns
            .get_campaign(&CampaignId::new(id))
            .await
            .unwrap()
    }

    /// The single run of `contact`
    pub async fn run_of(&self, contact: &str) -> SequenceRun {
        let contact = ContactId::new(contact);
        let runs: Vec<_> = self
            .repos
            .runs
            .list_runs()
            .await
            .unwrap()
            .into_iter()
            .filter(|run| run.contact_id == contact)
            .collect();

        assert_eq!(runs.len(), 1, "expected one run for {contact}");
        runs.into_iter().next().unwrap()
    }

    pub async fn logs_of(&self, contact: &str) -> Vec<SendLog> {
        self.repos
            .send_log
            .logs_for_contact(&ContactId::new(contact))
            .await
            .unwrap()
    }
}
