//! Repository traits
//!
//! Every collaborator of the scheduler is reached through one of these traits
//! so tests and the binary can inject whichever backend they need. Lookups
//! of a single record by id fail with [`StoreError::NotFound`] when absent.
//!
//! [`StoreError::NotFound`]: crate::StoreError::NotFound

use std::sync::Arc;

use async_trait::async_trait;
use cadence_common::{
    CampaignId, ContactId, ListId, OutboxId, RunId, SequenceId, TemplateId,
    model::{
        Campaign, CampaignMetrics, Contact, OutboxMessage, Sequence, SequenceRun, SendLog,
        SuppressionEntry, SuppressionReason, Template,
    },
};
use chrono::{DateTime, Utc};

use crate::Result;

#[async_trait]
pub trait RunRepo: Send + Sync + std::fmt::Debug {
    /// Store a new run
    ///
    /// # Errors
    /// If a run with the same id exists, or the store cannot be written
    async fn insert_run(&self, run: &SequenceRun) -> Result<()>;

    /// # Errors
    /// If the run does not exist
    async fn get_run(&self, id: &RunId) -> Result<SequenceRun>;

    /// Replace a stored run
    ///
    /// # Errors
    /// If the run does not exist, or the store cannot be written
    async fn update_run(&self, run: &SequenceRun) -> Result<()>;

    /// # Errors
    /// If the store cannot be read
    async fn list_runs(&self) -> Result<Vec<SequenceRun>>;

    /// Running runs whose `next_send_at` is unset or not after `now`, ordered
    /// by `(enrolled_at, id)`
    ///
    /// # Errors
    /// If the store cannot be read
    async fn due_runs(&self, now: DateTime<Utc>) -> Result<Vec<SequenceRun>>;

    /// # Errors
    /// If the store cannot be read
    async fn runs_for_campaign(&self, campaign: &CampaignId) -> Result<Vec<SequenceRun>>;
}

#[async_trait]
pub trait CampaignRepo: Send + Sync + std::fmt::Debug {
    /// Insert or replace a campaign
    ///
    /// # Errors
    /// If the store cannot be written
    async fn put_campaign(&self, campaign: &Campaign) -> Result<()>;

    /// # Errors
    /// If the campaign does not exist
    async fn get_campaign(&self, id: &CampaignId) -> Result<Campaign>;

    /// # Errors
    /// If the store cannot be read
    async fn list_campaigns(&self) -> Result<Vec<Campaign>>;

    /// Add `delta` to the campaign's counters in place
    ///
    /// # Errors
    /// If the campaign does not exist, or the store cannot be written
    async fn add_campaign_metrics(&self, id: &CampaignId, delta: &CampaignMetrics) -> Result<()>;
}

#[async_trait]
pub trait SequenceRepo: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// If the store cannot be written
    async fn put_sequence(&self, sequence: &Sequence) -> Result<()>;

    /// # Errors
    /// If the sequence does not exist
    async fn get_sequence(&self, id: &SequenceId) -> Result<Sequence>;

    /// # Errors
    /// If the store cannot be read
    async fn list_sequences(&self) -> Result<Vec<Sequence>>;
}

#[async_trait]
pub trait TemplateRepo: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// If the store cannot be written
    async fn put_template(&self, template: &Template) -> Result<()>;

    /// # Errors
    /// If the template does not exist
    async fn get_template(&self, id: &TemplateId) -> Result<Template>;

    /// # Errors
    /// If the template does not exist, or the store cannot be written
    async fn delete_template(&self, id: &TemplateId) -> Result<()>;
}

#[async_trait]
pub trait ContactRepo: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// If the store cannot be written
    async fn put_contact(&self, contact: &Contact) -> Result<()>;

    /// # Errors
    /// If the contact does not exist
    async fn get_contact(&self, id: &ContactId) -> Result<Contact>;

    /// Contacts belonging to `list`, ordered by id
    ///
    /// # Errors
    /// If the store cannot be read
    async fn list_members(&self, list: &ListId) -> Result<Vec<Contact>>;

    /// # Errors
    /// If the store cannot be read
    async fn list_contacts(&self) -> Result<Vec<Contact>>;
}

/// The append-only record of every step attempt
#[async_trait]
pub trait SendLogRepo: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// If the store cannot be written
    async fn append_log(&self, log: &SendLog) -> Result<()>;

    /// Entries for a run in the order they were appended
    ///
    /// # Errors
    /// If the store cannot be read
    async fn logs_for_run(&self, run: &RunId) -> Result<Vec<SendLog>>;

    /// # Errors
    /// If the store cannot be read
    async fn logs_for_contact(&self, contact: &ContactId) -> Result<Vec<SendLog>>;

    /// # Errors
    /// If the store cannot be read
    async fn log_by_tracking_id(&self, tracking_id: &str) -> Result<Option<SendLog>>;

    /// Number of `sent` entries for `campaign` at or after `since`
    ///
    /// # Errors
    /// If the store cannot be read
    async fn count_sent_since(&self, campaign: &CampaignId, since: DateTime<Utc>) -> Result<u32>;

    /// Whether `contact` replied to anything sent under `campaign`
    ///
    /// # Errors
    /// If the store cannot be read
    async fn has_reply(&self, contact: &ContactId, campaign: Option<&CampaignId>) -> Result<bool>;

    /// Whether `contact` unsubscribed through any send
    ///
    /// # Errors
    /// If the store cannot be read
    async fn has_unsubscribe(&self, contact: &ContactId) -> Result<bool>;

    /// Replace an entry's engagement fields. Only counters and flags change.
    ///
    /// # Errors
    /// If the entry does not exist, or the store cannot be written
    async fn update_log(&self, log: &SendLog) -> Result<()>;
}

/// Addresses that must never be sent to again, shared across campaigns
#[async_trait]
pub trait SuppressionRegistry: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// If the store cannot be read
    async fn is_suppressed(&self, email: &str) -> Result<bool>;

    /// Suppress `email`. Returns `true` when the address was not already
    /// suppressed; an existing entry keeps its original reason.
    ///
    /// # Errors
    /// If the store cannot be written
    async fn suppress(
        &self,
        email: &str,
        reason: SuppressionReason,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// # Errors
    /// If the store cannot be read
    async fn suppression(&self, email: &str) -> Result<Option<SuppressionEntry>>;

    /// # Errors
    /// If the store cannot be read
    async fn list_suppressions(&self) -> Result<Vec<SuppressionEntry>>;
}

#[async_trait]
pub trait OutboxRepo: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// If a message with the same id exists, or the store cannot be written
    async fn insert_outbox(&self, message: &OutboxMessage) -> Result<()>;

    /// # Errors
    /// If the message does not exist, or the store cannot be written
    async fn update_outbox(&self, message: &OutboxMessage) -> Result<()>;

    /// # Errors
    /// If the message does not exist
    async fn get_outbox(&self, id: &OutboxId) -> Result<OutboxMessage>;

    /// # Errors
    /// If the store cannot be read
    async fn outbox_for_run(&self, run: &RunId) -> Result<Vec<OutboxMessage>>;
}

/// Every repository the engine needs, injected as one value
#[derive(Debug, Clone)]
pub struct Repositories {
    pub runs: Arc<dyn RunRepo>,
    pub campaigns: Arc<dyn CampaignRepo>,
    pub sequences: Arc<dyn SequenceRepo>,
    pub templates: Arc<dyn TemplateRepo>,
    pub contacts: Arc<dyn ContactRepo>,
    pub send_log: Arc<dyn SendLogRepo>,
    pub suppression: Arc<dyn SuppressionRegistry>,
    pub outbox: Arc<dyn OutboxRepo>,
}

impl Repositories {
    /// Serve every repository from a single backend
    pub fn from_store<S>(store: &Arc<S>) -> Self
    where
        S: RunRepo
            + CampaignRepo
            + SequenceRepo
            + TemplateRepo
            + ContactRepo
            + SendLogRepo
            + SuppressionRegistry
            + OutboxRepo
            + 'static,
    {
        Self {
            runs: store.clone(),
            campaigns: store.clone(),
            sequences: store.clone(),
            templates: store.clone(),
            contacts: store.clone(),
            send_log: store.clone(),
            suppression: store.clone(),
            outbox: store.clone(),
        }
    }
}
