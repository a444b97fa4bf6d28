use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use cadence_common::{
    CampaignId, ContactId, ListId, OutboxId, RunId, SequenceId, TemplateId,
    model::{
        Campaign, CampaignMetrics, Contact, OutboxMessage, Sequence, SequenceRun, SendLog,
        SendStatus, SuppressionEntry, SuppressionReason, Template, normalize_email,
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::file::Snapshot;
use crate::{
    Result, StoreError,
    repository::{
        CampaignRepo, ContactRepo, OutboxRepo, RunRepo, SendLogRepo, SequenceRepo,
        SuppressionRegistry, TemplateRepo,
    },
};

/// Everything the store holds
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct State {
    /// Bumped on every change, so snapshots can be ordered
    pub(crate) generation: u64,
    pub(crate) runs: BTreeMap<RunId, SequenceRun>,
    pub(crate) campaigns: BTreeMap<CampaignId, Campaign>,
    pub(crate) sequences: BTreeMap<SequenceId, Sequence>,
    pub(crate) templates: BTreeMap<TemplateId, Template>,
    pub(crate) contacts: BTreeMap<ContactId, Contact>,
    pub(crate) send_log: Vec<SendLog>,
    pub(crate) suppressions: BTreeMap<String, SuppressionEntry>,
    pub(crate) outbox: BTreeMap<OutboxId, OutboxMessage>,
}

/// In-memory store implementing every repository
///
/// All records live in a single `State` behind an `RwLock`. When opened with
/// [`MemoryStore::open`] the state is also snapshotted to a file after every
/// change, and restored from it on the next open.
///
/// # Concurrency
/// Each operation takes the lock once, so every operation is atomic with
/// respect to the others. The lock is never held across an `.await`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub(crate) state: Arc<RwLock<State>>,
    pub(crate) snapshot: Option<Arc<Snapshot>>,
}

impl MemoryStore {
    /// Create a new, empty, purely in-memory store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether changes are written to a snapshot file
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.snapshot.is_some()
    }

    fn read<T>(&self, f: impl FnOnce(&State) -> T) -> Result<T> {
        Ok(f(&*self.state.read()?))
    }

    /// Apply `f` to the state, then write a snapshot if one is configured.
    ///
    /// The state is encoded while the lock is held; the write itself happens
    /// after it is released.
    async fn mutate<T>(&self, f: impl FnOnce(&mut State) -> Result<T> + Send) -> Result<T> {
        let (value, pending) = {
            let mut state = self.state.write()?;
            let value = f(&mut state)?;
            state.generation += 1;

            let pending = match &self.snapshot {
                Some(_) => Some((state.generation, Snapshot::encode(&state)?)),
                None => None,
            };

            (value, pending)
        };

        if let (Some(snapshot), Some((generation, bytes))) = (&self.snapshot, pending) {
            snapshot.write(generation, bytes).await?;
        }

        Ok(value)
    }
}

#[async_trait]
impl RunRepo for MemoryStore {
    async fn insert_run(&self, run: &SequenceRun) -> Result<()> {
        self.mutate(|state| {
            if state.runs.contains_key(&run.id) {
                return Err(StoreError::already_exists("run", &run.id));
            }
            state.runs.insert(run.id.clone(), run.clone());
            Ok(())
        })
        .await
    }

    async fn get_run(&self, id: &RunId) -> Result<SequenceRun> {
        self.read(|state| state.runs.get(id).cloned())?
            .ok_or_else(|| StoreError::not_found("run", id))
    }

    async fn update_run(&self, run: &SequenceRun) -> Result<()> {
        self.mutate(|state| match state.runs.get_mut(&run.id) {
            Some(stored) => {
                *stored = run.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("run", &run.id)),
        })
        .await
    }

    async fn list_runs(&self) -> Result<Vec<SequenceRun>> {
        self.read(|state| state.runs.values().cloned().collect())
    }

    async fn due_runs(&self, now: DateTime<Utc>) -> Result<Vec<SequenceRun>> {
        let mut due: Vec<_> = self.read(|state| {
            state
                .runs
                .values()
                .filter(|run| run.is_due(now))
                .cloned()
                .collect()
        })?;

        due.sort_by(|a, b| (a.enrolled_at, &a.id).cmp(&(b.enrolled_at, &b.id)));

        Ok(due)
    }

    async fn runs_for_campaign(&self, campaign: &CampaignId) -> Result<Vec<SequenceRun>> {
        self.read(|state| {
            state
                .runs
                .values()
                .filter(|run| run.campaign_id.as_ref() == Some(campaign))
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl CampaignRepo for MemoryStore {
    async fn put_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.mutate(|state| {
            state.campaigns.insert(campaign.id.clone(), campaign.clone());
            Ok(())
        })
        .await
    }

    async fn get_campaign(&self, id: &CampaignId) -> Result<Campaign> {
        self.read(|state| state.campaigns.get(id).cloned())?
            .ok_or_else(|| StoreError::not_found("campaign", id))
    }

    async fn list_campaigns(&self) -> Result<Vec<Campaign>> {
        self.read(|state| state.campaigns.values().cloned().collect())
    }

    async fn add_campaign_metrics(&self, id: &CampaignId, delta: &CampaignMetrics) -> Result<()> {
        self.mutate(|state| match state.campaigns.get_mut(id) {
            Some(campaign) => {
                campaign.metrics.absorb(delta);
                Ok(())
            }
            None => Err(StoreError::not_found("campaign", id)),
        })
        .await
    }
}

#[async_trait]
impl SequenceRepo for MemoryStore {
    async fn put_sequence(&self, sequence: &Sequence) -> Result<()> {
        self.mutate(|state| {
            state.sequences.insert(sequence.id.clone(), sequence.clone());
            Ok(())
        })
        .await
    }

    async fn get_sequence(&self, id: &SequenceId) -> Result<Sequence> {
        self.read(|state| state.sequences.get(id).cloned())?
            .ok_or_else(|| StoreError::not_found("sequence", id))
    }

    async fn list_sequences(&self) -> Result<Vec<Sequence>> {
        self.read(|state| state.sequences.values().cloned().collect())
    }
}

#[async_trait]
impl TemplateRepo for MemoryStore {
    async fn put_template(&self, template: &Template) -> Result<()> {
        self.mutate(|state| {
            state.templates.insert(template.id.clone(), template.clone());
            Ok(())
        })
        .await
    }

    async fn get_template(&self, id: &TemplateId) -> Result<Template> {
        self.read(|state| state.templates.get(id).cloned())?
            .ok_or_else(|| StoreError::not_found("template", id))
    }

    async fn delete_template(&self, id: &TemplateId) -> Result<()> {
        self.mutate(|state| {
            state
                .templates
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| StoreError::not_found("template", id))
        })
        .await
    }
}

#[async_trait]
impl ContactRepo for MemoryStore {
    async fn put_contact(&self, contact: &Contact) -> Result<()> {
        self.mutate(|state| {
            state.contacts.insert(contact.id.clone(), contact.clone());
            Ok(())
        })
        .await
    }

    async fn get_contact(&self, id: &ContactId) -> Result<Contact> {
        self.read(|state| state.contacts.get(id).cloned())?
            .ok_or_else(|| StoreError::not_found("contact", id))
    }

    async fn list_members(&self, list: &ListId) -> Result<Vec<Contact>> {
        self.read(|state| {
            state
                .contacts
                .values()
                .filter(|contact| contact.lists.contains(list))
                .cloned()
                .collect()
        })
    }

    async fn list_contacts(&self) -> Result<Vec<Contact>> {
        self.read(|state| state.contacts.values().cloned().collect())
    }
}

#[async_trait]
impl SendLogRepo for MemoryStore {
    async fn append_log(&self, log: &SendLog) -> Result<()> {
        self.mutate(|state| {
            state.send_log.push(log.clone());
            Ok(())
        })
        .await
    }

    async fn logs_for_run(&self, run: &RunId) -> Result<Vec<SendLog>> {
        self.read(|state| {
            state
                .send_log
                .iter()
                .filter(|log| log.run_id == *run)
                .cloned()
                .collect()
        })
    }

    async fn logs_for_contact(&self, contact: &ContactId) -> Result<Vec<SendLog>> {
        self.read(|state| {
            state
                .send_log
                .iter()
                .filter(|log| log.contact_id == *contact)
                .cloned()
                .collect()
        })
    }

    async fn log_by_tracking_id(&self, tracking_id: &str) -> Result<Option<SendLog>> {
        self.read(|state| {
            state
                .send_log
                .iter()
                .find(|log| log.tracking_id.as_deref() == Some(tracking_id))
                .cloned()
        })
    }

    async fn count_sent_since(&self, campaign: &CampaignId, since: DateTime<Utc>) -> Result<u32> {
        let count = self.read(|state| {
            state
                .send_log
                .iter()
                .filter(|log| {
                    log.status == SendStatus::Sent
                        && log.campaign_id.as_ref() == Some(campaign)
                        && log.at >= since
                })
                .count()
        })?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn has_reply(&self, contact: &ContactId, campaign: Option<&CampaignId>) -> Result<bool> {
        self.read(|state| {
            state.send_log.iter().any(|log| {
                log.replied && log.contact_id == *contact && log.campaign_id.as_ref() == campaign
            })
        })
    }

    async fn has_unsubscribe(&self, contact: &ContactId) -> Result<bool> {
        self.read(|state| {
            state
                .send_log
                .iter()
                .any(|log| log.unsubscribed && log.contact_id == *contact)
        })
    }

    async fn update_log(&self, log: &SendLog) -> Result<()> {
        self.mutate(|state| {
            let stored = state
                .send_log
                .iter_mut()
                .find(|stored| stored.id == log.id)
                .ok_or_else(|| StoreError::not_found("send log", &log.id))?;

            stored.opens = log.opens;
            stored.clicks = log.clicks;
            stored.replied = log.replied;
            stored.unsubscribed = log.unsubscribed;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SuppressionRegistry for MemoryStore {
    async fn is_suppressed(&self, email: &str) -> Result<bool> {
        let email = normalize_email(email);
        self.read(|state| state.suppressions.contains_key(&email))
    }

    async fn suppress(
        &self,
        email: &str,
        reason: SuppressionReason,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let email = normalize_email(email);

        // Avoid a snapshot write when nothing changes
        if self.read(|state| state.suppressions.contains_key(&email))? {
            return Ok(false);
        }

        self.mutate(|state| {
            if state.suppressions.contains_key(&email) {
                return Ok(false);
            }
            state.suppressions.insert(
                email.clone(),
                SuppressionEntry {
                    email: email.clone(),
                    reason,
                    at,
                },
            );
            Ok(true)
        })
        .await
    }

    async fn suppression(&self, email: &str) -> Result<Option<SuppressionEntry>> {
        let email = normalize_email(email);
        self.read(|state| state.suppressions.get(&email).cloned())
    }

    async fn list_suppressions(&self) -> Result<Vec<SuppressionEntry>> {
        self.read(|state| state.suppressions.values().cloned().collect())
    }
}

#[async_trait]
impl OutboxRepo for MemoryStore {
    async fn insert_outbox(&self, message: &OutboxMessage) -> Result<()> {
        self.mutate(|state| {
            if state.outbox.contains_key(&message.id) {
                return Err(StoreError::already_exists("outbox message", &message.id));
            }
            state.outbox.insert(message.id.clone(), message.clone());
            Ok(())
        })
        .await
    }

    async fn update_outbox(&self, message: &OutboxMessage) -> Result<()> {
        self.mutate(|state| match state.outbox.get_mut(&message.id) {
            Some(stored) => {
                *stored = message.clone();
                Ok(())
            }
            None => Err(StoreError::not_found("outbox message", &message.id)),
        })
        .await
    }

    async fn get_outbox(&self, id: &OutboxId) -> Result<OutboxMessage> {
        self.read(|state| state.outbox.get(id).cloned())?
            .ok_or_else(|| StoreError::not_found("outbox message", id))
    }

    async fn outbox_for_run(&self, run: &RunId) -> Result<Vec<OutboxMessage>> {
        self.read(|state| {
            state
                .outbox
                .values()
                .filter(|message| message.run_id == *run)
                .cloned()
                .collect()
        })
    }
}
