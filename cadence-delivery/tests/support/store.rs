//! A send log that can be told to fail reads for chosen runs

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use cadence_common::{CampaignId, ContactId, RunId, model::SendLog};
use cadence_store::{MemoryStore, SendLogRepo, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Debug)]
pub struct FaultyLog {
    inner: Arc<MemoryStore>,
    broken: Mutex<BTreeSet<RunId>>,
}

impl FaultyLog {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            broken: Mutex::default(),
        }
    }

    /// Fail every history read for `run` from now on
    pub fn break_run(&self, run: &RunId) {
        self.broken.lock().insert(run.clone());
    }
}

#[async_trait]
impl SendLogRepo for FaultyLog {
    async fn append_log(&self, log: &SendLog) -> cadence_store::Result<()> {
        self.inner.append_log(log).await
    }

    async fn logs_for_run(&self, run: &RunId) -> cadence_store::Result<Vec<SendLog>> {
        if self.broken.lock().contains(run) {
            return Err(StoreError::Internal(format!("history of {run} unreadable")));
        }
        self.inner.logs_for_run(run).await
    }

    async fn logs_for_contact(&self, contact: &ContactId) -> cadence_store::Result<Vec<SendLog>> {
        self.inner.logs_for_contact(contact).await
    }

    async fn log_by_tracking_id(&self, tracking_id: &str) -> cadence_store::Result<Option<SendLog>> {
        self.inner.log_by_tracking_id(tracking_id).await
    }

    async fn count_sent_since(
        &self,
        campaign: &CampaignId,
        since: DateTime<Utc>,
    ) -> cadence_store::Result<u32> {
        self.inner.count_sent_since(campaign, since).await
    }

    async fn has_reply(
        &self,
        contact: &ContactId,
        campaign: Option<&CampaignId>,
    ) -> cadence_store::Result<bool> {
        self.inner.has_reply(contact, campaign).await
    }

    async fn has_unsubscribe(&self, contact: &ContactId) -> cadence_store::Result<bool> {
        self.inner.has_unsubscribe(contact).await
    }

    async fn update_log(&self, log: &SendLog) -> cadence_store::Result<()> {
        self.inner.update_log(log).await
    }
}
