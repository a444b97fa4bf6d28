//! Engagement events reported by outside detectors
//!
//! Opens, clicks and replies arrive keyed by the tracking id injected into a
//! message; bounces and unsubscribes arrive keyed by address. Recording an
//! event updates the send log, the campaign counters and, where the event
//! means the contact must not be written to again, the suppression registry.

use std::sync::Arc;

use cadence_common::{
    Clock,
    audit::log_suppression,
    internal,
    model::{CampaignMetrics, SendLog, SendStatus, SuppressionReason, normalize_email},
};
use cadence_store::Repositories;
use serde::{Deserialize, Serialize};

use crate::error::DeliveryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngagementEvent {
    Open { tracking_id: String },
    Click { tracking_id: String },
    Reply { tracking_id: String },
    Bounce { email: String },
    Unsubscribe { email: String },
}

#[derive(Debug, Clone)]
pub struct EngagementRecorder {
    repos: Repositories,
    clock: Arc<dyn Clock>,
}

impl EngagementRecorder {
    #[must_use]
    pub fn new(repos: Repositories, clock: Arc<dyn Clock>) -> Self {
        Self { repos, clock }
    }

    /// Apply one event.
    ///
    /// Returns `false` when the event matched nothing: an unknown tracking
    /// id, or an address that was already suppressed and never sent to.
    /// Campaign counters count each send at most once per kind of event.
    ///
    /// # Errors
    /// If the store cannot be read or written
    pub async fn record(&self, event: &EngagementEvent) -> Result<bool, DeliveryError> {
        match event {
            EngagementEvent::Open { tracking_id } => {
                self.track(tracking_id, |log, metrics| {
                    if log.opens == 0 {
                        metrics.opens = 1;
                    }
                    log.opens = log.opens.saturating_add(1);
                })
                .await
            }
            EngagementEvent::Click { tracking_id } => {
                self.track(tracking_id, |log, metrics| {
                    if log.clicks == 0 {
                        metrics.clicks = 1;
                    }
                    log.clicks = log.clicks.saturating_add(1);
                })
                .await
            }
            EngagementEvent::Reply { tracking_id } => self.reply(tracking_id).await,
            EngagementEvent::Bounce { email } => {
                self.by_address(email, SuppressionReason::Bounced).await
            }
            EngagementEvent::Unsubscribe { email } => {
                self.by_address(email, SuppressionReason::Unsubscribed).await
            }
        }
    }

    async fn track(
        &self,
        tracking_id: &str,
        apply: impl FnOnce(&mut SendLog, &mut CampaignMetrics) + Send,
    ) -> Result<bool, DeliveryError> {
        let Some(mut log) = self.repos.send_log.log_by_tracking_id(tracking_id).await? else {
            internal!(level = DEBUG, "No send for tracking id {tracking_id}");
            return Ok(false);
        };

        let mut delta = CampaignMetrics::default();
        apply(&mut log, &mut delta);

        self.repos.send_log.update_log(&log).await?;
        self.add_metrics(&log, &delta).await?;

        Ok(true)
    }

    async fn reply(&self, tracking_id: &str) -> Result<bool, DeliveryError> {
        let Some(mut log) = self.repos.send_log.log_by_tracking_id(tracking_id).await? else {
            internal!(level = DEBUG, "No send for tracking id {tracking_id}");
            return Ok(false);
        };

        if !log.replied {
            log.replied = true;
            self.repos.send_log.update_log(&log).await?;
            self.add_metrics(
                &log,
                &CampaignMetrics {
                    replies: 1,
                    ..CampaignMetrics::default()
                },
            )
            .await?;
        }

        match self.repos.contacts.get_contact(&log.contact_id).await {
            Ok(contact) => {
                if let Some(email) = contact.email.as_deref() {
                    self.suppress(email, SuppressionReason::Replied).await?;
                }
            }
            // The reply still halts the run through the send log
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        Ok(true)
    }

    async fn by_address(
        &self,
        email: &str,
        reason: SuppressionReason,
    ) -> Result<bool, DeliveryError> {
        let newly_suppressed = self.suppress(email, reason).await?;

        let Some(mut log) = self.latest_send_to(email).await? else {
            return Ok(newly_suppressed);
        };

        let mut delta = CampaignMetrics::default();
        match reason {
            SuppressionReason::Unsubscribed if !log.unsubscribed => {
                log.unsubscribed = true;
                self.repos.send_log.update_log(&log).await?;
                delta.unsubscribes = 1;
            }
            SuppressionReason::Bounced if newly_suppressed => delta.bounces = 1,
            _ => {}
        }
        self.add_metrics(&log, &delta).await?;

        Ok(true)
    }

    /// Returns whether the address was newly suppressed
    async fn suppress(&self, email: &str, reason: SuppressionReason) -> Result<bool, DeliveryError> {
        let added = self
            .repos
            .suppression
            .suppress(email, reason, self.clock.now())
            .await?;

        if added {
            log_suppression(email, reason.as_str());
        }

        Ok(added)
    }

    /// The most recent successful send to any contact with `email`
    async fn latest_send_to(&self, email: &str) -> Result<Option<SendLog>, DeliveryError> {
        let email = normalize_email(email);
        let mut latest: Option<SendLog> = None;

        for contact in self.repos.contacts.list_contacts().await? {
            if contact.email.as_deref().map(normalize_email).as_deref() != Some(email.as_str()) {
                continue;
            }

            for log in self.repos.send_log.logs_for_contact(&contact.id).await? {
                if log.status == SendStatus::Sent
                    && latest.as_ref().is_none_or(|current| log.at >= current.at)
                {
                    latest = Some(log);
                }
            }
        }

        Ok(latest)
    }

    async fn add_metrics(&self, log: &SendLog, delta: &CampaignMetrics) -> Result<(), DeliveryError> {
        if *delta == CampaignMetrics::default() {
            return Ok(());
        }

        if let Some(campaign) = &log.campaign_id {
            match self.repos.campaigns.add_campaign_metrics(campaign, delta).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    internal!(level = WARN, "Campaign {campaign} is gone, dropping metrics");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}
