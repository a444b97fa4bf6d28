use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{AccountId, CampaignId, ListId, SequenceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Running,
    Paused,
}

/// The hours (UTC) a campaign may send in: `[start_hour, end_hour)`.
///
/// A window with `start_hour > end_hour` wraps past midnight, so
/// `(start_hour: 22, end_hour: 6)` allows 22:00 through 05:59.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl QuietHours {
    #[must_use]
    pub const fn new(start_hour: u8, end_hour: u8) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    /// Whether sending is allowed during `hour` (0-23)
    #[must_use]
    pub const fn allows_hour(&self, hour: u32) -> bool {
        let start = self.start_hour as u32;
        let end = self.end_hour as u32;

        if start <= end {
            hour >= start && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}

/// Sending policy for everything a campaign drives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignPolicy {
    /// Maximum sends per clock hour
    #[serde(default)]
    pub throttle_per_hour: Option<u32>,

    /// Operating window; outside it, email steps are deferred
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
}

/// Running totals for a campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignMetrics {
    #[serde(default)]
    pub sent: u64,
    /// Sends accepted by a real transport (dry runs excluded)
    #[serde(default)]
    pub delivered: u64,
    #[serde(default)]
    pub opens: u64,
    #[serde(default)]
    pub clicks: u64,
    #[serde(default)]
    pub replies: u64,
    #[serde(default)]
    pub bounces: u64,
    #[serde(default)]
    pub unsubscribes: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub skipped: u64,
}

impl CampaignMetrics {
    /// Add every counter of `delta` to `self`
    pub const fn absorb(&mut self, delta: &Self) {
        self.sent += delta.sent;
        self.delivered += delta.delivered;
        self.opens += delta.opens;
        self.clicks += delta.clicks;
        self.replies += delta.replies;
        self.bounces += delta.bounces;
        self.unsubscribes += delta.unsubscribes;
        self.failed += delta.failed;
        self.skipped += delta.skipped;
    }
}

/// A policy-bound execution of one sequence over one list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,

    #[serde(default)]
    pub name: String,

    pub sequence_id: SequenceId,
    pub list_id: ListId,
    pub account_id: AccountId,

    #[serde(default = "default_status")]
    pub status: CampaignStatus,

    #[serde(default)]
    pub policy: CampaignPolicy,

    #[serde(default)]
    pub metrics: CampaignMetrics,

    /// Template values shared by every run of this campaign
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

const fn default_status() -> CampaignStatus {
    CampaignStatus::Draft
}

impl Campaign {
    #[must_use]
    pub fn new(
        id: impl Into<CampaignId>,
        sequence_id: impl Into<SequenceId>,
        list_id: impl Into<ListId>,
        account_id: impl Into<AccountId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            sequence_id: sequence_id.into(),
            list_id: list_id.into(),
            account_id: account_id.into(),
            status: CampaignStatus::Draft,
            policy: CampaignPolicy::default(),
            metrics: CampaignMetrics::default(),
            variables: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: CampaignPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == CampaignStatus::Running
    }
}
