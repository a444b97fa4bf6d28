//! The `cadence.config.ron` file

use cadence_common::{
    audit::AuditConfig,
    model::{Account, Campaign, Contact, Sequence, SuppressionEntry, Template},
};
use cadence_delivery::SchedulerConfig;
use cadence_store::StoreConfig;
use serde::Deserialize;

/// Everything the binary is configured with
///
/// ```ron
/// (
///     scheduler: (interval_secs: 60),
///     store: File(path: "/var/lib/cadence/cadence.bin"),
///     accounts: [(id: "sales", from: Some("sales@example.com"))],
/// )
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Cadence {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Sending accounts. Runs of an account missing here fail to send.
    #[serde(default, alias = "account")]
    pub accounts: Vec<Account>,

    #[serde(default)]
    pub seed: Seed,
}

/// Records loaded into the store at startup
///
/// Templates, sequences and contacts replace stored records with the same id.
/// Campaigns are only added when absent, so a restart keeps their metrics.
/// Seeded campaigns with status `Running` are activated.
#[derive(Debug, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub templates: Vec<Template>,

    #[serde(default)]
    pub sequences: Vec<Sequence>,

    #[serde(default)]
    pub contacts: Vec<Contact>,

    #[serde(default)]
    pub campaigns: Vec<Campaign>,

    #[serde(default)]
    pub suppressions: Vec<SuppressionEntry>,
}

impl Cadence {
    /// Parse a RON configuration
    ///
    /// # Errors
    /// If `config` is not valid RON for this structure
    pub fn from_ron(config: &str) -> anyhow::Result<Self> {
        Ok(ron::from_str(config)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cadence_common::model::{CampaignStatus, StepKind};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_empty_config() {
        let config = Cadence::from_ron("()").unwrap();

        assert_eq!(config.scheduler.interval_secs, 60);
        assert!(config.audit.enabled);
        assert_eq!(config.store, StoreConfig::Memory);
        assert!(config.accounts.is_empty());
        assert!(config.seed.campaigns.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = Cadence::from_ron(
            r#"(
                scheduler: (
                    interval_secs: 30,
                    send_timeout_secs: 10,
                    retry: (backoff_secs: 600, jitter_factor: 0.1),
                    tracking: (base_url: "https://t.example.com"),
                ),
                audit: (redact_recipients: true),
                store: File(path: "/tmp/cadence.bin"),
                accounts: [
                    (id: "sales", from: Some("sales@example.com")),
                    (id: "staging", dry_run: true),
                ],
                seed: (
                    templates: [(id: "intro", subject: "Hi {{first_name}}", body: "Hello")],
                    sequences: [(
                        id: "outreach",
                        steps: [
                            (id: "s1", kind: Email(template: "intro")),
                            (id: "s2", kind: Wait, day_offset: 2),
                            (id: "s3", kind: ManualTask(instructions: "Call"), time_of_day: Some("09:30:00")),
                        ],
                    )],
                    contacts: [(id: "c1", name: "Ada Lovelace", email: Some("ada@example.com"), lists: ["leads"])],
                    campaigns: [(
                        id: "spring",
                        sequence_id: "outreach",
                        list_id: "leads",
                        account_id: "sales",
                        status: running,
                        policy: (throttle_per_hour: Some(50), quiet_hours: Some((start_hour: 8, end_hour: 18))),
                    )],
                ),
            )"#,
        )
        .unwrap();

        assert_eq!(config.scheduler.interval_secs, 30);
        assert_eq!(config.scheduler.retry.backoff_secs, 600);
        assert!(config.audit.redact_recipients);
        assert!(config.store.path().is_some());

        assert_eq!(config.accounts.len(), 2);
        assert!(config.accounts[1].dry_run);

        let steps = &config.seed.sequences[0].steps;
        assert!(matches!(&steps[0].kind, StepKind::Email { variants, .. } if variants.is_empty()));
        assert_eq!(steps[1].day_offset, 2);
        assert!(steps[2].time_of_day.is_some());

        let campaign = &config.seed.campaigns[0];
        assert_eq!(campaign.status, CampaignStatus::Running);
        assert_eq!(campaign.policy.throttle_per_hour, Some(50));
    }

    #[test]
    fn test_malformed_section_is_rejected() {
        assert!(Cadence::from_ron("(accounts: 5)").is_err());
        assert!(Cadence::from_ron("(store: Disk)").is_err());
    }
}
