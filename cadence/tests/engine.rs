//! The engine as the binary builds it from configuration

#![allow(clippy::unwrap_used, clippy::expect_used)]

use cadence::{Cadence, Engine};
use cadence_common::model::SuppressionReason;
use pretty_assertions::assert_eq;

fn config(store: &str) -> String {
    format!(
        r#"(
            store: {store},
            accounts: [(id: "sales", from: Some("sales@example.com"))],
            seed: (
                templates: [(id: "intro", subject: "Hi {{{{first_name}}}}", body: "Hello")],
                sequences: [(id: "outreach", steps: [
                    (id: "s1", kind: Email(template: "intro")),
                    (id: "s2", kind: Email(template: "intro"), day_offset: 3),
                ])],
                contacts: [
                    (id: "c1", name: "Ada Lovelace", email: Some("ada@example.com"), lists: ["leads"]),
                    (id: "c2", name: "Alan Turing", email: Some("alan@example.com"), lists: ["leads"]),
                ],
                suppressions: [(email: "alan@example.com", reason: manual, at: "2024-01-01T00:00:00Z")],
                campaigns: [(
                    id: "spring",
                    sequence_id: "outreach",
                    list_id: "leads",
                    account_id: "sales",
                    status: running,
                )],
            ),
        )"#
    )
}

#[tokio::test]
async fn test_seeded_campaign_sends_on_first_tick() {
    let engine = Engine::build(Cadence::from_ron(&config("Memory")).unwrap())
        .await
        .unwrap();

    let report = engine.tick_once().await;
    assert_eq!(report.selected, 2);
    assert_eq!(report.sent, 1);
    assert_eq!(report.skipped, 1);

    let entry = engine
        .repos()
        .suppression
        .suppression("alan@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.reason, SuppressionReason::Manual);

    let campaign = engine
        .repos()
        .campaigns
        .get_campaign(&"spring".into())
        .await
        .unwrap();
    assert_eq!(campaign.metrics.sent, 1);
    assert_eq!(campaign.metrics.delivered, 1);
    assert!(engine.scheduler().last_tick().is_some());
}

#[tokio::test]
async fn test_restart_does_not_enroll_or_send_twice() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cadence.bin");
    let store = format!("File(path: {:?})", path.display().to_string());

    let engine = Engine::build(Cadence::from_ron(&config(&store)).unwrap())
        .await
        .unwrap();
    assert_eq!(engine.tick_once().await.sent, 1);
    drop(engine);

    let engine = Engine::build(Cadence::from_ron(&config(&store)).unwrap())
        .await
        .unwrap();
    assert_eq!(engine.repos().runs.list_runs().await.unwrap().len(), 2);
    assert_eq!(engine.tick_once().await.selected, 0);

    let campaign = engine
        .repos()
        .campaigns
        .get_campaign(&"spring".into())
        .await
        .unwrap();
    assert_eq!(campaign.metrics.sent, 1);
    assert_eq!(campaign.metrics.skipped, 1);
}

#[tokio::test]
async fn test_invalid_seeded_campaign_fails_to_build() {
    let config = config("Memory").replace(
        "status: running,",
        "status: running, policy: (throttle_per_hour: Some(0)),",
    );

    assert!(Engine::build(Cadence::from_ron(&config).unwrap()).await.is_err());
}
