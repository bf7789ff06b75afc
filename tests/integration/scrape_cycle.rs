//! End-to-end orchestrator cycles with a scripted browser
//!
//! These tests use wiremock as the sync endpoint and check what reaches
//! disk and what reaches the wire.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use usage_keeper::browser::testing::{PagePlan, ScriptedBrowser, SectionOutcome};
use usage_keeper::config::Config;
use usage_keeper::orchestrator::{CycleOutcome, Orchestrator};
use usage_keeper::{CircuitState, UsageSnapshot};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    _profile: TempDir,
    _data: TempDir,
    browser: ScriptedBrowser,
    orchestrator: Orchestrator,
}

/// Creates a test configuration rooted in fresh temp directories
fn create_test_config(profile: &Path, data: &Path, sync_endpoint: Option<String>) -> Config {
    let mut config = Config::default();
    config.session.profile_dir = profile.to_string_lossy().into_owned();
    config.session.navigation_timeout_secs = 1;
    config.scraper.section_timeout_secs = 1;
    config.storage.directory = data.join("history").to_string_lossy().into_owned();
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 50;
    config.retry.jitter_secs = 0.0;
    config.schedule.maintenance_every_runs = 0;
    config.schedule.cache_size_threshold_mb = 0;

    if let Some(endpoint) = sync_endpoint {
        config.sync.enabled = true;
        config.sync.endpoint = endpoint;
        config.sync.api_key = "test-key".to_string();
        config.sync.timeout_secs = 2;
        config.sync.retry_delays_secs = vec![0, 0];
        config.sync.max_attempts = 2;
    }

    config
}

fn fixture(plan: PagePlan, sync_endpoint: Option<String>, tweak: impl FnOnce(&mut Config)) -> Fixture {
    let profile = tempfile::tempdir().unwrap();
    std::fs::write(profile.path().join("cookies.txt"), "sessionKey=abc").unwrap();
    let data = tempfile::tempdir().unwrap();

    let mut config = create_test_config(profile.path(), data.path(), sync_endpoint);
    tweak(&mut config);

    let browser = ScriptedBrowser::new(plan);
    let orchestrator = Orchestrator::from_config(&config, Arc::new(browser.clone()))
        .expect("Failed to build orchestrator");

    Fixture {
        _profile: profile,
        _data: data,
        browser,
        orchestrator,
    }
}

fn ack() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "success": true,
        "message": "Usage data received",
        "timestamp": "2026-05-01T12:00:00Z"
    }))
}

#[tokio::test]
async fn test_partial_snapshot_is_persisted_and_synced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/usage"))
        .and(header("X-API-Key", "test-key"))
        .respond_with(ack())
        .expect(1)
        .mount(&server)
        .await;

    let plan = PagePlan::healthy().with_section("All models", SectionOutcome::Timeout);
    let mut f = fixture(plan, Some(format!("{}/api/usage", server.uri())), |_| {});

    let outcome = f.orchestrator.run_cycle().await;
    let path = match outcome {
        CycleOutcome::Succeeded {
            path,
            partial,
            synced,
        } => {
            assert!(partial, "one section timed out");
            assert!(synced);
            path
        }
        other => panic!("Expected success, got {:?}", other),
    };

    // Stored copy keeps the extraction errors
    let stored: UsageSnapshot = f.orchestrator.storage().load_version(&path).await.unwrap();
    assert!(stored.is_partial);
    assert_eq!(stored.sections_extracted(), 2);
    let errors = stored.extraction_errors.clone().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors.contains_key("allModels"));
    assert!(stored.weekly_limits.as_ref().unwrap().all_models.is_none());

    let latest: UsageSnapshot = f.orchestrator.storage().load_latest().await.unwrap().unwrap();
    assert_eq!(latest, stored);

    // Wire copy drops them
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body.get("extractionErrors").is_none());
    assert_eq!(body["isPartial"], serde_json::json!(true));
    assert!(body["weeklyLimits"]["sonnetOnly"]["percentageUsed"].is_number());

    assert_eq!(f.browser.open_sessions(), 0);
}

#[tokio::test]
async fn test_sync_rejection_does_not_fail_cycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let mut f = fixture(
        PagePlan::healthy(),
        Some(format!("{}/api/usage", server.uri())),
        |_| {},
    );

    let outcome = f.orchestrator.run_cycle().await;
    assert!(matches!(
        outcome,
        CycleOutcome::Succeeded { synced: false, partial: false, .. }
    ));
    assert_eq!(f.orchestrator.retry().attempt_count(), 0);
    assert_eq!(
        f.orchestrator.storage().list_versions(None).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_sync_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ack())
        .expect(1)
        .mount(&server)
        .await;

    let mut f = fixture(
        PagePlan::healthy(),
        Some(format!("{}/api/usage", server.uri())),
        |_| {},
    );

    assert!(matches!(
        f.orchestrator.run_cycle().await,
        CycleOutcome::Succeeded { synced: true, .. }
    ));
}

#[tokio::test]
async fn test_breaker_opens_probes_and_closes() {
    let mut f = fixture(PagePlan::offline(), None, |config| {
        config.retry.failure_threshold = 2;
        config.retry.success_threshold = 2;
        config.retry.open_duration_ms = 100;
    });

    assert!(matches!(
        f.orchestrator.run_cycle().await,
        CycleOutcome::RetryScheduled { attempt: 1, .. }
    ));
    assert!(matches!(
        f.orchestrator.run_cycle().await,
        CycleOutcome::GaveUp { attempts: 2, .. }
    ));
    assert_eq!(f.orchestrator.retry().circuit_state(), CircuitState::Open);

    let launches = f.browser.launches();
    assert!(matches!(
        f.orchestrator.run_cycle().await,
        CycleOutcome::Skipped { .. }
    ));
    assert_eq!(f.browser.launches(), launches, "no browser while open");

    tokio::time::sleep(Duration::from_millis(150)).await;
    f.browser.set_plan(PagePlan::healthy());

    // First probe succeeds but one success is not enough to close
    assert!(f.orchestrator.run_cycle().await.is_success());
    assert_eq!(f.orchestrator.retry().circuit_state(), CircuitState::HalfOpen);

    assert!(f.orchestrator.run_cycle().await.is_success());
    assert_eq!(f.orchestrator.retry().circuit_state(), CircuitState::Closed);
    assert_eq!(f.orchestrator.retry().breaker().failure_count(), 0);
}

#[tokio::test]
async fn test_corrupted_profile_is_fatal() {
    let mut plan = PagePlan::healthy();
    plan.launch_error = Some("Target closed: profile lock is held".to_string());
    let mut f = fixture(plan, None, |_| {});

    let outcome = f.orchestrator.run_cycle().await;
    match outcome {
        CycleOutcome::Fatal { error } => {
            assert!(error.is_fatal());
            assert!(error.to_string().starts_with("CONTEXT_CORRUPTED: "));
        }
        other => panic!("Expected fatal, got {:?}", other),
    }
    assert!(f
        .orchestrator
        .storage()
        .list_versions(None)
        .await
        .unwrap()
        .is_empty());
}
