//! Full-stack cycles through the HTTP browser
//!
//! wiremock serves the usage page (or a login redirect) and the sync endpoint.

use std::sync::Arc;
use std::time::Duration;
use usage_keeper::browser::HttpBrowser;
use usage_keeper::config::Config;
use usage_keeper::orchestrator::{CycleOutcome, Orchestrator};
use usage_keeper::{ErrorCategory, SessionValidator, UsageSnapshot};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USAGE_PAGE: &str = r#"<!doctype html>
<html><body>
  <nav><a href="/settings">Settings</a></nav>
  <main>
    <h1>Plan usage limits</h1>
    <section><h2>Current session</h2><p>Resets in 3 hr 12 min</p><p>18% used</p></section>
    <h2>Weekly limits</h2>
    <section><h3>All models</h3><p>Resets Thu 9:00 AM</p><p>52% used</p></section>
    <section><h3>Sonnet only</h3><p>Resets Thu 9:00 AM</p><p>9% used</p></section>
  </main>
</body></html>"#;

const LOGIN_PAGE: &str = r#"<!doctype html>
<html><body><form><input name="email"><button>Continue with email</button></form></body></html>"#;

fn browser() -> Arc<HttpBrowser> {
    Arc::new(HttpBrowser::new("cookies.txt").with_poll_interval(Duration::from_millis(50)))
}

fn config_for(server: &MockServer, profile: &std::path::Path, data: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.session.profile_dir = profile.to_string_lossy().into_owned();
    config.session.usage_url = format!("{}/settings/usage", server.uri());
    config.session.navigation_timeout_secs = 2;
    config.scraper.section_timeout_secs = 1;
    config.storage.directory = data.to_string_lossy().into_owned();
    config.schedule.maintenance_every_runs = 0;
    config.schedule.cache_size_threshold_mb = 0;
    config.sync.enabled = true;
    config.sync.endpoint = format!("{}/api/usage", server.uri());
    config.sync.api_key = "test-key".to_string();
    config
}

#[tokio::test]
async fn test_http_cycle_scrapes_all_sections() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/settings/usage"))
        .and(header("cookie", "sessionKey=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(USAGE_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/usage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "message": "ok",
            "timestamp": "2026-05-01T12:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let profile = tempfile::tempdir().unwrap();
    std::fs::write(profile.path().join("cookies.txt"), "sessionKey=abc\n").unwrap();
    let data = tempfile::tempdir().unwrap();
    let config = config_for(&server, profile.path(), data.path());

    let mut orchestrator = Orchestrator::from_config(&config, browser()).unwrap();
    let outcome = orchestrator.run_cycle().await;
    assert!(
        matches!(
            outcome,
            CycleOutcome::Succeeded { partial: false, synced: true, .. }
        ),
        "unexpected outcome {:?}",
        outcome
    );

    let snapshot: UsageSnapshot = orchestrator.storage().load_latest().await.unwrap().unwrap();
    let current = snapshot.current_session.unwrap();
    assert_eq!(current.percentage_used, 18.0);
    assert_eq!(current.resets_in, "3 hr 12 min");
    let weekly = snapshot.weekly_limits.unwrap();
    assert_eq!(weekly.all_models.unwrap().percentage_used, 52.0);
    assert_eq!(weekly.sonnet_only.unwrap().percentage_used, 9.0);
}

#[tokio::test]
async fn test_http_login_redirect_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/settings/usage"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/login?returnTo=usage"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LOGIN_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let profile = tempfile::tempdir().unwrap();
    std::fs::write(profile.path().join("cookies.txt"), "sessionKey=stale").unwrap();
    let data = tempfile::tempdir().unwrap();
    let config = config_for(&server, profile.path(), data.path());

    let validator = SessionValidator::new(browser(), config.session.clone());
    let result = validator.validate(true).await;
    assert!(!result.valid);
    assert!(result.reason.unwrap().contains("Redirected to login"));
    assert_eq!(
        result.recovery_result.unwrap().action,
        "manual_login_required"
    );

    let mut orchestrator = Orchestrator::from_config(&config, browser()).unwrap();
    match orchestrator.run_cycle().await {
        CycleOutcome::Fatal { error } => {
            assert_eq!(error.category, ErrorCategory::SessionExpired)
        }
        other => panic!("Expected fatal, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_server_error_is_recoverable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let profile = tempfile::tempdir().unwrap();
    std::fs::write(profile.path().join("cookies.txt"), "sessionKey=abc").unwrap();
    let data = tempfile::tempdir().unwrap();
    let config = config_for(&server, profile.path(), data.path());

    let mut orchestrator = Orchestrator::from_config(&config, browser()).unwrap();
    match orchestrator.run_cycle().await {
        CycleOutcome::RetryScheduled { attempt, .. } => assert_eq!(attempt, 1),
        other => panic!("Expected a scheduled retry, got {:?}", other),
    }
}
