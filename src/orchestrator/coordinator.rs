//! Scrape loop coordinator
//!
//! This module contains the long-running loop that ties the subsystem
//! together, including:
//! - Running a scrape immediately, then on a fixed interval
//! - Skipping cycles while the circuit breaker is open
//! - Persisting and syncing successful snapshots
//! - Arming a single backoff retry for recoverable failures
//! - Stopping on fatal failures or shutdown

use super::scheduler::{maintenance_due, RetryTimer};
use crate::browser::BrowserLauncher;
use crate::config::{Config, ScheduleConfig};
use crate::retry::{ErrorCategory, RetryStrategy};
use crate::scraper::{ScrapeError, Scraper};
use crate::session::{CacheCleanupReport, CacheMaintainer};
use crate::storage::VersionedStorage;
use crate::sync::SyncClient;
use crate::usage::UsageSnapshot;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Result of one orchestrator cycle
#[derive(Debug)]
pub enum CycleOutcome {
    /// The circuit breaker was open; no scrape was attempted
    Skipped { remaining: Option<Duration> },

    /// A snapshot was scraped and persisted
    Succeeded {
        path: PathBuf,
        partial: bool,
        synced: bool,
    },

    /// A recoverable failure armed the backoff retry timer
    RetryScheduled { delay: Duration, attempt: u32 },

    /// A recoverable failure that is not retried; the next interval tick tries again
    GaveUp { error: ScrapeError, attempts: u32 },

    /// Human intervention is required
    Fatal { error: ScrapeError },
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}

/// Why [`Orchestrator::run`] returned
#[derive(Debug)]
pub enum RunExit {
    Shutdown,
    Fatal(ScrapeError),
}

enum Trigger {
    Shutdown,
    Interval,
    Retry,
}

/// Owns every component and drives them one cycle at a time
pub struct Orchestrator {
    scraper: Scraper,
    retry: RetryStrategy,
    storage: VersionedStorage,
    sync: Option<SyncClient>,
    cache: CacheMaintainer,
    schedule: ScheduleConfig,
    retry_timer: RetryTimer,
    run_count: u64,
    last_maintenance: Option<CacheCleanupReport>,
}

impl Orchestrator {
    pub fn new(
        scraper: Scraper,
        retry: RetryStrategy,
        storage: VersionedStorage,
        sync: Option<SyncClient>,
        cache: CacheMaintainer,
        schedule: ScheduleConfig,
    ) -> Self {
        Self {
            scraper,
            retry,
            storage,
            sync,
            cache,
            schedule,
            retry_timer: RetryTimer::new(),
            run_count: 0,
            last_maintenance: None,
        }
    }

    /// Builds every component from configuration
    ///
    /// # Arguments
    ///
    /// * `config` - The loaded configuration
    /// * `launcher` - Browser capability used for validation and extraction
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Ready to run
    /// * `Err(UsageError)` - Storage directory or sync client could not be set up
    pub fn from_config(config: &Config, launcher: Arc<dyn BrowserLauncher>) -> crate::Result<Self> {
        let scraper = Scraper::new(launcher, config.session.clone(), config.scraper.clone());
        let storage = VersionedStorage::from_config(&config.storage)?;
        let sync = if config.sync.enabled {
            Some(SyncClient::from_config(&config.sync)?)
        } else {
            tracing::info!("Sync disabled, snapshots are only stored locally");
            None
        };

        Ok(Self::new(
            scraper,
            RetryStrategy::from_config(&config.retry),
            storage,
            sync,
            CacheMaintainer::new(&config.session.profile_dir),
            config.schedule.clone(),
        ))
    }

    pub fn scraper(&self) -> &Scraper {
        &self.scraper
    }

    pub fn storage(&self) -> &VersionedStorage {
        &self.storage
    }

    pub fn retry(&self) -> &RetryStrategy {
        &self.retry
    }

    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    pub fn retry_timer(&self) -> &RetryTimer {
        &self.retry_timer
    }

    pub fn last_maintenance(&self) -> Option<&CacheCleanupReport> {
        self.last_maintenance.as_ref()
    }

    /// Runs scrape cycles until shutdown or a fatal failure
    ///
    /// The first cycle starts immediately. Later cycles start on each interval
    /// tick or when the backoff retry timer fires, whichever comes first.
    pub async fn run<F>(&mut self, shutdown: F) -> RunExit
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut interval = tokio::time::interval(Duration::from_secs(self.schedule.interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.schedule.interval_secs,
            "Starting scrape loop"
        );

        loop {
            let trigger = tokio::select! {
                _ = &mut shutdown => Trigger::Shutdown,
                _ = interval.tick() => Trigger::Interval,
                _ = self.retry_timer.fired() => Trigger::Retry,
            };

            match trigger {
                Trigger::Shutdown => {
                    tracing::info!("Shutdown requested, stopping scrape loop");
                    return RunExit::Shutdown;
                }
                Trigger::Interval => tracing::debug!("Interval tick"),
                Trigger::Retry => {
                    tracing::info!("Backoff elapsed, retrying scrape");
                    self.retry_timer.cancel();
                }
            }

            if let CycleOutcome::Fatal { error } = self.run_cycle().await {
                return RunExit::Fatal(error);
            }
        }
    }

    /// Runs one cycle: maintenance, breaker check, scrape, persist, sync
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        self.run_count += 1;
        self.run_maintenance_if_due().await;

        if self.retry.is_circuit_open() {
            let remaining = self
                .retry
                .breaker()
                .remaining_open_time_at(std::time::Instant::now());
            tracing::warn!(
                run = self.run_count,
                remaining_secs = remaining.map(|d| d.as_secs()),
                "Circuit breaker open, skipping cycle"
            );
            return CycleOutcome::Skipped { remaining };
        }

        // This attempt supersedes any retry still pending
        self.retry_timer.cancel();

        tracing::info!(run = self.run_count, "Starting scrape cycle");
        match self.scraper.scrape().await {
            Ok(snapshot) => self.handle_success(snapshot).await,
            Err(error) => self.handle_failure(error),
        }
    }

    async fn handle_success(&mut self, snapshot: UsageSnapshot) -> CycleOutcome {
        // A cycle only counts as a success once the snapshot is durable
        let path = match self.storage.save_version(&snapshot).await {
            Ok(path) => path,
            Err(e) => {
                return self.handle_failure(ScrapeError::new(
                    ErrorCategory::Unknown,
                    format!("failed to persist snapshot: {}", e),
                ));
            }
        };
        self.retry.record_success();

        let synced = match &self.sync {
            Some(client) => match client.sync_with_retry(&snapshot).await {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!("Snapshot stored but not synced: {}", e);
                    false
                }
            },
            None => false,
        };

        tracing::info!(
            path = %path.display(),
            partial = snapshot.is_partial,
            sections = snapshot.sections_extracted(),
            synced,
            "Scrape cycle succeeded"
        );

        CycleOutcome::Succeeded {
            path,
            partial: snapshot.is_partial,
            synced,
        }
    }

    fn handle_failure(&mut self, error: ScrapeError) -> CycleOutcome {
        let attempt = self.retry.record_failure();

        if error.is_fatal() {
            tracing::error!(
                category = %error.category,
                circuit = %self.retry.circuit_state(),
                "Fatal scrape failure: {}",
                error.message
            );
            return CycleOutcome::Fatal { error };
        }

        if self.retry.should_retry(error.category, attempt) {
            let delay = self.retry.calculate_delay(attempt);
            tracing::warn!(
                category = %error.category,
                attempt,
                delay_secs = delay.as_secs_f64(),
                "Scrape failed, retry scheduled: {}",
                error.message
            );
            self.retry_timer.arm(delay);
            return CycleOutcome::RetryScheduled { delay, attempt };
        }

        tracing::error!(
            category = %error.category,
            attempts = attempt,
            circuit = %self.retry.circuit_state(),
            "Scrape failed, giving up until the next interval: {}",
            error.message
        );
        self.retry.reset();
        CycleOutcome::GaveUp {
            error,
            attempts: attempt,
        }
    }

    async fn run_maintenance_if_due(&mut self) {
        let cache = self.cache.clone();
        let run_count = self.run_count;
        let every_runs = self.schedule.maintenance_every_runs;
        let threshold_bytes = self
            .schedule
            .cache_size_threshold_mb
            .saturating_mul(1024 * 1024);

        let job = tokio::task::spawn_blocking(move || {
            maintenance_due(run_count, every_runs, threshold_bytes, || {
                cache.cache_size_bytes()
            })
            .map(|reason| (reason, cache.clear_caches()))
        });

        match job.await {
            Ok(Some((reason, report))) => {
                tracing::info!(
                    reason = %reason,
                    removed = report.removed.len(),
                    freed_bytes = report.freed_bytes,
                    failed = report.failed.len(),
                    "Profile cache maintenance finished"
                );
                self.last_maintenance = Some(report);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Cache maintenance task failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{PagePlan, ScriptedBrowser};
    use crate::config::{RetryConfig, StorageConfig};
    use crate::retry::CircuitState;
    use tempfile::TempDir;

    struct Harness {
        _profile: TempDir,
        _data: TempDir,
        browser: ScriptedBrowser,
        orchestrator: Orchestrator,
    }

    fn harness(plan: PagePlan) -> Harness {
        harness_with(plan, |_| {})
    }

    fn harness_with(plan: PagePlan, tweak: impl FnOnce(&mut Config)) -> Harness {
        let profile = tempfile::tempdir().unwrap();
        std::fs::write(profile.path().join("cookies.txt"), "sessionKey=abc").unwrap();
        let data = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.session.profile_dir = profile.path().to_string_lossy().into_owned();
        config.session.navigation_timeout_secs = 1;
        config.storage = StorageConfig {
            directory: data.path().join("history").to_string_lossy().into_owned(),
            ..StorageConfig::default()
        };
        config.retry = RetryConfig {
            base_delay_ms: 20,
            max_delay_ms: 100,
            jitter_secs: 0.0,
            max_attempts: 5,
            failure_threshold: 3,
            success_threshold: 2,
            open_duration_ms: 60_000,
        };
        config.schedule.maintenance_every_runs = 0;
        config.schedule.cache_size_threshold_mb = 0;
        tweak(&mut config);

        let browser = ScriptedBrowser::new(plan);
        let orchestrator = Orchestrator::from_config(&config, Arc::new(browser.clone())).unwrap();

        Harness {
            _profile: profile,
            _data: data,
            browser,
            orchestrator,
        }
    }

    #[tokio::test]
    async fn test_successful_cycle_persists() {
        let mut h = harness(PagePlan::healthy());

        let outcome = h.orchestrator.run_cycle().await;
        match outcome {
            CycleOutcome::Succeeded {
                path,
                partial,
                synced,
            } => {
                assert!(path.exists());
                assert!(!partial);
                assert!(!synced);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(h.orchestrator.retry().attempt_count(), 0);
        assert_eq!(h.orchestrator.run_count(), 1);
        let latest: Option<UsageSnapshot> = h.orchestrator.storage().load_latest().await.unwrap();
        assert_eq!(latest.unwrap().sections_extracted(), 3);
        assert_eq!(h.browser.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_network_failure_schedules_backoff() {
        let mut h = harness(PagePlan::offline());

        let outcome = h.orchestrator.run_cycle().await;
        match outcome {
            CycleOutcome::RetryScheduled { delay, attempt } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_millis(20));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(h.orchestrator.retry_timer().is_armed());

        let outcome = h.orchestrator.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::RetryScheduled { attempt: 2, delay } if delay == Duration::from_millis(40)
        ));
    }

    #[tokio::test]
    async fn test_expired_session_is_fatal() {
        let mut h = harness(PagePlan::logged_out());

        let outcome = h.orchestrator.run_cycle().await;
        match outcome {
            CycleOutcome::Fatal { error } => {
                assert_eq!(error.category, ErrorCategory::SessionExpired);
                assert!(error.category.remediation().is_some());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(h.orchestrator.retry().breaker().failure_count(), 1);
        assert!(!h.orchestrator.retry_timer().is_armed());
    }

    #[tokio::test]
    async fn test_open_circuit_skips_cycles() {
        let mut h = harness(PagePlan::offline());

        assert!(matches!(
            h.orchestrator.run_cycle().await,
            CycleOutcome::RetryScheduled { attempt: 1, .. }
        ));
        assert!(matches!(
            h.orchestrator.run_cycle().await,
            CycleOutcome::RetryScheduled { attempt: 2, .. }
        ));
        // Third failure opens the breaker, so no retry is armed
        assert!(matches!(
            h.orchestrator.run_cycle().await,
            CycleOutcome::GaveUp { attempts: 3, .. }
        ));
        assert_eq!(h.orchestrator.retry().circuit_state(), CircuitState::Open);

        let launches = h.browser.launches();
        let outcome = h.orchestrator.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::Skipped { remaining: Some(_) }
        ));
        assert_eq!(h.browser.launches(), launches);
    }

    #[tokio::test]
    async fn test_storage_failure_fails_cycle() {
        let mut h = harness(PagePlan::healthy());
        std::fs::remove_dir_all(h.orchestrator.storage().dir()).unwrap();

        let outcome = h.orchestrator.run_cycle().await;
        assert!(matches!(
            outcome,
            CycleOutcome::RetryScheduled { attempt: 1, .. }
        ));
        assert_eq!(h.orchestrator.retry().attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_persistent_storage_failure_escalates_and_opens_circuit() {
        let mut h = harness(PagePlan::healthy());
        std::fs::remove_dir_all(h.orchestrator.storage().dir()).unwrap();

        assert!(matches!(
            h.orchestrator.run_cycle().await,
            CycleOutcome::RetryScheduled { attempt: 1, delay } if delay == Duration::from_millis(20)
        ));
        assert!(matches!(
            h.orchestrator.run_cycle().await,
            CycleOutcome::RetryScheduled { attempt: 2, delay } if delay == Duration::from_millis(40)
        ));
        assert_eq!(h.orchestrator.retry().breaker().failure_count(), 2);

        assert!(matches!(
            h.orchestrator.run_cycle().await,
            CycleOutcome::GaveUp { attempts: 3, .. }
        ));
        assert_eq!(h.orchestrator.retry().circuit_state(), CircuitState::Open);
        assert!(matches!(
            h.orchestrator.run_cycle().await,
            CycleOutcome::Skipped { .. }
        ));
    }

    #[tokio::test]
    async fn test_maintenance_clears_profile_caches() {
        let mut h = harness(PagePlan::healthy());
        h.orchestrator.schedule.maintenance_every_runs = 1;

        let profile = PathBuf::from(&h.orchestrator.scraper().validator().config().profile_dir);
        std::fs::create_dir_all(profile.join("Cache")).unwrap();
        std::fs::write(profile.join("Cache").join("data_0"), vec![0u8; 2048]).unwrap();

        h.orchestrator.run_cycle().await;

        assert!(!profile.join("Cache").exists());
        assert!(profile.join("cookies.txt").exists());
        let report = h.orchestrator.last_maintenance().unwrap();
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.freed_bytes, 2048);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut h = harness(PagePlan::healthy());

        let exit = h
            .orchestrator
            .run(tokio::time::sleep(Duration::from_millis(300)))
            .await;

        assert!(matches!(exit, RunExit::Shutdown));
        // The first scrape runs immediately, not after the first interval
        assert_eq!(h.orchestrator.run_count(), 1);
        assert_eq!(h.orchestrator.storage().list_versions(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_fatal() {
        let mut h = harness(PagePlan::logged_out());

        let exit = h.orchestrator.run(std::future::pending::<()>()).await;
        match exit {
            RunExit::Fatal(error) => assert_eq!(error.category, ErrorCategory::SessionExpired),
            RunExit::Shutdown => panic!("expected a fatal exit"),
        }
    }

    #[tokio::test]
    async fn test_run_retries_on_backoff_timer() {
        let mut h = harness_with(PagePlan::offline(), |config| {
            config.retry.failure_threshold = 10;
        });

        let browser = h.browser.clone();
        let exit = h
            .orchestrator
            .run(async move {
                // Failures at roughly 0, 20 and 60 ms, then the network comes back
                tokio::time::sleep(Duration::from_millis(100)).await;
                browser.set_plan(PagePlan::healthy());
                tokio::time::sleep(Duration::from_millis(400)).await;
            })
            .await;

        assert!(matches!(exit, RunExit::Shutdown));
        assert!(h.orchestrator.run_count() >= 3);
        assert!(!h.orchestrator.storage().list_versions(None).await.unwrap().is_empty());
    }
}
