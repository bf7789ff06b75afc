use serde::Deserialize;

/// Main configuration structure for Usage-Keeper
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub scraper: ScraperConfig,
    pub retry: RetryConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub schedule: ScheduleConfig,
}

/// Persisted browser session configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Directory the browser treats as its persistent profile
    pub profile_dir: String,

    /// Page holding the usage figures
    pub usage_url: String,

    /// Substring of the URL the service redirects to when logged out
    pub login_url_pattern: String,

    /// Text that only appears on the page when authenticated
    pub authenticated_marker: String,

    /// Cookie header file inside the profile, replayed by the HTTP browser
    pub cookie_file: String,

    /// Bound on page navigation (seconds)
    pub navigation_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile_dir: "./.browser-profile".to_string(),
            usage_url: "https://console.anthropic.com/settings/usage".to_string(),
            login_url_pattern: "/login".to_string(),
            authenticated_marker: "Current session".to_string(),
            cookie_file: "cookies.txt".to_string(),
            navigation_timeout_secs: 10,
        }
    }
}

/// Section extraction configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScraperConfig {
    /// Bound on waiting for each section to appear (seconds)
    pub section_timeout_secs: u64,

    /// Label locating the current-session window
    pub current_session_label: String,

    /// Label locating the all-models weekly window
    pub all_models_label: String,

    /// Label locating the sonnet-only weekly window
    pub sonnet_only_label: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            section_timeout_secs: 15,
            current_session_label: "Current session".to_string(),
            all_models_label: "All models".to_string(),
            sonnet_only_label: "Sonnet only".to_string(),
        }
    }
}

/// Backoff and circuit breaker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_secs: f64,
    pub max_attempts: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_duration_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 30_000,
            max_delay_ms: 300_000,
            jitter_secs: 10.0,
            max_attempts: 5,
            failure_threshold: 3,
            success_threshold: 2,
            open_duration_ms: 60_000,
        }
    }
}

/// Version history configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Directory holding one JSON file per snapshot
    pub directory: String,

    /// Latest-snapshot pointer file (defaults to `latest.json` inside `directory`)
    pub latest_file: Option<String>,

    /// Versions younger than this are always kept
    pub retention_days: u32,

    /// Minimum number of most recent versions to keep
    pub max_versions: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: "./data/usage-history".to_string(),
            latest_file: None,
            retention_days: 7,
            max_versions: 100,
        }
    }
}

/// Remote sync endpoint configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SyncConfig {
    pub enabled: bool,

    /// `POST` target for snapshots
    pub endpoint: String,

    /// Sent as `X-API-Key`; falls back to `USAGE_SYNC_API_KEY` when empty
    pub api_key: String,

    pub timeout_secs: u64,

    /// Fixed delays between attempts (seconds)
    pub retry_delays_secs: Vec<u64>,

    pub max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: String::new(),
            timeout_secs: 10,
            retry_delays_secs: vec![10, 20, 40],
            max_attempts: 3,
        }
    }
}

/// Scrape loop scheduling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScheduleConfig {
    /// Fixed interval between scheduled scrapes (seconds)
    pub interval_secs: u64,

    /// Run cache maintenance every N cycles (0 disables the count trigger)
    pub maintenance_every_runs: u64,

    /// Run cache maintenance when profile caches exceed this size (MB)
    pub cache_size_threshold_mb: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            maintenance_every_runs: 12,
            cache_size_threshold_mb: 500,
        }
    }
}
