use crate::config::types::{
    Config, RetryConfig, ScheduleConfig, ScraperConfig, SessionConfig, StorageConfig, SyncConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_session_config(&config.session)?;
    validate_scraper_config(&config.scraper)?;
    validate_retry_config(&config.retry)?;
    validate_storage_config(&config.storage)?;
    validate_sync_config(&config.sync)?;
    validate_schedule_config(&config.schedule)?;
    Ok(())
}

/// Validates persisted session configuration
fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.profile_dir.is_empty() {
        return Err(ConfigError::Validation(
            "profile_dir cannot be empty".to_string(),
        ));
    }

    let url = Url::parse(&config.usage_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid usage_url: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Validation(format!(
            "usage_url must use http or https, got '{}'",
            config.usage_url
        )));
    }

    if config.login_url_pattern.is_empty() {
        return Err(ConfigError::Validation(
            "login_url_pattern cannot be empty".to_string(),
        ));
    }

    if config.authenticated_marker.is_empty() {
        return Err(ConfigError::Validation(
            "authenticated_marker cannot be empty".to_string(),
        ));
    }

    if config.navigation_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "navigation_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates section extraction configuration
fn validate_scraper_config(config: &ScraperConfig) -> Result<(), ConfigError> {
    if config.section_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "section_timeout_secs must be >= 1".to_string(),
        ));
    }

    for (name, label) in [
        ("current_session_label", &config.current_session_label),
        ("all_models_label", &config.all_models_label),
        ("sonnet_only_label", &config.sonnet_only_label),
    ] {
        if label.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

/// Validates backoff and circuit breaker configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.base_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "base_delay_ms must be >= 1".to_string(),
        ));
    }

    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base_delay_ms ({}) must not exceed max_delay_ms ({})",
            config.base_delay_ms, config.max_delay_ms
        )));
    }

    if !config.jitter_secs.is_finite() || config.jitter_secs < 0.0 {
        return Err(ConfigError::Validation(format!(
            "jitter_secs must be a non-negative number, got {}",
            config.jitter_secs
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_attempts must be >= 1".to_string(),
        ));
    }

    if config.failure_threshold < 1 || config.success_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "circuit thresholds must be >= 1, got failure={} success={}",
            config.failure_threshold, config.success_threshold
        )));
    }

    Ok(())
}

/// Validates version history configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.directory.is_empty() {
        return Err(ConfigError::Validation(
            "storage directory cannot be empty".to_string(),
        ));
    }

    if config.max_versions < 1 {
        return Err(ConfigError::Validation(
            "max_versions must be >= 1".to_string(),
        ));
    }

    if let Some(latest) = &config.latest_file {
        if latest.is_empty() {
            return Err(ConfigError::Validation(
                "latest_file cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates remote sync configuration
fn validate_sync_config(config: &SyncConfig) -> Result<(), ConfigError> {
    if !config.enabled {
        return Ok(());
    }

    Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid sync endpoint: {}", e)))?;

    if config.api_key.is_empty() {
        return Err(ConfigError::Validation(
            "sync is enabled but no api_key is configured".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "sync timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "sync max_attempts must be >= 1".to_string(),
        ));
    }

    if config.retry_delays_secs.is_empty() {
        return Err(ConfigError::Validation(
            "sync retry_delays_secs cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates scheduling configuration
fn validate_schedule_config(config: &ScheduleConfig) -> Result<(), ConfigError> {
    if config.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}
