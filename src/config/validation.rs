use crate::config::types::{Config, ScrapeSettings, ServiceConfig};
use crate::ConfigError;

/// Bulk submissions carry between 1 and this many URLs
pub const MAX_BULK_URLS: usize = 50;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_service_config(&config.service)?;
    validate_settings(&config.scraper)?;
    validate_quotas(config)?;
    Ok(())
}

/// Validates job execution configuration
fn validate_service_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max_retries must be at most 10, got {}",
            config.max_retries
        )));
    }

    Ok(())
}

/// Validates scrape settings, whether from config defaults or a submission
///
/// These are the synchronous checks that keep bad requests out of the job
/// state machine entirely.
pub fn validate_settings(settings: &ScrapeSettings) -> Result<(), ConfigError> {
    if settings.page_timeout_ms < 5_000 || settings.page_timeout_ms > 120_000 {
        return Err(ConfigError::Validation(format!(
            "page_timeout_ms must be between 5000 and 120000, got {}",
            settings.page_timeout_ms
        )));
    }

    if settings.max_concurrent < 1 || settings.max_concurrent > 10 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and 10, got {}",
            settings.max_concurrent
        )));
    }

    if settings.page_budget < 1 || settings.page_budget > 100 {
        return Err(ConfigError::Validation(format!(
            "page_budget must be between 1 and 100, got {}",
            settings.page_budget
        )));
    }

    if settings.request_delay_ms > 10_000 {
        return Err(ConfigError::Validation(format!(
            "request_delay_ms must be at most 10000, got {}",
            settings.request_delay_ms
        )));
    }

    if settings.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the size of a bulk URL list
pub fn validate_bulk_size(count: usize) -> Result<(), ConfigError> {
    if count == 0 || count > MAX_BULK_URLS {
        return Err(ConfigError::Validation(format!(
            "bulk requests must carry between 1 and {} URLs, got {}",
            MAX_BULK_URLS, count
        )));
    }
    Ok(())
}

/// Validates quota overrides, including their tier and operation names
fn validate_quotas(config: &Config) -> Result<(), ConfigError> {
    use crate::limiter::{OperationKind, Tier};

    for (tier_name, ops) in &config.quotas {
        if Tier::parse(tier_name).is_none() {
            return Err(ConfigError::Validation(format!(
                "unknown tier '{}' in quota overrides",
                tier_name
            )));
        }
        for (op_name, policy) in ops {
            if OperationKind::parse(op_name).is_none() {
                return Err(ConfigError::Validation(format!(
                    "unknown operation '{}' in quota overrides",
                    op_name
                )));
            }
            if policy.max_requests == 0 {
                return Err(ConfigError::Validation(format!(
                    "quota for {}/{} must allow at least 1 request",
                    tier_name, op_name
                )));
            }
            if policy.window_seconds == 0 {
                return Err(ConfigError::Validation(format!(
                    "quota window for {}/{} must be at least 1 second",
                    tier_name, op_name
                )));
            }
        }
    }
    Ok(())
}
