//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (queue depth, timeouts, retention windows)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ObsConfig → Result<(), Vec<ValidationError>>
//! - An unconfigured analytics section is valid: it disables the provider,
//!   it does not fail validation

use thiserror::Error;

use crate::config::schema::ObsConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("store.db_path must not be empty")]
    EmptyDbPath,

    #[error("store.writer_queue_depth must be greater than zero")]
    ZeroQueueDepth,

    #[error("service.provider_timeout_ms must be greater than zero")]
    ZeroProviderTimeout,

    #[error("service.{field} must be greater than zero")]
    ZeroTruncationCap { field: &'static str },

    #[error("analytics.request_timeout_ms must be greater than zero")]
    ZeroAnalyticsTimeout,

    #[error("retention.interval_secs must be greater than zero")]
    ZeroRetentionInterval,

    #[error("retention window for {table} must be greater than zero days")]
    ZeroRetentionWindow { table: &'static str },
}

/// Check semantic constraints across the whole config.
pub fn validate_config(config: &ObsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.store.db_path.trim().is_empty() {
        errors.push(ValidationError::EmptyDbPath);
    }
    if config.store.writer_queue_depth == 0 {
        errors.push(ValidationError::ZeroQueueDepth);
    }

    if config.service.provider_timeout_ms == 0 {
        errors.push(ValidationError::ZeroProviderTimeout);
    }
    if config.service.preview_max_bytes == 0 {
        errors.push(ValidationError::ZeroTruncationCap {
            field: "preview_max_bytes",
        });
    }
    if config.service.error_max_bytes == 0 {
        errors.push(ValidationError::ZeroTruncationCap {
            field: "error_max_bytes",
        });
    }

    if config.analytics.request_timeout_ms == 0 {
        errors.push(ValidationError::ZeroAnalyticsTimeout);
    }

    if config.retention.interval_secs == 0 {
        errors.push(ValidationError::ZeroRetentionInterval);
    }
    for (table, days) in [
        ("traces", config.retention.traces_days),
        ("spans", config.retention.spans_days),
        ("llm_calls", config.retention.llm_calls_days),
        ("chat_messages", config.retention.chat_messages_days),
        ("document_events", config.retention.document_events_days),
    ] {
        if days == 0 {
            errors.push(ValidationError::ZeroRetentionWindow { table });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ObsConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ObsConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_are_collected() {
        let mut config = ObsConfig::default();
        config.store.writer_queue_depth = 0;
        config.service.provider_timeout_ms = 0;
        config.retention.traces_days = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::ZeroQueueDepth));
        assert!(errors.contains(&ValidationError::ZeroRetentionWindow { table: "traces" }));
    }

    #[test]
    fn test_unconfigured_analytics_is_valid() {
        let mut config = ObsConfig::default();
        config.analytics.enabled = true;
        // endpoint and api_key left empty: provider ends up disabled, but
        // the config itself is fine
        assert!(validate_config(&config).is_ok());
    }
}
