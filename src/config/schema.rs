//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! observability core. All types derive Serde traits for deserialization
//! from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the observability core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ObsConfig {
    /// Persistent store settings (SQLite path, writer queue).
    pub store: StoreConfig,

    /// Registry/fan-out settings.
    pub service: ServiceConfig,

    /// Optional external analytics backend.
    pub analytics: AnalyticsConfig,

    /// Retention/cleanup job settings.
    pub retention: RetentionConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Persistent store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub db_path: String,

    /// Bounded depth of the writer command queue. When full, writes are
    /// dropped and counted, never blocked on.
    pub writer_queue_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: "tracekeeper.db".to_string(),
            writer_queue_depth: 4096,
        }
    }
}

/// Registry/fan-out configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Per-provider call deadline in milliseconds. A timeout is an ordinary
    /// swallowed provider failure.
    pub provider_timeout_ms: u64,

    /// Cap on stored input/output previews in bytes.
    pub preview_max_bytes: usize,

    /// Cap on stored error type/message in bytes.
    pub error_max_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 250,
            preview_max_bytes: 4096,
            error_max_bytes: 1024,
        }
    }
}

/// External analytics backend configuration.
///
/// The provider is active only when `enabled` is set and both `endpoint` and
/// `api_key` are non-empty; anything less yields `enabled() == false`, never
/// a construction error.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Enable the external analytics provider.
    pub enabled: bool,

    /// Ingest endpoint of the vendor backend.
    pub endpoint: String,

    /// API key sent as a bearer token.
    pub api_key: String,

    /// Outbound request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: String::new(),
            request_timeout_ms: 2000,
        }
    }
}

/// Retention/cleanup job configuration.
///
/// Windows are per base table: the high-volume daily-partitioned trace
/// tables are typically kept shorter than the lower-volume
/// weekly-partitioned event tables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Enable the periodic cleanup loop.
    pub enabled: bool,

    /// Interval between cleanup runs in seconds.
    pub interval_secs: u64,

    /// Report expired partitions without dropping them.
    pub dry_run: bool,

    /// Retention window for the traces table in days.
    pub traces_days: u32,

    /// Retention window for the spans table in days.
    pub spans_days: u32,

    /// Retention window for the llm_calls table in days.
    pub llm_calls_days: u32,

    /// Retention window for the chat_messages table in days.
    pub chat_messages_days: u32,

    /// Retention window for the document_events table in days.
    pub document_events_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            dry_run: false,
            traces_days: 90,
            spans_days: 90,
            llm_calls_days: 90,
            chat_messages_days: 180,
            document_events_days: 180,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_a_valid_config() {
        let config: ObsConfig = toml::from_str("").unwrap();
        assert_eq!(config.store.db_path, "tracekeeper.db");
        assert_eq!(config.retention.traces_days, 90);
        assert_eq!(config.retention.chat_messages_days, 180);
        assert!(!config.analytics.enabled);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: ObsConfig = toml::from_str(
            r#"
            [retention]
            traces_days = 30
            dry_run = true
            "#,
        )
        .unwrap();
        assert_eq!(config.retention.traces_days, 30);
        assert!(config.retention.dry_run);
        assert_eq!(config.retention.spans_days, 90);
        assert_eq!(config.service.provider_timeout_ms, 250);
    }
}
