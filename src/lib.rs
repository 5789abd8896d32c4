//! Tracekeeper: embedded observability core for LLM-centric applications.
//!
//! # Architecture Overview
//!
//! ```text
//! instrumented business code
//!     │
//!     ▼
//! ObservabilityService (service.rs)          registry + fan-out
//!     │  per-call deadline, failures swallowed
//!     ├──▶ SqliteProvider (store/)           durable, partitioned
//!     │        bounded queue → writer thread → daily/weekly tables
//!     └──▶ AnalyticsProvider (analytics.rs)  optional external backend
//!              sync_status bookkeeping via the store
//!
//! RetentionJob (retention.rs)                drops expired partitions
//! TraceReader (store/reader.rs)              read-only query surface
//! ```

// Core domain
pub mod context;
pub mod model;
pub mod provider;

// Providers and registry
pub mod analytics;
pub mod service;
pub mod store;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod retention;

pub use config::{load_config, ObsConfig};
pub use context::{TraceContext, TraceScope};
pub use lifecycle::Shutdown;
pub use provider::ObservabilityProvider;
pub use service::{ObservabilityService, SpanRecorder};
pub use store::SqliteStore;
