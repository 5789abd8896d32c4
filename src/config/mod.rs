//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ObsConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the provider registry is built from it
//!   exactly once, so reconfiguration means reconstruction
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A missing or incomplete analytics section disables that provider; it is
//!   never a load error

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AnalyticsConfig, LoggingConfig, ObsConfig, RetentionConfig, ServiceConfig, StoreConfig,
};
