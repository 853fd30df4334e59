//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → lifecycle::startup builds the proxy and bootstraps instances
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; runtime topology changes go through
//!   the admin API and are not written back
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, ForwardConfig, InstanceConfig, ListenerConfig, ObservabilityConfig,
    PluginConfig, ProxyConfig, ProxyMetadataConfig, RuleConfig, ScopeConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
