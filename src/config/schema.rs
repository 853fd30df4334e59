//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy metadata reported by the admin API.
    pub proxy: ProxyMetadataConfig,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Default forwarder settings.
    pub forward: ForwardConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Management API settings.
    pub admin: AdminConfig,

    /// Instances created at startup.
    pub instances: Vec<InstanceConfig>,
}

/// Descriptive metadata for this proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyMetadataConfig {
    pub name: String,
    pub description: String,
}

impl Default for ProxyMetadataConfig {
    fn default() -> Self {
        Self {
            name: "scoped-proxy".to_string(),
            description: String::new(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Forwarder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Send the client's Host header upstream instead of the target's.
    pub pass_host_header: bool,

    /// Fixed upstream URI. When unset the upstream is derived from the
    /// request itself.
    pub target: Option<String>,

    /// Upstream response timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            pass_host_header: true,
            target: None,
            timeout_secs: 30,
        }
    }
}

/// Timeout configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API listener.
    pub enabled: bool,

    /// API key for authentication (Bearer token). No key = open access.
    pub api_key: Option<String>,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// An instance and its scopes.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InstanceConfig {
    pub name: String,
    pub description: String,
    pub scopes: Vec<ScopeConfig>,
}

/// A scope: rules that gate it and the plugins it runs.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ScopeConfig {
    pub name: String,
    pub rules: Vec<RuleConfig>,
    pub plugins: Vec<PluginConfig>,
}

/// A rule referenced by factory name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    pub name: String,
    #[serde(default = "empty_object")]
    pub config: Value,
}

/// A plugin referenced by factory name.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "empty_object")]
    pub config: Value,
    #[serde(default = "empty_object")]
    pub metadata: Value,
}

fn default_enabled() -> bool {
    true
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}
