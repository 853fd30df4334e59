//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Check bootstrap topology (named instances, scopes and factories)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Factory names are checked against registries later, at bootstrap

use std::net::SocketAddr;

use axum::http::Uri;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check `config`, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.bind_address == config.listener.bind_address {
            errors.push(ValidationError::new(
                "admin.bind_address",
                "must differ from listener.bind_address",
            ));
        }
    }
    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.forward.timeout_secs == 0 {
        errors.push(ValidationError::new("forward.timeout_secs", "must be greater than 0"));
    }
    if let Some(target) = &config.forward.target {
        match target.parse::<Uri>() {
            Ok(uri) if uri.scheme().is_some() && uri.authority().is_some() => {}
            _ => errors.push(ValidationError::new(
                "forward.target",
                format!("'{target}' is not an absolute http URI"),
            )),
        }
    }

    match config.observability.log_format.to_ascii_lowercase().as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{other}' (expected pretty or json)"),
        )),
    }

    for (i, instance) in config.instances.iter().enumerate() {
        let base = format!("instances[{i}]");
        if instance.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{base}.name"), "must not be empty"));
        }
        for (j, scope) in instance.scopes.iter().enumerate() {
            let base = format!("{base}.scopes[{j}]");
            if scope.name.trim().is_empty() {
                errors.push(ValidationError::new(format!("{base}.name"), "must not be empty"));
            }
            for (k, rule) in scope.rules.iter().enumerate() {
                if rule.name.trim().is_empty() {
                    errors.push(ValidationError::new(
                        format!("{base}.rules[{k}].name"),
                        "factory name must not be empty",
                    ));
                }
            }
            for (k, plugin) in scope.plugins.iter().enumerate() {
                if plugin.name.trim().is_empty() {
                    errors.push(ValidationError::new(
                        format!("{base}.plugins[{k}].name"),
                        "factory name must not be empty",
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError::new(field, "must not be empty"));
    } else if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{value}' is not a valid socket address"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{InstanceConfig, PluginConfig, ScopeConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = String::new();
        config.timeouts.request_secs = 0;
        config.forward.target = Some("not a uri".into());
        config.instances.push(InstanceConfig {
            name: " ".into(),
            description: String::new(),
            scopes: vec![ScopeConfig {
                name: "api".into(),
                rules: vec![],
                plugins: vec![PluginConfig {
                    name: String::new(),
                    enabled: true,
                    config: serde_json::json!({}),
                    metadata: serde_json::json!({}),
                }],
            }],
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "timeouts.request_secs",
                "forward.target",
                "instances[0].name",
                "instances[0].scopes[0].plugins[0].name",
            ]
        );
    }

    #[test]
    fn test_relative_target_rejected() {
        let mut config = ProxyConfig::default();
        config.forward.target = Some("/just/a/path".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "forward.target");

        config.forward.target = Some("http://127.0.0.1:3000".into());
        assert!(validate_config(&config).is_ok());
    }
}
