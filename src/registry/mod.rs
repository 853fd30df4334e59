//! Factory registries for plugins and rules.
//!
//! # Data Flow
//! ```text
//! startup: register_builtin(&registries)
//!     → Registry::register(FactoryInfo, factory)
//!
//! admin / bootstrap: "attach plugin 'logger' with {..}"
//!     → Registry::instantiate(name, config)
//!         unknown name        → UnknownFactory
//!         missing mandatory   → InvalidConfig
//!         factory rejects     → InvalidConfig (with the factory's reason)
//!         ok                  → T
//! ```
//!
//! # Design Decisions
//! - Registries are plain values owned by the composition root, not
//!   process globals; tests build isolated ones
//! - `DashMap` gives concurrent lookups; the factory is cloned out of the
//!   map before it runs so no shard lock is held during instantiation

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::{BoxError, ProxyError};
use crate::plugins::Plugin;
use crate::routing::Matcher;

/// Declared configuration field of a factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub mandatory: bool,
    pub example: String,
}

impl Param {
    pub fn required(name: &str, kind: &str, description: &str, example: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            description: description.to_string(),
            mandatory: true,
            example: example.to_string(),
        }
    }

    pub fn optional(name: &str, kind: &str, description: &str, example: &str) -> Self {
        Self {
            mandatory: false,
            ..Self::required(name, kind, description, example)
        }
    }
}

/// Catalogue entry describing a factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactoryInfo {
    pub name: String,
    pub description: String,
    pub params: Vec<Param>,
}

impl FactoryInfo {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }
}

/// Builds a `T` from a configuration object.
pub type Factory<T> = Arc<dyn Fn(&Value) -> Result<T, BoxError> + Send + Sync>;

struct Registration<T> {
    info: FactoryInfo,
    factory: Factory<T>,
}

impl<T> Clone for Registration<T> {
    fn clone(&self) -> Self {
        Self {
            info: self.info.clone(),
            factory: self.factory.clone(),
        }
    }
}

/// Name → factory table.
pub struct Registry<T> {
    kind: &'static str,
    entries: DashMap<String, Registration<T>>,
}

impl<T> Registry<T> {
    /// `kind` names the product ("plugin", "rule") in errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Register a factory. Replaces any previous one with the same name.
    pub fn register<F>(&self, info: FactoryInfo, factory: F)
    where
        F: Fn(&Value) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let name = info.name.clone();
        let replaced = self
            .entries
            .insert(
                name.clone(),
                Registration {
                    info,
                    factory: Arc::new(factory),
                },
            )
            .is_some();
        tracing::debug!(kind = self.kind, name = %name, replaced, "Factory registered");
    }

    /// Remove a factory. Instances already built from it are unaffected.
    pub fn remove(&self, name: &str) -> Result<FactoryInfo, ProxyError> {
        self.entries
            .remove(name)
            .map(|(_, registration)| registration.info)
            .ok_or_else(|| ProxyError::UnknownFactory {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn info(&self, name: &str) -> Option<FactoryInfo> {
        self.entries.get(name).map(|r| r.info.clone())
    }

    /// Every registered factory, sorted by name.
    pub fn catalogue(&self) -> Vec<FactoryInfo> {
        let mut infos: Vec<FactoryInfo> = self.entries.iter().map(|r| r.info.clone()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a `T` from the factory registered under `name`.
    pub fn instantiate(&self, name: &str, config: &Value) -> Result<T, ProxyError> {
        let registration = self
            .entries
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| ProxyError::UnknownFactory {
                kind: self.kind,
                name: name.to_string(),
            })?;

        let invalid = |reason: String| ProxyError::InvalidConfig {
            kind: self.kind,
            name: name.to_string(),
            reason,
        };

        if !(config.is_object() || config.is_null()) {
            return Err(invalid("configuration must be an object".to_string()));
        }
        for param in registration.info.params.iter().filter(|p| p.mandatory) {
            if config.get(&param.name).map_or(true, Value::is_null) {
                return Err(invalid(format!("missing mandatory parameter '{}'", param.name)));
            }
        }

        (registration.factory)(config).map_err(|e| invalid(e.to_string()))
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("factories", &self.len())
            .finish()
    }
}

/// The two registries a proxy works with.
#[derive(Debug)]
pub struct Registries {
    pub plugins: Registry<Arc<dyn Plugin>>,
    pub rules: Registry<Arc<dyn Matcher>>,
}

impl Registries {
    /// Empty registries.
    pub fn new() -> Self {
        Self {
            plugins: Registry::new("plugin"),
            rules: Registry::new("rule"),
        }
    }

    /// Registries preloaded with the built-in plugins and rules.
    pub fn with_builtins() -> Self {
        let registries = Self::new();
        crate::plugins::register_builtin(&registries.plugins);
        crate::rules::register_builtin(&registries.rules);
        registries
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a string field from a factory configuration.
pub fn str_field<'a>(config: &'a Value, name: &str) -> Result<Option<&'a str>, BoxError> {
    match config.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(format!("'{name}' must be a string").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry<String> {
        let registry = Registry::new("rule");
        registry.register(
            FactoryInfo::new("greeting", "Says hello")
                .param(Param::required("who", "string", "Who to greet", "world")),
            |config: &Value| {
                let who = str_field(config, "who")?.unwrap_or_default();
                if who == "nobody" {
                    return Err("cannot greet nobody".into());
                }
                Ok(format!("hello {who}"))
            },
        );
        registry
    }

    #[test]
    fn test_instantiate() {
        let registry = registry();
        let built = registry
            .instantiate("greeting", &serde_json::json!({ "who": "world" }))
            .unwrap();
        assert_eq!(built, "hello world");
    }

    #[test]
    fn test_unknown_factory() {
        let err = registry()
            .instantiate("missing", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, ProxyError::UnknownFactory { kind: "rule", .. }));
    }

    #[test]
    fn test_invalid_config() {
        let registry = registry();

        let err = registry
            .instantiate("greeting", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidConfig { ref reason, .. } if reason.contains("who")));

        let err = registry
            .instantiate("greeting", &serde_json::json!({ "who": "nobody" }))
            .unwrap_err();
        assert!(
            matches!(err, ProxyError::InvalidConfig { ref reason, .. } if reason == "cannot greet nobody")
        );

        let err = registry
            .instantiate("greeting", &serde_json::json!({ "who": 7 }))
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidConfig { .. }));

        let err = registry
            .instantiate("greeting", &serde_json::json!(["who"]))
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidConfig { .. }));
    }

    #[test]
    fn test_catalogue_sorted_and_remove() {
        let registry = registry();
        registry.register(FactoryInfo::new("alpha", "First"), |_: &Value| Ok("a".to_string()));

        let names: Vec<String> = registry.catalogue().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["alpha", "greeting"]);

        assert_eq!(registry.remove("alpha").unwrap().name, "alpha");
        assert!(matches!(
            registry.remove("alpha"),
            Err(ProxyError::UnknownFactory { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_catalogue_serializes_type_field() {
        let info = FactoryInfo::new("path", "Path prefix")
            .param(Param::required("path", "string", "Prefix", "/api"));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["params"][0]["type"], "string");
        assert_eq!(json["params"][0]["mandatory"], true);
    }
}
