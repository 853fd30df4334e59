//! A scope: a rule-gated bundle of plugins.
//!
//! # Responsibilities
//! - Own the scope's gate (`Mux`) and its nested layer
//! - Keep the rule set the gate evaluates
//! - Attach, toggle and detach plugins as phase entries of the nested layer
//!
//! # Design Decisions
//! - Factories run before the writer lock is taken; a failing factory
//!   leaves the scope untouched
//! - A plugin occupies one entry per phase, registered in a single swap

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::Request;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::pipeline::{EntryId, HandlerKind, Layer, LayerArena, Phase, Priority};
use crate::plugins::{PluginHook, PluginInstance};
use crate::registry::Registries;
use crate::routing::{Matcher, Mux};
use crate::rules::RuleInstance;

/// The scope's rules, evaluated with AND semantics.
///
/// An empty set matches every request.
#[derive(Default)]
pub struct RuleSet {
    rules: ArcSwap<Vec<Arc<RuleInstance>>>,
}

impl RuleSet {
    pub fn snapshot(&self) -> Arc<Vec<Arc<RuleInstance>>> {
        self.rules.load_full()
    }

    fn store(&self, rules: Vec<Arc<RuleInstance>>) {
        self.rules.store(Arc::new(rules));
    }
}

impl Matcher for RuleSet {
    fn matches(&self, req: &Request<Body>) -> bool {
        self.rules.load().iter().all(|rule| rule.matches(req))
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules = self.rules.load();
        f.debug_list()
            .entries(rules.iter().map(|r| r.name()))
            .finish()
    }
}

#[derive(Clone)]
struct AttachedPlugin {
    instance: Arc<PluginInstance>,
    entries: Vec<EntryId>,
}

pub struct Scope {
    id: String,
    name: String,
    gate: Arc<Mux>,
    rules: Arc<RuleSet>,
    plugins: ArcSwap<Vec<AttachedPlugin>>,
    registries: Arc<Registries>,
    writer: Mutex<()>,
}

impl Scope {
    /// Build a scope whose gate owns a fresh layer of `arena`.
    ///
    /// The gate is not registered anywhere yet; the owning instance does that.
    pub(crate) fn new(
        name: impl Into<String>,
        arena: &Arc<LayerArena>,
        registries: Arc<Registries>,
    ) -> Self {
        let rules = Arc::new(RuleSet::default());
        let gate = Arc::new(Mux::new(arena, rules.clone()));
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            gate,
            rules,
            plugins: ArcSwap::from_pointee(Vec::new()),
            registries,
            writer: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gate(&self) -> &Arc<Mux> {
        &self.gate
    }

    pub fn layer(&self) -> &Arc<Layer> {
        self.gate.layer()
    }

    /// Whether `req` passes every rule of the scope.
    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.rules.matches(req)
    }

    /// Instantiate rule factory `name` and add it to the rule set.
    pub fn add_rule(
        &self,
        name: &str,
        config: Value,
        metadata: Value,
    ) -> Result<Arc<RuleInstance>, ProxyError> {
        let matcher = self.registries.rules.instantiate(name, &config)?;
        let description = self
            .registries
            .rules
            .info(name)
            .map(|info| info.description)
            .unwrap_or_default();
        let rule = Arc::new(RuleInstance::new(name, description, config, metadata, matcher));

        let _guard = self.writer.lock();
        let mut rules = Vec::clone(&self.rules.snapshot());
        rules.push(rule.clone());
        self.rules.store(rules);

        tracing::info!(scope = %self.id, rule = %rule.id(), factory = name, "Rule attached");
        Ok(rule)
    }

    pub fn remove_rule(&self, id: &str) -> Result<Arc<RuleInstance>, ProxyError> {
        let _guard = self.writer.lock();
        let mut rules = Vec::clone(&self.rules.snapshot());
        let pos = rules
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| ProxyError::not_found("rule", id))?;
        let removed = rules.remove(pos);
        self.rules.store(rules);

        tracing::info!(scope = %self.id, rule = %id, "Rule removed");
        Ok(removed)
    }

    pub fn rules(&self) -> Vec<Arc<RuleInstance>> {
        Vec::clone(&self.rules.snapshot())
    }

    pub fn rule(&self, id: &str) -> Result<Arc<RuleInstance>, ProxyError> {
        self.rules
            .snapshot()
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or_else(|| ProxyError::not_found("rule", id))
    }

    /// Instantiate plugin factory `name` and attach it to every phase of
    /// the scope's layer.
    pub fn add_plugin(
        &self,
        name: &str,
        config: Value,
        metadata: Value,
    ) -> Result<Arc<PluginInstance>, ProxyError> {
        let plugin = self.registries.plugins.instantiate(name, &config)?;
        let description = self
            .registries
            .plugins
            .info(name)
            .map(|info| info.description)
            .unwrap_or_default();
        let instance = Arc::new(PluginInstance::new(
            name,
            description,
            config,
            metadata,
            plugin,
        ));

        let hooks = [Phase::Request, Phase::Response, Phase::Error]
            .into_iter()
            .map(|phase| {
                let hook = Arc::new(PluginHook::new(instance.clone(), phase.clone()));
                (phase, Priority::Normal, HandlerKind::Handler(hook))
            })
            .collect();

        let _guard = self.writer.lock();
        let entries = self.layer().register_batch(hooks)?;
        let mut plugins = Vec::clone(&self.plugins.load());
        plugins.push(AttachedPlugin {
            instance: instance.clone(),
            entries,
        });
        self.plugins.store(Arc::new(plugins));

        tracing::info!(scope = %self.id, plugin = %instance.id(), factory = name, "Plugin attached");
        Ok(instance)
    }

    pub fn remove_plugin(&self, id: &str) -> Result<Arc<PluginInstance>, ProxyError> {
        let _guard = self.writer.lock();
        let mut plugins = Vec::clone(&self.plugins.load());
        let pos = plugins
            .iter()
            .position(|p| p.instance.id() == id)
            .ok_or_else(|| ProxyError::not_found("plugin", id))?;

        if self.layer().unregister(&plugins[pos].entries) == 0 {
            return Err(ProxyError::RemovalFailed {
                kind: "plugin",
                id: id.to_string(),
            });
        }
        let removed = plugins.remove(pos);
        self.plugins.store(Arc::new(plugins));

        tracing::info!(scope = %self.id, plugin = %id, "Plugin removed");
        Ok(removed.instance)
    }

    /// Enable or disable a plugin without detaching it.
    pub fn set_plugin_enabled(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<Arc<PluginInstance>, ProxyError> {
        let plugin = self.plugin(id)?;
        plugin.set_enabled(enabled);
        tracing::info!(scope = %self.id, plugin = %id, enabled, "Plugin toggled");
        Ok(plugin)
    }

    pub fn plugins(&self) -> Vec<Arc<PluginInstance>> {
        self.plugins
            .load()
            .iter()
            .map(|p| p.instance.clone())
            .collect()
    }

    pub fn plugin(&self, id: &str) -> Result<Arc<PluginInstance>, ProxyError> {
        self.plugins
            .load()
            .iter()
            .find(|p| p.instance.id() == id)
            .map(|p| p.instance.clone())
            .ok_or_else(|| ProxyError::not_found("plugin", id))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("layer", &self.layer().id())
            .field("rules", &self.rules)
            .field("plugins", &self.plugins.load().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> Scope {
        // Leaked so the gate's layer keeps a live arena for the whole test.
        let arena: &'static Arc<LayerArena> = Box::leak(Box::new(LayerArena::new()));
        Scope::new("api", arena, Arc::new(Registries::with_builtins()))
    }

    fn request(path: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header("host", "example.com")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_empty_rule_set_matches_everything() {
        let scope = scope();
        assert!(scope.matches(&request("/anything")));
    }

    #[test]
    fn test_rules_are_conjunctive() {
        let scope = scope();
        scope.add_rule("path", json!({ "path": "/api" }), Value::Null).unwrap();
        let vhost = scope
            .add_rule("vhost", json!({ "host": "example.com" }), Value::Null)
            .unwrap();
        scope
            .add_rule("header", json!({ "name": "x-tenant" }), Value::Null)
            .unwrap();

        assert!(!scope.matches(&request("/api/x")));

        let header = scope.rules()[2].id().to_string();
        scope.remove_rule(&header).unwrap();
        assert!(scope.matches(&request("/api/x")));
        assert!(!scope.matches(&request("/web")));
        assert_eq!(scope.rule(vhost.id()).unwrap().name(), "vhost");
    }

    #[test]
    fn test_unknown_plugin_leaves_scope_unchanged() {
        let scope = scope();
        let err = scope.add_plugin("nope", json!({}), Value::Null).unwrap_err();
        assert!(matches!(err, ProxyError::UnknownFactory { .. }));
        assert!(scope.plugins().is_empty());
        assert!(scope.layer().snapshot().is_empty());

        let err = scope
            .add_plugin("ratelimit", json!({ "rps": -1 }), Value::Null)
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidConfig { .. }));
        assert!(scope.plugins().is_empty());
    }

    #[test]
    fn test_plugin_lifecycle() {
        let scope = scope();
        let plugin = scope.add_plugin("logger", json!({}), json!({ "owner": "ops" })).unwrap();
        assert_eq!(plugin.description(), "Logs every request and response passing through the scope");
        assert_eq!(scope.layer().snapshot().len(), 3);

        scope.set_plugin_enabled(plugin.id(), false).unwrap();
        assert!(!scope.plugins()[0].is_enabled());

        scope.remove_plugin(plugin.id()).unwrap();
        assert!(scope.layer().snapshot().is_empty());
        assert!(matches!(
            scope.remove_plugin(plugin.id()),
            Err(ProxyError::NotFound { kind: "plugin", .. })
        ));
        assert!(matches!(
            scope.remove_rule("missing"),
            Err(ProxyError::NotFound { kind: "rule", .. })
        ));
    }
}
