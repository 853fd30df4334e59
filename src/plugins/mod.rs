//! Plugins: configurable middleware attached to scopes.
//!
//! # Data Flow
//! ```text
//! Registry::instantiate("logger", config) → Arc<dyn Plugin>
//!     → PluginInstance (id, name, enabled flag, config, metadata)
//!     → one PluginHook per phase, registered in the scope's layer
//!
//! request time:
//!     PluginHook::handle
//!         disabled → next.run()
//!         enabled  → Plugin::on_request / on_response / on_error
//! ```
//!
//! # Design Decisions
//! - The enabled flag is read on every request, so toggling it needs no
//!   table swap and the plugin stays visible while disabled
//! - Hooks default to "continue", so a plugin only overrides what it uses

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::error::HandlerResult;
use crate::observability::metrics;
use crate::pipeline::{BoxFuture, Exchange, Handler, Next, Phase};
use crate::registry::Registry;

pub mod headers;
pub mod logger;
pub mod ratelimit;
pub mod static_response;

/// Middleware produced by a plugin factory.
pub trait Plugin: Send + Sync + 'static {
    /// Called in the "request" phase.
    fn on_request<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        next.run(exchange)
    }

    /// Called in the "response" phase, once a response exists.
    fn on_response<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        next.run(exchange)
    }

    /// Called in the "error" phase. `exchange.failure()` holds the error.
    fn on_error<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        next.run(exchange)
    }
}

/// A configured plugin bound to a scope.
pub struct PluginInstance {
    id: String,
    name: String,
    description: String,
    enabled: AtomicBool,
    config: Value,
    metadata: Value,
    plugin: Arc<dyn Plugin>,
}

impl PluginInstance {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        config: Value,
        metadata: Value,
        plugin: Arc<dyn Plugin>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            enabled: AtomicBool::new(true),
            config,
            metadata,
            plugin,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Factory name the plugin was built from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Phase entry that runs one hook of a plugin instance.
pub struct PluginHook {
    instance: Arc<PluginInstance>,
    phase: Phase,
}

impl PluginHook {
    pub fn new(instance: Arc<PluginInstance>, phase: Phase) -> Self {
        Self { instance, phase }
    }
}

impl Handler for PluginHook {
    fn handle<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        if !self.instance.is_enabled() {
            return next.run(exchange);
        }

        if let Phase::Custom(_) = self.phase {
            return next.run(exchange);
        }

        tracing::debug!(
            plugin = %self.instance.name,
            plugin_id = %self.instance.id,
            phase = %self.phase,
            request_id = %exchange.request_id(),
            "Running plugin"
        );
        metrics::record_plugin_execution(&self.instance.name, self.phase.as_str());

        let plugin = &self.instance.plugin;
        match self.phase {
            Phase::Request => plugin.on_request(exchange, next),
            Phase::Response => plugin.on_response(exchange, next),
            _ => plugin.on_error(exchange, next),
        }
    }
}

/// Register the built-in plugin factories.
pub fn register_builtin(registry: &Registry<Arc<dyn Plugin>>) {
    logger::register(registry);
    headers::register(registry);
    static_response::register(registry);
    ratelimit::register(registry);
}
