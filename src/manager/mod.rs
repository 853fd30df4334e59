//! Instance / scope hierarchy and its administrative operations.
//!
//! # Data Flow
//! ```text
//! root layer ("request", "response")
//!     → instance layer          (HandlerKind::Layer, Normal, creation order)
//!         → scope gate (Mux)    (HandlerKind::Gate, Normal, creation order)
//!             rules (AND) match → scope layer: plugin hooks
//!             no match          → next scope
//!     → router (Tail) → final handler (forwarder)
//! ```
//!
//! # Responsibilities
//! - Create and remove instances, scopes, rules and plugins
//! - Serialize structural mutations per level with a writer lock
//! - Expose read-only snapshots for the admin surface
//!
//! # Design Decisions
//! - Collections are `ArcSwap<Vec<_>>`: readers never block, writers copy
//! - Each request pins one table per layer, so a removal is observed either
//!   fully or not at all by a request in flight
//! - Nested layers join their parent's "request" and "response" phases
//!   only; an "error" phase runs in the layer that raised the failure

mod instance;
mod scope;
pub mod view;

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::InstanceConfig;
use crate::error::ProxyError;
use crate::pipeline::{HandlerKind, Layer, LayerArena, Phase, Priority};
use crate::registry::Registries;

pub use instance::Instance;
pub use scope::{RuleSet, Scope};
pub use view::{CatalogueView, InstanceView, ItemView, ScopeView};

pub struct Manager {
    arena: Arc<LayerArena>,
    root: Arc<Layer>,
    registries: Arc<Registries>,
    instances: ArcSwap<Vec<Arc<Instance>>>,
    writer: Mutex<()>,
}

impl Manager {
    /// Instances are attached to `root`, which must belong to `arena`.
    pub fn new(arena: Arc<LayerArena>, root: Arc<Layer>, registries: Arc<Registries>) -> Self {
        Self {
            arena,
            root,
            registries,
            instances: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    pub fn catalogue(&self) -> CatalogueView {
        CatalogueView {
            plugins: self.registries.plugins.catalogue(),
            rules: self.registries.rules.catalogue(),
        }
    }

    pub fn create_instance(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Arc<Instance>, ProxyError> {
        let _guard = self.writer.lock();

        let layer = self.arena.create();
        let nested = [Phase::Request, Phase::Response]
            .into_iter()
            .map(|phase| (phase, Priority::Normal, HandlerKind::Layer(layer.clone())))
            .collect();
        let entries = match self.root.register_batch(nested) {
            Ok(entries) => entries,
            Err(err) => {
                self.arena.remove(layer.id());
                return Err(err);
            }
        };

        let instance = Arc::new(Instance::new(
            name,
            description,
            layer,
            entries,
            self.arena.clone(),
            self.registries.clone(),
        ));
        let mut instances = Vec::clone(&self.instances.load());
        instances.push(instance.clone());
        self.instances.store(Arc::new(instances));

        tracing::info!(
            instance = %instance.id(),
            name,
            layer = %instance.layer().id(),
            "Instance created"
        );
        Ok(instance)
    }

    /// Detach an instance and flush its layer.
    pub fn remove_instance(&self, id: &str) -> Result<Arc<Instance>, ProxyError> {
        let _guard = self.writer.lock();
        let mut instances = Vec::clone(&self.instances.load());
        let pos = instances
            .iter()
            .position(|i| i.id() == id)
            .ok_or_else(|| ProxyError::not_found("instance", id))?;

        if self.root.unregister(instances[pos].root_entries()) == 0 {
            return Err(ProxyError::RemovalFailed {
                kind: "instance",
                id: id.to_string(),
            });
        }
        let removed = instances.remove(pos);
        self.instances.store(Arc::new(instances));

        let scopes = removed.flush();
        self.arena.remove(removed.layer().id());

        tracing::info!(instance = %id, scopes, "Instance removed");
        Ok(removed)
    }

    pub fn instances(&self) -> Vec<Arc<Instance>> {
        Vec::clone(&self.instances.load())
    }

    pub fn instance(&self, id: &str) -> Result<Arc<Instance>, ProxyError> {
        self.instances
            .load()
            .iter()
            .find(|i| i.id() == id)
            .cloned()
            .ok_or_else(|| ProxyError::not_found("instance", id))
    }

    /// Shorthand for `instance(instance_id)?.scope(scope_id)`.
    pub fn scope(&self, instance_id: &str, scope_id: &str) -> Result<Arc<Scope>, ProxyError> {
        self.instance(instance_id)?.scope(scope_id)
    }

    /// Remove every instance.
    pub fn flush(&self) -> usize {
        let ids: Vec<String> = self.instances().iter().map(|i| i.id().to_string()).collect();
        ids.iter()
            .filter(|id| self.remove_instance(id).is_ok())
            .count()
    }

    /// Build the topology described by `configs` through the regular
    /// create operations. Stops at the first failure.
    pub fn load(&self, configs: &[InstanceConfig]) -> Result<(), ProxyError> {
        for config in configs {
            let instance = self.create_instance(&config.name, &config.description)?;
            for scope_config in &config.scopes {
                let scope = instance.create_scope(&scope_config.name)?;
                for rule in &scope_config.rules {
                    scope.add_rule(&rule.name, rule.config.clone(), Value::Null)?;
                }
                for plugin in &scope_config.plugins {
                    let attached = scope.add_plugin(
                        &plugin.name,
                        plugin.config.clone(),
                        plugin.metadata.clone(),
                    )?;
                    attached.set_enabled(plugin.enabled);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("root", &self.root.id())
            .field("instances", &self.instances.load().len())
            .finish()
    }
}
