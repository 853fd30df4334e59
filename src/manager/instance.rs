//! An instance: the isolation root grouping scopes.
//!
//! Scope order is gate order: scopes run in the order they were created.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::ProxyError;
use crate::manager::scope::Scope;
use crate::pipeline::{EntryId, HandlerKind, Layer, LayerArena, Phase, Priority};
use crate::registry::Registries;

#[derive(Clone)]
struct AttachedScope {
    scope: Arc<Scope>,
    entries: Vec<EntryId>,
}

pub struct Instance {
    id: String,
    name: String,
    description: String,
    layer: Arc<Layer>,
    root_entries: Vec<EntryId>,
    arena: Arc<LayerArena>,
    registries: Arc<Registries>,
    scopes: ArcSwap<Vec<AttachedScope>>,
    writer: Mutex<()>,
}

impl Instance {
    pub(crate) fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        layer: Arc<Layer>,
        root_entries: Vec<EntryId>,
        arena: Arc<LayerArena>,
        registries: Arc<Registries>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            layer,
            root_entries,
            arena,
            registries,
            scopes: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn layer(&self) -> &Arc<Layer> {
        &self.layer
    }

    pub(crate) fn root_entries(&self) -> &[EntryId] {
        &self.root_entries
    }

    /// Create an empty scope gated into this instance's layer.
    pub fn create_scope(&self, name: &str) -> Result<Arc<Scope>, ProxyError> {
        let scope = Arc::new(Scope::new(name, &self.arena, self.registries.clone()));

        let _guard = self.writer.lock();
        let gates = [Phase::Request, Phase::Response]
            .into_iter()
            .map(|phase| (phase, Priority::Normal, HandlerKind::Gate(scope.gate().clone())))
            .collect();
        let entries = match self.layer.register_batch(gates) {
            Ok(entries) => entries,
            Err(err) => {
                self.arena.remove(scope.layer().id());
                return Err(err);
            }
        };

        let mut scopes = Vec::clone(&self.scopes.load());
        scopes.push(AttachedScope {
            scope: scope.clone(),
            entries,
        });
        self.scopes.store(Arc::new(scopes));

        tracing::info!(
            instance = %self.id,
            scope = %scope.id(),
            name,
            layer = %scope.layer().id(),
            "Scope created"
        );
        Ok(scope)
    }

    /// Detach a scope.
    ///
    /// The gate entries leave this instance's layer in one swap. The
    /// scope's own layer is not flushed: requests that already pinned the
    /// old topology finish with the scope's plugins intact.
    pub fn remove_scope(&self, id: &str) -> Result<Arc<Scope>, ProxyError> {
        let _guard = self.writer.lock();
        let mut scopes = Vec::clone(&self.scopes.load());
        let pos = scopes
            .iter()
            .position(|s| s.scope.id() == id)
            .ok_or_else(|| ProxyError::not_found("scope", id))?;

        if self.layer.unregister(&scopes[pos].entries) == 0 {
            return Err(ProxyError::RemovalFailed {
                kind: "scope",
                id: id.to_string(),
            });
        }
        let removed = scopes.remove(pos);
        self.scopes.store(Arc::new(scopes));
        self.arena.remove(removed.scope.layer().id());

        tracing::info!(instance = %self.id, scope = %id, "Scope removed");
        Ok(removed.scope)
    }

    pub fn scopes(&self) -> Vec<Arc<Scope>> {
        self.scopes.load().iter().map(|s| s.scope.clone()).collect()
    }

    pub fn scope(&self, id: &str) -> Result<Arc<Scope>, ProxyError> {
        self.scopes
            .load()
            .iter()
            .find(|s| s.scope.id() == id)
            .map(|s| s.scope.clone())
            .ok_or_else(|| ProxyError::not_found("scope", id))
    }

    /// Drop every scope and release their layers.
    pub fn flush(&self) -> usize {
        let _guard = self.writer.lock();
        let scopes = self.scopes.swap(Arc::new(Vec::new()));
        self.layer.flush();
        for attached in scopes.iter() {
            self.arena.remove(attached.scope.layer().id());
        }
        scopes.len()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("layer", &self.layer.id())
            .field("scopes", &self.scopes.load().len())
            .finish()
    }
}
