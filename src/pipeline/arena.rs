//! Layer arena: stable layer IDs and parent links.
//!
//! # Responsibilities
//! - Allocate layers with unique IDs
//! - Store parent links as IDs (a child never owns its parent)
//! - Reject rebinds that would introduce a cycle
//!
//! # Design Decisions
//! - The arena holds the strong references; layers hold a `Weak` back to it
//! - Parent links are only read to resolve inherited final handlers, so a
//!   single `RwLock` around the link table is enough

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ProxyError;
use crate::pipeline::layer::Layer;

/// Unique identifier for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

#[derive(Default)]
struct Slots {
    layers: HashMap<LayerId, Arc<Layer>>,
    parents: HashMap<LayerId, LayerId>,
}

/// Owner of every layer in a proxy.
pub struct LayerArena {
    next_id: AtomicU64,
    slots: RwLock<Slots>,
}

impl LayerArena {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            slots: RwLock::new(Slots::default()),
        })
    }

    /// Allocate a new, empty, parentless layer.
    pub fn create(self: &Arc<Self>) -> Arc<Layer> {
        let id = LayerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let layer = Arc::new(Layer::new(id, Arc::downgrade(self)));
        self.slots.write().layers.insert(id, layer.clone());
        tracing::trace!(layer = %id, "Layer created");
        layer
    }

    pub fn get(&self, id: LayerId) -> Option<Arc<Layer>> {
        self.slots.read().layers.get(&id).cloned()
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.slots.read().layers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.slots.read().layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn parent_of(&self, id: LayerId) -> Option<LayerId> {
        self.slots.read().parents.get(&id).copied()
    }

    /// Bind `child` under `parent`.
    ///
    /// Fails with `StructuralCorruption` when either layer is unknown or the
    /// link would close a cycle; the existing links are left untouched.
    pub fn set_parent(&self, child: LayerId, parent: LayerId) -> Result<(), ProxyError> {
        let mut slots = self.slots.write();
        if !slots.layers.contains_key(&child) || !slots.layers.contains_key(&parent) {
            return Err(corruption(format!(
                "cannot link {child} under {parent}: layer not in arena"
            )));
        }

        // Walk up from the proposed parent; meeting the child means a cycle.
        let mut cursor = Some(parent);
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == child {
                return Err(corruption(format!(
                    "linking {child} under {parent} would create a cycle"
                )));
            }
            steps += 1;
            if steps > slots.layers.len() {
                return Err(corruption(format!("parent chain of {parent} does not terminate")));
            }
            cursor = slots.parents.get(&current).copied();
        }

        slots.parents.insert(child, parent);
        Ok(())
    }

    /// Drop the parent link of `id`, if any.
    pub fn detach(&self, id: LayerId) {
        self.slots.write().parents.remove(&id);
    }

    /// Remove a layer. Children linked to it become roots.
    pub fn remove(&self, id: LayerId) -> Option<Arc<Layer>> {
        let mut slots = self.slots.write();
        let removed = slots.layers.remove(&id);
        slots.parents.remove(&id);
        slots.parents.retain(|_, parent| *parent != id);
        if removed.is_some() {
            tracing::trace!(layer = %id, "Layer removed");
        }
        removed
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: LayerId) -> Vec<LayerId> {
        let slots = self.slots.read();
        let mut chain = Vec::new();
        let mut cursor = slots.parents.get(&id).copied();
        while let Some(current) = cursor {
            if chain.contains(&current) {
                break;
            }
            chain.push(current);
            cursor = slots.parents.get(&current).copied();
        }
        chain
    }
}

fn corruption(message: String) -> ProxyError {
    tracing::error!(%message, "Layer hierarchy invariant violated");
    ProxyError::StructuralCorruption(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_ids_unique() {
        let arena = LayerArena::new();
        let a = arena.create();
        let b = arena.create();
        assert_ne!(a.id(), b.id());
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn parent_chain_is_recorded() {
        let arena = LayerArena::new();
        let root = arena.create();
        let mid = arena.create();
        let leaf = arena.create();

        arena.set_parent(mid.id(), root.id()).unwrap();
        arena.set_parent(leaf.id(), mid.id()).unwrap();

        assert_eq!(arena.parent_of(leaf.id()), Some(mid.id()));
        assert_eq!(arena.ancestors(leaf.id()), vec![mid.id(), root.id()]);
    }

    #[test]
    fn cycle_is_rejected_and_links_kept() {
        let arena = LayerArena::new();
        let root = arena.create();
        let child = arena.create();
        arena.set_parent(child.id(), root.id()).unwrap();

        let err = arena.set_parent(root.id(), child.id()).unwrap_err();
        assert!(matches!(err, ProxyError::StructuralCorruption(_)));
        assert_eq!(arena.parent_of(root.id()), None);
        assert_eq!(arena.parent_of(child.id()), Some(root.id()));

        let err = arena.set_parent(root.id(), root.id()).unwrap_err();
        assert!(matches!(err, ProxyError::StructuralCorruption(_)));
    }

    #[test]
    fn removal_orphans_children() {
        let arena = LayerArena::new();
        let root = arena.create();
        let child = arena.create();
        arena.set_parent(child.id(), root.id()).unwrap();

        assert!(arena.remove(root.id()).is_some());
        assert!(!arena.contains(root.id()));
        assert_eq!(arena.parent_of(child.id()), None);
        assert!(arena.remove(root.id()).is_none());
    }
}
