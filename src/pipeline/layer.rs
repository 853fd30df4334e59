//! Layers: phase tables of prioritized handler entries.
//!
//! # Responsibilities
//! - Keep one ordered entry list per phase (Head, Normal, Tail; stable)
//! - Validate handler kinds at registration time
//! - Execute a phase, nesting child layers and routing failures to the
//!   "error" phase of the layer that raised them
//!
//! # Design Decisions
//! - The table is immutable once published; writers clone, edit and swap
//!   it under `writer`, so readers never see a half-applied mutation
//! - A nested layer runs with a continuation that resumes its parent's
//!   chain, so the parent's remaining handlers still run afterwards

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use axum::http::StatusCode;
use parking_lot::{Mutex, RwLock};

use crate::error::{HandlerError, HandlerResult, ProxyError};
use crate::http::response::text_response;
use crate::pipeline::arena::{LayerArena, LayerId};
use crate::pipeline::exchange::Exchange;
use crate::pipeline::handler::{BoxFuture, Handler, Next, Tail};
use crate::pipeline::phase::{Phase, Priority};
use crate::routing::Mux;

static ENTRY_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier of a registered entry, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

impl EntryId {
    fn next() -> Self {
        Self(ENTRY_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry-{}", self.0)
    }
}

/// Everything that can be handed to [`Layer::register`].
pub enum HandlerKind {
    /// A plain handler.
    Handler(Arc<dyn Handler>),
    /// A composite layer run as a nested pipeline.
    Layer(Arc<Layer>),
    /// A nested layer guarded by a matcher.
    Gate(Arc<Mux>),
    /// A terminal handler. Only accepted by [`Layer::set_final_handler`].
    Final(Arc<dyn Handler>),
}

impl fmt::Debug for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Handler(_) => f.write_str("Handler"),
            HandlerKind::Layer(layer) => write!(f, "Layer({})", layer.id()),
            HandlerKind::Gate(mux) => write!(f, "Gate({})", mux.layer().id()),
            HandlerKind::Final(_) => f.write_str("Final"),
        }
    }
}

#[derive(Clone)]
enum Target {
    Handler(Arc<dyn Handler>),
    Layer(Arc<Layer>),
    Gate(Arc<Mux>),
}

impl Target {
    fn nested(&self) -> Option<LayerId> {
        match self {
            Target::Handler(_) => None,
            Target::Layer(layer) => Some(layer.id()),
            Target::Gate(mux) => Some(mux.layer().id()),
        }
    }
}

/// One registered handler.
#[derive(Clone)]
pub(crate) struct Entry {
    id: EntryId,
    priority: Priority,
    target: Target,
}

impl Entry {
    pub(crate) fn dispatch<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        match &self.target {
            Target::Handler(handler) => handler.handle(exchange, next),
            Target::Layer(layer) => layer.run_nested(exchange, next),
            Target::Gate(mux) => mux.handle(exchange, next),
        }
    }
}

/// Immutable snapshot of a layer's entries, keyed by phase.
#[derive(Clone, Default)]
pub struct PhaseTable {
    phases: HashMap<Phase, Vec<Entry>>,
}

impl PhaseTable {
    pub(crate) fn entries(&self, phase: &Phase) -> &[Entry] {
        self.phases.get(phase).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Entry IDs of `phase`, in execution order.
    pub fn ids(&self, phase: &Phase) -> Vec<EntryId> {
        self.entries(phase).iter().map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.phases.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.phases.values().flatten().any(|e| e.id == id)
    }

    fn insert(&mut self, phase: Phase, entry: Entry) {
        let list = self.phases.entry(phase).or_default();
        // After every entry of the same or a lower class.
        let pos = list.partition_point(|e| e.priority <= entry.priority);
        list.insert(pos, entry);
    }

    fn retain(&mut self, mut keep: impl FnMut(&Entry) -> bool) -> usize {
        let before = self.len();
        for list in self.phases.values_mut() {
            list.retain(|e| keep(e));
        }
        self.phases.retain(|_, list| !list.is_empty());
        before - self.len()
    }

    fn nested_layers(&self) -> HashSet<LayerId> {
        self.phases
            .values()
            .flatten()
            .filter_map(|e| e.target.nested())
            .collect()
    }
}

/// An ordered, phase-keyed collection of handlers.
pub struct Layer {
    id: LayerId,
    arena: Weak<LayerArena>,
    table: ArcSwap<PhaseTable>,
    final_handler: RwLock<Option<Arc<dyn Handler>>>,
    writer: Mutex<()>,
}

impl Layer {
    pub(crate) fn new(id: LayerId, arena: Weak<LayerArena>) -> Self {
        Self {
            id,
            arena,
            table: ArcSwap::from_pointee(PhaseTable::default()),
            final_handler: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Current table. Requests pin it through their [`Exchange`].
    pub fn snapshot(&self) -> Arc<PhaseTable> {
        self.table.load_full()
    }

    fn arena(&self) -> Result<Arc<LayerArena>, ProxyError> {
        self.arena.upgrade().ok_or_else(|| {
            ProxyError::StructuralCorruption(format!("{} outlived its arena", self.id))
        })
    }

    /// Attach a handler to `phase`.
    pub fn register(
        &self,
        phase: impl Into<Phase>,
        priority: Priority,
        kind: HandlerKind,
    ) -> Result<EntryId, ProxyError> {
        let mut ids = self.register_batch(vec![(phase.into(), priority, kind)])?;
        ids.pop()
            .ok_or_else(|| ProxyError::UnsupportedHandler("empty registration".into()))
    }

    /// Attach several handlers in a single table swap.
    ///
    /// Either every entry becomes visible to new requests or none does.
    pub fn register_batch(
        &self,
        items: Vec<(Phase, Priority, HandlerKind)>,
    ) -> Result<Vec<EntryId>, ProxyError> {
        let _guard = self.writer.lock();

        let mut resolved = Vec::with_capacity(items.len());
        for (phase, priority, kind) in items {
            let target = match kind {
                HandlerKind::Handler(handler) => Target::Handler(handler),
                HandlerKind::Layer(layer) => Target::Layer(layer),
                HandlerKind::Gate(mux) => Target::Gate(mux),
                HandlerKind::Final(_) => {
                    return Err(ProxyError::UnsupportedHandler(format!(
                        "final handlers cannot be registered in phase '{phase}'; use set_final_handler"
                    )))
                }
            };
            resolved.push((phase, priority, target));
        }

        let children: Vec<LayerId> = resolved.iter().filter_map(|(_, _, t)| t.nested()).collect();
        if !children.is_empty() {
            self.adopt(&children)?;
        }

        let mut table = PhaseTable::clone(&self.table.load());
        let mut ids = Vec::with_capacity(resolved.len());
        for (phase, priority, target) in resolved {
            let id = EntryId::next();
            tracing::trace!(layer = %self.id, entry = %id, phase = %phase, ?priority, "Handler registered");
            table.insert(
                phase,
                Entry {
                    id,
                    priority,
                    target,
                },
            );
            ids.push(id);
        }
        self.table.store(Arc::new(table));
        Ok(ids)
    }

    /// Link `children` under this layer, restoring previous links on failure.
    fn adopt(&self, children: &[LayerId]) -> Result<(), ProxyError> {
        let arena = self.arena()?;
        let mut linked = Vec::new();
        for &child in children {
            let previous = arena.parent_of(child);
            if previous == Some(self.id) {
                continue;
            }
            if let Err(err) = arena.set_parent(child, self.id) {
                for (child, previous) in linked {
                    match previous {
                        Some(parent) => {
                            let _ = arena.set_parent(child, parent);
                        }
                        None => arena.detach(child),
                    }
                }
                return Err(err);
            }
            linked.push((child, previous));
        }
        Ok(())
    }

    /// Remove entries by ID. Returns how many were removed.
    pub fn unregister(&self, ids: &[EntryId]) -> usize {
        self.retain(|id| !ids.contains(&id))
    }

    /// Keep only the entries for which `keep` returns true.
    pub fn retain(&self, keep: impl Fn(EntryId) -> bool) -> usize {
        let _guard = self.writer.lock();
        let mut table = PhaseTable::clone(&self.table.load());
        let before = table.nested_layers();
        let removed = table.retain(|e| keep(e.id));
        if removed == 0 {
            return 0;
        }
        let after = table.nested_layers();
        self.table.store(Arc::new(table));

        if let Ok(arena) = self.arena() {
            for child in before.difference(&after) {
                if arena.parent_of(*child) == Some(self.id) {
                    arena.detach(*child);
                }
            }
        }
        tracing::trace!(layer = %self.id, removed, "Handlers unregistered");
        removed
    }

    /// Drop every registered entry. The final handler is kept.
    pub fn flush(&self) -> usize {
        self.retain(|_| false)
    }

    /// Set the terminal handler. The last call wins.
    pub fn set_final_handler(&self, handler: Arc<dyn Handler>) {
        *self.final_handler.write() = Some(handler);
    }

    pub fn final_handler(&self) -> Option<Arc<dyn Handler>> {
        self.final_handler.read().clone()
    }

    /// Delegate to `parent` for inherited final handling.
    pub fn set_parent(&self, parent: &Layer) -> Result<(), ProxyError> {
        self.arena()?.set_parent(self.id, parent.id)
    }

    pub fn parent(&self) -> Option<LayerId> {
        self.arena.upgrade().and_then(|arena| arena.parent_of(self.id))
    }

    /// Terminal handler for a top-level run.
    ///
    /// Own final handler, then the caller's fallback, then the nearest
    /// ancestor's final handler, then a 502 responder.
    pub fn resolve_final(&self, fallback: Option<Arc<dyn Handler>>) -> Arc<dyn Handler> {
        if let Some(own) = self.final_handler() {
            return own;
        }
        if let Some(fallback) = fallback {
            return fallback;
        }
        if let Some(arena) = self.arena.upgrade() {
            for ancestor in arena.ancestors(self.id) {
                if let Some(handler) = arena.get(ancestor).and_then(|l| l.final_handler()) {
                    return handler;
                }
            }
        }
        Arc::new(Unhandled)
    }

    /// Execute `phase` as a top-level pipeline.
    ///
    /// The "request" phase always ends in a terminal handler; other phases
    /// end when their list is exhausted unless a fallback is supplied.
    ///
    /// A parent set with [`Layer::set_parent`] contributes only its final
    /// handler here: the parent's own phase list is not run. To embed this
    /// layer inside an enclosing chain, register it behind a gate so it
    /// executes through [`Layer::run_nested`].
    pub fn run<'a>(
        &'a self,
        phase: &'a Phase,
        exchange: &'a mut Exchange,
        fallback: Option<Arc<dyn Handler>>,
    ) -> BoxFuture<'a, HandlerResult> {
        let tail = if *phase == Phase::Request {
            Tail::Final(self.resolve_final(fallback))
        } else {
            fallback.map(Tail::Final).unwrap_or(Tail::Done)
        };
        self.execute(phase, exchange, tail)
    }

    /// Execute this layer embedded in an enclosing chain.
    pub fn run_nested<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        let phase = next.phase();
        self.execute(phase, exchange, Tail::Resume(Box::new(next)))
    }

    fn execute<'a>(
        &'a self,
        phase: &'a Phase,
        exchange: &'a mut Exchange,
        tail: Tail<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let table = exchange.pin(self);
            let outcome = Next::new(phase, table.entries(phase), tail)
                .run(exchange)
                .await;

            let mut err = match outcome {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            if err.escalations > 0 {
                // Raised by an enclosing layer's handler.
                err.escalations -= 1;
                return Err(err);
            }
            if phase.is_error() {
                return Err(err);
            }

            tracing::warn!(
                layer = %self.id,
                phase = %phase,
                request_id = %exchange.request_id(),
                error = %err,
                "Handler failed"
            );
            self.recover(&table, exchange, err).await
        })
    }

    /// Run this layer's "error" phase for `err`.
    ///
    /// The failure counts as handled if an error handler claims it or
    /// writes a response.
    async fn recover(
        &self,
        table: &PhaseTable,
        exchange: &mut Exchange,
        err: HandlerError,
    ) -> HandlerResult {
        let error_phase = Phase::Error;
        let handlers = table.entries(&error_phase);
        if handlers.is_empty() {
            return Err(err);
        }

        let written = exchange.responses_written();
        exchange.set_failure(err);
        let outcome = Next::new(&error_phase, handlers, Tail::Done)
            .run(exchange)
            .await;
        let pending = exchange.take_failure();

        match (outcome, pending) {
            (Err(raised), _) => Err(raised),
            (Ok(()), None) => Ok(()),
            (Ok(()), Some(_)) if exchange.responses_written() != written => Ok(()),
            (Ok(()), Some(failure)) => Err(failure),
        }
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("id", &self.id)
            .field("entries", &self.table.load().len())
            .field("has_final", &self.final_handler.read().is_some())
            .finish()
    }
}

/// Terminal handler of last resort: a request is never dropped silently.
struct Unhandled;

impl Handler for Unhandled {
    fn handle<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        _next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            exchange.respond(text_response(
                StatusCode::BAD_GATEWAY,
                "no handler available for this request",
            ));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::handler::{FnHandler, Tap};
    use axum::body::Body;
    use axum::http::{Request, Response};

    type Log = Arc<parking_lot::Mutex<Vec<String>>>;

    fn exchange() -> Exchange {
        Exchange::new(Request::builder().uri("/test").body(Body::empty()).unwrap())
    }

    fn mark(log: &Log, label: &'static str) -> HandlerKind {
        let log = log.clone();
        HandlerKind::Handler(Tap::shared(move |_| log.lock().push(label.to_string())))
    }

    fn responder(status: StatusCode) -> Arc<dyn Handler> {
        FnHandler::shared(move |exchange, _next| {
            Box::pin(async move {
                exchange.respond(Response::builder().status(status).body(Body::empty()).unwrap());
                Ok(())
            })
        })
    }

    fn failing(message: &'static str) -> HandlerKind {
        HandlerKind::Handler(FnHandler::shared(
            move |_exchange, _next| {
                Box::pin(async move { Err(HandlerError::new(message)) })
            },
        ))
    }

    #[tokio::test]
    async fn test_priority_order_independent_of_registration() {
        let arena = LayerArena::new();
        let layer = arena.create();
        let log: Log = Default::default();

        layer.register("request", Priority::Tail, mark(&log, "tail-1")).unwrap();
        layer.register("request", Priority::Normal, mark(&log, "normal-1")).unwrap();
        layer.register("request", Priority::Head, mark(&log, "head-1")).unwrap();
        layer.register("request", Priority::Normal, mark(&log, "normal-2")).unwrap();
        layer.register("request", Priority::Head, mark(&log, "head-2")).unwrap();
        layer.register("request", Priority::Tail, mark(&log, "tail-2")).unwrap();

        let mut ex = exchange();
        layer.run(&Phase::Request, &mut ex, Some(responder(StatusCode::OK))).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["head-1", "head-2", "normal-1", "normal-2", "tail-1", "tail-2"]
        );
        assert_eq!(ex.take_response().unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest_and_final() {
        let arena = LayerArena::new();
        let layer = arena.create();
        let log: Log = Default::default();

        layer
            .register("request", Priority::Normal, HandlerKind::Handler(responder(StatusCode::ACCEPTED)))
            .unwrap();
        layer.register("request", Priority::Normal, mark(&log, "after")).unwrap();

        let mut ex = exchange();
        layer.run(&Phase::Request, &mut ex, Some(responder(StatusCode::OK))).await.unwrap();

        assert!(log.lock().is_empty());
        assert_eq!(ex.take_response().unwrap().status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_nested_layer_resumes_parent_chain() {
        let arena = LayerArena::new();
        let parent = arena.create();
        let child = arena.create();
        let log: Log = Default::default();

        child.register("request", Priority::Normal, mark(&log, "child")).unwrap();
        parent.register("request", Priority::Head, mark(&log, "before")).unwrap();
        parent
            .register("request", Priority::Normal, HandlerKind::Layer(child.clone()))
            .unwrap();
        parent.register("request", Priority::Tail, mark(&log, "after")).unwrap();

        assert_eq!(arena.parent_of(child.id()), Some(parent.id()));

        let mut ex = exchange();
        parent.run(&Phase::Request, &mut ex, Some(responder(StatusCode::OK))).await.unwrap();
        assert_eq!(*log.lock(), vec!["before", "child", "after"]);
    }

    #[tokio::test]
    async fn test_final_handler_precedence() {
        let arena = LayerArena::new();
        let root = arena.create();
        let child = arena.create();
        child.set_parent(&root).unwrap();

        // Nothing anywhere: built-in 502.
        let mut ex = exchange();
        child.run(&Phase::Request, &mut ex, None).await.unwrap();
        assert_eq!(ex.take_response().unwrap().status(), StatusCode::BAD_GATEWAY);

        // Inherited from the parent.
        root.set_final_handler(responder(StatusCode::IM_A_TEAPOT));
        let mut ex = exchange();
        child.run(&Phase::Request, &mut ex, None).await.unwrap();
        assert_eq!(ex.take_response().unwrap().status(), StatusCode::IM_A_TEAPOT);

        // Caller fallback beats inherited.
        let mut ex = exchange();
        child
            .run(&Phase::Request, &mut ex, Some(responder(StatusCode::ACCEPTED)))
            .await
            .unwrap();
        assert_eq!(ex.take_response().unwrap().status(), StatusCode::ACCEPTED);

        // Own final handler beats everything; last write wins.
        child.set_final_handler(responder(StatusCode::CREATED));
        child.set_final_handler(responder(StatusCode::OK));
        let mut ex = exchange();
        child
            .run(&Phase::Request, &mut ex, Some(responder(StatusCode::ACCEPTED)))
            .await
            .unwrap();
        assert_eq!(ex.take_response().unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_error_phase_recovers_in_failing_layer() {
        let arena = LayerArena::new();
        let root = arena.create();
        let child = arena.create();
        let log: Log = Default::default();

        let seen = log.clone();
        child
            .register(
                "error",
                Priority::Normal,
                HandlerKind::Handler(FnHandler::shared(
                    move |exchange, _next| {
                        let seen = seen.clone();
                        Box::pin(async move {
                            let failure = exchange.take_failure().unwrap();
                            seen.lock().push(format!("child-error:{}", failure.message()));
                            exchange.respond(
                                Response::builder()
                                    .status(StatusCode::SERVICE_UNAVAILABLE)
                                    .body(Body::empty())
                                    .unwrap(),
                            );
                            Ok(())
                        })
                    },
                )),
            )
            .unwrap();
        child.register("request", Priority::Normal, failing("boom")).unwrap();
        root.register("error", Priority::Normal, mark(&log, "root-error")).unwrap();
        root.register("request", Priority::Normal, HandlerKind::Layer(child.clone()))
            .unwrap();

        let mut ex = exchange();
        root.run(&Phase::Request, &mut ex, None).await.unwrap();

        assert_eq!(*log.lock(), vec!["child-error:boom"]);
        assert_eq!(ex.take_response().unwrap().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_error_raised_after_nested_layer_belongs_to_parent() {
        let arena = LayerArena::new();
        let root = arena.create();
        let child = arena.create();
        let log: Log = Default::default();

        child.register("request", Priority::Normal, mark(&log, "child")).unwrap();
        child.register("error", Priority::Normal, mark(&log, "child-error")).unwrap();
        root.register("request", Priority::Head, HandlerKind::Layer(child.clone()))
            .unwrap();
        root.register("request", Priority::Tail, failing("late")).unwrap();
        root.register("error", Priority::Normal, mark(&log, "root-error")).unwrap();

        let mut ex = exchange();
        let err = root.run(&Phase::Request, &mut ex, None).await.unwrap_err();

        // Only the root's error phase ran; nobody claimed the failure.
        assert_eq!(*log.lock(), vec!["child", "root-error"]);
        assert_eq!(err.message(), "late");
    }

    #[tokio::test]
    async fn test_unrecovered_failure_escalates_outward() {
        let arena = LayerArena::new();
        let root = arena.create();
        let child = arena.create();
        let log: Log = Default::default();

        child.register("request", Priority::Normal, failing("deep")).unwrap();
        child.register("error", Priority::Normal, mark(&log, "child-error")).unwrap();
        root.register("request", Priority::Normal, HandlerKind::Layer(child.clone()))
            .unwrap();
        root.register("error", Priority::Normal, mark(&log, "root-error")).unwrap();

        let mut ex = exchange();
        let err = root.run(&Phase::Request, &mut ex, None).await.unwrap_err();
        assert_eq!(*log.lock(), vec!["child-error", "root-error"]);
        assert_eq!(err.message(), "deep");
    }

    #[test]
    fn test_final_kind_rejected_by_register() {
        let arena = LayerArena::new();
        let layer = arena.create();
        let err = layer
            .register("request", Priority::Normal, HandlerKind::Final(responder(StatusCode::OK)))
            .unwrap_err();
        assert!(matches!(err, ProxyError::UnsupportedHandler(_)));
        assert!(layer.snapshot().is_empty());
    }

    #[test]
    fn test_nesting_cycle_rejected() {
        let arena = LayerArena::new();
        let a = arena.create();
        let b = arena.create();
        a.register("request", Priority::Normal, HandlerKind::Layer(b.clone())).unwrap();

        let err = b
            .register("request", Priority::Normal, HandlerKind::Layer(a.clone()))
            .unwrap_err();
        assert!(matches!(err, ProxyError::StructuralCorruption(_)));
        assert!(b.snapshot().is_empty());
    }

    #[test]
    fn test_unregister_detaches_child() {
        let arena = LayerArena::new();
        let parent = arena.create();
        let child = arena.create();
        let ids = parent
            .register_batch(vec![
                (Phase::Request, Priority::Normal, HandlerKind::Layer(child.clone())),
                (Phase::Response, Priority::Normal, HandlerKind::Layer(child.clone())),
            ])
            .unwrap();

        assert_eq!(parent.unregister(&ids[..1]), 1);
        assert_eq!(arena.parent_of(child.id()), Some(parent.id()));

        assert_eq!(parent.unregister(&ids[1..]), 1);
        assert_eq!(arena.parent_of(child.id()), None);
        assert_eq!(parent.unregister(&ids), 0);
    }

    #[tokio::test]
    async fn test_pinned_snapshot_survives_mutation() {
        let arena = LayerArena::new();
        let layer = arena.create();
        let log: Log = Default::default();
        let id = layer.register("response", Priority::Normal, mark(&log, "old")).unwrap();

        let mut ex = exchange();
        layer.run(&Phase::Request, &mut ex, Some(responder(StatusCode::OK))).await.unwrap();

        layer.unregister(&[id]);
        layer.register("response", Priority::Normal, mark(&log, "new")).unwrap();

        layer.run(&Phase::Response, &mut ex, None).await.unwrap();
        assert_eq!(*log.lock(), vec!["old"]);

        let mut fresh = exchange();
        layer.run(&Phase::Response, &mut fresh, None).await.unwrap();
        assert_eq!(*log.lock(), vec!["old", "new"]);
    }
}
