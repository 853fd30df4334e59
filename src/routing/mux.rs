//! Matcher-gated nested layer.
//!
//! A `Mux` sits in an enclosing layer's phase list. When its matcher accepts
//! the request the nested layer runs and then resumes the enclosing chain;
//! otherwise the enclosing chain simply continues. The decision is taken
//! once per request and reused by every later phase.

use std::sync::Arc;

use crate::error::{HandlerResult, ProxyError};
use crate::pipeline::{
    BoxFuture, EntryId, Exchange, Handler, HandlerKind, Layer, LayerArena, Next, Phase, Priority,
};
use crate::routing::matcher::{AndMatcher, Matcher};

/// Conditional gate in front of a nested layer.
#[derive(Debug)]
pub struct Mux {
    matcher: Arc<dyn Matcher>,
    layer: Arc<Layer>,
}

impl Mux {
    /// Gate a fresh layer of `arena` behind `matcher`.
    pub fn new(arena: &Arc<LayerArena>, matcher: Arc<dyn Matcher>) -> Self {
        Self::with_layer(matcher, arena.create())
    }

    /// Gate behind every matcher in `matchers` (empty = always).
    pub fn all(arena: &Arc<LayerArena>, matchers: Vec<Arc<dyn Matcher>>) -> Self {
        Self::new(arena, Arc::new(AndMatcher::new(matchers)))
    }

    pub fn with_layer(matcher: Arc<dyn Matcher>, layer: Arc<Layer>) -> Self {
        Self { matcher, layer }
    }

    pub fn layer(&self) -> &Arc<Layer> {
        &self.layer
    }

    pub fn matcher(&self) -> &Arc<dyn Matcher> {
        &self.matcher
    }

    /// Register a handler in the gated layer's "request" phase.
    pub fn use_handler(&self, handler: Arc<dyn Handler>) -> Result<EntryId, ProxyError> {
        self.layer
            .register(Phase::Request, Priority::Normal, HandlerKind::Handler(handler))
    }

    /// Register a handler in any phase of the gated layer.
    pub fn use_phase(
        &self,
        phase: impl Into<Phase>,
        priority: Priority,
        handler: Arc<dyn Handler>,
    ) -> Result<EntryId, ProxyError> {
        self.layer
            .register(phase, priority, HandlerKind::Handler(handler))
    }
}

impl Handler for Mux {
    fn handle<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        if exchange.decide(self.layer.id(), self.matcher.as_ref()) {
            tracing::trace!(
                layer = %self.layer.id(),
                phase = %next.phase(),
                request_id = %exchange.request_id(),
                "Gate matched"
            );
            self.layer.run_nested(exchange, next)
        } else {
            next.run(exchange)
        }
    }
}
