//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store routes per method (plus a `*` bucket for any method)
//! - Look up the best route for a request
//! - Dispatch to the route's own layer, or fall through on no match
//!
//! # Design Decisions
//! - Route table is an immutable snapshot swapped on every change
//! - Exact method beats `*`; HEAD falls back to GET before `*`
//! - More literal segments beat captures; ties keep registration order
//! - No match is not an error: the chain continues to the final handler

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::Method;
use parking_lot::Mutex;

use crate::error::{HandlerResult, ProxyError};
use crate::pipeline::{
    BoxFuture, EntryId, Exchange, Handler, HandlerKind, Layer, LayerArena, LayerId, Next, Phase,
    Priority,
};
use crate::routing::pattern::{Params, Pattern};

/// A registered route. Returned by [`Router::route`] so callers can attach
/// the handler that serves it.
#[derive(Debug)]
pub struct Route {
    method: Option<Method>,
    pattern: Pattern,
    layer: Arc<Layer>,
}

/// Handle to a registered route.
pub type RouteHandle = Arc<Route>;

impl Route {
    /// Set the handler serving this route. The last call wins.
    pub fn handle(&self, handler: Arc<dyn Handler>) -> &Self {
        self.layer.set_final_handler(handler);
        self
    }

    /// Add route-scoped middleware ahead of the route handler.
    pub fn use_handler(&self, handler: Arc<dyn Handler>) -> Result<EntryId, ProxyError> {
        self.layer
            .register(Phase::Request, Priority::Normal, HandlerKind::Handler(handler))
    }

    /// `None` means any method.
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn layer(&self) -> &Arc<Layer> {
        &self.layer
    }
}

#[derive(Default, Clone)]
struct RouteTable {
    by_method: HashMap<Option<Method>, Vec<RouteHandle>>,
}

impl RouteTable {
    fn find(&self, method: Option<&Method>, path: &str) -> Option<(RouteHandle, Params)> {
        self.by_method
            .get(&method.cloned())?
            .iter()
            .find_map(|route| route.pattern.matches(path).map(|p| (route.clone(), p)))
    }
}

/// Method + pattern router.
pub struct Router {
    arena: Arc<LayerArena>,
    parent: LayerId,
    routes: ArcSwap<RouteTable>,
    writer: Mutex<()>,
}

impl Router {
    /// Route layers are parented to `parent` so unhandled routes inherit
    /// its final handler.
    pub fn new(arena: Arc<LayerArena>, parent: LayerId) -> Self {
        Self {
            arena,
            parent,
            routes: ArcSwap::from_pointee(RouteTable::default()),
            writer: Mutex::new(()),
        }
    }

    /// Register `pattern` for `method` (`"*"` for any method).
    pub fn route(&self, method: &str, pattern: &str) -> Result<RouteHandle, ProxyError> {
        let method = match method {
            "*" => None,
            other => Some(Method::from_bytes(other.to_ascii_uppercase().as_bytes()).map_err(
                |e| ProxyError::InvalidConfig {
                    kind: "route",
                    name: pattern.to_string(),
                    reason: format!("invalid method '{other}': {e}"),
                },
            )?),
        };
        self.add(method, pattern)
    }

    fn add(&self, method: Option<Method>, pattern: &str) -> Result<RouteHandle, ProxyError> {
        let _guard = self.writer.lock();

        let layer = self.arena.create();
        if let Err(err) = self.arena.set_parent(layer.id(), self.parent) {
            self.arena.remove(layer.id());
            return Err(err);
        }

        let route = Arc::new(Route {
            method: method.clone(),
            pattern: Pattern::parse(pattern),
            layer,
        });

        let mut table = RouteTable::clone(&self.routes.load());
        let list = table.by_method.entry(method).or_default();
        let rank = route.pattern.rank();
        let pos = list.partition_point(|r| r.pattern.rank() >= rank);
        list.insert(pos, route.clone());
        self.routes.store(Arc::new(table));

        tracing::debug!(
            method = route.method.as_ref().map(Method::as_str).unwrap_or("*"),
            pattern = %route.pattern,
            "Route registered"
        );
        Ok(route)
    }

    pub fn get(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.add(Some(Method::GET), pattern)
    }

    pub fn post(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.add(Some(Method::POST), pattern)
    }

    pub fn put(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.add(Some(Method::PUT), pattern)
    }

    pub fn delete(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.add(Some(Method::DELETE), pattern)
    }

    pub fn patch(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.add(Some(Method::PATCH), pattern)
    }

    pub fn options(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.add(Some(Method::OPTIONS), pattern)
    }

    pub fn all(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.add(None, pattern)
    }

    /// Remove a route. Returns false if it was not registered here.
    pub fn remove(&self, route: &Route) -> bool {
        let _guard = self.writer.lock();
        let mut table = RouteTable::clone(&self.routes.load());
        let Some(list) = table.by_method.get_mut(&route.method) else {
            return false;
        };
        let before = list.len();
        list.retain(|r| r.layer.id() != route.layer.id());
        if list.len() == before {
            return false;
        }
        self.routes.store(Arc::new(table));
        self.arena.remove(route.layer.id());
        true
    }

    pub fn len(&self) -> usize {
        self.routes.load().by_method.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best route for `method` and `path`, with its captured parameters.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<(RouteHandle, Params)> {
        let table = self.routes.load();
        table
            .find(Some(method), path)
            .or_else(|| {
                if *method == Method::HEAD {
                    table.find(Some(&Method::GET), path)
                } else {
                    None
                }
            })
            .or_else(|| table.find(None, path))
    }
}

impl Handler for Router {
    fn handle<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let found = self.lookup(exchange.request().method(), exchange.request().uri().path());
            let Some((route, params)) = found else {
                return next.run(exchange).await;
            };

            tracing::debug!(
                request_id = %exchange.request_id(),
                pattern = %route.pattern,
                "Route matched"
            );
            exchange.set_params(params);
            route.layer.run(next.phase(), exchange, None).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::text_response;
    use crate::pipeline::FnHandler;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    fn setup() -> (Arc<LayerArena>, Arc<Layer>, Router) {
        let arena = LayerArena::new();
        let root = arena.create();
        let router = Router::new(arena.clone(), root.id());
        (arena, root, router)
    }

    fn reply(body: &'static str) -> Arc<dyn Handler> {
        FnHandler::shared(move |exchange, _next| {
            Box::pin(async move {
                let id = exchange.param("x").unwrap_or("-").to_string();
                exchange.respond(text_response(StatusCode::OK, format!("{body}:{id}")));
                Ok(())
            })
        })
    }

    #[test]
    fn test_literal_beats_param_regardless_of_order() {
        let (_arena, _root, router) = setup();
        let param = router.get("/a/:x").unwrap();
        let literal = router.get("/a/b").unwrap();

        let (found, params) = router.lookup(&Method::GET, "/a/b").unwrap();
        assert_eq!(found.layer().id(), literal.layer().id());
        assert!(params.is_empty());

        let (found, params) = router.lookup(&Method::GET, "/a/c").unwrap();
        assert_eq!(found.layer().id(), param.layer().id());
        assert_eq!(params.get("x"), Some("c"));
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let (_arena, _root, router) = setup();
        let first = router.get("/u/:a").unwrap();
        let _second = router.get("/u/:b").unwrap();
        let (found, _) = router.lookup(&Method::GET, "/u/1").unwrap();
        assert_eq!(found.layer().id(), first.layer().id());
    }

    #[test]
    fn test_exact_method_beats_any() {
        let (_arena, _root, router) = setup();
        let any = router.all("/items").unwrap();
        let post = router.post("/items").unwrap();

        let (found, _) = router.lookup(&Method::POST, "/items").unwrap();
        assert_eq!(found.layer().id(), post.layer().id());
        let (found, _) = router.lookup(&Method::DELETE, "/items").unwrap();
        assert_eq!(found.layer().id(), any.layer().id());
    }

    #[test]
    fn test_head_falls_back_to_get() {
        let (_arena, _root, router) = setup();
        let get = router.get("/page").unwrap();
        let (found, _) = router.lookup(&Method::HEAD, "/page").unwrap();
        assert_eq!(found.layer().id(), get.layer().id());
        assert!(router.lookup(&Method::POST, "/page").is_none());
    }

    #[test]
    fn test_invalid_method_rejected() {
        let (_arena, _root, router) = setup();
        let err = router.route("BAD METHOD", "/x").unwrap_err();
        assert!(matches!(err, ProxyError::InvalidConfig { .. }));
        assert!(router.is_empty());
    }

    #[test]
    fn test_remove_route() {
        let (arena, _root, router) = setup();
        let route = router.route("get", "/gone").unwrap();
        assert!(arena.contains(route.layer().id()));
        assert!(router.remove(&route));
        assert!(!router.remove(&route));
        assert!(router.lookup(&Method::GET, "/gone").is_none());
        assert!(!arena.contains(route.layer().id()));
    }

    #[tokio::test]
    async fn test_dispatch_and_fall_through() {
        let (_arena, root, router) = setup();
        router.get("/a/:x").unwrap().handle(reply("param"));
        router.get("/a/b").unwrap().handle(reply("literal"));
        root.register(Phase::Request, Priority::Tail, HandlerKind::Handler(Arc::new(router)))
            .unwrap();
        root.set_final_handler(reply("final"));

        let run = |path: &'static str| {
            let root = root.clone();
            async move {
                let mut ex =
                    Exchange::new(Request::builder().uri(path).body(Body::empty()).unwrap());
                root.run(&Phase::Request, &mut ex, None).await.unwrap();
                let body = ex.take_response().unwrap().into_body();
                let bytes = axum::body::to_bytes(body, 1024).await.unwrap();
                String::from_utf8(bytes.to_vec()).unwrap()
            }
        };

        assert_eq!(run("/a/b").await, "literal:-");
        assert_eq!(run("/a/42").await, "param:42");
        assert_eq!(run("/elsewhere").await, "final:-");
    }
}
