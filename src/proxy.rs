//! The proxy composition root.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → Exchange (request id, original host, client addr)
//!     → root "request" phase
//!         Head / Normal handlers (user middleware, instance layers, muxes)
//!         Tail: router
//!         final: forwarder
//!     → root "response" phase
//!     → Response<Body>   (unhandled failure → 500, never a dropped request)
//! ```
//!
//! # Responsibilities
//! - Own the layer arena, the root layer, the router and the manager
//! - Wire the forwarder in as the root's final handler
//! - Convert a pipeline outcome into exactly one HTTP response

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use serde::Serialize;
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::forward::Forwarder;
use crate::http::response::text_response;
use crate::manager::Manager;
use crate::observability::metrics;
use crate::pipeline::{
    EntryId, Exchange, Handler, HandlerKind, Layer, LayerArena, Phase, Priority,
};
use crate::registry::Registries;
use crate::routing::{Matcher, Mux, RouteHandle, Router};

/// Descriptive information about a running proxy.
#[derive(Debug, Clone, Serialize)]
pub struct ProxyMetadata {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub platform: &'static str,
}

impl ProxyMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            hostname: std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()),
            platform: std::env::consts::OS,
        }
    }

    /// Pseudonym used in the `Via` header.
    pub fn pseudonym(&self) -> String {
        let short = self.id.split('-').next().unwrap_or_default();
        format!("{}-{}", self.name, short)
    }
}

impl Default for ProxyMetadata {
    fn default() -> Self {
        Self::new("scoped-proxy", "")
    }
}

pub struct Proxy {
    metadata: ProxyMetadata,
    arena: Arc<LayerArena>,
    root: Arc<Layer>,
    router: Arc<Router>,
    router_entry: EntryId,
    manager: Manager,
}

impl Proxy {
    /// A proxy with no instances, an empty router and the default
    /// forwarder.
    pub fn new(metadata: ProxyMetadata, registries: Arc<Registries>) -> Result<Self, ProxyError> {
        let arena = LayerArena::new();
        let root = arena.create();
        let router = Arc::new(Router::new(arena.clone(), root.id()));
        let router_entry = root.register(
            Phase::Request,
            Priority::Tail,
            HandlerKind::Handler(router.clone()),
        )?;
        root.set_final_handler(Arc::new(
            Forwarder::new().with_via(&metadata.pseudonym()),
        ));
        let manager = Manager::new(arena.clone(), root.clone(), registries);

        tracing::debug!(proxy = %metadata.id, root = %root.id(), "Proxy created");
        Ok(Self {
            metadata,
            arena,
            root,
            router,
            router_entry,
            manager,
        })
    }

    /// Build a proxy from configuration and bootstrap its instances.
    pub fn from_config(
        config: &ProxyConfig,
        registries: Arc<Registries>,
    ) -> Result<Self, ProxyError> {
        let metadata = ProxyMetadata::new(&config.proxy.name, &config.proxy.description);
        let proxy = Self::new(metadata, registries)?;
        let forwarder = Forwarder::from_config(&config.forward)?.with_via(&proxy.metadata.pseudonym());
        proxy.use_final_handler(Arc::new(forwarder));
        proxy.manager.load(&config.instances)?;
        Ok(proxy)
    }

    pub fn metadata(&self) -> &ProxyMetadata {
        &self.metadata
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn root(&self) -> &Arc<Layer> {
        &self.root
    }

    pub fn arena(&self) -> &Arc<LayerArena> {
        &self.arena
    }

    pub fn route(&self, method: &str, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.router.route(method, pattern)
    }

    pub fn get(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.router.get(pattern)
    }

    pub fn post(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.router.post(pattern)
    }

    pub fn put(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.router.put(pattern)
    }

    pub fn delete(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.router.delete(pattern)
    }

    pub fn patch(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.router.patch(pattern)
    }

    pub fn options(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.router.options(pattern)
    }

    pub fn all(&self, pattern: &str) -> Result<RouteHandle, ProxyError> {
        self.router.all(pattern)
    }

    /// Send all unhandled traffic to `uri`.
    pub fn forward_to(&self, uri: &str) -> Result<&Self, ProxyError> {
        let forwarder = Forwarder::to(uri)?.with_via(&self.metadata.pseudonym());
        tracing::info!(target_uri = uri, "Forwarding to fixed target");
        Ok(self.use_final_handler(Arc::new(forwarder)))
    }

    /// Add a "request" phase handler to the root layer.
    pub fn use_handler(&self, handler: Arc<dyn Handler>) -> Result<EntryId, ProxyError> {
        self.root
            .register(Phase::Request, Priority::Normal, HandlerKind::Handler(handler))
    }

    pub fn use_phase(
        &self,
        phase: impl Into<Phase>,
        priority: Priority,
        handler: Arc<dyn Handler>,
    ) -> Result<EntryId, ProxyError> {
        self.root
            .register(phase, priority, HandlerKind::Handler(handler))
    }

    /// Replace the root's final handler (the forwarder by default).
    pub fn use_final_handler(&self, handler: Arc<dyn Handler>) -> &Self {
        self.root.set_final_handler(handler);
        self
    }

    /// Gate a new nested layer behind `matchers` (all must match).
    pub fn mux(&self, matchers: Vec<Arc<dyn Matcher>>) -> Result<Arc<Mux>, ProxyError> {
        let mux = Arc::new(Mux::all(&self.arena, matchers));
        if let Err(err) = self.root.register(
            Phase::Request,
            Priority::Normal,
            HandlerKind::Gate(mux.clone()),
        ) {
            self.arena.remove(mux.layer().id());
            return Err(err);
        }
        Ok(mux)
    }

    /// Drop every root handler except the router and the instances.
    pub fn flush(&self) -> usize {
        let mut keep: HashSet<EntryId> = HashSet::from([self.router_entry]);
        for instance in self.manager.instances() {
            keep.extend(instance.root_entries().iter().copied());
        }
        self.root.retain(|id| keep.contains(&id))
    }

    /// Run one request through the pipeline.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let mut exchange = Exchange::new(request);
        let method = exchange.request().method().clone();

        tracing::debug!(
            request_id = %exchange.request_id(),
            method = %method,
            path = %exchange.request().uri().path(),
            "Request received"
        );

        let mut outcome = self.root.run(&Phase::Request, &mut exchange, None).await;
        if outcome.is_ok() && exchange.has_response() {
            outcome = self.root.run(&Phase::Response, &mut exchange, None).await;
        }

        let response = match outcome {
            Ok(()) => exchange.take_response().unwrap_or_else(|| {
                tracing::error!(
                    request_id = %exchange.request_id(),
                    "Pipeline finished without a response"
                );
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "No response produced")
            }),
            Err(err) => {
                tracing::error!(
                    request_id = %exchange.request_id(),
                    error = %err,
                    "Unhandled handler failure"
                );
                let status = err.status();
                text_response(
                    status,
                    status.canonical_reason().unwrap_or("Internal Server Error"),
                )
            }
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), exchange.started());
        response
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("metadata", &self.metadata)
            .field("root", &self.root.id())
            .field("routes", &self.router.len())
            .field("manager", &self.manager)
            .finish()
    }
}
