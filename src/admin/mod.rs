//! Management API over the instance / scope hierarchy.
//!
//! # Data Flow
//! ```text
//! admin listener
//!     → auth.rs (optional bearer token)
//!     → handlers.rs (extract path IDs and JSON bodies)
//!     → Manager operations
//!     → views as JSON, or the ProxyError envelope
//! ```
//!
//! # Design Decisions
//! - Served on its own listener so it is never reachable through the proxy
//! - Every handler is a thin adapter: validation and errors come from the core

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::proxy::Proxy;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub proxy: Arc<Proxy>,
    pub api_key: Option<Arc<str>>,
}

impl AdminState {
    pub fn new(proxy: Arc<Proxy>, api_key: Option<String>) -> Self {
        Self {
            proxy,
            api_key: api_key.filter(|k| !k.is_empty()).map(Arc::from),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/", get(get_status))
        .route("/catalog", get(get_catalog))
        .route("/instances", get(list_instances).post(create_instance))
        .route(
            "/instances/{instance}",
            get(get_instance).delete(delete_instance),
        )
        .route(
            "/instances/{instance}/scopes",
            get(list_scopes).post(create_scope),
        )
        .route(
            "/instances/{instance}/scopes/{scope}",
            get(get_scope).delete(delete_scope),
        )
        .route(
            "/instances/{instance}/scopes/{scope}/plugins",
            get(list_plugins).post(create_plugin),
        )
        .route(
            "/instances/{instance}/scopes/{scope}/plugins/{plugin}",
            get(get_plugin).patch(update_plugin).delete(delete_plugin),
        )
        .route(
            "/instances/{instance}/scopes/{scope}/rules",
            get(list_rules).post(create_rule),
        )
        .route(
            "/instances/{instance}/scopes/{scope}/rules/{rule}",
            get(get_rule).delete(delete_rule),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
