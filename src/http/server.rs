//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router that hands every request to the proxy
//! - Wire up middleware (request ID, tracing, timeout, panic isolation)
//! - Bind the server to a listener with client address info
//! - Stop accepting on shutdown and drain in-flight requests

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::proxy::Proxy;

/// HTTP server for the proxy listener.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(proxy: Arc<Proxy>, request_timeout: Duration) -> Self {
        Self {
            router: Self::build_router(proxy, request_timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(proxy: Arc<Proxy>, request_timeout: Duration) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(proxy)
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Proxy listener starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Proxy listener stopped");
        Ok(())
    }
}

async fn proxy_handler(State(proxy): State<Arc<Proxy>>, request: Request<Body>) -> Response {
    proxy.handle(request).await
}
