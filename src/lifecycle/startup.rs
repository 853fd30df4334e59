//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize metrics, registries and the proxy in dependency order
//! - Bootstrap configured instances
//! - Bind the proxy and admin listeners and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when the topology is built)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::HttpServer;
use crate::lifecycle::{shutdown::Shutdown, signals};
use crate::observability::metrics;
use crate::proxy::Proxy;
use crate::registry::Registries;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build proxy: {0}")]
    Proxy(#[from] ProxyError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Build the proxy described by `config` and serve until a shutdown signal.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registries = Arc::new(Registries::with_builtins());
    let proxy = Arc::new(Proxy::from_config(&config, registries)?);
    tracing::info!(
        proxy = %proxy.metadata().id,
        instances = proxy.manager().instances().len(),
        "Proxy initialized"
    );

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_listener(shutdown.clone());

    let admin = if config.admin.enabled {
        let listener = bind(&config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");
        let router = setup_admin_router(AdminState::new(
            proxy.clone(),
            config.admin.api_key.clone(),
        ));
        let signalled = shutdown.signalled();
        Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(signalled)
                .await
        }))
    } else {
        None
    };

    let listener = bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(proxy, Duration::from_secs(config.timeouts.request_secs));
    server.run(listener, shutdown.signalled()).await?;

    if let Some(handle) = admin {
        match handle.await {
            Ok(result) => result?,
            Err(e) => tracing::error!(error = %e, "Admin listener task failed"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
