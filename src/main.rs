//! scoped-proxy: programmable reverse proxy with rule-gated plugin scopes.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!   Client Request     │  root layer "request" phase                  │
//!   ──────────────────▶│   Head / Normal handlers                     │
//!                      │   instance layer ─▶ scope gate (rules AND)   │
//!                      │                      └─▶ scope plugins       │
//!                      │   Tail: router ─▶ route handler              │
//!                      │   final: forwarder ──────────────────────────┼──▶ Upstream
//!   Client Response    │  root layer "response" phase                 │
//!   ◀──────────────────│                                              │
//!                      └──────────────────────────────────────────────┘
//!   Admin API (separate listener) ─▶ Manager (instances, scopes, plugins, rules)
//! ```

use std::path::PathBuf;

use clap::Parser;

use scoped_proxy::config::{load_config, ProxyConfig};
use scoped_proxy::lifecycle;
use scoped_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "scoped-proxy", version, about = "Programmable scoped reverse proxy")]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "scoped-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        admin_enabled = config.admin.enabled,
        instances = config.instances.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    lifecycle::run(config).await?;
    Ok(())
}
