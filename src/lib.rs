//! Programmable scoped reverse proxy.
//!
//! Requests run through a phase engine of prioritized, nested layers.
//! Instances group rule-gated scopes of plugins; a method/pattern router
//! sits at the tail of the root layer and the forwarder handles whatever
//! nothing else answered.

pub mod admin;
pub mod config;
pub mod error;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod manager;
pub mod observability;
pub mod pipeline;
pub mod plugins;
pub mod proxy;
pub mod registry;
pub mod routing;
pub mod rules;

pub use config::schema::ProxyConfig;
pub use error::{HandlerError, HandlerResult, ProxyError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{Proxy, ProxyMetadata};
pub use registry::Registries;
