//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout, panic isolation)
//!     → Proxy::handle (phase engine)
//!     → response.rs (proxy-generated responses)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id_of, X_REQUEST_ID};
pub use server::HttpServer;
