//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → TraceLayer / request ID / timeout
//!     → security::amp_cors (AMP origin policy)
//!     → proxy handler → upstream backend
//!     → decorated response to client
//! ```

pub mod server;

pub use server::{AppState, HttpServer, ServerError};
