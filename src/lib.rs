//! AMP CORS gateway library.
//!
//! Enforces the AMP cross-origin policy for one publisher origin, either as
//! a tower middleware ([`AmpCorsLayer`]) or as a standalone gateway in front
//! of an upstream backend ([`HttpServer`]).

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use security::{AmpCorsLayer, AmpOriginGuard};
