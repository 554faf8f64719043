//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → amp_cors.rs (detect AMP flow, resolve origin)
//!         → origins.rs (whitelist lookup)
//!     → Pass to upstream, or 401
//! ```
//!
//! # Design Decisions
//! - Fail closed: any unresolved AMP origin is rejected
//! - No trust in client input: `AMP-Same-Origin` only counts inside the AMP flow

pub mod amp_cors;
pub mod origins;

pub use amp_cors::{AmpCors, AmpCorsLayer, AmpOriginGuard, Decision, GuardError, Rejection};
pub use origins::ValidOriginSet;
