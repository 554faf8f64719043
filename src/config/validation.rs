//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Publisher origin must be https
//! - Addresses must parse
//! - Extra query parameters must not shadow the AMP parameter
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::uri::Authority;

use crate::config::schema::GatewayConfig;
use crate::security::amp_cors::{AmpOriginGuard, GuardError, AMP_SOURCE_ORIGIN_PARAM};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("amp.publisher_origin `{0}` must start with https://")]
    InsecurePublisherOrigin(String),

    #[error("listener.bind_address `{0}` is not a socket address")]
    InvalidBindAddress(String),

    #[error("upstream.address `{0}` is not a valid host:port")]
    InvalidUpstreamAddress(String),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("timeouts.request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("amp.query_string contains an empty parameter name")]
    EmptyQueryParameterName,

    #[error("amp.query_string may not set `{}`", AMP_SOURCE_ORIGIN_PARAM)]
    ReservedQueryParameter,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(GuardError::InsecurePublisherOrigin(origin)) =
        AmpOriginGuard::new(config.amp.publisher_origin.as_str())
    {
        errors.push(ValidationError::InsecurePublisherOrigin(origin));
    }

    for name in config.amp.query_string.keys() {
        if name.is_empty() {
            errors.push(ValidationError::EmptyQueryParameterName);
        } else if name == AMP_SOURCE_ORIGIN_PARAM {
            errors.push(ValidationError::ReservedQueryParameter);
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    let upstream_ok = config
        .upstream
        .address
        .parse::<Authority>()
        .map(|authority| authority.port_u16().is_some())
        .unwrap_or(false);
    if !upstream_ok {
        errors.push(ValidationError::InvalidUpstreamAddress(
            config.upstream.address.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
