//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Upstream URLs must be absolute http(s) URLs
//! - Validate value ranges (timeouts > 0, status codes in range)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::{ProxyConfig, REDIS_TLS_PROTOCOL};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required config: {0}")]
    Missing(&'static str),

    #[error("{field} is not a valid upstream URL ({value}): {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("fallback.trigger_status {0} is not a valid HTTP status")]
    InvalidStatus(u16),

    #[error("fallback.releases_prefix must start with '/' (got {0:?})")]
    InvalidPrefix(String),

    #[error("redis.sec_protocol must be empty or \"TLS\" (got {0:?})")]
    InvalidSecProtocol(String),
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::Missing("listener.bind_address"));
    }
    if config.listener.graceful_shutdown_secs == 0 {
        errors.push(ValidationError::Zero("listener.graceful_shutdown_secs"));
    }

    if config.upstreams.primary_url.is_empty() {
        errors.push(ValidationError::Missing("upstreams.primary_url"));
    } else if let Err(e) = check_upstream_url("upstreams.primary_url", &config.upstreams.primary_url) {
        errors.push(e);
    }

    if config.features.enable_releases_fallback {
        if config.upstreams.secondary_url.is_empty() {
            errors.push(ValidationError::Missing("upstreams.secondary_url"));
        } else if let Err(e) =
            check_upstream_url("upstreams.secondary_url", &config.upstreams.secondary_url)
        {
            errors.push(e);
        }
    }

    if !(100..=599).contains(&config.fallback.trigger_status) {
        errors.push(ValidationError::InvalidStatus(config.fallback.trigger_status));
    }
    if !config.fallback.releases_prefix.starts_with('/') {
        errors.push(ValidationError::InvalidPrefix(
            config.fallback.releases_prefix.clone(),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }
    if config.health_check.interval_secs == 0 {
        errors.push(ValidationError::Zero("health_check.interval_secs"));
    }
    if config.redis.lookup_timeout_ms == 0 {
        errors.push(ValidationError::Zero("redis.lookup_timeout_ms"));
    }

    match config.redis.sec_protocol.as_deref() {
        None | Some("") | Some(REDIS_TLS_PROTOCOL) => {}
        Some(other) => errors.push(ValidationError::InvalidSecProtocol(other.to_string())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parse an upstream base URL, requiring an absolute http(s) URL with a host.
pub fn check_upstream_url(field: &'static str, value: &str) -> Result<Url, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("base URL must not carry a query or fragment".to_string()));
    }
    Ok(url)
}
