//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the redirect proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, shutdown deadline).
    pub listener: ListenerConfig,

    /// Upstream content services.
    pub upstreams: UpstreamConfig,

    /// Feature toggles.
    pub features: FeatureConfig,

    /// Releases fallback settings.
    pub fallback: FallbackConfig,

    /// Redirect store connection settings.
    pub redis: RedisConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:30000").
    pub bind_address: String,

    /// Deadline for draining in-flight requests on shutdown, in seconds.
    pub graceful_shutdown_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "localhost:30000".to_string(),
            graceful_shutdown_secs: 5,
        }
    }
}

/// Upstream base URLs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Primary content service every request falls through to.
    pub primary_url: String,

    /// Secondary service tried first for releases paths.
    pub secondary_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            primary_url: "http://localhost:20000".to_string(),
            secondary_url: "http://localhost:8000".to_string(),
        }
    }
}

/// Feature toggles. Both default to off.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    /// Consult the redirect store before routing.
    pub enable_redirects: bool,

    /// Try the secondary upstream first for releases paths.
    pub enable_releases_fallback: bool,
}

/// How the fallback combinator replays the inbound body to its two handlers.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BodyReplay {
    /// Read the whole body up front and hand each handler a copy.
    #[default]
    Buffered,
    /// Share the body through a stream splitter, pulling it lazily.
    Split,
}

/// Releases fallback configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FallbackConfig {
    /// Path prefix routed through the fallback combinator.
    pub releases_prefix: String,

    /// Status from the secondary upstream that triggers the fallback.
    pub trigger_status: u16,

    /// Body replay strategy.
    pub body_replay: BodyReplay,

    /// Maximum inbound body size buffered in `buffered` mode.
    pub max_body_bytes: usize,

    /// Maximum size of a captured secondary response.
    pub max_capture_bytes: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            releases_prefix: "/releases".to_string(),
            trigger_status: 404,
            body_replay: BodyReplay::Buffered,
            max_body_bytes: 10 * 1024 * 1024,
            max_capture_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Security protocol value that turns on TLS for the redirect store.
pub const REDIS_TLS_PROTOCOL: &str = "TLS";

/// Redirect store connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RedisConfig {
    /// Node address (e.g., "localhost:6379").
    pub address: String,

    /// Cluster name for managed deployments.
    pub cluster_name: Option<String>,

    /// Region for managed deployments.
    pub region: Option<String>,

    /// Service name for managed deployments.
    pub service: Option<String>,

    /// Username for authenticated deployments.
    pub username: Option<String>,

    /// Security protocol; `"TLS"` enables TLS.
    pub sec_protocol: Option<String>,

    /// Deadline for a single redirect lookup in milliseconds.
    pub lookup_timeout_ms: u64,
}

impl RedisConfig {
    /// Cluster mode requires all three managed-deployment fields.
    pub fn is_cluster(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        set(&self.cluster_name) && set(&self.region) && set(&self.service)
    }

    pub fn is_tls(&self) -> bool {
        self.sec_protocol.as_deref() == Some(REDIS_TLS_PROTOCOL)
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            address: "localhost:6379".to_string(),
            cluster_name: None,
            region: None,
            service: None,
            username: None,
            sec_protocol: None,
            lookup_timeout_ms: 500,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// How long a check may fail before the service reports critical.
    pub critical_timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            critical_timeout_secs: 90,
        }
    }
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (time until upstream response headers) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
