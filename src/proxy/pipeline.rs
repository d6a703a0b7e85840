//! Pipeline construction.
//!
//! Turns a validated [`ProxyConfig`] into the handler chain serving every
//! inbound request. Building is pure: the same config always yields an
//! equivalent pipeline, and nothing is shared with a previous build, so a
//! reload constructs a fresh pipeline and swaps it in whole.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use thiserror::Error;

use super::alternative::try_handler;
use super::{Forwarder, Handler, RedirectLayer, SharedHandler};
use crate::config::{ProxyConfig, ValidationError};
use crate::routing::Router;
use crate::store::RedirectStore;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid {name} upstream: {source}")]
    Upstream {
        name: &'static str,
        #[source]
        source: ValidationError,
    },

    #[error("invalid fallback trigger status {0}")]
    TriggerStatus(u16),

    #[error("redirects are enabled but no redirect store was provided")]
    MissingStore,
}

/// The handler chain built from one config.
pub struct Pipeline {
    root: SharedHandler,
    router: Arc<Router>,
    redirects: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("router", &self.router)
            .field("redirects", &self.redirects)
            .finish()
    }
}

impl Pipeline {
    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn redirects_enabled(&self) -> bool {
        self.redirects
    }
}

#[async_trait]
impl Handler for Pipeline {
    async fn handle(&self, request: Request<Body>) -> Response {
        self.root.handle(request).await
    }
}

/// Build the request pipeline for `config`.
///
/// `store` is required only when redirects are enabled.
pub fn build_pipeline(
    config: &ProxyConfig,
    store: Option<Arc<dyn RedirectStore>>,
) -> Result<Pipeline, BuildError> {
    let primary = Forwarder::new("primary", &config.upstreams.primary_url, &config.timeouts)
        .map_err(|source| BuildError::Upstream {
            name: "primary",
            source,
        })?;
    let primary: SharedHandler = Arc::new(primary);

    let mut builder = Router::builder();
    if config.features.enable_releases_fallback {
        let secondary =
            Forwarder::new("secondary", &config.upstreams.secondary_url, &config.timeouts)
                .map_err(|source| BuildError::Upstream {
                    name: "secondary",
                    source,
                })?;
        let trigger = StatusCode::from_u16(config.fallback.trigger_status)
            .map_err(|_| BuildError::TriggerStatus(config.fallback.trigger_status))?;

        let releases = try_handler(Arc::new(secondary))
            .when_status(trigger)
            .then(primary.clone())
            .with_body_replay(config.fallback.body_replay)
            .with_limits(config.fallback.max_body_bytes, config.fallback.max_capture_bytes);

        tracing::debug!(
            prefix = %config.fallback.releases_prefix,
            trigger = %trigger,
            "Releases fallback enabled"
        );
        builder = builder.prefix(config.fallback.releases_prefix.clone(), Arc::new(releases));
    }
    let router = Arc::new(builder.catch_all(primary));

    let root: SharedHandler = if config.features.enable_redirects {
        let store = store.ok_or(BuildError::MissingStore)?;
        let timeout = Duration::from_millis(config.redis.lookup_timeout_ms);
        tracing::debug!(lookup_timeout = ?timeout, "Redirects enabled");
        Arc::new(RedirectLayer::new(store, timeout).layer(router.clone()))
    } else {
        router.clone()
    };

    Ok(Pipeline {
        root,
        router,
        redirects: config.features.enable_redirects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn config(redirects: bool, fallback: bool) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.features.enable_redirects = redirects;
        config.features.enable_releases_fallback = fallback;
        config
    }

    #[test]
    fn test_plain_pipeline_has_only_catch_all() {
        let pipeline = build_pipeline(&config(false, false), None).unwrap();
        assert!(pipeline.router().prefixes().is_empty());
        assert!(!pipeline.redirects_enabled());
    }

    #[test]
    fn test_releases_route_installed_when_enabled() {
        let pipeline = build_pipeline(&config(false, true), None).unwrap();
        assert_eq!(pipeline.router().prefixes(), vec!["/releases"]);
    }

    #[test]
    fn test_redirects_need_store() {
        assert!(matches!(
            build_pipeline(&config(true, false), None),
            Err(BuildError::MissingStore)
        ));

        let store: Arc<dyn RedirectStore> = Arc::new(MemoryStore::new());
        let pipeline = build_pipeline(&config(true, false), Some(store)).unwrap();
        assert!(pipeline.redirects_enabled());
    }

    #[test]
    fn test_bad_upstream_rejected() {
        let mut cfg = config(false, true);
        cfg.upstreams.secondary_url = "localhost:8000".into();
        assert!(matches!(
            build_pipeline(&cfg, None),
            Err(BuildError::Upstream { name: "secondary", .. })
        ));

        // secondary is irrelevant when fallback is off
        cfg.features.enable_releases_fallback = false;
        assert!(build_pipeline(&cfg, None).is_ok());
    }

    #[test]
    fn test_bad_trigger_status_rejected() {
        let mut cfg = config(false, true);
        cfg.fallback.trigger_status = 42;
        assert!(matches!(
            build_pipeline(&cfg, None),
            Err(BuildError::TriggerStatus(42))
        ));
    }
}
