//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, then apply
/// environment overrides.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ProxyConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a configuration from defaults plus environment overrides only.
pub fn from_env() -> Result<ProxyConfig, ConfigError> {
    let mut config = ProxyConfig::default();
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply environment variable overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("BIND_ADDR") {
        config.listener.bind_address = v;
    }
    if let Some(v) = lookup("GRACEFUL_SHUTDOWN_TIMEOUT") {
        config.listener.graceful_shutdown_secs = duration_secs("GRACEFUL_SHUTDOWN_TIMEOUT", &v)?;
    }
    if let Some(v) = lookup("PROXIED_SERVICE_URL") {
        config.upstreams.primary_url = v;
    }
    if let Some(v) = lookup("WAGTAIL_URL") {
        config.upstreams.secondary_url = v;
    }
    if let Some(v) = lookup("ENABLE_REDIRECTS") {
        config.features.enable_redirects = boolean("ENABLE_REDIRECTS", &v)?;
    }
    if let Some(v) = lookup("ENABLE_RELEASES_FALLBACK") {
        config.features.enable_releases_fallback = boolean("ENABLE_RELEASES_FALLBACK", &v)?;
    }
    if let Some(v) = lookup("REDIS_ADDRESS") {
        config.redis.address = v;
    }
    if let Some(v) = lookup("REDIS_CLUSTER_NAME") {
        config.redis.cluster_name = Some(v);
    }
    if let Some(v) = lookup("REDIS_REGION") {
        config.redis.region = Some(v);
    }
    if let Some(v) = lookup("REDIS_SERVICE") {
        config.redis.service = Some(v);
    }
    if let Some(v) = lookup("REDIS_USERNAME") {
        config.redis.username = Some(v);
    }
    if let Some(v) = lookup("REDIS_SEC_PROTO") {
        config.redis.sec_protocol = Some(v);
    }
    if let Some(v) = lookup("HEALTHCHECK_INTERVAL") {
        config.health_check.interval_secs = duration_secs("HEALTHCHECK_INTERVAL", &v)?;
    }
    if let Some(v) = lookup("HEALTHCHECK_CRITICAL_TIMEOUT") {
        config.health_check.critical_timeout_secs =
            duration_secs("HEALTHCHECK_CRITICAL_TIMEOUT", &v)?;
    }
    Ok(())
}

fn boolean(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            value: value.to_string(),
        }),
    }
}

/// Whole seconds for a duration value, rounding sub-second values up so a
/// non-zero duration never becomes zero.
fn duration_secs(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    let duration = parse_duration(value).ok_or_else(|| ConfigError::Env {
        var,
        value: value.to_string(),
    })?;
    let secs = duration.as_secs();
    Ok(if duration.subsec_nanos() > 0 { secs + 1 } else { secs })
}

/// Parse a duration such as `"5s"`, `"500ms"` or `"1m30s"`. A bare number
/// is taken as seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1h 5m"), Some(Duration::from_secs(3900)));
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("5x"), None);
    }

    #[test]
    fn test_compound_durations_from_env() {
        let mut config = ProxyConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("GRACEFUL_SHUTDOWN_TIMEOUT", "1m30s"),
                ("HEALTHCHECK_INTERVAL", "1m"),
                ("HEALTHCHECK_CRITICAL_TIMEOUT", "2m30s"),
            ]),
        )
        .unwrap();
        assert_eq!(config.listener.graceful_shutdown_secs, 90);
        assert_eq!(config.health_check.interval_secs, 60);
        assert_eq!(config.health_check.critical_timeout_secs, 150);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ProxyConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("BIND_ADDR", "0.0.0.0:30000"),
                ("PROXIED_SERVICE_URL", "http://legacy:8080"),
                ("WAGTAIL_URL", "http://wagtail:8000"),
                ("ENABLE_REDIRECTS", "true"),
                ("ENABLE_RELEASES_FALLBACK", "1"),
                ("GRACEFUL_SHUTDOWN_TIMEOUT", "10s"),
                ("REDIS_SEC_PROTO", "TLS"),
            ]),
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:30000");
        assert_eq!(config.listener.graceful_shutdown_secs, 10);
        assert_eq!(config.upstreams.primary_url, "http://legacy:8080");
        assert_eq!(config.upstreams.secondary_url, "http://wagtail:8000");
        assert!(config.features.enable_redirects);
        assert!(config.features.enable_releases_fallback);
        assert!(config.redis.is_tls());
    }

    #[test]
    fn test_sub_second_timeout_rounds_up() {
        let mut config = ProxyConfig::default();
        apply_env_overrides(&mut config, env(&[("GRACEFUL_SHUTDOWN_TIMEOUT", "1500ms")])).unwrap();
        assert_eq!(config.listener.graceful_shutdown_secs, 2);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = ProxyConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("ENABLE_REDIRECTS", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "ENABLE_REDIRECTS", .. }));
    }

    #[test]
    fn test_load_config_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [upstreams]
            primary_url = "ftp://nope"
            "#
        )
        .unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [listener]
            bind_address = "127.0.0.1:0"

            [features]
            enable_releases_fallback = true

            [upstreams]
            primary_url = "http://legacy:8080"
            secondary_url = "http://wagtail:8000"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert!(config.features.enable_releases_fallback);
        assert_eq!(config.upstreams.secondary_url, "http://wagtail:8000");
    }
}
