// ABOUTME: Runtime configuration for the coordination layer.
// ABOUTME: Built from defaults, environment variables, or an arbitrary lookup.

use std::time::Duration;

use crate::error::ConfigError;

/// Default store address when nothing is configured.
pub const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379";

/// Settings shared by every coordination component.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordConfig {
    /// Store address: `redis://…` or `memory://`.
    pub store_url: String,
    /// Namespace prefix for every key written to the store.
    pub key_prefix: String,
    /// Record TTL for agents, and the default lock TTL.
    pub coordination_ttl: Duration,
    /// Hard bound on a single connection attempt.
    pub connect_timeout: Duration,
    /// Attempts before a connect is surfaced as unavailable.
    pub connect_attempts: u32,
    /// Interval of the background ping.
    pub health_interval: Duration,
    /// Bound on every store round trip.
    pub operation_timeout: Duration,
    /// Agents seen within this window are active.
    pub liveness_window: Duration,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    /// Max entries kept in each agent's conflict log.
    pub conflict_log_len: usize,
    /// Mirror facade metrics into the store.
    pub persist_metrics: bool,
}

impl Default for CoordConfig {
    fn default() -> Self {
        Self {
            store_url: DEFAULT_STORE_URL.to_string(),
            key_prefix: "coord".to_string(),
            coordination_ttl: Duration::from_secs(3600),
            connect_timeout: Duration::from_millis(5000),
            connect_attempts: 3,
            health_interval: Duration::from_millis(30_000),
            operation_timeout: Duration::from_millis(2000),
            liveness_window: Duration::from_secs(300),
            cache_capacity: 1000,
            cache_ttl: Duration::from_millis(5000),
            conflict_log_len: 100,
            persist_metrics: false,
        }
    }
}

impl CoordConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("COORD_STORE_URL").or_else(|| lookup("REDIS_URL")) {
            config.store_url = url;
        }
        if let Some(prefix) = lookup("COORD_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        if let Some(secs) = parse_var(&lookup, "COORDINATION_TTL")? {
            config.coordination_ttl = Duration::from_secs(positive("COORDINATION_TTL", secs)?);
        }
        if let Some(ms) = parse_var(&lookup, "COORD_CONNECT_TIMEOUT_MS")? {
            config.connect_timeout =
                Duration::from_millis(positive("COORD_CONNECT_TIMEOUT_MS", ms)?);
        }
        if let Some(ms) = parse_var(&lookup, "COORD_HEALTH_INTERVAL_MS")? {
            config.health_interval =
                Duration::from_millis(positive("COORD_HEALTH_INTERVAL_MS", ms)?);
        }
        if let Some(ms) = parse_var(&lookup, "COORD_OPERATION_TIMEOUT_MS")? {
            config.operation_timeout =
                Duration::from_millis(positive("COORD_OPERATION_TIMEOUT_MS", ms)?);
        }
        if let Some(secs) = parse_var(&lookup, "COORD_LIVENESS_WINDOW_SECS")? {
            config.liveness_window =
                Duration::from_secs(positive("COORD_LIVENESS_WINDOW_SECS", secs)?);
        }
        if let Some(n) = parse_var(&lookup, "COORD_CACHE_CAPACITY")? {
            config.cache_capacity = positive("COORD_CACHE_CAPACITY", n)? as usize;
        }
        if let Some(ms) = parse_var(&lookup, "COORD_CACHE_TTL_MS")? {
            config.cache_ttl = Duration::from_millis(ms);
        }
        if let Some(flag) = lookup("COORD_PERSIST_METRICS") {
            config.persist_metrics = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "COORD_PERSIST_METRICS",
                        value: flag,
                        reason: "expected a boolean".into(),
                    });
                }
            };
        }

        Ok(config)
    }
}

fn parse_var<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                var,
                value: raw,
                reason: e.to_string(),
            }),
    }
}

fn positive(var: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}
