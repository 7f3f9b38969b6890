//! Controller configuration from environment variables

use std::time::Duration;
use tracing::warn;

/// Default port for health and metrics endpoints
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Default backoff after a failed reconciliation
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(10);

/// Default poll interval while a measurement is in flight
pub const DEFAULT_IN_FLIGHT_POLL: Duration = Duration::from_secs(10);

/// Default timeout for provider HTTP requests
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub health_port: u16,
    pub error_requeue: Duration,
    pub in_flight_poll: Duration,
    pub provider_timeout: Duration,
    /// Namespace to watch; all namespaces when None
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            health_port: DEFAULT_HEALTH_PORT,
            error_requeue: DEFAULT_ERROR_REQUEUE,
            in_flight_poll: DEFAULT_IN_FLIGHT_POLL,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Read configuration from the process environment
    ///
    /// - `KULTA_HEALTH_PORT` (default 8080)
    /// - `KULTA_ERROR_REQUEUE_SECONDS` (default 10)
    /// - `KULTA_IN_FLIGHT_POLL_SECONDS` (default 10)
    /// - `KULTA_PROVIDER_TIMEOUT_SECONDS` (default 30)
    /// - `KULTA_WATCH_NAMESPACE` (default: all namespaces)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Invalid values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ControllerConfig::default();

        ControllerConfig {
            health_port: parse_or("KULTA_HEALTH_PORT", &lookup, defaults.health_port),
            error_requeue: seconds_or(
                "KULTA_ERROR_REQUEUE_SECONDS",
                &lookup,
                defaults.error_requeue,
            ),
            in_flight_poll: seconds_or(
                "KULTA_IN_FLIGHT_POLL_SECONDS",
                &lookup,
                defaults.in_flight_poll,
            ),
            provider_timeout: seconds_or(
                "KULTA_PROVIDER_TIMEOUT_SECONDS",
                &lookup,
                defaults.provider_timeout,
            ),
            watch_namespace: lookup("KULTA_WATCH_NAMESPACE")
                .map(|ns| ns.trim().to_string())
                .filter(|ns| !ns.is_empty()),
        }
    }
}

fn parse_or<T>(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key = key, value = %raw, default = ?default, "Invalid config value, using default");
                default
            }
        },
    }
}

fn seconds_or(key: &str, lookup: &impl Fn(&str) -> Option<String>, default: Duration) -> Duration {
    match parse_or::<u64>(key, lookup, default.as_secs()) {
        0 => {
            warn!(key = key, "Zero duration not allowed, using default");
            default
        }
        secs => Duration::from_secs(secs),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ControllerConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.health_port, 8080);
        assert_eq!(config.error_requeue, Duration::from_secs(10));
        assert_eq!(config.watch_namespace, None);
    }

    #[test]
    fn test_values_are_read() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("KULTA_HEALTH_PORT", "9090"),
            ("KULTA_ERROR_REQUEUE_SECONDS", "30"),
            ("KULTA_IN_FLIGHT_POLL_SECONDS", "5"),
            ("KULTA_PROVIDER_TIMEOUT_SECONDS", "12"),
            ("KULTA_WATCH_NAMESPACE", "rollouts"),
        ]));

        assert_eq!(config.health_port, 9090);
        assert_eq!(config.error_requeue, Duration::from_secs(30));
        assert_eq!(config.in_flight_poll, Duration::from_secs(5));
        assert_eq!(config.provider_timeout, Duration::from_secs(12));
        assert_eq!(config.watch_namespace.as_deref(), Some("rollouts"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ControllerConfig::from_lookup(lookup_from(&[
            ("KULTA_HEALTH_PORT", "not-a-port"),
            ("KULTA_ERROR_REQUEUE_SECONDS", "0"),
            ("KULTA_IN_FLIGHT_POLL_SECONDS", "-3"),
            ("KULTA_WATCH_NAMESPACE", "  "),
        ]));

        assert_eq!(config.health_port, DEFAULT_HEALTH_PORT);
        assert_eq!(config.error_requeue, DEFAULT_ERROR_REQUEUE);
        assert_eq!(config.in_flight_poll, DEFAULT_IN_FLIGHT_POLL);
        assert_eq!(config.watch_namespace, None);
    }
}
