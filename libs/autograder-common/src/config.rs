// Application configuration loaded from the environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Circuit breaker tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            base_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub sandbox_url: String,
    pub api_prefix: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub default_run_timeout_ms: u64,
    /// Upper bound the sandbox enforces on run_timeout
    pub run_timeout_cap_ms: u64,
    pub compile_timeout_ms: u64,
    /// In-flight request bound across all grading calls
    pub max_connections: usize,
    pub max_idle_per_host: usize,
    pub breaker: BreakerConfig,
    pub template_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sandbox_url: "http://localhost:2000".to_string(),
            api_prefix: "/api/v2".to_string(),
            request_timeout: Duration::from_millis(30_000),
            connect_timeout: Duration::from_millis(5_000),
            default_run_timeout_ms: 3_000,
            run_timeout_cap_ms: 3_000,
            compile_timeout_ms: 10_000,
            max_connections: 20,
            max_idle_per_host: 10,
            breaker: BreakerConfig::default(),
            template_dir: None,
        }
    }
}

impl Config {
    /// Load configuration with defaults, overridden by environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reading from an arbitrary source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let sandbox_url = lookup("SANDBOX_URL")
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.sandbox_url);

        let api_prefix = lookup("SANDBOX_API_PREFIX")
            .map(|v| normalize_prefix(&v))
            .unwrap_or(defaults.api_prefix);

        let breaker = BreakerConfig {
            failure_threshold: parse_or(&lookup, "BREAKER_FAILURE_THRESHOLD", defaults.breaker.failure_threshold)
                .max(1),
            base_backoff: Duration::from_secs(parse_or(
                &lookup,
                "BREAKER_BASE_BACKOFF_SECS",
                defaults.breaker.base_backoff.as_secs(),
            )),
            max_backoff: Duration::from_secs(parse_or(
                &lookup,
                "BREAKER_MAX_BACKOFF_SECS",
                defaults.breaker.max_backoff.as_secs(),
            )),
        };

        Self {
            sandbox_url,
            api_prefix,
            request_timeout: Duration::from_millis(parse_or(
                &lookup,
                "SANDBOX_REQUEST_TIMEOUT_MS",
                defaults.request_timeout.as_millis() as u64,
            )),
            connect_timeout: Duration::from_millis(parse_or(
                &lookup,
                "SANDBOX_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout.as_millis() as u64,
            )),
            default_run_timeout_ms: parse_or(&lookup, "DEFAULT_RUN_TIMEOUT_MS", defaults.default_run_timeout_ms),
            run_timeout_cap_ms: parse_or(&lookup, "RUN_TIMEOUT_CAP_MS", defaults.run_timeout_cap_ms),
            compile_timeout_ms: parse_or(&lookup, "COMPILE_TIMEOUT_MS", defaults.compile_timeout_ms),
            max_connections: parse_or(&lookup, "SANDBOX_MAX_CONNECTIONS", defaults.max_connections).max(1),
            max_idle_per_host: parse_or(&lookup, "SANDBOX_MAX_IDLE_PER_HOST", defaults.max_idle_per_host),
            breaker,
            template_dir: lookup("HARNESS_TEMPLATE_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Base URL including the API prefix, e.g. `http://localhost:2000/api/v2`
    pub fn api_base(&self) -> String {
        format!("{}{}", self.sandbox_url, self.api_prefix)
    }

    /// Run timeout actually sent to the sandbox
    pub fn effective_run_timeout(&self, requested_ms: u64) -> u64 {
        requested_ms.min(self.run_timeout_cap_ms)
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
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
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config, Config::default());
        assert_eq!(config.api_base(), "http://localhost:2000/api/v2");
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.base_backoff, Duration::from_secs(30));
        assert_eq!(config.breaker.max_backoff, Duration::from_secs(300));
        assert!(config.template_dir.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("SANDBOX_URL", "http://piston:2000/"),
            ("SANDBOX_API_PREFIX", "api/v3/"),
            ("SANDBOX_REQUEST_TIMEOUT_MS", "1500"),
            ("BREAKER_FAILURE_THRESHOLD", "2"),
            ("HARNESS_TEMPLATE_DIR", "/etc/autograder/templates"),
        ]));

        assert_eq!(config.api_base(), "http://piston:2000/api/v3");
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.breaker.failure_threshold, 2);
        assert_eq!(
            config.template_dir,
            Some(PathBuf::from("/etc/autograder/templates"))
        );
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("SANDBOX_MAX_CONNECTIONS", "lots"),
            ("BREAKER_FAILURE_THRESHOLD", "0"),
            ("HARNESS_TEMPLATE_DIR", "  "),
        ]));
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.breaker.failure_threshold, 1);
        assert!(config.template_dir.is_none());
    }

    #[test]
    fn test_run_timeout_is_capped() {
        let config = Config::default();
        assert_eq!(config.effective_run_timeout(10_000), 3_000);
        assert_eq!(config.effective_run_timeout(1_200), 1_200);
    }
}
