//! Injected dependencies and process configuration

use gophr_core::environment::Clock;
use gophr_http::{API_URL_VAR, DEFAULT_API_URL};
use gophr_runtime::config::{DedupStrategy, PipelineConfig};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the per-call timeout in milliseconds
pub const TIMEOUT_VAR: &str = "GOPHR_TRANSPORT_TIMEOUT_MS";

/// Environment variable selecting the dedup strategy (`off` / `in-flight`)
pub const DEDUP_VAR: &str = "GOPHR_DEDUP";

/// Environment variable enabling the Prometheus recorder (`1`)
pub const METRICS_VAR: &str = "GOPHR_METRICS";

/// Dependencies of [`SiteReducer`](crate::SiteReducer)
#[derive(Clone)]
pub struct SiteEnvironment {
    clock: Arc<dyn Clock>,
}

impl SiteEnvironment {
    /// Create an environment around `clock`
    #[must_use]
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self { clock: Arc::new(clock) }
    }

    /// The injected clock
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

/// Invalid configuration value
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SiteConfigError {
    /// Timeout is not a whole number of milliseconds
    #[error("{var} must be a number of milliseconds, got '{value}'")]
    InvalidTimeout {
        /// Variable name
        var: &'static str,
        /// Value as read
        value: String,
    },

    /// Unknown dedup strategy
    #[error("{0}")]
    InvalidDedup(String),
}

/// Settings for the site binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    /// API base URL
    pub api_url: String,
    /// Per-call timeout; `None` waits for the transport
    pub transport_timeout: Option<Duration>,
    /// In-flight deduplication
    pub dedup: DedupStrategy,
    /// Install the Prometheus recorder
    pub metrics: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            transport_timeout: None,
            dedup: DedupStrategy::Disabled,
            metrics: false,
        }
    }
}

impl SiteConfig {
    /// Read the configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`SiteConfigError`] when a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, SiteConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read the configuration through `lookup`
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SiteConfigError`] when a variable is set to an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SiteConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(API_URL_VAR) {
            config.api_url = url;
        }
        if let Some(value) = lookup(TIMEOUT_VAR) {
            let millis = value.trim().parse::<u64>().map_err(|_| SiteConfigError::InvalidTimeout {
                var: TIMEOUT_VAR,
                value: value.clone(),
            })?;
            config.transport_timeout = Some(Duration::from_millis(millis));
        }
        if let Some(value) = lookup(DEDUP_VAR) {
            config.dedup = value.parse().map_err(SiteConfigError::InvalidDedup)?;
        }
        if let Some(value) = lookup(METRICS_VAR) {
            config.metrics = matches!(value.trim(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Pipeline settings derived from this configuration
    #[must_use]
    pub const fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new(self.dedup, self.transport_timeout)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn unset_variables_keep_defaults() {
        let config = SiteConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SiteConfig::default());
        assert_eq!(config.api_url, "http://localhost:3000/api/v0");
    }

    #[test]
    fn variables_override_defaults() {
        let config = SiteConfig::from_lookup(lookup(&[
            ("GOPHR_API_URL", "https://gophr.pm/api/v0"),
            ("GOPHR_TRANSPORT_TIMEOUT_MS", "2500"),
            ("GOPHR_DEDUP", "in-flight"),
            ("GOPHR_METRICS", "1"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://gophr.pm/api/v0");
        assert_eq!(config.transport_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.dedup, DedupStrategy::InFlight);
        assert!(config.metrics);
        assert_eq!(config.pipeline_config().dedup, DedupStrategy::InFlight);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            SiteConfig::from_lookup(lookup(&[("GOPHR_TRANSPORT_TIMEOUT_MS", "soon")])),
            Err(SiteConfigError::InvalidTimeout { .. })
        ));
        assert!(matches!(
            SiteConfig::from_lookup(lookup(&[("GOPHR_DEDUP", "sometimes")])),
            Err(SiteConfigError::InvalidDedup(_))
        ));
    }
}
