//! Runtime configuration
//!
//! Plain values with `const` builder methods and sensible defaults.
//!
//! # Example
//!
//! ```
//! use gophr_runtime::config::{DedupStrategy, PipelineConfig, StoreConfig};
//! use std::time::Duration;
//!
//! let pipeline = PipelineConfig::default()
//!     .with_dedup(DedupStrategy::InFlight)
//!     .with_transport_timeout(Duration::from_secs(10));
//!
//! let store = StoreConfig::default().with_broadcast_capacity(256);
//!
//! assert_eq!(pipeline.dedup, DedupStrategy::InFlight);
//! assert_eq!(store.broadcast_capacity, 256);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// What to do when an identical call is already in flight
///
/// Two calls are identical when method, resource and payload are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupStrategy {
    /// Every dispatch reaches the transport (fire-and-forget)
    #[default]
    Disabled,
    /// A dispatch identical to one still in flight emits nothing
    InFlight,
}

impl FromStr for DedupStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "off" | "disabled" | "none" => Ok(Self::Disabled),
            "in-flight" | "inflight" | "on" => Ok(Self::InFlight),
            other => Err(format!("unknown dedup strategy: {other}")),
        }
    }
}

/// Configuration for a [`DispatchPipeline`](crate::pipeline::DispatchPipeline)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineConfig {
    /// In-flight deduplication
    pub dedup: DedupStrategy,
    /// Upper bound on a single transport call; `None` waits forever
    pub transport_timeout: Option<Duration>,
}

impl PipelineConfig {
    /// Create a configuration with custom values
    #[must_use]
    pub const fn new(dedup: DedupStrategy, transport_timeout: Option<Duration>) -> Self {
        Self {
            dedup,
            transport_timeout,
        }
    }

    /// Set the dedup strategy
    #[must_use]
    pub const fn with_dedup(mut self, dedup: DedupStrategy) -> Self {
        self.dedup = dedup;
        self
    }

    /// Bound every transport call; expiry becomes a failure event
    #[must_use]
    pub const fn with_transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = Some(timeout);
        self
    }
}

/// Configuration for a [`Store`](crate::store::Store)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Capacity of the action broadcast channel
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Create a configuration with custom values
    #[must_use]
    pub const fn new(broadcast_capacity: usize, default_shutdown_timeout: Duration) -> Self {
        Self {
            broadcast_capacity,
            default_shutdown_timeout,
        }
    }

    /// Set the broadcast capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 64,
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_fire_and_forget_semantics() {
        let config = PipelineConfig::default();
        assert_eq!(config.dedup, DedupStrategy::Disabled);
        assert_eq!(config.transport_timeout, None);
    }

    #[test]
    fn dedup_strategy_parses_env_spellings() {
        assert_eq!("in-flight".parse::<DedupStrategy>().unwrap(), DedupStrategy::InFlight);
        assert_eq!("OFF".parse::<DedupStrategy>().unwrap(), DedupStrategy::Disabled);
        assert!("sometimes".parse::<DedupStrategy>().is_err());
    }
}
