//! Error types for the HTTP transport

use thiserror::Error;

/// Errors building an [`HttpTransport`](crate::HttpTransport)
///
/// Request-time failures are not reported here; they become
/// [`TransportError`](gophr_core::TransportError)s and, through the pipeline,
/// failure events.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The base URL does not parse
    #[error("Invalid API base URL '{url}': {reason}")]
    InvalidUrl {
        /// URL as given
        url: String,
        /// Parser message
        reason: String,
    },

    /// The base URL cannot have path segments appended (e.g. `mailto:`)
    #[error("API base URL '{0}' cannot be used as a base")]
    CannotBeABase(String),

    /// The HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}
