//! Transport contract
//!
//! The dispatch pipeline has no knowledge of HTTP, headers or serialization.
//! It delegates every call to an injected [`Transport`]; implementations live
//! outside this crate (`gophr-http` for production, `gophr-testing` for tests).

use crate::descriptor::{Method, Resource};
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

/// Outcome of a transport call
pub type TransportFuture<'a> = BoxFuture<'a, Result<Value, TransportError>>;

/// Transport failures
///
/// Opaque to the pipeline: whatever the variant, it becomes the payload of a
/// single failure event. Cloneable so reducers and observers can keep it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The resource does not exist
    #[error("Not found: {resource}")]
    NotFound {
        /// Resource (and key) that was requested
        resource: String,
    },

    /// The caller is not allowed to perform the call
    #[error("Unauthorized")]
    Unauthorized,

    /// Too many requests
    #[error("Rate limited")]
    RateLimited,

    /// Any other non-success response
    #[error("Request failed (status {status}): {message}")]
    Status {
        /// Response status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// The request never produced a response
    #[error("Network error: {0}")]
    Network(String),

    /// The response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The call exceeded the configured timeout
    #[error("Timed out after {after_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds
        after_ms: u64,
    },
}

impl TransportError {
    /// Stable snake-case label, used in logs, metrics and wire views
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate_limited",
            Self::Status { .. } => "status",
            Self::Network(_) => "network",
            Self::Decode(_) => "decode",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Capability performing the actual call for a descriptor
///
/// # Dyn Compatibility
///
/// Returns an explicit boxed future instead of using `async fn` so the
/// pipeline can hold an `Arc<dyn Transport>`.
///
/// # Example
///
/// ```
/// use gophr_core::transport::{Transport, TransportError, TransportFuture};
/// use gophr_core::descriptor::{Method, Resource};
/// use serde_json::{json, Value};
///
/// struct Echo;
///
/// impl Transport for Echo {
///     fn call(&self, _method: Method, resource: &Resource, payload: &Value) -> TransportFuture<'_> {
///         let body = json!({ "resource": resource.as_str(), "echo": payload });
///         Box::pin(async move { Ok(body) })
///     }
/// }
/// ```
pub trait Transport: Send + Sync {
    /// Perform `method` on `resource` with `payload`
    ///
    /// # Errors
    ///
    /// Any [`TransportError`]; the pipeline turns it into a failure event.
    fn call(&self, method: Method, resource: &Resource, payload: &Value) -> TransportFuture<'_>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn call(&self, method: Method, resource: &Resource, payload: &Value) -> TransportFuture<'_> {
        (**self).call(method, resource, payload)
    }
}
