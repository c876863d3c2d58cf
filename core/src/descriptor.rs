//! Action descriptors
//!
//! An [`ActionDescriptor`] is the value a call site hands to the dispatcher to
//! say "perform this call and tell everyone how it went". It is pure data:
//! building one never fails, never performs I/O and never looks at state.
//!
//! Values entering the dispatcher are wrapped in [`Dispatch`]: either an
//! ordinary action, passed through untouched, or a descriptor, turned into
//! lifecycle events by the pipeline.

use crate::lifecycle::LifecycleTypes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Configuration errors in descriptors or in the tag namespace
///
/// These indicate a programming mistake in a builder or in pipeline wiring.
/// They are raised synchronously at dispatch time and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// `types` is present but is not an array
    #[error("Expected an array of three string types")]
    NotAnArray,

    /// `types` does not have exactly three entries
    #[error("Expected an array of three string types, found {found} entries")]
    WrongArity {
        /// Number of entries found
        found: usize,
    },

    /// An entry of `types` is not a string
    #[error("Expected an array of three string types, entry {index} is not a string")]
    NotAString {
        /// Position of the offending entry
        index: usize,
    },

    /// An entry of `types` is the empty string
    #[error("Lifecycle tag {index} is empty")]
    EmptyTag {
        /// Position of the offending entry
        index: usize,
    },

    /// The same tag appears twice in one triple
    #[error("Lifecycle tag '{tag}' appears more than once")]
    DuplicateTag {
        /// The repeated tag
        tag: String,
    },

    /// The same tag is owned by two different resources
    #[error("Lifecycle tag '{tag}' is used by both '{first}' and '{second}'")]
    TagCollision {
        /// The shared tag
        tag: String,
        /// Resource that registered the tag first
        first: String,
        /// Resource that tried to reuse it
        second: String,
    },

    /// `method` is missing or not one of the known methods
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// `resource` is missing, empty or not a string
    #[error("Descriptor is missing a resource")]
    MissingResource,
}

/// Intent of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Method {
    /// Read
    Get,
    /// Write
    Post,
}

impl Method {
    /// Lowercase name, as used on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            _ => Err(DescriptorError::UnknownMethod(s.to_string())),
        }
    }
}

/// Flat identifier of the entity a call acts on (e.g. `package`)
///
/// The transport owns the mapping from resource to endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Cow<'static, str>);

impl Resource {
    /// A single package
    pub const PACKAGE: Self = Self::from_static("package");
    /// Package search
    pub const PACKAGES: Self = Self::from_static("packages");
    /// Account registration
    pub const REGISTER: Self = Self::from_static("register");
    /// Sign in
    pub const LOGIN: Self = Self::from_static("login");
    /// Password change
    pub const PASSWORD: Self = Self::from_static("password");
    /// Email change
    pub const EMAIL: Self = Self::from_static("email");
    /// Account profile
    pub const PROFILE: Self = Self::from_static("profile");
    /// Package subscriptions
    pub const SUBSCRIPTION: Self = Self::from_static("subscription");
    /// API tokens
    pub const TOKENS: Self = Self::from_static("tokens");

    /// Resource from a static name
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Resource from any string
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pure function of current state; `true` means the call is already satisfied
pub type CachePredicate<S> = Arc<dyn Fn(&S) -> bool + Send + Sync>;

/// Immutable description of an API call and the tags to emit for it
///
/// Built by intent builders (see [`intent`](crate::intent)) or by hand with
/// [`ActionDescriptor::new`]. The dispatcher reads it and never mutates it.
pub struct ActionDescriptor<S> {
    types: LifecycleTypes,
    resource: Resource,
    method: Method,
    payload: Value,
    cache: Option<CachePredicate<S>>,
    cancellation: Option<CancellationToken>,
}

impl<S> ActionDescriptor<S> {
    /// Descriptor with an empty payload and no cache predicate
    #[must_use]
    pub const fn new(types: LifecycleTypes, resource: Resource, method: Method) -> Self {
        Self {
            types,
            resource,
            method,
            payload: Value::Null,
            cache: None,
            cancellation: None,
        }
    }

    /// Attach the caller-defined payload
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Skip the call entirely whenever `predicate(state)` holds
    #[must_use]
    pub fn with_cache<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        self.cache = Some(Arc::new(predicate));
        self
    }

    /// Suppress the terminal event once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// The lifecycle tags
    #[must_use]
    pub const fn types(&self) -> &LifecycleTypes {
        &self.types
    }

    /// The resource acted upon
    #[must_use]
    pub const fn resource(&self) -> &Resource {
        &self.resource
    }

    /// The method
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The payload forwarded to the transport
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Whether a cache predicate is attached
    #[must_use]
    pub const fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Evaluate the cache predicate; `false` when none is attached
    #[must_use]
    pub fn is_cached(&self, state: &S) -> bool {
        self.cache.as_ref().is_some_and(|predicate| predicate(state))
    }

    /// The cancellation token, if one was attached
    #[must_use]
    pub const fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Parse a descriptor from its JSON shape
    ///
    /// Expects `{ "types": [..3 tags..], "method": "get", "resource": "package", "payload": ... }`.
    /// `payload` defaults to null. A JSON descriptor never carries a cache predicate.
    ///
    /// # Errors
    ///
    /// Any [`DescriptorError`] raised while validating `types`, `method` or `resource`.
    pub fn from_json(value: &Value) -> Result<Self, DescriptorError> {
        let types = LifecycleTypes::from_json(value.get("types").unwrap_or(&Value::Null))?;

        let method = match value.get("method") {
            Some(Value::String(method)) => method.parse()?,
            Some(other) => return Err(DescriptorError::UnknownMethod(other.to_string())),
            None => return Err(DescriptorError::UnknownMethod(String::new())),
        };

        let resource = match value.get("resource") {
            Some(Value::String(resource)) if !resource.is_empty() => Resource::new(resource.clone()),
            _ => return Err(DescriptorError::MissingResource),
        };

        let payload = value.get("payload").cloned().unwrap_or(Value::Null);

        Ok(Self::new(types, resource, method).with_payload(payload))
    }
}

impl<S> Clone for ActionDescriptor<S> {
    fn clone(&self) -> Self {
        Self {
            types: self.types.clone(),
            resource: self.resource.clone(),
            method: self.method,
            payload: self.payload.clone(),
            cache: self.cache.clone(),
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<S> fmt::Debug for ActionDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDescriptor")
            .field("types", &self.types)
            .field("resource", &self.resource)
            .field("method", &self.method)
            .field("payload", &self.payload)
            .field("cache", &self.cache.as_ref().map(|_| "<predicate>"))
            .field("cancellable", &self.cancellation.is_some())
            .finish()
    }
}

/// A value submitted to the dispatcher
pub enum Dispatch<S, A> {
    /// Ordinary action; forwarded unchanged to the next handler
    Action(A),
    /// API call; turned into lifecycle events
    Call(ActionDescriptor<S>),
}

impl<S, A> Dispatch<S, A> {
    /// Whether this is an API call descriptor
    #[must_use]
    pub const fn is_call(&self) -> bool {
        matches!(self, Self::Call(_))
    }
}

impl<S, A: DeserializeOwned> Dispatch<S, A> {
    /// Classify a dynamically shaped value
    ///
    /// An object whose `types` key holds a truthy value is a descriptor and is
    /// validated as one. A missing `types`, or one that is `null`, `false`,
    /// `0` or `""`, marks an ordinary action, which must deserialize into `A`.
    ///
    /// # Errors
    ///
    /// - [`DispatchJsonError::Descriptor`] when `types` is present but the descriptor is malformed
    /// - [`DispatchJsonError::Action`] when the value is not a valid `A`
    pub fn from_json(value: Value) -> Result<Self, DispatchJsonError> {
        if value.get("types").is_some_and(is_truthy) {
            return Ok(Self::Call(ActionDescriptor::from_json(&value)?));
        }
        serde_json::from_value(value)
            .map(Self::Action)
            .map_err(|e| DispatchJsonError::Action(e.to_string()))
    }
}

/// JavaScript truthiness, as clients sending these objects understand it
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl<S, A> From<ActionDescriptor<S>> for Dispatch<S, A> {
    fn from(descriptor: ActionDescriptor<S>) -> Self {
        Self::Call(descriptor)
    }
}

impl<S, A: fmt::Debug> fmt::Debug for Dispatch<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(action) => f.debug_tuple("Dispatch::Action").field(action).finish(),
            Self::Call(descriptor) => f.debug_tuple("Dispatch::Call").field(descriptor).finish(),
        }
    }
}

/// Errors classifying a JSON value with [`Dispatch::from_json`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchJsonError {
    /// The value carries `types` but is not a valid descriptor
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// The value is neither a descriptor nor a valid ordinary action
    #[error("Not a valid action: {0}")]
    Action(String),
}
