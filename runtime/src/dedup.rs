//! In-flight deduplication
//!
//! Opt-in (see [`DedupStrategy`](crate::config::DedupStrategy)). When enabled,
//! the pipeline claims a [`FlightKey`] before emitting the request event and
//! releases it when the flight finishes, however it finishes. A dispatch whose
//! key is already claimed emits nothing.

use gophr_core::{ActionDescriptor, Method, Resource};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Identity of a call: method, resource and canonical payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlightKey {
    method: Method,
    resource: Resource,
    payload: String,
}

impl FlightKey {
    /// Key of `descriptor`
    #[must_use]
    pub fn of<S>(descriptor: &ActionDescriptor<S>) -> Self {
        Self {
            method: descriptor.method(),
            resource: descriptor.resource().clone(),
            payload: descriptor.payload().to_string(),
        }
    }

    /// Resource part of the key
    #[must_use]
    pub const fn resource(&self) -> &Resource {
        &self.resource
    }
}

/// Set of keys currently in flight
#[derive(Debug, Clone, Default)]
pub struct InFlightTable {
    keys: Arc<Mutex<HashSet<FlightKey>>>,
}

impl InFlightTable {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`; `None` if it is already in flight
    #[must_use]
    pub fn try_claim(&self, key: FlightKey) -> Option<FlightGuard> {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if keys.insert(key.clone()) {
            Some(FlightGuard {
                keys: Arc::clone(&self.keys),
                key,
            })
        } else {
            None
        }
    }

    /// Whether `key` is in flight
    #[must_use]
    pub fn contains(&self, key: &FlightKey) -> bool {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Number of keys in flight
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is in flight
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases its key on drop
///
/// Held by the flight future, so the key is released on success, failure,
/// cancellation or when the flight is dropped unpolled.
#[derive(Debug)]
pub struct FlightGuard {
    keys: Arc<Mutex<HashSet<FlightKey>>>,
    key: FlightKey,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
