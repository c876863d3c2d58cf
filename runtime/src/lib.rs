//! # Gophr Runtime
//!
//! Runtime side of the gophr dispatch architecture.
//!
//! This crate turns [`ActionDescriptor`](gophr_core::ActionDescriptor)s into
//! lifecycle events and coordinates reducer execution with effect handling.
//!
//! ## Core Components
//!
//! - **Dispatch pipeline**: Middleware that forwards ordinary actions, skips
//!   cached calls and turns descriptors into a request event plus a flight
//! - **Store**: Manages state, runs the reducer and executes effects, feeding
//!   their actions back (the terminal event of a call is one of them)
//! - **Dedup**: Optional in-flight table keyed by method, resource and payload
//!
//! ## Example
//!
//! ```ignore
//! use gophr_runtime::{DispatchPipeline, Store};
//! use gophr_core::intent;
//!
//! let pipeline = DispatchPipeline::new().with_transport(transport);
//! let store = Store::with_pipeline(SiteState::default(), SiteReducer, env, pipeline);
//!
//! let mut receipt = store.dispatch(intent::get_package("gorilla/mux").into()).await?;
//! receipt.handle.wait().await;
//!
//! let loaded = store.state(|s| s.packages.contains_key("gorilla/mux")).await;
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Runtime configuration
pub mod config;

/// In-flight deduplication
pub mod dedup;

/// Prometheus metrics for observability
pub mod metrics;

/// The dispatch pipeline middleware
pub mod pipeline;

/// The Store runtime
pub mod store;

/// Error types for the runtime
pub mod error {
    use gophr_core::{DescriptorError, DispatchJsonError};
    use thiserror::Error;

    /// A dispatch rejected before anything was emitted
    ///
    /// These are configuration errors. Transport failures never show up here;
    /// they are delivered as failure events.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum DispatchError {
        /// The descriptor is malformed or its tags belong to another resource
        #[error("Invalid action descriptor: {0}")]
        Descriptor(#[from] DescriptorError),

        /// A descriptor was dispatched but no transport is installed
        #[error("No transport configured for resource '{resource}'")]
        MissingTransport {
            /// Resource the descriptor targeted
            resource: String,
        },

        /// A dynamic value without `types` that is not a valid action
        #[error("Malformed action: {0}")]
        MalformedAction(String),
    }

    impl From<DispatchJsonError> for DispatchError {
        fn from(error: DispatchJsonError) -> Self {
            match error {
                DispatchJsonError::Descriptor(e) => Self::Descriptor(e),
                DispatchJsonError::Action(message) => Self::MalformedAction(message),
            }
        }
    }

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// The pipeline rejected a dispatch
        #[error(transparent)]
        Dispatch(#[from] DispatchError),

        /// A task join error occurred during parallel effect execution
        ///
        /// This typically means a spawned task panicked.
        #[error("Task failed during parallel execution: {0}")]
        TaskJoinError(#[from] tokio::task::JoinError),

        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for an action or for effects to complete
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use config::{DedupStrategy, PipelineConfig, StoreConfig};
pub use error::{DispatchError, StoreError};
pub use pipeline::{DispatchPipeline, Flight, Intercepted};
pub use store::{DispatchOutcome, DispatchReceipt, Store};

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] and inside a [`DispatchReceipt`]. For a dispatch
/// that emitted a request, waiting on the handle waits until the terminal
/// event has been reduced (or suppressed by cancellation).
///
/// # Example
///
/// ```ignore
/// let mut receipt = store.dispatch(intent::get_tokens().into()).await?;
/// receipt.handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };
        let tracking = EffectTracking {
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Number of effects still running
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Every tracker is gone; nothing can complete any more.
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires first.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: decrements the effect counter on drop, even if the effect panics
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Internal: decrements the store-wide pending counter on drop (shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gophr_core::DescriptorError;

    #[tokio::test]
    async fn untracked_handle_does_not_block() {
        let (mut handle, _tracking) = EffectHandle::new();
        assert_eq!(handle.pending(), 0);
        handle.wait_with_timeout(Duration::from_millis(10)).await.unwrap();
    }

    #[tokio::test]
    async fn handle_completes_when_guards_drop() {
        let (mut handle, tracking) = EffectHandle::new();
        tracking.increment();
        tracking.increment();
        let first = DecrementGuard(tracking.clone());
        let second = DecrementGuard(tracking);

        assert!(handle.wait_with_timeout(Duration::from_millis(10)).await.is_err());
        drop(first);
        assert_eq!(handle.pending(), 1);

        tokio::spawn(async move { drop(second) });
        handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
    }

    #[test]
    fn json_errors_map_to_dispatch_errors() {
        let e = DispatchError::from(gophr_core::DispatchJsonError::Descriptor(DescriptorError::NotAnArray));
        assert_eq!(e, DispatchError::Descriptor(DescriptorError::NotAnArray));

        let e = DispatchError::from(gophr_core::DispatchJsonError::Action("missing type".into()));
        assert_eq!(e, DispatchError::MalformedAction("missing type".into()));
    }
}
