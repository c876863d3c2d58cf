//! # Gophr Testing
//!
//! Testing utilities and helpers for gophr.
//!
//! This crate provides:
//! - `MockTransport`: scripted per-resource responses, a call log, and gates
//!   for resolving calls in any order
//! - `FixedClock`: deterministic event timestamps
//! - `EventRecorder`: collects emitted actions
//! - `PipelineTest` / `ReducerTest`: fluent Given-When-Then harnesses
//! - proptest strategies for tags and descriptors
//!
//! ## Example
//!
//! ```ignore
//! use gophr_testing::{MockTransport, test_clock};
//! use gophr_runtime::{DispatchPipeline, Store};
//!
//! #[tokio::test]
//! async fn loads_a_package() {
//!     let transport = MockTransport::new();
//!     transport.succeed(Resource::PACKAGE, json!({ "name": "foo" }));
//!
//!     let pipeline = DispatchPipeline::new().with_transport(transport.clone()).with_clock(test_clock());
//!     let store = Store::with_pipeline(SiteState::default(), SiteReducer, env, pipeline);
//!
//!     let mut receipt = store.dispatch(intent::get_package("foo").into()).await?;
//!     receipt.handle.wait().await;
//!     assert!(store.state(|s| s.packages.contains_key("foo")).await);
//! }
//! ```

use chrono::{DateTime, Utc};
use gophr_core::environment::Clock;


pub use pipeline_test::{Observed, PipelineTest, Probe};
pub use reducer_test::{assertions, ReducerTest};

/// Mock implementations of injected capabilities
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use futures::FutureExt;
    use gophr_core::{Method, Resource, Transport, TransportError, TransportFuture};
    use serde_json::Value;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use gophr_testing::mocks::FixedClock;
    /// use gophr_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::days(20_089))
    }

    /// One call the transport received
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedCall {
        /// HTTP method
        pub method: Method,
        /// Target resource
        pub resource: Resource,
        /// Payload as sent
        pub payload: Value,
    }

    type Outcome = Result<Value, TransportError>;

    enum Scripted {
        Ready(Outcome),
        Delayed(Duration, Outcome),
        Gated(oneshot::Receiver<Outcome>),
    }

    #[derive(Default)]
    struct MockState {
        scripts: HashMap<Resource, VecDeque<Scripted>>,
        calls: Vec<RecordedCall>,
    }

    /// Scripted in-memory transport
    ///
    /// Responses are queued per resource and consumed in order, one per call.
    /// A call with nothing queued fails with `Status { status: 501, .. }`.
    ///
    /// Clones share the same script and call log.
    ///
    /// # Example
    ///
    /// ```
    /// use gophr_testing::MockTransport;
    /// use gophr_core::{Method, Resource, Transport, TransportError};
    /// use serde_json::json;
    ///
    /// # tokio_test::block_on(async {
    /// let transport = MockTransport::new();
    /// transport.succeed(Resource::TOKENS, json!(["t1"]));
    ///
    /// let value = transport.call(Method::Get, &Resource::TOKENS, &json!(null)).await;
    /// assert_eq!(value, Ok(json!(["t1"])));
    /// assert_eq!(transport.call_count(), 1);
    /// # });
    /// ```
    #[derive(Clone, Default)]
    pub struct MockTransport {
        inner: Arc<Mutex<MockState>>,
    }

    impl MockTransport {
        /// Transport with nothing scripted
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn push(&self, resource: Resource, scripted: Scripted) {
            self.lock().scripts.entry(resource).or_default().push_back(scripted);
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Queue a response for the next call to `resource`
        pub fn respond(&self, resource: Resource, outcome: Result<Value, TransportError>) -> &Self {
            self.push(resource, Scripted::Ready(outcome));
            self
        }

        /// Queue a success
        pub fn succeed(&self, resource: Resource, value: Value) -> &Self {
            self.respond(resource, Ok(value))
        }

        /// Queue a failure
        pub fn fail(&self, resource: Resource, error: TransportError) -> &Self {
            self.respond(resource, Err(error))
        }

        /// Queue a response delivered after `delay`
        pub fn delayed(&self, resource: Resource, delay: Duration, outcome: Result<Value, TransportError>) -> &Self {
            self.push(resource, Scripted::Delayed(delay, outcome));
            self
        }

        /// Queue a response resolved by hand through the returned [`Gate`]
        #[must_use]
        pub fn gate(&self, resource: Resource) -> Gate {
            let (tx, rx) = oneshot::channel();
            self.push(resource, Scripted::Gated(rx));
            Gate { tx }
        }

        /// Every call received so far, in order
        #[must_use]
        pub fn calls(&self) -> Vec<RecordedCall> {
            self.lock().calls.clone()
        }

        /// Calls received for `resource`
        #[must_use]
        pub fn calls_to(&self, resource: &Resource) -> Vec<RecordedCall> {
            self.lock()
                .calls
                .iter()
                .filter(|call| &call.resource == resource)
                .cloned()
                .collect()
        }

        /// Number of calls received
        #[must_use]
        pub fn call_count(&self) -> usize {
            self.lock().calls.len()
        }
    }

    impl Transport for MockTransport {
        fn call(&self, method: Method, resource: &Resource, payload: &Value) -> TransportFuture<'_> {
            let scripted = {
                let mut state = self.lock();
                state.calls.push(RecordedCall {
                    method,
                    resource: resource.clone(),
                    payload: payload.clone(),
                });
                state.scripts.get_mut(resource).and_then(VecDeque::pop_front)
            };
            let resource = resource.clone();

            async move {
                match scripted {
                    Some(Scripted::Ready(outcome)) => outcome,
                    Some(Scripted::Delayed(delay, outcome)) => {
                        tokio::time::sleep(delay).await;
                        outcome
                    },
                    Some(Scripted::Gated(rx)) => rx
                        .await
                        .unwrap_or_else(|_| Err(TransportError::Network("gate dropped".to_string()))),
                    None => Err(TransportError::Status {
                        status: 501,
                        message: format!("no scripted response for {resource}"),
                    }),
                }
            }
            .boxed()
        }
    }

    impl std::fmt::Debug for MockTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockTransport")
                .field("calls", &self.call_count())
                .finish_non_exhaustive()
        }
    }

    /// Hand-resolved response for a gated call
    #[derive(Debug)]
    pub struct Gate {
        tx: oneshot::Sender<Result<Value, TransportError>>,
    }

    impl Gate {
        /// Resolve the call with `value`
        pub fn resolve(self, value: Value) {
            let _ = self.tx.send(Ok(value));
        }

        /// Reject the call with `error`
        pub fn reject(self, error: TransportError) {
            let _ = self.tx.send(Err(error));
        }
    }
}

/// Recording of emitted actions
pub mod recorder {
    use std::sync::{Arc, Mutex, PoisonError};
    use tokio::sync::broadcast;
    use tokio::task::JoinHandle;

    /// Collects actions, from a `next` callback or a store subscription
    ///
    /// # Example
    ///
    /// ```
    /// use gophr_testing::EventRecorder;
    ///
    /// let recorder = EventRecorder::new();
    /// let mut sink = recorder.sink();
    /// sink("a");
    /// sink("b");
    /// assert_eq!(recorder.snapshot(), vec!["a", "b"]);
    /// ```
    #[derive(Debug)]
    pub struct EventRecorder<A> {
        seen: Arc<Mutex<Vec<A>>>,
    }

    impl<A> Clone for EventRecorder<A> {
        fn clone(&self) -> Self {
            Self {
                seen: Arc::clone(&self.seen),
            }
        }
    }

    impl<A> Default for EventRecorder<A> {
        fn default() -> Self {
            Self {
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl<A: Clone> EventRecorder<A> {
        /// Empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Record one action
        pub fn push(&self, action: A) {
            self.seen.lock().unwrap_or_else(PoisonError::into_inner).push(action);
        }

        /// Callback recording every action it is given
        pub fn sink(&self) -> impl FnMut(A) + Send + 'static
        where
            A: Send + 'static,
        {
            let recorder = self.clone();
            move |action| recorder.push(action)
        }

        /// Record everything arriving on `rx` until the channel closes
        pub fn follow(&self, mut rx: broadcast::Receiver<A>) -> JoinHandle<()>
        where
            A: Send + 'static,
        {
            let recorder = self.clone();
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(action) => recorder.push(action),
                        Err(broadcast::error::RecvError::Lagged(_)) => {},
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        }

        /// Everything recorded so far
        #[must_use]
        pub fn snapshot(&self) -> Vec<A> {
            self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        /// Number of recorded actions
        #[must_use]
        pub fn len(&self) -> usize {
            self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
        }

        /// Whether nothing was recorded
        #[must_use]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }
}

/// Property-based testing strategies
pub mod properties {
    use gophr_core::{ActionDescriptor, LifecycleTypes, Method, Resource};
    use proptest::prelude::*;

    /// Upper-snake tag such as `GET_PACKAGE_REQUEST`
    pub fn arb_tag() -> impl Strategy<Value = String> {
        "[A-Z][A-Z_]{0,24}"
    }

    /// Three pairwise distinct tags
    pub fn arb_lifecycle_types() -> impl Strategy<Value = LifecycleTypes> {
        (arb_tag(), arb_tag(), arb_tag())
            .prop_filter("tags must be distinct", |(a, b, c)| a != b && b != c && a != c)
            .prop_filter_map("valid triple", |(a, b, c)| LifecycleTypes::new(a, b, c).ok())
    }

    /// Descriptor with a random triple, resource, method and small payload
    pub fn arb_descriptor<S: 'static>() -> impl Strategy<Value = ActionDescriptor<S>> {
        (
            arb_lifecycle_types(),
            "[a-z]{1,12}",
            prop_oneof![Just(Method::Get), Just(Method::Post)],
            proptest::option::of("[a-z0-9/]{1,16}"),
        )
            .prop_map(|(types, resource, method, name)| {
                let descriptor = ActionDescriptor::new(types, Resource::new(resource), method);
                match name {
                    Some(name) => descriptor.with_payload(serde_json::json!({ "name": name })),
                    None => descriptor,
                }
            })
    }
}

/// Install a test-friendly tracing subscriber (idempotent)
///
/// Honours `RUST_LOG`; output goes through the test harness capture.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub use mocks::{test_clock, FixedClock, Gate, MockTransport, RecordedCall};
pub use recorder::EventRecorder;
