//! The dispatch pipeline
//!
//! The only component that turns an [`ActionDescriptor`] into observable
//! lifecycle events. It sits in the dispatcher's handler chain:
//!
//! ```text
//! Dispatch::Action(a) ──────────────────────────────► next(a)
//!
//! Dispatch::Call(d) ─► registry check ─► transport present?
//!                         │ (config error)   │ (config error)
//!                         ▼                  ▼
//!                  cache predicate hit? ── yes ─► SATISFIED (no events)
//!                         │ no
//!                  identical call in flight? ── yes ─► DEDUPLICATED (no events, opt-in)
//!                         │ no
//!                  next(request event)          ◄── synchronous
//!                         │
//!                  Flight ─► transport.call ─► next(success | failure)
//! ```
//!
//! Configuration errors come back synchronously from [`DispatchPipeline::intercept`]
//! before anything is emitted. Transport failures never do: they become the
//! payload of the failure event.

use crate::config::{DedupStrategy, PipelineConfig};
use crate::dedup::{FlightGuard, FlightKey, InFlightTable};
use crate::error::DispatchError;
use crate::metrics::DispatchMetrics;
use futures::future::{BoxFuture, FutureExt};
use gophr_core::effect::Effect;
use gophr_core::environment::{Clock, SystemClock};
use gophr_core::{
    ActionDescriptor, CancellationToken, Dispatch, DispatchId, EventMeta, EventPayload, LifecycleEvent,
    Method, Resource, TagRegistry, Transport, TransportError,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

/// Result of intercepting one dispatched value
#[must_use = "the terminal event is only produced when the flight is driven"]
pub enum Intercepted<O, A> {
    /// Ordinary action, forwarded; carries what the next handler returned
    Forwarded(O),
    /// The cache predicate held; nothing was emitted and the transport was not called
    Satisfied,
    /// An identical call is already in flight; nothing was emitted
    Deduplicated,
    /// The request event was emitted; `flight` yields the terminal event
    Requested {
        /// What the next handler returned for the request event
        output: O,
        /// The pending transport call
        flight: Flight<A>,
    },
}

impl<O, A> Intercepted<O, A> {
    /// Whether anything was emitted or forwarded
    #[must_use]
    pub const fn emitted(&self) -> bool {
        matches!(self, Self::Forwarded(_) | Self::Requested { .. })
    }
}

impl<O: fmt::Debug, A> fmt::Debug for Intercepted<O, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forwarded(output) => f.debug_tuple("Forwarded").field(output).finish(),
            Self::Satisfied => f.write_str("Satisfied"),
            Self::Deduplicated => f.write_str("Deduplicated"),
            Self::Requested { output, flight } => f
                .debug_struct("Requested")
                .field("output", output)
                .field("flight", flight)
                .finish(),
        }
    }
}

/// A transport call whose request event has been emitted
///
/// Lazy: the transport is only invoked when the flight is first polled.
/// Resolves to the terminal event, or `None` if the descriptor's cancellation
/// token fired before the call completed.
#[must_use = "the terminal event is only produced when the flight is driven"]
pub struct Flight<A> {
    id: DispatchId,
    future: BoxFuture<'static, Option<A>>,
}

impl<A> Flight<A> {
    /// Dispatch id shared by the request and terminal events
    #[must_use]
    pub const fn id(&self) -> DispatchId {
        self.id
    }

    /// Run this flight as a store effect; its output is fed back to the reducer
    #[must_use]
    pub fn into_effect(self) -> Effect<A> {
        Effect::Future(self.future)
    }
}

impl<A> Future for Flight<A> {
    type Output = Option<A>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.future.poll_unpin(cx)
    }
}

impl<A> fmt::Debug for Flight<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flight").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Middleware turning action descriptors into lifecycle events
///
/// # Example
///
/// ```ignore
/// let pipeline = DispatchPipeline::new()
///     .with_transport(HttpTransport::new("http://localhost:3000/api/v0")?)
///     .with_registry(TagRegistry::from_intents(&Intent::ALL)?);
///
/// let mut events = Vec::new();
/// let outcome = pipeline.intercept(intent::get_package("foo").into(), &state, |e| events.push(e))?;
/// if let Intercepted::Requested { flight, .. } = outcome {
///     events.extend(flight.await);
/// }
/// ```
#[derive(Clone)]
pub struct DispatchPipeline {
    transport: Option<Arc<dyn Transport>>,
    registry: Option<Arc<TagRegistry>>,
    config: PipelineConfig,
    clock: Arc<dyn Clock>,
    in_flight: InFlightTable,
    next_id: Arc<AtomicU64>,
}

impl DispatchPipeline {
    /// Pipeline with no transport, no registry and default configuration
    ///
    /// Ordinary actions pass through; any descriptor is a configuration error
    /// until a transport is installed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transport: None,
            registry: None,
            config: PipelineConfig::default(),
            clock: Arc::new(SystemClock),
            in_flight: InFlightTable::new(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Install the transport
    #[must_use]
    pub fn with_transport<T>(self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.with_shared_transport(Arc::new(transport))
    }

    /// Install a shared transport
    #[must_use]
    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Reject descriptors whose tags belong to another resource
    #[must_use]
    pub fn with_registry(mut self, registry: TagRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    /// Replace the configuration
    #[must_use]
    pub const fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock stamping emitted events
    #[must_use]
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Current configuration
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Whether a transport is installed
    #[must_use]
    pub const fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    /// Keys of calls currently in flight (only populated with [`DedupStrategy::InFlight`])
    #[must_use]
    pub const fn in_flight(&self) -> &InFlightTable {
        &self.in_flight
    }

    /// Intercept one dispatched value
    ///
    /// Ordinary actions go straight to `next`. Descriptors are validated, checked
    /// against `state` with their cache predicate, and then produce a request event
    /// through `next` plus a [`Flight`] for the terminal event.
    ///
    /// `next` is called at most once.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Descriptor`] if the registry rejects the descriptor's tags
    /// - [`DispatchError::MissingTransport`] if no transport is installed
    ///
    /// In both cases nothing has been emitted.
    pub fn intercept<S, A, N, O>(
        &self,
        value: Dispatch<S, A>,
        state: &S,
        next: N,
    ) -> Result<Intercepted<O, A>, DispatchError>
    where
        N: FnOnce(A) -> O,
        A: From<LifecycleEvent> + Send + 'static,
    {
        match value {
            Dispatch::Action(action) => {
                tracing::trace!("Passing ordinary action through");
                DispatchMetrics::record_passthrough();
                Ok(Intercepted::Forwarded(next(action)))
            },
            Dispatch::Call(descriptor) => self.admit(descriptor, state, next),
        }
    }

    /// Intercept a dynamically shaped value
    ///
    /// See [`Dispatch::from_json`] for how the value is classified.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Descriptor`] for a malformed descriptor (e.g. a `types`
    ///   array that is short, repeats a tag or holds a non-string)
    /// - [`DispatchError::MalformedAction`] for a value that is not a valid `A`
    /// - anything [`DispatchPipeline::intercept`] returns
    pub fn intercept_json<S, A, N, O>(
        &self,
        value: Value,
        state: &S,
        next: N,
    ) -> Result<Intercepted<O, A>, DispatchError>
    where
        N: FnOnce(A) -> O,
        A: From<LifecycleEvent> + DeserializeOwned + Send + 'static,
    {
        let dispatch = Dispatch::from_json(value).map_err(|e| {
            let error = DispatchError::from(e);
            tracing::error!(error = %error, "Rejected malformed dispatch");
            DispatchMetrics::record_config_error();
            error
        })?;
        self.intercept(dispatch, state, next)
    }

    fn admit<S, A, N, O>(
        &self,
        descriptor: ActionDescriptor<S>,
        state: &S,
        next: N,
    ) -> Result<Intercepted<O, A>, DispatchError>
    where
        N: FnOnce(A) -> O,
        A: From<LifecycleEvent> + Send + 'static,
    {
        let resource = descriptor.resource().clone();
        let method = descriptor.method();

        if let Some(registry) = &self.registry {
            if let Err(e) = registry.check(&descriptor) {
                tracing::error!(%resource, error = %e, "Descriptor rejected by tag registry");
                DispatchMetrics::record_config_error();
                return Err(e.into());
            }
        }

        let Some(transport) = self.transport.clone() else {
            tracing::error!(%resource, "Descriptor dispatched without a transport");
            DispatchMetrics::record_config_error();
            return Err(DispatchError::MissingTransport {
                resource: resource.to_string(),
            });
        };

        if descriptor.is_cached(state) {
            tracing::debug!(%resource, %method, "Cache predicate satisfied, skipping call");
            DispatchMetrics::record_cache_hit();
            return Ok(Intercepted::Satisfied);
        }

        let guard = match self.config.dedup {
            DedupStrategy::Disabled => None,
            DedupStrategy::InFlight => {
                if let Some(guard) = self.in_flight.try_claim(FlightKey::of(&descriptor)) {
                    Some(guard)
                } else {
                    tracing::debug!(%resource, %method, "Identical call in flight, dropping dispatch");
                    DispatchMetrics::record_deduplicated();
                    return Ok(Intercepted::Deduplicated);
                }
            },
        };

        let id = DispatchId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let types = descriptor.types().clone();

        let request = LifecycleEvent::new(
            types.request().clone(),
            EventPayload::Request(descriptor.payload().clone()),
            self.meta(id, &resource, method),
        );
        tracing::debug!(
            dispatch_id = %id,
            %resource,
            %method,
            action_type = %types.request(),
            "Emitting request event"
        );
        DispatchMetrics::record_request();
        let output = next(A::from(request));

        let call = Call {
            id,
            types,
            resource,
            method,
            payload: descriptor.payload().clone(),
            cancellation: descriptor.cancellation().cloned(),
            guard,
        };
        let future = call.run(transport, Arc::clone(&self.clock), self.config.transport_timeout);

        Ok(Intercepted::Requested {
            output,
            flight: Flight {
                id,
                future: future.boxed(),
            },
        })
    }

    fn meta(&self, dispatch_id: DispatchId, resource: &Resource, method: Method) -> EventMeta {
        EventMeta {
            dispatch_id,
            resource: resource.clone(),
            method,
            emitted_at: self.clock.now(),
        }
    }
}

impl Default for DispatchPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DispatchPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchPipeline")
            .field("has_transport", &self.transport.is_some())
            .field("has_registry", &self.registry.is_some())
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

/// Everything a flight needs once the descriptor itself is gone
struct Call {
    id: DispatchId,
    types: gophr_core::LifecycleTypes,
    resource: Resource,
    method: Method,
    payload: Value,
    cancellation: Option<CancellationToken>,
    guard: Option<FlightGuard>,
}

impl Call {
    async fn run<A>(
        self,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        timeout: Option<std::time::Duration>,
    ) -> Option<A>
    where
        A: From<LifecycleEvent>,
    {
        let Self {
            id,
            types,
            resource,
            method,
            payload,
            cancellation,
            guard,
        } = self;
        // Released when the flight ends, whatever the outcome.
        let _guard = guard;

        let started = Instant::now();
        let call = transport.call(method, &resource, &payload);
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                Err(TransportError::Timeout {
                    after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })
            }),
            None => call.await,
        };
        DispatchMetrics::record_transport_duration(started.elapsed());

        if cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            tracing::debug!(dispatch_id = %id, %resource, "Call cancelled, suppressing terminal event");
            DispatchMetrics::record_cancelled();
            return None;
        }

        let (action_type, payload) = match result {
            Ok(value) => {
                tracing::debug!(dispatch_id = %id, %resource, %method, "Transport resolved");
                DispatchMetrics::record_success();
                (types.success().clone(), EventPayload::Success(value))
            },
            Err(error) => {
                tracing::warn!(
                    dispatch_id = %id,
                    %resource,
                    %method,
                    kind = error.kind(),
                    error = %error,
                    "Transport rejected"
                );
                DispatchMetrics::record_failure();
                (types.failure().clone(), EventPayload::Failure(error))
            },
        };

        let meta = EventMeta {
            dispatch_id: id,
            resource,
            method,
            emitted_at: clock.now(),
        };
        Some(A::from(LifecycleEvent::new(action_type, payload, meta)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use gophr_core::{intent, DescriptorError, Intent, LifecycleTypes, Phase};
    use gophr_testing::{test_clock, MockTransport};
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(tag = "type")]
    enum TestAction {
        #[serde(rename = "PING")]
        Ping,
        #[serde(skip)]
        Lifecycle(LifecycleEvent),
    }

    impl From<LifecycleEvent> for TestAction {
        fn from(event: LifecycleEvent) -> Self {
            Self::Lifecycle(event)
        }
    }

    fn lifecycle(action: &TestAction) -> &LifecycleEvent {
        match action {
            TestAction::Lifecycle(event) => event,
            TestAction::Ping => panic!("expected a lifecycle event, got Ping"),
        }
    }

    fn package_call() -> Dispatch<Vec<String>, TestAction> {
        Dispatch::Call(ActionDescriptor::new(
            LifecycleTypes::new("REQ", "OK", "ERR").unwrap(),
            Resource::PACKAGE,
            Method::Get,
        )
        .with_payload(json!({ "name": "foo" })))
    }

    fn pipeline(transport: &MockTransport) -> DispatchPipeline {
        DispatchPipeline::new()
            .with_transport(transport.clone())
            .with_clock(test_clock())
    }

    #[tokio::test]
    async fn ordinary_actions_pass_through_untouched() {
        let transport = MockTransport::new();
        let mut seen = Vec::new();

        let outcome = pipeline(&transport)
            .intercept(Dispatch::<(), _>::Action(TestAction::Ping), &(), |a| {
                seen.push(a);
                42
            })
            .unwrap();

        assert!(matches!(outcome, Intercepted::Forwarded(42)));
        assert_eq!(seen, vec![TestAction::Ping]);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn request_then_success() {
        let transport = MockTransport::new();
        transport.succeed(Resource::PACKAGE, json!({ "id": 1, "name": "foo" }));
        let mut events = Vec::new();

        let outcome = pipeline(&transport)
            .intercept(package_call(), &Vec::new(), |a| events.push(a))
            .unwrap();
        let Intercepted::Requested { flight, .. } = outcome else {
            panic!("expected a request");
        };

        assert_eq!(events.len(), 1);
        assert_eq!(transport.call_count(), 0, "transport runs only when the flight is polled");

        events.extend(flight.await);
        assert_eq!(events.len(), 2);

        let request = lifecycle(&events[0]);
        let success = lifecycle(&events[1]);
        assert!(request.is("REQ"));
        assert_eq!(request.payload, EventPayload::Request(json!({ "name": "foo" })));
        assert!(success.is("OK"));
        assert_eq!(success.success(), Some(&json!({ "id": 1, "name": "foo" })));
        assert_eq!(request.meta.dispatch_id, success.meta.dispatch_id);
        assert_eq!(transport.calls()[0].payload, json!({ "name": "foo" }));
    }

    #[tokio::test]
    async fn request_then_failure() {
        let transport = MockTransport::new();
        let not_found = TransportError::NotFound { resource: "package/foo".into() };
        transport.fail(Resource::PACKAGE, not_found.clone());
        let mut events = Vec::new();

        let outcome = pipeline(&transport)
            .intercept(package_call(), &Vec::new(), |a| events.push(a))
            .unwrap();
        let Intercepted::Requested { flight, .. } = outcome else {
            panic!("expected a request");
        };
        events.extend(flight.await);

        let phases: Vec<Phase> = events.iter().map(|a| lifecycle(a).phase()).collect();
        assert_eq!(phases, vec![Phase::Request, Phase::Failure]);
        assert!(lifecycle(&events[1]).is("ERR"));
        assert_eq!(lifecycle(&events[1]).error(), Some(&not_found));
    }

    #[tokio::test]
    async fn cache_hit_emits_nothing() {
        let transport = MockTransport::new();
        let call = Dispatch::<Vec<String>, TestAction>::Call(
            intent::get_package("foo").with_cache(|loaded: &Vec<String>| loaded.iter().any(|n| n == "foo")),
        );
        let mut events: Vec<TestAction> = Vec::new();

        let outcome = pipeline(&transport)
            .intercept(call, &vec!["foo".to_string()], |a| events.push(a))
            .unwrap();

        assert!(matches!(outcome, Intercepted::Satisfied));
        assert!(!outcome.emitted());
        assert!(events.is_empty());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_transport_is_a_configuration_error() {
        let mut events: Vec<TestAction> = Vec::new();
        let err = DispatchPipeline::new()
            .intercept(package_call(), &Vec::new(), |a| events.push(a))
            .unwrap_err();

        assert_eq!(err, DispatchError::MissingTransport { resource: "package".into() });
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn malformed_json_triples_fail_before_any_event() {
        let transport = MockTransport::new();
        let pipeline = pipeline(&transport);

        for types in [json!(["REQ", "OK"]), json!(["REQ", "REQ", "ERR"]), json!(["REQ", 1, "ERR"])] {
            let mut events: Vec<TestAction> = Vec::new();
            let value = json!({ "types": types, "method": "get", "resource": "package" });
            let err = pipeline
                .intercept_json(value, &(), |a| events.push(a))
                .unwrap_err();
            assert!(matches!(err, DispatchError::Descriptor(_)), "{err}");
            assert!(events.is_empty());
        }
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn json_without_types_passes_through() {
        let transport = MockTransport::new();
        let mut events = Vec::new();
        let outcome = pipeline(&transport)
            .intercept_json(json!({ "type": "PING" }), &(), |a: TestAction| events.push(a))
            .unwrap();
        assert!(matches!(outcome, Intercepted::Forwarded(())));
        assert_eq!(events, vec![TestAction::Ping]);
    }

    #[tokio::test]
    async fn registry_rejects_borrowed_tags() {
        let transport = MockTransport::new();
        let pipeline = pipeline(&transport).with_registry(TagRegistry::from_intents(&Intent::ALL).unwrap());
        let borrowed = ActionDescriptor::<()>::new(Intent::Login.types(), Resource::REGISTER, Method::Post);
        let mut events: Vec<TestAction> = Vec::new();

        let err = pipeline
            .intercept(Dispatch::Call(borrowed), &(), |a| events.push(a))
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Descriptor(DescriptorError::TagCollision { .. })
        ));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn timeout_becomes_a_failure_event() {
        let transport = MockTransport::new();
        transport.delayed(Resource::PACKAGE, Duration::from_millis(200), Ok(json!({})));
        let pipeline = pipeline(&transport)
            .with_config(PipelineConfig::default().with_transport_timeout(Duration::from_millis(10)));

        let outcome = pipeline
            .intercept(package_call(), &Vec::new(), |_| ())
            .unwrap();
        let Intercepted::Requested { flight, .. } = outcome else {
            panic!("expected a request");
        };
        let terminal = flight.await.unwrap();

        assert_eq!(lifecycle(&terminal).error(), Some(&TransportError::Timeout { after_ms: 10 }));
    }

    #[tokio::test]
    async fn cancellation_suppresses_the_terminal_event() {
        let transport = MockTransport::new();
        let gate = transport.gate(Resource::PACKAGE);
        let token = CancellationToken::new();
        let call = Dispatch::<(), TestAction>::Call(intent::get_package("foo").with_cancellation(token.clone()));

        let outcome = pipeline(&transport).intercept(call, &(), |_| ()).unwrap();
        let Intercepted::Requested { flight, .. } = outcome else {
            panic!("expected a request");
        };
        let pending = tokio::spawn(flight);

        token.cancel();
        gate.resolve(json!({ "name": "foo" }));

        assert_eq!(pending.await.unwrap(), None);
        assert_eq!(transport.call_count(), 1, "the call itself is never retracted");
    }

    #[tokio::test]
    async fn in_flight_dedup_drops_identical_calls() {
        let transport = MockTransport::new();
        let gate = transport.gate(Resource::PACKAGE);
        let pipeline = pipeline(&transport)
            .with_config(PipelineConfig::default().with_dedup(DedupStrategy::InFlight));
        let mut events: Vec<TestAction> = Vec::new();

        let first = pipeline
            .intercept(Dispatch::<(), _>::Call(intent::get_package("foo")), &(), |a| events.push(a))
            .unwrap();
        let second = pipeline
            .intercept(Dispatch::<(), _>::Call(intent::get_package("foo")), &(), |a| events.push(a))
            .unwrap();
        assert!(matches!(second, Intercepted::Deduplicated));
        assert_eq!(events.len(), 1);

        let Intercepted::Requested { flight, .. } = first else {
            panic!("expected a request");
        };
        gate.resolve(json!({}));
        assert!(flight.await.is_some());
        assert!(pipeline.in_flight().is_empty());

        transport.succeed(Resource::PACKAGE, json!({}));
        let third = pipeline
            .intercept(Dispatch::<(), _>::Call(intent::get_package("foo")), &(), |a| events.push(a))
            .unwrap();
        assert!(matches!(third, Intercepted::Requested { .. }));
    }

    #[tokio::test]
    async fn dispatch_ids_are_distinct() {
        let transport = MockTransport::new();
        let pipeline = pipeline(&transport);
        let mut ids = Vec::new();
        for _ in 0..3 {
            if let Intercepted::Requested { flight, .. } = pipeline
                .intercept(Dispatch::<(), TestAction>::Call(intent::get_tokens()), &(), |_| ())
                .unwrap()
            {
                ids.push(flight.id());
            }
        }
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
