//! The Store - event dispatcher and state reduction
//!
//! Every action that reaches the reducer (ordinary actions, request events and
//! terminal events alike) is broadcast to observers after it has been reduced.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::metrics::StoreMetrics;
use crate::pipeline::{DispatchPipeline, Intercepted};
use crate::{AtomicCounterGuard, DecrementGuard, EffectHandle, EffectTracking};
use gophr_core::effect::Effect;
use gophr_core::reducer::Reducer;
use gophr_core::{Dispatch, DispatchId, LifecycleEvent};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};

/// What a dispatch did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// An ordinary action was reduced
    Forwarded,
    /// The cache predicate held; nothing was emitted
    Satisfied,
    /// An identical call was in flight; nothing was emitted
    Deduplicated,
    /// The request event was reduced and the call is in flight
    Requested(DispatchId),
}

/// Returned by [`Store::dispatch`]
///
/// For [`DispatchOutcome::Requested`], `handle` completes once the terminal
/// event has been reduced.
#[derive(Debug)]
pub struct DispatchReceipt {
    /// What the dispatch did
    pub outcome: DispatchOutcome,
    /// Completion of the effects started by the dispatch
    pub handle: EffectHandle,
}

/// The Store - runtime coordinator for a reducer
///
/// The Store manages:
/// 1. State (behind `RwLock` for concurrent access)
/// 2. Reducer (business logic)
/// 3. Environment (injected dependencies)
/// 4. The dispatch pipeline in front of the reducer
/// 5. Effect execution (with feedback loop)
///
/// # Example
///
/// ```ignore
/// let store = Store::with_pipeline(
///     SiteState::default(),
///     SiteReducer,
///     SiteEnvironment::default(),
///     DispatchPipeline::new().with_transport(transport),
/// );
///
/// store.send(SiteAction::Logout).await?;
/// store.dispatch(intent::get_tokens().into()).await?;
/// ```
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: Arc<RwLock<S>>,
    reducer: R,
    environment: E,
    pipeline: DispatchPipeline,
    config: StoreConfig,
    shutdown: Arc<AtomicBool>,
    pending_effects: Arc<AtomicUsize>,
    action_broadcast: broadcast::Sender<A>,
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
    A: From<LifecycleEvent> + Clone + Send + Sync + 'static,
    S: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a store without a transport
    ///
    /// Ordinary actions work; dispatching a descriptor fails with
    /// [`DispatchError::MissingTransport`](crate::DispatchError::MissingTransport).
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_pipeline(initial_state, reducer, environment, DispatchPipeline::new())
    }

    /// Create a store with a configured pipeline
    #[must_use]
    pub fn with_pipeline(initial_state: S, reducer: R, environment: E, pipeline: DispatchPipeline) -> Self {
        Self::with_config(initial_state, reducer, environment, pipeline, StoreConfig::default())
    }

    /// Create a store with a configured pipeline and custom configuration
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = Store::with_config(
    ///     SiteState::default(),
    ///     SiteReducer,
    ///     env,
    ///     pipeline,
    ///     StoreConfig::default().with_broadcast_capacity(256),
    /// );
    /// ```
    #[must_use]
    pub fn with_config(
        initial_state: S,
        reducer: R,
        environment: E,
        pipeline: DispatchPipeline,
        config: StoreConfig,
    ) -> Self {
        let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

        Self {
            state: Arc::new(RwLock::new(initial_state)),
            reducer,
            environment,
            pipeline,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            pending_effects: Arc::new(AtomicUsize::new(0)),
            action_broadcast,
        }
    }

    /// The pipeline in front of the reducer
    #[must_use]
    pub const fn pipeline(&self) -> &DispatchPipeline {
        &self.pipeline
    }

    /// Send an ordinary action to the reducer
    ///
    /// 1. Acquires write lock on state
    /// 2. Calls reducer with (state, action, environment)
    /// 3. Broadcasts the action to observers
    /// 4. Executes returned effects asynchronously
    ///
    /// `send()` returns after starting effect execution, not completion.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
    #[tracing::instrument(skip(self, action), name = "store_send")]
    pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError> {
        if self.shutdown.load(Ordering::Acquire) {
            tracing::warn!("Rejected action: store is shutting down");
            return Err(StoreError::ShutdownInProgress);
        }

        let (handle, tracking) = EffectHandle::new();
        self.reduce(action, &tracking).await;

        Ok(handle)
    }

    /// Dispatch an ordinary action or an action descriptor
    ///
    /// The pipeline sees a read snapshot of state (for the cache predicate).
    /// A request event is reduced before this returns; the transport call then
    /// runs as an effect whose terminal event is fed back to the reducer.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Dispatch`] for configuration errors; nothing was emitted
    /// - [`StoreError::ShutdownInProgress`] if the store is shutting down
    #[tracing::instrument(skip(self, value), name = "store_dispatch", fields(call = value.is_call()))]
    pub async fn dispatch(&self, value: Dispatch<S, A>) -> Result<DispatchReceipt, StoreError> {
        if self.shutdown.load(Ordering::Acquire) {
            tracing::warn!("Rejected dispatch: store is shutting down");
            return Err(StoreError::ShutdownInProgress);
        }

        // `reduce` is lazy, so the read lock is released before anything is reduced.
        let (handle, tracking) = EffectHandle::new();
        let intercepted = {
            let state = self.state.read().await;
            self.pipeline.intercept(value, &*state, |action| self.reduce(action, &tracking))?
        };
        Ok(self.complete(intercepted, handle, &tracking).await)
    }

    /// Dispatch a dynamically shaped value
    ///
    /// An object with a truthy `types` is treated as a descriptor and validated;
    /// anything else must deserialize into `A`.
    ///
    /// # Errors
    ///
    /// As [`Store::dispatch`], plus [`StoreError::Dispatch`] for malformed values.
    #[tracing::instrument(skip(self, value), name = "store_dispatch_json")]
    pub async fn dispatch_json(&self, value: Value) -> Result<DispatchReceipt, StoreError>
    where
        A: DeserializeOwned,
    {
        if self.shutdown.load(Ordering::Acquire) {
            tracing::warn!("Rejected dispatch: store is shutting down");
            return Err(StoreError::ShutdownInProgress);
        }

        let (handle, tracking) = EffectHandle::new();
        let intercepted = {
            let state = self.state.read().await;
            self.pipeline.intercept_json(value, &*state, |action| self.reduce(action, &tracking))?
        };
        Ok(self.complete(intercepted, handle, &tracking).await)
    }

    /// Reduce whatever the pipeline emitted and start the flight
    ///
    /// The request event's own effects and the flight share `tracking`, so
    /// `handle` completes only once all of them have.
    async fn complete<F>(
        &self,
        intercepted: Intercepted<F, A>,
        handle: EffectHandle,
        tracking: &EffectTracking,
    ) -> DispatchReceipt
    where
        F: Future<Output = ()>,
    {
        let outcome = match intercepted {
            Intercepted::Forwarded(reduced) => {
                reduced.await;
                DispatchOutcome::Forwarded
            },
            Intercepted::Satisfied => DispatchOutcome::Satisfied,
            Intercepted::Deduplicated => DispatchOutcome::Deduplicated,
            Intercepted::Requested { output, flight } => {
                output.await;
                let id = flight.id();
                self.execute_effect(flight.into_effect(), tracking);
                DispatchOutcome::Requested(id)
            },
        };

        DispatchReceipt { outcome, handle }
    }

    /// Send an action and wait for a matching action
    ///
    /// Subscribes before sending, so a matching action produced by the
    /// action's own effects cannot be missed.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`]: no matching action before `timeout`
    /// - [`StoreError::ChannelClosed`]: broadcast channel closed
    /// - [`StoreError::ShutdownInProgress`]: store is shutting down
    pub async fn send_and_wait_for<F>(&self, action: A, predicate: F, timeout: Duration) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        let mut rx = self.action_broadcast.subscribe();
        self.send(action).await?;
        wait_for(&mut rx, predicate, timeout).await
    }

    /// Dispatch and wait for a matching action
    ///
    /// Typically used with a predicate matching the descriptor's terminal tags.
    /// A cache hit or dropped duplicate emits nothing and ends in a timeout.
    ///
    /// # Errors
    ///
    /// As [`Store::dispatch`] and [`Store::send_and_wait_for`].
    pub async fn dispatch_and_wait_for<F>(
        &self,
        value: Dispatch<S, A>,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        let mut rx = self.action_broadcast.subscribe();
        self.dispatch(value).await?;
        wait_for(&mut rx, predicate, timeout).await
    }

    /// Subscribe to every action reduced by this store
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
        self.action_broadcast.subscribe()
    }

    /// Read current state via a closure
    ///
    /// ```ignore
    /// let loaded = store.state(|s| s.packages.len()).await;
    /// ```
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.state.read().await;
        f(&*state)
    }

    /// Number of effects currently running
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.pending_effects.load(Ordering::Acquire)
    }

    /// Gracefully shut down with the configured default timeout
    ///
    /// # Errors
    ///
    /// See [`Store::shutdown`].
    pub async fn shutdown_default(&self) -> Result<(), StoreError> {
        self.shutdown(self.config.default_shutdown_timeout).await
    }

    /// Gracefully shut down the store
    ///
    /// Rejects new actions and dispatches, then waits for running effects
    /// (including in-flight calls) to complete.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running when
    /// `timeout` expires.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        tracing::info!("Initiating graceful shutdown");
        self.shutdown.store(true, Ordering::Release);

        let start = Instant::now();
        let poll_interval = Duration::from_millis(10);

        loop {
            let pending = self.pending_effects.load(Ordering::Acquire);

            if pending == 0 {
                tracing::info!("All effects completed, shutdown successful");
                return Ok(());
            }

            if start.elapsed() >= timeout {
                tracing::error!(pending_effects = pending, "Shutdown timed out");
                return Err(StoreError::ShutdownTimeout(pending));
            }

            tracing::debug!(pending_effects = pending, "Waiting for effects to complete");
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Execute an effect with tracking
    ///
    /// - `None`: No-op
    /// - `Future`: Awaits the computation, sends the resulting action if `Some`
    fn execute_effect(&self, effect: Effect<A>, tracking: &EffectTracking) {
        match effect {
            Effect::None => {
                tracing::trace!("Executing Effect::None (no-op)");
            },
            Effect::Future(fut) => {
                tracing::trace!("Executing Effect::Future");
                let (guard, pending) = self.track(tracking);
                let store = self.clone();
                let tracking = tracking.clone();

                tokio::spawn(async move {
                    let _guard = guard;
                    let _pending = pending;

                    if let Some(action) = fut.await {
                        store.reduce(action, &tracking).await;
                    } else {
                        tracing::trace!("Effect::Future completed with no action");
                    }
                });
            },
        }
    }

    fn track(&self, tracking: &EffectTracking) -> (DecrementGuard, AtomicCounterGuard) {
        tracking.increment();
        self.pending_effects.fetch_add(1, Ordering::SeqCst);
        (
            DecrementGuard(tracking.clone()),
            AtomicCounterGuard(Arc::clone(&self.pending_effects)),
        )
    }

    /// Run the reducer and start the effects it returns
    ///
    /// Effect feedback comes through here directly, bypassing the shutdown
    /// check, so in-flight calls still land in state during shutdown.
    async fn reduce(&self, action: A, tracking: &EffectTracking) {
        let effects = {
            let mut state = self.state.write().await;
            let start = Instant::now();
            let effects = self.reducer.reduce(&mut *state, action.clone(), &self.environment);
            StoreMetrics::record_action(start.elapsed());
            tracing::trace!(effects = effects.len(), "Reducer completed");
            effects
        };

        // No receivers is fine.
        let _ = self.action_broadcast.send(action);

        for effect in effects {
            self.execute_effect(effect, tracking);
        }
    }
}

async fn wait_for<A, F>(rx: &mut broadcast::Receiver<A>, predicate: F, timeout: Duration) -> Result<A, StoreError>
where
    A: Clone,
    F: Fn(&A) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(action) if predicate(&action) => return Ok(action),
                Ok(_) => {},
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Action observer lagged");
                },
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(StoreError::ChannelClosed);
                },
            }
        }
    })
    .await
    .map_err(|_| StoreError::Timeout)?
}

impl<S, A, E, R> Clone for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone,
    E: Clone,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            reducer: self.reducer.clone(),
            environment: self.environment.clone(),
            pipeline: self.pipeline.clone(),
            config: self.config,
            shutdown: Arc::clone(&self.shutdown),
            pending_effects: Arc::clone(&self.pending_effects),
            action_broadcast: self.action_broadcast.clone(),
        }
    }
}
