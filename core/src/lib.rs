//! # Gophr Core
//!
//! Core types for the gophr dispatch pipeline.
//!
//! This crate holds the pure data side of the architecture: call sites build
//! [`ActionDescriptor`]s describing *what* should happen, the runtime turns them
//! into a request/terminal pair of [`LifecycleEvent`]s, and reducers fold those
//! events into state.
//!
//! ## Core Concepts
//!
//! - **Action Descriptor**: Immutable description of an API call plus its
//!   three lifecycle tags (request, success, failure)
//! - **Lifecycle Event**: One of the request/success/failure notifications
//!   emitted for a descriptor
//! - **Transport**: Injected capability performing the actual call
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//!
//! ## Example
//!
//! ```
//! use gophr_core::intent;
//! use gophr_core::descriptor::Method;
//!
//! #[derive(Default)]
//! struct SiteState {
//!     loaded: Vec<String>,
//! }
//!
//! let descriptor = intent::get_package::<SiteState>("gorilla/mux")
//!     .with_cache(|state: &SiteState| state.loaded.iter().any(|n| n == "gorilla/mux"));
//!
//! assert_eq!(descriptor.method(), Method::Get);
//! assert_eq!(descriptor.resource().as_str(), "package");
//! assert_eq!(descriptor.types().request().as_str(), "GET_PACKAGE_REQUEST");
//! assert!(!descriptor.is_cached(&SiteState::default()));
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{smallvec, SmallVec};
pub use tokio_util::sync::CancellationToken;

pub mod descriptor;
pub mod event;
pub mod intent;
pub mod lifecycle;
pub mod transport;

pub use descriptor::{
    ActionDescriptor, CachePredicate, DescriptorError, Dispatch, DispatchJsonError, Method, Resource,
};
pub use event::{DispatchId, EventMeta, EventPayload, LifecycleEvent};
pub use intent::{Intent, TagRegistry};
pub use lifecycle::{ActionType, LifecycleTypes, Phase};
pub use transport::{Transport, TransportError, TransportFuture};

/// Reducer module - The trait state reduction is written against
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// The dispatch pipeline never touches state itself; every change happens in a
/// reducer consuming the lifecycle events it emits.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for state reduction
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for SiteReducer {
    ///     type State = SiteState;
    ///     type Action = SiteAction;
    ///     type Environment = SiteEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut SiteState,
    ///         action: SiteAction,
    ///         env: &SiteEnvironment,
    ///     ) -> SmallVec<[Effect<SiteAction>; 4]> {
    ///         match action {
    ///             SiteAction::Logout => {
    ///                 state.session = None;
    ///                 smallvec![Effect::None]
    ///             }
    ///             _ => smallvec![Effect::None],
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// Updates state in place and returns effect descriptions to be
        /// executed by the runtime.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects describe side effects to be performed by the runtime.
/// They are values (not execution). An in-flight API call is itself run as an
/// [`Effect::Future`](effect::Effect::Future) whose output is the terminal
/// lifecycle event.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime. An in-flight API call
    /// is an `Effect::Future` whose output is the terminal lifecycle event.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected.
/// The transport lives in [`transport`](crate::transport); the clock here
/// stamps lifecycle events.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock backed by [`Utc::now`]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
