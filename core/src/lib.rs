//! # Composable Resource Core
//!
//! Core traits and types for driving asynchronous network operations against an
//! in-memory, normalized entity cache.
//!
//! This crate is the functional core of the resource layer. Nothing in here
//! performs I/O: requests are described, keyed and cached, responses are merged
//! into entity tables, and nested resources are addressed by state paths. The
//! runtime crate executes the descriptions.
//!
//! ## Core Concepts
//!
//! - **State**: [`resource::ResourceState`], one per resource (and per nested
//!   ancestor-id tuple)
//! - **Action**: [`resource::ResourceAction`], one lifecycle phase of one operation
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies via traits ([`environment::Clock`],
//!   [`environment::HttpClient`])
//!
//! ## Building Blocks
//!
//! - [`request`]: request descriptors, templates and canonical [`request::RequestKey`]s
//! - [`entity`]: primary-key indexed [`entity::EntityTable`] and its merge functions
//! - [`lifecycle`]: the LOADING → SUCCESS | FAILURE protocol
//! - [`cache`]: request records and the read-deduplication policy
//! - [`resource`]: definitions, nested addressing, state tree and reducer
//! - [`operation`]: the standard CRUD-shaped operations
//!
//! ## Example
//!
//! ```
//! use composable_resource_core::entity::{union_by_id, EntityTable};
//! use serde_json::json;
//!
//! let table = union_by_id(&EntityTable::new(), &[json!({"id": 1}), json!({"id": 2})], "id")?;
//! assert_eq!(table.len(), 2);
//! # Ok::<(), composable_resource_core::entity::EntityError>(())
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use serde_json::Value;
pub use smallvec::{smallvec, SmallVec};

/// Request cache records and the read-deduplication policy
pub mod cache;
/// Transport configuration layers
pub mod config;
/// Primary-key indexed entity tables
pub mod entity;
/// Three-phase lifecycle protocol for asynchronous operations
pub mod lifecycle;
/// Standard resource operations
pub mod operation;
/// Request descriptors and canonical keys
pub mod request;
/// Resource definitions, nested addressing and resource state
pub mod resource;

/// Reducer module - The core trait for state transitions
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`
///
/// They contain all state transition logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for state transitions
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```
    /// use composable_resource_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
    ///
    /// struct Counter;
    ///
    /// impl Reducer for Counter {
    ///     type State = i32;
    ///     type Action = i32;
    ///     type Environment = ();
    ///
    ///     fn reduce(&self, state: &mut i32, action: i32, _env: &()) -> SmallVec<[Effect<i32>; 4]> {
    ///         *state += action;
    ///         smallvec![Effect::None]
    ///     }
    /// }
    ///
    /// let mut state = 0;
    /// Counter.reduce(&mut state, 2, &());
    /// assert_eq!(state, 2);
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
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effects to be executed by the runtime
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
/// They are values (not execution) and are composable.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the Store runtime.
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Delayed action
        Delay {
            /// How long to wait
            duration: Duration,
            /// Action to dispatch after delay
            action: Box<Action>,
        },

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                },
                Effect::Delay { duration, action } => f
                    .debug_struct("Effect::Delay")
                    .field("duration", duration)
                    .field("action", action)
                    .finish(),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// via the Environment parameter.
pub mod environment {
    use crate::config::TransportConfig;
    use crate::request::{HttpResponse, RequestDescriptor, RequestError};
    use chrono::{DateTime, Utc};
    use std::future::Future;
    use std::pin::Pin;

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use composable_resource_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Future returned by [`HttpClient::request`]
    pub type HttpFuture<'a> =
        Pin<Box<dyn Future<Output = Result<HttpResponse, RequestError>> + Send + 'a>>;

    /// Transport capability: issue one request and return its response
    ///
    /// Implementations reject (return `Err`) on network failure and on
    /// non-2xx statuses. Timeouts are the transport's responsibility and are
    /// configured through [`TransportConfig::timeout`].
    ///
    /// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
    /// so the client can be shared as `Arc<dyn HttpClient>` by every store.
    pub trait HttpClient: Send + Sync {
        /// Execute `descriptor` with the already-merged `config`.
        ///
        /// # Errors
        ///
        /// Returns a [`RequestError`] on network failure, timeout, non-2xx
        /// status or an undecodable body.
        fn request<'a>(
            &'a self,
            descriptor: &'a RequestDescriptor,
            config: &'a TransportConfig,
        ) -> HttpFuture<'a>;
    }
}

#[cfg(test)]
mod tests {
    use super::effect::Effect;
    use super::environment::{Clock, SystemClock};

    #[test]
    fn effect_debug_hides_futures() {
        let effect: Effect<()> = Effect::Future(Box::pin(async { None }));
        assert_eq!(format!("{effect:?}"), "Effect::Future(<future>)");
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
