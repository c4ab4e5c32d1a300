//! Three-phase lifecycle protocol for asynchronous operations.
//!
//! Any asynchronous operation can be reported as a LOADING phase followed by
//! exactly one of SUCCESS or FAILURE. Callers customize two things:
//!
//! - **contexts** ([`LifecycleHooks`]): the data that accompanies each phase
//! - **updaters** ([`LifecycleReducer`]): how each phase folds into state
//!
//! The runtime crate drives the protocol (`Store::run_lifecycle`); this module
//! only defines the actions, the shared in-flight handle and the defaults.
//!
//! Failures are data: an [`InFlight`] resolves to `Result<T, E>` and never
//! panics, so callers can always await it without a separate error path.

use crate::effect::Effect;
use crate::reducer::Reducer;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// One phase of the lifecycle protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// The operation has started and not settled
    Loading,
    /// The operation fulfilled
    Success,
    /// The operation rejected
    Failure,
}

impl Phase {
    /// Upper-case suffix used in action type names
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Loading => "LOADING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        }
    }

    /// Whether the phase settles the operation
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Loading)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => f.write_str("loading"),
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
        }
    }
}

/// Action type name of one phase, e.g. `[posts][index][LOADING]`.
#[must_use]
pub fn action_type(blocks: &[&str], phase: Phase) -> String {
    let mut name: String = blocks.iter().map(|block| format!("[{block}]")).collect();
    name.push('[');
    name.push_str(phase.suffix());
    name.push(']');
    name
}

/// Shared handle to an operation that may still be running.
///
/// Cloning is cheap; every clone resolves to the same `Result`. The handle is
/// what a second caller awaits instead of issuing a duplicate request.
pub struct InFlight<T, E> {
    inner: Shared<BoxFuture<'static, Result<T, E>>>,
}

impl<T, E> InFlight<T, E>
where
    T: Clone,
    E: Clone,
{
    /// Wrap `future` in a shareable handle. The future is not polled until the
    /// handle (or a clone) is.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            inner: future.boxed().shared(),
        }
    }

    /// A handle that is already settled with `outcome`
    #[must_use]
    pub fn settled(outcome: Result<T, E>) -> Self
    where
        T: Send + 'static,
        E: Send + 'static,
    {
        Self::new(futures::future::ready(outcome))
    }

    /// The outcome, if the operation has settled and the handle was polled
    #[must_use]
    pub fn peek(&self) -> Option<&Result<T, E>> {
        self.inner.peek()
    }

    /// Whether [`Self::peek`] would return an outcome
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.peek().is_some()
    }
}

impl<T: Clone, E: Clone> Clone for InFlight<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone, E: Clone> Future for InFlight<T, E> {
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<T: Clone, E: Clone> fmt::Debug for InFlight<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("settled", &self.is_settled())
            .finish_non_exhaustive()
    }
}

/// One reported phase, carrying its context
#[derive(Debug, Clone)]
pub enum LifecycleAction<C, T, E> {
    /// Reported before the operation settles
    Loading {
        /// Loading context
        context: C,
    },
    /// Reported when the operation fulfilled
    Success {
        /// Fulfilled value
        result: T,
        /// Success context
        context: C,
    },
    /// Reported when the operation rejected
    Failure {
        /// Rejection value
        error: E,
        /// Failure context
        context: C,
    },
}

impl<C, T, E> LifecycleAction<C, T, E> {
    /// Phase of this action
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Loading { .. } => Phase::Loading,
            Self::Success { .. } => Phase::Success,
            Self::Failure { .. } => Phase::Failure,
        }
    }

    /// Context of this action
    #[must_use]
    pub const fn context(&self) -> &C {
        match self {
            Self::Loading { context }
            | Self::Success { context, .. }
            | Self::Failure { context, .. } => context,
        }
    }
}

/// Default context: the phase value followed by the call arguments.
#[derive(Debug, Clone)]
pub enum DefaultContext<T: Clone, E: Clone, Args> {
    /// `[in_flight, ...args]`
    Loading(InFlight<T, E>, Args),
    /// `[result, ...args]`
    Success(T, Args),
    /// `[error, ...args]`
    Failure(E, Args),
}

type LoadingContextFn<Args, T, E, C> = Arc<dyn Fn(&InFlight<T, E>, &Args) -> C + Send + Sync>;
type SuccessContextFn<Args, T, C> = Arc<dyn Fn(&T, &Args) -> C + Send + Sync>;
type FailureContextFn<Args, E, C> = Arc<dyn Fn(&E, &Args) -> C + Send + Sync>;

/// Per-phase context builders.
pub struct LifecycleHooks<Args, T, E, C> {
    loading_context: LoadingContextFn<Args, T, E, C>,
    success_context: SuccessContextFn<Args, T, C>,
    failure_context: FailureContextFn<Args, E, C>,
}

impl<Args, T, E, C> LifecycleHooks<Args, T, E, C> {
    /// Build hooks from three context functions
    pub fn new<L, S, F>(loading: L, success: S, failure: F) -> Self
    where
        L: Fn(&InFlight<T, E>, &Args) -> C + Send + Sync + 'static,
        S: Fn(&T, &Args) -> C + Send + Sync + 'static,
        F: Fn(&E, &Args) -> C + Send + Sync + 'static,
    {
        Self {
            loading_context: Arc::new(loading),
            success_context: Arc::new(success),
            failure_context: Arc::new(failure),
        }
    }

    /// Context for the loading phase
    pub fn loading_context(&self, in_flight: &InFlight<T, E>, args: &Args) -> C {
        (self.loading_context)(in_flight, args)
    }

    /// Context for the success phase
    pub fn success_context(&self, result: &T, args: &Args) -> C {
        (self.success_context)(result, args)
    }

    /// Context for the failure phase
    pub fn failure_context(&self, error: &E, args: &Args) -> C {
        (self.failure_context)(error, args)
    }
}

impl<Args, T, E> Default for LifecycleHooks<Args, T, E, DefaultContext<T, E, Args>>
where
    Args: Clone + 'static,
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn default() -> Self {
        Self::new(
            |in_flight: &InFlight<T, E>, args: &Args| {
                DefaultContext::Loading(in_flight.clone(), args.clone())
            },
            |result: &T, args: &Args| DefaultContext::Success(result.clone(), args.clone()),
            |error: &E, args: &Args| DefaultContext::Failure(error.clone(), args.clone()),
        )
    }
}

impl<Args, T, E, C> Clone for LifecycleHooks<Args, T, E, C> {
    fn clone(&self) -> Self {
        Self {
            loading_context: Arc::clone(&self.loading_context),
            success_context: Arc::clone(&self.success_context),
            failure_context: Arc::clone(&self.failure_context),
        }
    }
}

type LoadingUpdater<S, C> = Arc<dyn Fn(&mut S, &C) + Send + Sync>;
type SettledUpdater<S, V, C> = Arc<dyn Fn(&mut S, &V, &C) + Send + Sync>;

/// Folds lifecycle phases into state. Every updater defaults to identity.
///
/// # Example
///
/// ```
/// use composable_resource_core::lifecycle::{LifecycleAction, LifecycleReducer};
///
/// let reducer = LifecycleReducer::<Vec<String>, (), u32, String>::default()
///     .with_success_updater(|log, value, ()| log.push(format!("got {value}")));
///
/// let mut log = Vec::new();
/// reducer.apply(&mut log, &LifecycleAction::Loading { context: () });
/// reducer.apply(&mut log, &LifecycleAction::Success { result: 3, context: () });
/// assert_eq!(log, ["got 3"]);
/// ```
pub struct LifecycleReducer<S, C, T, E> {
    loading: LoadingUpdater<S, C>,
    success: SettledUpdater<S, T, C>,
    failure: SettledUpdater<S, E, C>,
}

impl<S, C, T, E> Default for LifecycleReducer<S, C, T, E> {
    fn default() -> Self {
        Self {
            loading: Arc::new(|_: &mut S, _: &C| {}),
            success: Arc::new(|_: &mut S, _: &T, _: &C| {}),
            failure: Arc::new(|_: &mut S, _: &E, _: &C| {}),
        }
    }
}

impl<S, C, T, E> LifecycleReducer<S, C, T, E> {
    /// Replace the loading updater
    #[must_use]
    pub fn with_loading_updater<F>(mut self, updater: F) -> Self
    where
        F: Fn(&mut S, &C) + Send + Sync + 'static,
    {
        self.loading = Arc::new(updater);
        self
    }

    /// Replace the success updater
    #[must_use]
    pub fn with_success_updater<F>(mut self, updater: F) -> Self
    where
        F: Fn(&mut S, &T, &C) + Send + Sync + 'static,
    {
        self.success = Arc::new(updater);
        self
    }

    /// Replace the failure updater
    #[must_use]
    pub fn with_failure_updater<F>(mut self, updater: F) -> Self
    where
        F: Fn(&mut S, &E, &C) + Send + Sync + 'static,
    {
        self.failure = Arc::new(updater);
        self
    }

    /// Apply the updater matching the phase of `action`.
    pub fn apply(&self, state: &mut S, action: &LifecycleAction<C, T, E>) {
        match action {
            LifecycleAction::Loading { context } => (self.loading)(state, context),
            LifecycleAction::Success { result, context } => (self.success)(state, result, context),
            LifecycleAction::Failure { error, context } => (self.failure)(state, error, context),
        }
    }
}

impl<S, C, T, E> Clone for LifecycleReducer<S, C, T, E> {
    fn clone(&self) -> Self {
        Self {
            loading: Arc::clone(&self.loading),
            success: Arc::clone(&self.success),
            failure: Arc::clone(&self.failure),
        }
    }
}

impl<S, C, T, E> Reducer for LifecycleReducer<S, C, T, E> {
    type State = S;
    type Action = LifecycleAction<C, T, E>;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        self.apply(state, &action);
        smallvec![Effect::None]
    }
}

#[cfg(test)]
#[allow(clippy::panic)] // Test code can panic
mod tests {
    use super::*;

    #[test]
    fn action_type_brackets_every_block() {
        assert_eq!(action_type(&["posts", "index"], Phase::Loading), "[posts][index][LOADING]");
        assert_eq!(action_type(&["ping"], Phase::Failure), "[ping][FAILURE]");
    }

    #[test]
    fn in_flight_clones_share_one_outcome() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle: InFlight<u32, String> = InFlight::new(async move {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(5)
        });
        let other = handle.clone();

        assert!(!handle.is_settled());
        assert_eq!(tokio_test::block_on(handle), Ok(5));
        assert_eq!(tokio_test::block_on(other.clone()), Ok(5));
        assert!(other.is_settled());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn default_hooks_prefix_arguments_with_phase_value() {
        let hooks: LifecycleHooks<Vec<u8>, u32, String, DefaultContext<u32, String, Vec<u8>>> =
            LifecycleHooks::default();
        match hooks.success_context(&9, &vec![1, 2]) {
            DefaultContext::Success(value, args) => {
                assert_eq!(value, 9);
                assert_eq!(args, vec![1, 2]);
            },
            other => panic!("unexpected context: {other:?}"),
        }
        assert!(matches!(
            hooks.failure_context(&"boom".to_string(), &vec![]),
            DefaultContext::Failure(ref e, _) if e == "boom"
        ));
    }

    #[test]
    fn default_reducer_is_identity() {
        let reducer = LifecycleReducer::<u32, (), u32, String>::default();
        let mut state = 4;
        reducer.reduce(&mut state, LifecycleAction::Loading { context: () }, &());
        reducer.reduce(&mut state, LifecycleAction::Success { result: 1, context: () }, &());
        reducer.reduce(
            &mut state,
            LifecycleAction::Failure {
                error: "x".into(),
                context: (),
            },
            &(),
        );
        assert_eq!(state, 4);
    }

    #[test]
    fn custom_updaters_see_context() {
        let reducer = LifecycleReducer::<Vec<&'static str>, &'static str, (), ()>::default()
            .with_loading_updater(|log, ctx| log.push(*ctx))
            .with_failure_updater(|log, (), ctx| log.push(*ctx));
        let mut log = Vec::new();
        reducer.apply(&mut log, &LifecycleAction::Loading { context: "start" });
        reducer.apply(&mut log, &LifecycleAction::Failure { error: (), context: "end" });
        assert_eq!(log, ["start", "end"]);
    }
}
