//! Driving the LOADING → SUCCESS | FAILURE protocol through a [`Store`].
//!
//! [`Store::run_lifecycle`] turns any async operation into three reducer
//! actions. The loading action is reduced before `run_lifecycle` returns; the
//! terminal action is reduced by the operation's driver, which the store runs
//! as an effect so it completes (and is counted by shutdown) even when nobody
//! awaits the returned handle. Once the loading action is admitted the
//! terminal action is always reduced, even if shutdown starts in between.

use crate::{Store, StoreError};
use composable_resource_core::effect::Effect;
use composable_resource_core::lifecycle::{InFlight, LifecycleAction, LifecycleHooks};
use composable_resource_core::reducer::Reducer;
use std::future::Future;
use std::sync::Arc;

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
    A: Send + Clone + 'static,
    S: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Run `operation(args)` as a lifecycle.
    ///
    /// 1. The loading action, built from `hooks.loading_context`, is reduced.
    /// 2. The operation is started.
    /// 3. Its outcome is reported as a success or failure action and reduced.
    ///
    /// `lift` embeds lifecycle actions into the store's action type. The
    /// returned handle resolves to the operation's outcome; failures are
    /// returned as data, never raised.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the loading action is
    /// rejected; the operation is then never started.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let hooks = LifecycleHooks::default();
    /// let handle = store
    ///     .run_lifecycle(|n: u32| async move { Ok::<_, String>(n * 2) }, 21, &hooks, |a| a)
    ///     .await?;
    /// assert_eq!(handle.await, Ok(42));
    /// ```
    pub async fn run_lifecycle<Args, T, Err, C, Op, Fut, L>(
        &self,
        operation: Op,
        args: Args,
        hooks: &LifecycleHooks<Args, T, Err, C>,
        lift: L,
    ) -> Result<InFlight<T, Err>, StoreError>
    where
        Op: FnOnce(Args) -> Fut,
        Fut: Future<Output = Result<T, Err>> + Send + 'static,
        Args: Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        Err: Clone + Send + Sync + 'static,
        C: Send + 'static,
        L: Fn(LifecycleAction<C, T, Err>) -> A + Send + Sync + 'static,
    {
        let lift = Arc::new(lift);
        let pending = operation(args.clone());

        let driver = {
            let store = self.clone();
            let hooks = hooks.clone();
            let lift = Arc::clone(&lift);
            let args = args.clone();
            async move {
                let outcome = pending.await;
                let terminal = match &outcome {
                    Ok(result) => LifecycleAction::Success {
                        result: result.clone(),
                        context: hooks.success_context(result, &args),
                    },
                    Err(error) => LifecycleAction::Failure {
                        error: error.clone(),
                        context: hooks.failure_context(error, &args),
                    },
                };
                tracing::trace!(phase = %terminal.phase(), "Reducing terminal lifecycle phase");
                store.reduce_admitted(lift(terminal)).await;
                outcome
            }
        };
        let in_flight = InFlight::new(driver);

        let loading = LifecycleAction::Loading {
            context: hooks.loading_context(&in_flight, &args),
        };
        self.send(lift(loading)).await?;

        let runner = in_flight.clone();
        self.execute_detached(Effect::Future(Box::pin(async move {
            let _ = runner.await;
            None
        })));

        Ok(in_flight)
    }
}
