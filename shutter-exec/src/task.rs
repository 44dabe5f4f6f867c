//! Units of work submitted to the [`TaskCoordinator`](crate::TaskCoordinator).

use std::future::Future;

use futures_util::future::BoxFuture;
use shutter_core::{ShutterError, ShutterResult, TaskError};
use tokio_util::sync::CancellationToken;

/// Handed to every task when it starts.
///
/// Carries the task's slot (its position in the submitted set) and the
/// cancellation signal for the run. Tasks must observe the signal at each
/// blocking step: call [`checkpoint`](Self::checkpoint) between steps, or wrap
/// an await in [`guard`](Self::guard).
#[derive(Debug, Clone)]
pub struct TaskContext {
    slot: usize,
    token: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(slot: usize, token: CancellationToken) -> Self {
        Self { slot, token }
    }

    /// A context outside any coordinated run, never cancelled unless
    /// `token` is.
    pub fn detached(token: CancellationToken) -> Self {
        Self::new(0, token)
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the run has been cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// `Err(TaskError::Cancelled)` if the run has been cancelled.
    pub fn checkpoint(&self) -> ShutterResult<()> {
        if self.is_cancelled() {
            Err(self.cancelled_error())
        } else {
            Ok(())
        }
    }

    /// Run `fut` unless the run is cancelled first.
    ///
    /// On cancellation `fut` is dropped at its current await point.
    pub async fn guard<T, F>(&self, fut: F) -> ShutterResult<T>
    where
        F: Future<Output = ShutterResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(self.cancelled_error()),
            out = fut => out,
        }
    }

    fn cancelled_error(&self) -> ShutterError {
        TaskError::Cancelled { slot: self.slot }.into()
    }
}

type TaskFn<T> = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, ShutterResult<T>> + Send>;

/// A no-argument unit of work producing a `T` or an error.
///
/// Identity is positional: the coordinator reports results in submission
/// order.
///
/// # Example
///
/// ```ignore
/// let count = Task::new(move |ctx| async move {
///     ctx.guard(store.count(&filter)).await
/// });
/// ```
pub struct Task<T> {
    run: TaskFn<T>,
}

impl<T: Send + 'static> Task<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = ShutterResult<T>> + Send + 'static,
    {
        Self {
            run: Box::new(move |ctx| -> BoxFuture<'static, ShutterResult<T>> {
                Box::pin(f(ctx))
            }),
        }
    }

    /// Transform the successful result.
    pub fn map<U, F>(self, f: F) -> Task<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Task::new(move |ctx| {
            let fut = self.start(ctx);
            async move { fut.await.map(f) }
        })
    }

    pub(crate) fn start(self, ctx: TaskContext) -> BoxFuture<'static, ShutterResult<T>> {
        (self.run)(ctx)
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("output", &std::any::type_name::<T>())
            .finish()
    }
}
