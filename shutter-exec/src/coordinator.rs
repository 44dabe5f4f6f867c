//! Fan-out/fan-in task coordination.
//!
//! A [`TaskCoordinator`] runs a fixed set of independent [`Task`]s
//! concurrently and joins them under a [`JoinPolicy`]. All tasks are spawned
//! before any is awaited. No task outlives the call that spawned it: on an
//! early resolution the siblings are cancelled, given `cancel_grace` to wind
//! down, then aborted.
//!
//! # Join order
//!
//! An error always wins over a success. Under `FirstErrorWins` the first
//! observed failure cancels the run; every sibling is then joined, and among
//! all failures reported by the tasks themselves (the first one included)
//! the one from the lowest slot (earliest submitted) is returned. Errors a
//! sibling returns because it observed the cancellation do not compete.
//! Under `AllOrNothing` the lowest-slot failure is returned.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use shutter_core::constants::DEFAULT_CANCEL_GRACE_MS;
use shutter_core::{ExecSettings, ShutterError, ShutterResult, TaskError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::task::{Task, TaskContext};

/// How a coordinated run resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinPolicy {
    /// Resolve on the first failure (cancelling the rest) or once every task
    /// has succeeded.
    #[default]
    FirstErrorWins,
    /// Wait for every task, then report the first failure by submission
    /// order, if any.
    AllOrNothing,
}

/// Per-slot outcomes of a run where every task was awaited.
#[derive(Debug)]
pub struct Settled<T> {
    outcomes: Vec<ShutterResult<T>>,
}

impl<T> Settled<T> {
    /// Outcomes in submission order.
    pub fn outcomes(&self) -> &[ShutterResult<T>] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<ShutterResult<T>> {
        self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn successes(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_err()).count()
    }

    /// The failure with the lowest slot.
    pub fn first_error(&self) -> Option<&ShutterError> {
        self.outcomes.iter().find_map(|o| o.as_ref().err())
    }

    /// All results, or the first failure by submission order. Successful
    /// results are discarded when any task failed.
    pub fn into_result(self) -> ShutterResult<Vec<T>> {
        self.outcomes.into_iter().collect()
    }
}

/// Runs sets of tasks concurrently and joins their outcomes.
///
/// Holds only configuration; share it freely.
#[derive(Debug, Clone)]
pub struct TaskCoordinator {
    /// Every run's token is a child of this one.
    parent: CancellationToken,
    cancel_grace: Duration,
}

impl Default for TaskCoordinator {
    fn default() -> Self {
        Self {
            parent: CancellationToken::new(),
            cancel_grace: Duration::from_millis(DEFAULT_CANCEL_GRACE_MS),
        }
    }
}

type Outcome<T> = (usize, Result<ShutterResult<T>, Box<dyn Any + Send>>);

impl TaskCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &ExecSettings) -> Self {
        Self::default().with_cancel_grace(settings.cancel_grace)
    }

    /// Tie every run to `parent`: cancelling it cancels all in-flight tasks,
    /// e.g. when the enclosing request is abandoned.
    pub fn with_parent(mut self, parent: CancellationToken) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_cancel_grace(mut self, cancel_grace: Duration) -> Self {
        self.cancel_grace = cancel_grace;
        self
    }

    pub fn cancel_grace(&self) -> Duration {
        self.cancel_grace
    }

    /// Run `tasks` and join them under `policy`.
    ///
    /// Returns every result in submission order, or exactly one error. A
    /// task's own error is returned unchanged; the coordinator adds only
    /// `TaskError::Panicked` and `TaskError::Cancelled`. Failed tasks are
    /// never retried.
    pub async fn run<T>(&self, tasks: Vec<Task<T>>, policy: JoinPolicy) -> ShutterResult<Vec<T>>
    where
        T: Send + 'static,
    {
        debug!(tasks = tasks.len(), policy = ?policy, "coordinated run started");
        let result = match policy {
            JoinPolicy::FirstErrorWins => self.run_first_error_wins(tasks).await,
            JoinPolicy::AllOrNothing => self.run_all_settled(tasks).await.into_result(),
        };
        match &result {
            Ok(values) => debug!(policy = ?policy, results = values.len(), "coordinated run succeeded"),
            Err(e) => debug!(policy = ?policy, error = %e, "coordinated run failed"),
        }
        result
    }

    /// Run `tasks` to completion and report every outcome.
    ///
    /// Nothing is cancelled because of a failure; tasks only see
    /// cancellation when the parent token fires.
    pub async fn run_all_settled<T>(&self, tasks: Vec<Task<T>>) -> Settled<T>
    where
        T: Send + 'static,
    {
        let count = tasks.len();
        let token = self.parent.child_token();
        let _cancel_on_drop = token.clone().drop_guard();
        let mut set = spawn_all(tasks, &token);

        let mut outcomes: Vec<Option<ShutterResult<T>>> = (0..count).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            if let Ok((slot, outcome)) = joined {
                let outcome = flatten(slot, outcome);
                if let Err(e) = &outcome {
                    warn!(slot, error = %e, "task failed");
                }
                outcomes[slot] = Some(outcome);
            }
        }

        Settled {
            outcomes: outcomes
                .into_iter()
                .enumerate()
                .map(|(slot, o)| o.unwrap_or_else(|| Err(TaskError::Cancelled { slot }.into())))
                .collect(),
        }
    }

    /// Run two tasks with different result types.
    pub async fn run_pair<A, B>(
        &self,
        first: Task<A>,
        second: Task<B>,
        policy: JoinPolicy,
    ) -> ShutterResult<(A, B)>
    where
        A: Send + 'static,
        B: Send + 'static,
    {
        let tasks = vec![first.map(Either::First), second.map(Either::Second)];
        let mut results = self.run(tasks, policy).await?.into_iter();
        match (results.next(), results.next()) {
            (Some(Either::First(a)), Some(Either::Second(b))) => Ok((a, b)),
            _ => Err(TaskError::Panicked {
                slot: 0,
                reason: "pair results out of submission order".to_string(),
            }
            .into()),
        }
    }

    async fn run_first_error_wins<T>(&self, tasks: Vec<Task<T>>) -> ShutterResult<Vec<T>>
    where
        T: Send + 'static,
    {
        let count = tasks.len();
        let token = self.parent.child_token();
        let _cancel_on_drop = token.clone().drop_guard();
        let mut set = spawn_all(tasks, &token);

        let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            let Ok((slot, outcome)) = joined else {
                continue;
            };
            match flatten(slot, outcome) {
                Ok(value) => results[slot] = Some(value),
                Err(error) => {
                    token.cancel();
                    let (slot, error) = self
                        .wind_down(&mut set)
                        .await
                        .into_iter()
                        .filter(|(other, _)| *other < slot)
                        .min_by_key(|(other, _)| *other)
                        .unwrap_or((slot, error));
                    warn!(slot, error = %error, "task failed, siblings cancelled");
                    return Err(error);
                }
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(slot, r)| r.ok_or_else(|| TaskError::Cancelled { slot }.into()))
            .collect()
    }

    /// Join cancelled siblings, aborting whatever is still running after the
    /// grace period. Returns the failures siblings reported on their own;
    /// cancellations and aborts are not failures.
    async fn wind_down<T: Send + 'static>(
        &self,
        set: &mut JoinSet<Outcome<T>>,
    ) -> Vec<(usize, ShutterError)> {
        let mut failures = Vec::new();
        let drained = tokio::time::timeout(self.cancel_grace, async {
            while let Some(joined) = set.join_next().await {
                collect_failure(joined, &mut failures);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = set.len(),
                grace_ms = self.cancel_grace.as_millis() as u64,
                "tasks did not observe cancellation in time, aborting"
            );
            set.abort_all();
            while let Some(joined) = set.join_next().await {
                collect_failure(joined, &mut failures);
            }
        }
        failures
    }
}

enum Either<A, B> {
    First(A),
    Second(B),
}

fn spawn_all<T>(tasks: Vec<Task<T>>, token: &CancellationToken) -> JoinSet<Outcome<T>>
where
    T: Send + 'static,
{
    let mut set = JoinSet::new();
    for (slot, task) in tasks.into_iter().enumerate() {
        let fut = task.start(TaskContext::new(slot, token.clone()));
        set.spawn(async move { (slot, AssertUnwindSafe(fut).catch_unwind().await) });
    }
    set
}

fn flatten<T>(slot: usize, outcome: Result<ShutterResult<T>, Box<dyn Any + Send>>) -> ShutterResult<T> {
    outcome.unwrap_or_else(|payload| {
        Err(TaskError::Panicked {
            slot,
            reason: panic_message(payload.as_ref()),
        }
        .into())
    })
}

fn collect_failure<T>(
    joined: Result<Outcome<T>, tokio::task::JoinError>,
    failures: &mut Vec<(usize, ShutterError)>,
) {
    if let Ok((slot, outcome)) = joined {
        if let Err(error) = flatten(slot, outcome) {
            if !error.is_cancellation() {
                failures.push((slot, error));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shutter_core::{EntityKind, StoreError};

    fn ok_after(ms: u64, value: u32) -> Task<u32> {
        Task::new(move |ctx| async move {
            ctx.guard(async {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(value)
            })
            .await
        })
    }

    fn fail_after(ms: u64, reason: &str) -> Task<u32> {
        let reason = reason.to_string();
        Task::new(move |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Err(StoreError::Query {
                kind: EntityKind::Post,
                reason,
            }
            .into())
        })
    }

    fn reason_of(err: &ShutterError) -> String {
        match err {
            ShutterError::Store(StoreError::Query { reason, .. }) => reason.clone(),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_results_in_submission_order() {
        let coordinator = TaskCoordinator::new();
        let tasks = vec![ok_after(30, 1), ok_after(0, 2), ok_after(10, 3)];
        let out = coordinator.run(tasks, JoinPolicy::FirstErrorWins).await.unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_run_succeeds() {
        let coordinator = TaskCoordinator::new();
        let out = coordinator
            .run(Vec::<Task<u32>>::new(), JoinPolicy::FirstErrorWins)
            .await
            .unwrap();
        assert!(out.is_empty());
        let settled = coordinator.run_all_settled(Vec::<Task<u32>>::new()).await;
        assert!(settled.is_empty());
    }

    #[tokio::test]
    async fn test_first_error_wins_returns_without_waiting_for_slow_sibling() {
        let coordinator = TaskCoordinator::new();
        let started = tokio::time::Instant::now();
        let err = coordinator
            .run(vec![ok_after(10_000, 1), fail_after(5, "boom")], JoinPolicy::FirstErrorWins)
            .await
            .unwrap_err();
        assert_eq!(reason_of(&err), "boom");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_all_or_nothing_reports_first_error_by_submission_order() {
        let coordinator = TaskCoordinator::new();
        let tasks = vec![ok_after(0, 1), fail_after(40, "slot1"), fail_after(0, "slot2")];
        let err = coordinator.run(tasks, JoinPolicy::AllOrNothing).await.unwrap_err();
        assert_eq!(reason_of(&err), "slot1");
    }

    #[tokio::test]
    async fn test_settled_keeps_every_outcome() {
        let coordinator = TaskCoordinator::new();
        let settled = coordinator
            .run_all_settled(vec![ok_after(0, 1), fail_after(0, "x"), ok_after(5, 3)])
            .await;
        assert_eq!(settled.len(), 3);
        assert_eq!(settled.successes(), 2);
        assert_eq!(settled.failures(), 1);
        assert_eq!(settled.first_error().map(reason_of).as_deref(), Some("x"));
        assert!(settled.into_result().is_err());
    }

    #[tokio::test]
    async fn test_panic_becomes_task_error() {
        let coordinator = TaskCoordinator::new();
        let panicking: Task<u32> = Task::new(|ctx| async move {
            if ctx.slot() == 1 {
                panic!("kaboom");
            }
            Ok(0)
        });
        let err = coordinator
            .run(vec![ok_after(0, 1), panicking], JoinPolicy::AllOrNothing)
            .await
            .unwrap_err();
        match err {
            ShutterError::Task(TaskError::Panicked { slot, reason }) => {
                assert_eq!(slot, 1);
                assert!(reason.contains("kaboom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_pair_mixed_types() {
        let coordinator = TaskCoordinator::new();
        let count = Task::new(|_ctx| async move { Ok(21u64) });
        let page = Task::new(|_ctx| async move { Ok(vec!["a".to_string()]) });
        let (total, items) = coordinator
            .run_pair(count, page, JoinPolicy::FirstErrorWins)
            .await
            .unwrap();
        assert_eq!(total, 21);
        assert_eq!(items, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_tasks() {
        let parent = CancellationToken::new();
        let coordinator = TaskCoordinator::new().with_parent(parent.clone());
        parent.cancel();

        let err = coordinator
            .run(vec![ok_after(10_000, 1)], JoinPolicy::AllOrNothing)
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
    }
}
