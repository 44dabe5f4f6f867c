//! Pacing gates.
//!
//! A [`PacingGate`] issues admission slots at a fixed cadence of
//! `1 / requests_per_second`. Slots are strictly serialized: waiters are
//! admitted in arrival order and slot N+1 is never issued before slot N.
//! There is no burst allowance, so idle time does not bank capacity: after an
//! idle period exactly one caller is admitted immediately, the next one a full
//! cadence later.
//!
//! Built on a `governor` direct rate limiter with a burst of one.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use shutter_core::{parse_rate_budget, GateError, GateSettings};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// "N operations per second", fixed for the lifetime of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget(NonZeroU32);

impl RateBudget {
    pub fn per_second(requests_per_second: NonZeroU32) -> Self {
        Self(requests_per_second)
    }

    /// Parse a raw setting; absent, non-positive or unparsable input yields
    /// the default of 10 per second.
    pub fn parse(raw: Option<&str>) -> Self {
        Self(parse_rate_budget(raw))
    }

    pub fn from_settings(settings: &GateSettings) -> Self {
        Self(settings.requests_per_second)
    }

    pub fn requests_per_second(&self) -> u32 {
        self.0.get()
    }

    /// Spacing between consecutive slots.
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(1) / self.0.get()
    }

    fn quota(&self) -> Quota {
        Quota::per_second(self.0).allow_burst(NonZeroU32::MIN)
    }
}

impl Default for RateBudget {
    fn default() -> Self {
        Self::from_settings(&GateSettings::default())
    }
}

/// Admission control for one category of expensive work.
pub struct PacingGate {
    name: String,
    budget: RateBudget,
    limiter: DirectRateLimiter,
    clock: DefaultClock,
    /// Holds waiters in arrival order; only the head talks to the limiter.
    queue: Mutex<()>,
}

impl PacingGate {
    pub fn new(name: impl Into<String>, budget: RateBudget) -> Self {
        Self {
            name: name.into(),
            budget,
            limiter: RateLimiter::direct(budget.quota()),
            clock: DefaultClock::default(),
            queue: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn budget(&self) -> RateBudget {
        self.budget
    }

    /// Wait for the next slot, however long that takes.
    pub async fn acquire(&self) {
        // Without a deadline or token the only outcome is admission.
        let _ = self.admit(None, None).await;
    }

    /// Wait for the next slot for at most `timeout`.
    pub async fn acquire_within(&self, timeout: Duration) -> Result<(), GateError> {
        self.admit(None, Some(Instant::now() + timeout)).await
    }

    /// Wait for the next slot until `cancel` fires or `deadline` passes.
    ///
    /// # Errors
    ///
    /// - `GateError::Cancelled` if `cancel` fired first
    /// - `GateError::Timeout` if `deadline` passed first (retryable)
    pub async fn acquire_cancellable(
        &self,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<(), GateError> {
        self.admit(Some(cancel), deadline).await
    }

    async fn admit(
        &self,
        cancel: Option<&CancellationToken>,
        deadline: Option<Instant>,
    ) -> Result<(), GateError> {
        let started = Instant::now();
        let _turn = self
            .wait(self.queue.lock(), cancel, deadline, started)
            .await?;

        loop {
            match self.limiter.check() {
                Ok(()) => {
                    debug!(
                        gate = %self.name,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "admitted"
                    );
                    return Ok(());
                }
                Err(not_until) => {
                    let pause = not_until.wait_time_from(self.clock.now());
                    self.wait(tokio::time::sleep(pause), cancel, deadline, started)
                        .await?;
                }
            }
        }
    }

    /// Drive `fut` unless cancellation or the deadline comes first.
    async fn wait<F: Future>(
        &self,
        fut: F,
        cancel: Option<&CancellationToken>,
        deadline: Option<Instant>,
        started: Instant,
    ) -> Result<F::Output, GateError> {
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => {
                debug!(gate = %self.name, "wait for slot cancelled");
                Err(GateError::Cancelled { gate: self.name.clone() })
            }
            out = fut => Ok(out),
            _ = expired => {
                let waited = started.elapsed();
                warn!(gate = %self.name, waited_ms = waited.as_millis() as u64, "timed out waiting for slot");
                Err(GateError::Timeout { gate: self.name.clone(), waited })
            }
        }
    }
}

impl std::fmt::Debug for PacingGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacingGate")
            .field("name", &self.name)
            .field("budget", &self.budget)
            .finish()
    }
}

/// Named gates sharing one rate budget, created on first use.
///
/// Each name gets its own independent cadence.
#[derive(Debug, Clone)]
pub struct GateRegistry {
    budget: RateBudget,
    gates: Arc<DashMap<String, Arc<PacingGate>>>,
}

impl GateRegistry {
    pub fn new(budget: RateBudget) -> Self {
        Self {
            budget,
            gates: Arc::new(DashMap::new()),
        }
    }

    pub fn from_settings(settings: &GateSettings) -> Self {
        Self::new(RateBudget::from_settings(settings))
    }

    pub fn budget(&self) -> RateBudget {
        self.budget
    }

    /// The gate called `name`, created if it does not exist yet.
    pub fn gate(&self, name: &str) -> Arc<PacingGate> {
        if let Some(gate) = self.gates.get(name) {
            return Arc::clone(gate.value());
        }
        let gate = self
            .gates
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(PacingGate::new(name, self.budget)));
        Arc::clone(gate.value())
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

impl Default for GateRegistry {
    fn default() -> Self {
        Self::new(RateBudget::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(rps: u32) -> RateBudget {
        RateBudget::per_second(NonZeroU32::new(rps).unwrap())
    }

    #[test]
    fn test_rate_budget_parse_falls_back() {
        assert_eq!(RateBudget::parse(Some("-1")).requests_per_second(), 10);
        assert_eq!(RateBudget::parse(Some("4")).cadence(), Duration::from_millis(250));
        assert_eq!(RateBudget::default().requests_per_second(), 10);
    }

    #[tokio::test]
    async fn test_first_slot_is_immediate_and_no_burst() {
        let gate = PacingGate::new("test", budget(5));
        let started = std::time::Instant::now();
        gate.acquire().await;
        assert!(started.elapsed() < Duration::from_millis(100));

        // The second slot waits one full cadence (200ms) even though the gate
        // was idle before.
        gate.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_acquire_within_times_out() {
        let gate = PacingGate::new("slow", budget(1));
        gate.acquire().await;

        let err = gate.acquire_within(Duration::from_millis(50)).await.unwrap_err();
        match err {
            GateError::Timeout { gate, waited } => {
                assert_eq!(gate, "slow");
                assert!(waited >= Duration::from_millis(40));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_wait() {
        let gate = PacingGate::new("slow", budget(1));
        gate.acquire().await;

        let token = CancellationToken::new();
        token.cancel();
        let err = gate.acquire_cancellable(&token, None).await.unwrap_err();
        assert_eq!(
            err,
            GateError::Cancelled {
                gate: "slow".to_string()
            }
        );
    }

    #[test]
    fn test_registry_reuses_gates() {
        let registry = GateRegistry::new(budget(3));
        let a = registry.gate("auth");
        let b = registry.gate("auth");
        let c = registry.gate("posts");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len(), 2);
        assert_eq!(c.budget().requests_per_second(), 3);
    }
}
