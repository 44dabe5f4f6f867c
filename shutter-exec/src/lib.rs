//! Shutter Exec - Concurrency Substrate
//!
//! - [`TaskCoordinator`]: runs a fixed set of independent tasks concurrently
//!   and joins them under a [`JoinPolicy`], cancelling siblings on early
//!   resolution.
//! - [`PacingGate`] / [`GateRegistry`]: admission control at a fixed cadence,
//!   with deadline- and cancellation-aware waits.

pub mod coordinator;
pub mod gate;
pub mod task;

pub use coordinator::{JoinPolicy, Settled, TaskCoordinator};
pub use gate::{GateRegistry, PacingGate, RateBudget};
pub use task::{Task, TaskContext};

// Re-exported so callers can build parent tokens without depending on
// tokio-util directly.
pub use tokio_util::sync::CancellationToken;
