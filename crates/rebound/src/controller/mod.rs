//! Per-call retry controllers.
//!
//! A [`Controller`] owns the mutable state of exactly one retry call: how many
//! attempts have completed and whether the call was aborted. It answers two
//! questions for the executor: "should I try again?" and "how long do I wait?".
//!
//! # Key Types
//!
//! - [`Controller`] - Capability trait driven by [`execute`](crate::retry::execute)
//! - [`BackoffController`] - Controller backed by a [`BackoffConfig`](crate::backoff::BackoffConfig)
//! - [`Cancellable`] - Wrapper whose pauses race a [`CancelSignal`]
//! - [`AbortHandle`] / [`Attempt`] - Shared abort flag handed to the operation
//!
//! # State machine
//!
//! ```text
//! Idle(0) --notify--> Trying(1) --notify--> ... --notify--> Trying(max)   (should_try = false)
//!    \                   |                                     |
//!     `------------------+---------------- abort --------------+--> Aborted (terminal)
//! ```

mod backoff;
mod cancellable;

pub use backoff::BackoffController;
pub use cancellable::{CancelSignal, Cancellable, Deadline};

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Why a retry call stopped without succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// Every attempt in the budget was used.
    Exhausted,
    /// [`Controller::abort`] or [`AbortHandle::abort`] was called.
    Aborted,
    /// A [`CancelSignal`] fired while pausing between attempts.
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Exhausted => "budget exhausted",
            StopReason::Aborted => "aborted",
            StopReason::Cancelled => "cancelled",
        })
    }
}

const RUNNING: u8 = 0;
const ABORTED: u8 = 1;
const CANCELLED: u8 = 2;

/// Shared, monotonic abort flag of one retry call.
///
/// Clones observe and mutate the same flag, so an abort issued from inside the
/// operation (or from another task) is seen by the executor immediately. The
/// first stop reason recorded wins; later calls are no-ops.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    state: Arc<AtomicU8>,
}

impl AbortHandle {
    /// Create a handle in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the retry call: no further attempts and no further pauses.
    pub fn abort(&self) {
        self.stop(ABORTED);
    }

    pub(crate) fn cancel(&self) {
        self.stop(CANCELLED);
    }

    fn stop(&self, to: u8) {
        let _ = self
            .state
            .compare_exchange(RUNNING, to, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Whether the call has been aborted or cancelled.
    pub fn is_aborted(&self) -> bool {
        self.state.load(Ordering::Acquire) != RUNNING
    }

    /// The recorded stop reason, if the call was stopped early.
    pub fn reason(&self) -> Option<StopReason> {
        match self.state.load(Ordering::Acquire) {
            ABORTED => Some(StopReason::Aborted),
            CANCELLED => Some(StopReason::Cancelled),
            _ => None,
        }
    }
}

/// Context handed to the retried operation for a single attempt.
///
/// Carries the 1-based attempt number and the call's [`AbortHandle`].
#[derive(Debug, Clone)]
pub struct Attempt {
    number: u32,
    abort: AbortHandle,
}

impl Attempt {
    pub(crate) fn new(number: u32, abort: AbortHandle) -> Self {
        Self { number, abort }
    }

    /// 1-based index of this attempt.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Whether this is the first attempt of the call.
    pub fn is_first(&self) -> bool {
        self.number == 1
    }

    /// Stop retrying after this attempt. A failure returned by this attempt is
    /// still recorded, but no pause and no further attempt follow.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// The call's abort handle, for passing to other tasks.
    pub fn abort_handle(&self) -> &AbortHandle {
        &self.abort
    }
}

/// Mutable per-call state behind the try/wait protocol.
///
/// The executor drives a controller in a fixed order:
///
/// 1. [`should_try`](Self::should_try) before every attempt;
/// 2. [`notify_attempt_completed`](Self::notify_attempt_completed) exactly once
///    after each attempt returns;
/// 3. [`pause`](Self::pause) only after a failure and only while
///    `should_try()` still holds.
///
/// Implementations are never reused across calls; use [`fresh`](Self::fresh)
/// to obtain a zeroed controller with the same configuration.
#[async_trait]
pub trait Controller: Send {
    /// Whether another attempt is allowed. Pure query.
    ///
    /// The executor checks [`abort_handle`](Self::abort_handle) before this,
    /// so an aborted or cancelled call stops even if this only counts attempts.
    fn should_try(&self) -> bool;

    /// Record that one more attempt has completed.
    fn notify_attempt_completed(&mut self);

    /// Number of completed attempts.
    fn attempts(&self) -> u32;

    /// Pause that [`pause`](Self::pause) would insert right now.
    fn next_delay(&self) -> Duration;

    /// Wait before the next attempt.
    ///
    /// Must not be called once `should_try()` is false.
    async fn pause(&mut self) {
        tokio::time::sleep(self.next_delay()).await;
    }

    /// The abort flag shared with the operation.
    fn abort_handle(&self) -> &AbortHandle;

    /// Stop the call. Takes effect for the current decision and every later one.
    fn abort(&self) {
        self.abort_handle().abort();
    }

    /// Whether the call has been aborted or cancelled.
    fn is_aborted(&self) -> bool {
        self.abort_handle().is_aborted()
    }

    /// A new controller with the same configuration and zeroed state.
    fn fresh(&self) -> Self
    where
        Self: Sized;
}
