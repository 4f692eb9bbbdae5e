//! Pauses that race an external cancellation signal.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{AbortHandle, Controller};

/// Far-future fallback for deadlines whose instant would overflow.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// External, read-only cancellation capability.
///
/// The retry machinery only observes a signal; it never creates, owns or
/// triggers one.
#[async_trait]
pub trait CancelSignal: Send + Sync {
    /// Resolve once the signal has fired. Must resolve immediately if it
    /// already has.
    async fn cancelled(&self);

    /// Whether the signal has already fired.
    fn is_cancelled(&self) -> bool;
}

#[async_trait]
impl CancelSignal for CancellationToken {
    async fn cancelled(&self) {
        CancellationToken::cancelled(self).await;
    }

    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }
}

/// Signal that fires at a fixed point in time.
///
/// Uses [`tokio::time::Instant`], so it follows a paused test clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Fire at `at`.
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// Fire once `timeout` has elapsed from now.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { at }
    }

    /// The instant this deadline fires.
    pub fn instant(&self) -> Instant {
        self.at
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

#[async_trait]
impl CancelSignal for Deadline {
    async fn cancelled(&self) {
        tokio::time::sleep_until(self.at).await;
    }

    fn is_cancelled(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Controller wrapper whose pauses end early when a [`CancelSignal`] fires.
///
/// Every pause of the inner controller is raced against the signal:
///
/// - signal first: the call is stopped with
///   [`StopReason::Cancelled`](super::StopReason::Cancelled) and the pause
///   returns at once, so `should_try()` reports `false` afterwards;
/// - pause first: returns normally, as if no signal had been supplied.
///
/// The total time a call spends pausing therefore never runs past the
/// signal. The signal is not consulted while the operation itself runs.
///
/// # Examples
///
/// ```rust
/// use rebound::prelude::*;
/// use std::time::Duration;
///
/// # async fn example() {
/// let policy = BackoffConfig::constant(100, Duration::from_millis(10)).unwrap();
/// let controller = policy.new_cancellable(Deadline::after(Duration::from_millis(35)));
///
/// let failures = execute(controller, |_| async { Err::<(), _>("down") })
///     .await
///     .unwrap_err();
/// assert_eq!(failures.reason(), StopReason::Cancelled);
/// # }
/// ```
#[derive(Debug)]
pub struct Cancellable<C, S> {
    inner: C,
    signal: S,
}

impl<C, S> Cancellable<C, S>
where
    C: Controller,
    S: CancelSignal,
{
    /// Wrap `inner` so its pauses race `signal`.
    pub fn new(inner: C, signal: S) -> Self {
        Self { inner, signal }
    }

    /// The signal pauses race against.
    pub fn signal(&self) -> &S {
        &self.signal
    }

    /// The wrapped controller.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Unwrap into the inner controller.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

#[async_trait]
impl<C, S> Controller for Cancellable<C, S>
where
    C: Controller,
    S: CancelSignal + Clone,
{
    fn should_try(&self) -> bool {
        self.inner.should_try()
    }

    fn notify_attempt_completed(&mut self) {
        self.inner.notify_attempt_completed();
    }

    fn attempts(&self) -> u32 {
        self.inner.attempts()
    }

    fn next_delay(&self) -> Duration {
        self.inner.next_delay()
    }

    async fn pause(&mut self) {
        let abort: AbortHandle = self.inner.abort_handle().clone();
        let attempts = self.inner.attempts();
        if self.signal.is_cancelled() {
            debug!(attempts, "signal already fired, skipping pause");
            abort.cancel();
            return;
        }

        let delay = self.inner.next_delay();
        tokio::select! {
            biased;
            () = self.signal.cancelled() => {
                debug!(attempts, ?delay, "signal fired during pause");
                abort.cancel();
            }
            () = self.inner.pause() => {
                trace!(?delay, "pause completed before signal");
            }
        }
    }

    fn abort_handle(&self) -> &AbortHandle {
        self.inner.abort_handle()
    }

    fn fresh(&self) -> Self {
        Self {
            inner: self.inner.fresh(),
            signal: self.signal.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffConfig;
    use crate::controller::StopReason;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn capped_base2(max_attempts: u32) -> BackoffConfig {
        BackoffConfig::builder()
            .max_attempts(max_attempts)
            .base(2.0)
            .scaling(ms(10))
            .y_offset(ms(10))
            .per_attempt_cap(ms(50))
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_complete_before_deadline() {
        let mut controller = capped_base2(10).new_cancellable(Deadline::after(ms(205)));
        let start = Instant::now();
        let mut waits = Vec::new();

        for _ in 0..4 {
            controller.notify_attempt_completed();
            let before = Instant::now();
            controller.pause().await;
            waits.push(before.elapsed().as_millis());
        }

        assert_eq!(waits, vec![20, 30, 50, 50]);
        assert!(start.elapsed() <= ms(205));
        assert!(controller.should_try());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cuts_pause_short() {
        let mut controller = capped_base2(10).new_cancellable(Deadline::after(ms(105)));
        let start = Instant::now();

        for _ in 0..4 {
            controller.notify_attempt_completed();
            controller.pause().await;
            if !controller.should_try() {
                break;
            }
        }

        // 20 + 30 + 50 = 100ms of full pauses, the fourth is cut at 105ms.
        let elapsed = start.elapsed();
        assert!(elapsed >= ms(105) && elapsed < ms(106), "elapsed {elapsed:?}");
        assert!(!controller.should_try());
        assert_eq!(controller.abort_handle().reason(), Some(StopReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn token_cancelled_before_pause_skips_it() {
        let token = CancellationToken::new();
        let mut controller = BackoffConfig::constant(3, Duration::from_secs(10))
            .unwrap()
            .new_cancellable(token.clone());
        controller.notify_attempt_completed();
        token.cancel();

        let start = Instant::now();
        controller.pause().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!controller.should_try());
    }

    #[tokio::test(start_paused = true)]
    async fn token_cancelled_from_another_task() {
        let token = CancellationToken::new();
        let mut controller = BackoffConfig::constant(3, Duration::from_secs(10))
            .unwrap()
            .new_cancellable(token.clone());
        controller.notify_attempt_completed();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(ms(250)).await;
            token.cancel();
        });

        let start = Instant::now();
        controller.pause().await;
        canceller.await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= ms(250) && elapsed < ms(251), "elapsed {elapsed:?}");
        assert_eq!(controller.abort_handle().reason(), Some(StopReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_keeps_signal_and_resets_state() {
        let token = CancellationToken::new();
        let mut controller = capped_base2(2).new_cancellable(token.clone());
        controller.notify_attempt_completed();
        controller.abort();

        let fresh = controller.fresh();
        assert_eq!(fresh.attempts(), 0);
        assert!(fresh.should_try());

        token.cancel();
        assert!(fresh.signal().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_at_fixed_instant() {
        let at = Instant::now() + ms(40);
        let deadline = Deadline::at(at);
        assert_eq!(deadline.instant(), at);
        assert_eq!(deadline.remaining(), ms(40));
        assert!(!deadline.is_cancelled());

        tokio::time::advance(ms(40)).await;
        assert!(deadline.is_cancelled());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn wrapper_exposes_inner_controller() {
        let mut controller = capped_base2(4).new_cancellable(CancellationToken::new());
        controller.notify_attempt_completed();

        assert_eq!(controller.inner().attempts(), 1);
        assert_eq!(controller.inner().config().max_attempts(), 4);

        let inner = controller.into_inner();
        assert_eq!(inner.attempts(), 1);
        assert!(inner.should_try());
    }

    #[test]
    fn deadline_after_huge_timeout_does_not_overflow() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(deadline.remaining() > Duration::from_secs(86_400));
    }
}
