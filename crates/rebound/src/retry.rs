//! The retry loop.
//!
//! [`execute`] drives one operation with one [`Controller`]:
//!
//! ```text
//! while proceed(controller):
//!     outcome = operation(attempt)
//!     controller.notify_attempt_completed()
//!     Ok  -> return Ok(value)               (earlier failures are discarded)
//!     Err -> record failure
//!            stop if !proceed(controller)   (budget used up or aborted)
//!            controller.pause()
//! ```
//!
//! `proceed` reads the controller's [`AbortHandle`](crate::controller::AbortHandle)
//! before asking `should_try()`, so a controller whose `should_try` only counts
//! attempts still stops once aborted or cancelled.

use std::future::Future;
use tracing::{debug, trace};

use crate::backoff::BackoffConfig;
use crate::controller::{Attempt, CancelSignal, Controller, StopReason};
use crate::error::Failures;

/// Run `operation` until it succeeds or `controller` stops allowing attempts.
///
/// The controller is consumed: its state belongs to this call alone. Each
/// attempt receives an [`Attempt`] sharing the controller's abort flag, so
/// calling [`Attempt::abort`] stops the loop right after that attempt without
/// pausing; a failure returned by the aborting attempt is still recorded.
///
/// # Returns
/// - `Ok(T)`: the first successful attempt's value
/// - `Err(Failures<E>)`: every failure in attempt order, plus the [`StopReason`]
///
/// If the controller refuses the very first attempt the operation is never
/// invoked and the returned [`Failures`] is empty.
///
/// # Examples
///
/// ```rust
/// use rebound::prelude::*;
/// use std::time::Duration;
///
/// # async fn example() {
/// let policy = BackoffConfig::constant(5, Duration::from_millis(1)).unwrap();
///
/// let failures = execute(policy.new_controller(), |attempt| async move {
///     if attempt.number() == 2 {
///         // Not worth retrying: stop now, keep the error.
///         attempt.abort();
///     }
///     Err::<(), _>(std::io::Error::other("refused"))
/// })
/// .await
/// .unwrap_err();
///
/// assert_eq!(failures.len(), 2);
/// assert_eq!(failures.reason(), StopReason::Aborted);
/// # }
/// ```
pub async fn execute<C, F, Fut, T, E>(mut controller: C, mut operation: F) -> Result<T, Failures<E>>
where
    C: Controller,
    F: FnMut(Attempt) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    // Created on the first failure only.
    let mut failures: Option<Failures<E>> = None;

    while proceed(&controller) {
        let attempt = Attempt::new(
            controller.attempts().saturating_add(1),
            controller.abort_handle().clone(),
        );
        let number = attempt.number();

        let outcome = operation(attempt).await;
        controller.notify_attempt_completed();

        match outcome {
            Ok(value) => {
                trace!(attempt = number, "attempt succeeded");
                return Ok(value);
            }
            Err(err) => {
                failures.get_or_insert_with(Failures::new).push(err);
                if !proceed(&controller) {
                    break;
                }
                debug!(
                    attempt = number,
                    delay = ?controller.next_delay(),
                    "attempt failed, backing off"
                );
                controller.pause().await;
            }
        }
    }

    let reason = controller
        .abort_handle()
        .reason()
        .unwrap_or(StopReason::Exhausted);
    let failures = failures.unwrap_or_else(Failures::new).stopped(reason);
    debug!(
        %reason,
        attempts = controller.attempts(),
        failures = failures.len(),
        "retrying stopped"
    );
    Err(failures)
}

fn proceed<C: Controller>(controller: &C) -> bool {
    !controller.abort_handle().is_aborted() && controller.should_try()
}

impl BackoffConfig {
    /// Run `operation` under a fresh controller built from this configuration.
    ///
    /// The configuration can seed any number of independent calls, including
    /// concurrent ones.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rebound::backoff::BackoffConfig;
    /// use std::time::Duration;
    ///
    /// # async fn example() {
    /// let policy = BackoffConfig::base2(3, Duration::from_millis(1)).unwrap();
    /// let value = policy
    ///     .retry(|attempt| async move {
    ///         if attempt.is_first() { Err("cold cache") } else { Ok(7) }
    ///     })
    ///     .await
    ///     .unwrap();
    /// assert_eq!(value, 7);
    /// # }
    /// ```
    pub async fn retry<F, Fut, T, E>(&self, operation: F) -> Result<T, Failures<E>>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        execute(self.new_controller(), operation).await
    }

    /// Like [`retry`](Self::retry), but every pause races `signal`.
    ///
    /// When the signal fires during a pause the call stops with
    /// [`StopReason::Cancelled`] and the failures recorded so far.
    pub async fn retry_until<S, F, Fut, T, E>(&self, signal: S, operation: F) -> Result<T, Failures<E>>
    where
        S: CancelSignal + Clone,
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        execute(self.new_cancellable(signal), operation).await
    }
}
