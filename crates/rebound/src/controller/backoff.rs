use async_trait::async_trait;
use std::time::Duration;
use tracing::trace;

use super::{AbortHandle, Controller};
use crate::backoff::BackoffConfig;

/// Controller that counts attempts against a [`BackoffConfig`] budget and
/// sleeps for the formula's delay between attempts.
///
/// # Examples
///
/// ```rust
/// use rebound::prelude::*;
/// use std::time::Duration;
///
/// let policy = BackoffConfig::constant(2, Duration::from_millis(5)).unwrap();
/// let mut controller = policy.new_controller();
///
/// assert!(controller.should_try());
/// controller.notify_attempt_completed();
/// assert!(controller.should_try());
/// controller.notify_attempt_completed();
/// assert!(!controller.should_try());
/// ```
#[derive(Debug)]
pub struct BackoffController {
    config: BackoffConfig,
    attempts: u32,
    abort: AbortHandle,
}

impl BackoffController {
    /// Create a controller with zeroed state.
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
            abort: AbortHandle::new(),
        }
    }

    /// The formula this controller follows.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}

#[async_trait]
impl Controller for BackoffController {
    fn should_try(&self) -> bool {
        !self.abort.is_aborted() && self.attempts < self.config.max_attempts()
    }

    fn notify_attempt_completed(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn next_delay(&self) -> Duration {
        self.config.delay_for(self.attempts)
    }

    async fn pause(&mut self) {
        debug_assert!(self.should_try(), "pause() called after retrying stopped");
        let delay = self.next_delay();
        trace!(attempts = self.attempts, ?delay, "pausing before next attempt");
        tokio::time::sleep(delay).await;
        trace!(attempts = self.attempts, "pause finished");
    }

    fn abort_handle(&self) -> &AbortHandle {
        &self.abort
    }

    fn fresh(&self) -> Self {
        Self::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::StopReason;
    use proptest::prelude::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn policy(max_attempts: u32) -> BackoffConfig {
        BackoffConfig::builder()
            .max_attempts(max_attempts)
            .base(2.0)
            .scaling(Duration::from_millis(10))
            .y_offset(Duration::from_millis(10))
            .per_attempt_cap(Duration::from_millis(50))
            .build()
            .unwrap()
    }

    #[test]
    fn should_try_is_a_pure_query() {
        let controller = policy(1).new_controller();
        for _ in 0..10 {
            assert!(controller.should_try());
        }
        assert_eq!(controller.attempts(), 0);
    }

    #[test]
    fn abort_is_immediate_and_terminal() {
        let mut controller = policy(5).new_controller();
        controller.notify_attempt_completed();
        controller.abort();
        assert!(!controller.should_try());
        assert!(controller.is_aborted());

        controller.abort();
        controller.notify_attempt_completed();
        assert!(!controller.should_try());
        assert_eq!(controller.abort_handle().reason(), Some(StopReason::Aborted));
    }

    #[test]
    fn next_delay_follows_completed_attempts() {
        let mut controller = policy(5).new_controller();
        let mut seen = Vec::new();
        for _ in 0..4 {
            controller.notify_attempt_completed();
            seen.push(controller.next_delay());
        }
        let ms = Duration::from_millis;
        assert_eq!(seen, vec![ms(20), ms(30), ms(50), ms(50)]);
    }

    #[test]
    fn fresh_controller_has_zeroed_state() {
        let mut used = policy(2).new_controller();
        used.notify_attempt_completed();
        used.abort();

        let fresh = used.fresh();
        assert_eq!(fresh.attempts(), 0);
        assert!(fresh.should_try());
        assert_eq!(fresh.config(), used.config());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_traces_start_and_finish() {
        let logs = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(logs.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut controller = policy(5).new_controller();
        controller.notify_attempt_completed();
        controller.pause().await;

        let text = logs.text();
        let started = text.find("pausing before next attempt").expect("start traced");
        let finished = text.find("pause finished").expect("finish traced");
        assert!(started < finished, "{text}");
    }

    proptest! {
        /// Property: the budget admits exactly `max` attempts, or fewer when
        /// aborted, and stays closed afterwards
        #[test]
        fn prop_budget_is_exact_and_abort_is_terminal(
            max in 1u32..64,
            abort_at in proptest::option::of(0u32..64),
        ) {
            let mut controller = policy(max).new_controller();
            let mut allowed = 0u32;
            loop {
                if abort_at == Some(allowed) {
                    controller.abort();
                }
                if !controller.should_try() {
                    break;
                }
                allowed += 1;
                controller.notify_attempt_completed();
            }

            let expected = abort_at.map_or(max, |at| at.min(max));
            prop_assert_eq!(allowed, expected);
            prop_assert_eq!(controller.attempts(), expected);

            controller.notify_attempt_completed();
            prop_assert!(!controller.should_try());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn pause_sleeps_for_next_delay() {
        let mut controller = policy(5).new_controller();
        controller.notify_attempt_completed();

        let start = tokio::time::Instant::now();
        controller.pause().await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(20) && elapsed < Duration::from_millis(21),
            "paused for {elapsed:?}"
        );
    }
}
