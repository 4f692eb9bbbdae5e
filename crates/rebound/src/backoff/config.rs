//! Wait-time formula: `scaling * base^(n - 1) + y_offset`, optionally capped.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::load::RawBackoffConfig;
use crate::controller::{BackoffController, CancelSignal, Cancellable};
use crate::error::ConfigError;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Immutable description of a backoff formula and its attempt budget.
///
/// The pause inserted after the `n`-th completed attempt (`n >= 1`) is:
///
/// ```text
/// delay(n) = scaling * base^(n - 1) + y_offset
/// delay(n) = min(delay(n), per_attempt_cap)     if a cap is set
/// ```
///
/// The `base` selects one of four growth shapes:
///
/// | `base` | growth term           | resulting delay           |
/// |--------|-----------------------|---------------------------|
/// | `0`    | `0`                   | `y_offset` (fixed delay)  |
/// | `1`    | `scaling`             | `scaling + y_offset`      |
/// | `2`    | `scaling << (n - 1)`  | integer fast path         |
/// | other  | `scaling * base^(n-1)`| real-valued exponent      |
///
/// All arithmetic saturates at [`Duration::MAX`].
///
/// # Examples
///
/// ```rust
/// use rebound::backoff::BackoffConfig;
/// use std::time::Duration;
///
/// let policy = BackoffConfig::builder()
///     .max_attempts(5)
///     .base(2.0)
///     .scaling(Duration::from_secs(10))
///     .y_offset(Duration::from_secs(10))
///     .per_attempt_cap(Duration::from_secs(50))
///     .build()
///     .unwrap();
///
/// assert_eq!(policy.delay_for(1), Duration::from_secs(20));
/// assert_eq!(policy.delay_for(2), Duration::from_secs(30));
/// assert_eq!(policy.delay_for(3), Duration::from_secs(50));
/// assert_eq!(policy.delay_for(4), Duration::from_secs(50));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBackoffConfig", into = "RawBackoffConfig")]
pub struct BackoffConfig {
    max_attempts: u32,
    base: f64,
    scaling: Duration,
    y_offset: Duration,
    per_attempt_cap: Option<Duration>,
}

/// Shape of the exponent term, derived from `base`.
#[derive(Debug, Clone, Copy)]
enum Growth {
    Flat,
    Unit,
    PowerOfTwo,
    Power(f64),
}

impl Growth {
    fn of(base: f64) -> Self {
        if base == 0.0 {
            Growth::Flat
        } else if base == 1.0 {
            Growth::Unit
        } else if base == 2.0 {
            Growth::PowerOfTwo
        } else {
            Growth::Power(base)
        }
    }
}

impl BackoffConfig {
    /// Create a new builder for configuring a backoff formula.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rebound::backoff::BackoffConfig;
    /// use std::time::Duration;
    ///
    /// let policy = BackoffConfig::builder()
    ///     .max_attempts(3)
    ///     .y_offset(Duration::from_millis(250))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(policy.delay_for(7), Duration::from_millis(250));
    /// ```
    pub fn builder() -> BackoffConfigBuilder {
        BackoffConfigBuilder::default()
    }

    /// Fixed delay between attempts: `base = 0`, `y_offset = wait`.
    pub fn constant(max_attempts: u32, wait: Duration) -> Result<Self, ConfigError> {
        Self::builder()
            .max_attempts(max_attempts)
            .base(0.0)
            .y_offset(wait)
            .build()
    }

    /// Exponential growth `scaling * base^(n - 1)` with no offset and no cap.
    pub fn exponential(max_attempts: u32, base: f64, scaling: Duration) -> Result<Self, ConfigError> {
        Self::builder()
            .max_attempts(max_attempts)
            .base(base)
            .scaling(scaling)
            .build()
    }

    /// Doubling delay `scaling * 2^(n - 1)` with no offset and no cap.
    pub fn base2(max_attempts: u32, scaling: Duration) -> Result<Self, ConfigError> {
        Self::exponential(max_attempts, 2.0, scaling)
    }

    /// Maximum number of attempts a retry call may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Base of the exponent term.
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Multiplier applied to the exponent term.
    pub fn scaling(&self) -> Duration {
        self.scaling
    }

    /// Duration added to every delay.
    pub fn y_offset(&self) -> Duration {
        self.y_offset
    }

    /// Upper bound on any single delay, if set.
    pub fn per_attempt_cap(&self) -> Option<Duration> {
        self.per_attempt_cap.filter(|cap| !cap.is_zero())
    }

    /// Compute the pause that follows the `attempts_so_far`-th completed attempt.
    ///
    /// Pure and deterministic. The exponent is floored at zero, so
    /// `delay_for(0) == delay_for(1)`.
    pub fn delay_for(&self, attempts_so_far: u32) -> Duration {
        let exponent = attempts_so_far.saturating_sub(1);
        let growth = match Growth::of(self.base) {
            Growth::Flat => Duration::ZERO,
            Growth::Unit => self.scaling,
            Growth::PowerOfTwo => shl_saturating(self.scaling, exponent),
            Growth::Power(base) => mul_f64_saturating(self.scaling, base.powf(f64::from(exponent))),
        };

        let delay = growth.saturating_add(self.y_offset);
        match self.per_attempt_cap() {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Create a fresh controller for one retry call.
    ///
    /// Every call gets zeroed state; the configuration itself is copied.
    pub fn new_controller(&self) -> BackoffController {
        BackoffController::new(*self)
    }

    /// Create a fresh controller whose pauses race against `signal`.
    pub fn new_cancellable<S>(&self, signal: S) -> Cancellable<BackoffController, S>
    where
        S: CancelSignal + Clone,
    {
        Cancellable::new(self.new_controller(), signal)
    }

    pub(crate) fn validated(self) -> Result<Self, ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if !self.base.is_finite() || self.base < 0.0 {
            return Err(ConfigError::InvalidBase(self.base));
        }
        Ok(Self {
            per_attempt_cap: self.per_attempt_cap(),
            ..self
        })
    }
}

impl Default for BackoffConfig {
    /// Three attempts with a fixed 100ms pause in between.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: 0.0,
            scaling: Duration::ZERO,
            y_offset: Duration::from_millis(100),
            per_attempt_cap: None,
        }
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    match u64::try_from(nanos / NANOS_PER_SEC) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}

fn shl_saturating(scaling: Duration, shift: u32) -> Duration {
    if scaling.is_zero() {
        return Duration::ZERO;
    }
    1u128
        .checked_shl(shift)
        .and_then(|factor| scaling.as_nanos().checked_mul(factor))
        .map_or(Duration::MAX, duration_from_nanos)
}

fn mul_f64_saturating(scaling: Duration, factor: f64) -> Duration {
    // Float-to-int `as` saturates: inf maps to u128::MAX, NaN (0 * inf) to 0.
    duration_from_nanos((scaling.as_nanos() as f64 * factor).round() as u128)
}

/// Builder for configuring a [`BackoffConfig`].
///
/// Unset fields fall back to [`BackoffConfig::default`], except that setting
/// any of `base`/`scaling` without `y_offset` leaves the offset at zero.
///
/// # Examples
///
/// ```rust
/// use rebound::backoff::BackoffConfig;
/// use std::time::Duration;
///
/// let policy = BackoffConfig::builder()
///     .max_attempts(5)
///     .base(3.0)
///     .scaling(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert_eq!(policy.delay_for(3), Duration::from_secs(90));
/// ```
#[derive(Debug, Default, Clone)]
pub struct BackoffConfigBuilder {
    max_attempts: Option<u32>,
    base: Option<f64>,
    scaling: Option<Duration>,
    y_offset: Option<Duration>,
    per_attempt_cap: Option<Duration>,
}

impl BackoffConfigBuilder {
    /// Set the attempt budget.
    ///
    /// Default: 3. Zero is rejected by [`build`](Self::build).
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the exponent base.
    ///
    /// Default: 0 (fixed delay). Must be finite and non-negative.
    pub fn base(mut self, base: f64) -> Self {
        self.base = Some(base);
        self
    }

    /// Set the multiplier applied to the exponent term.
    pub fn scaling(mut self, scaling: Duration) -> Self {
        self.scaling = Some(scaling);
        self
    }

    /// Set the duration added to every delay.
    pub fn y_offset(mut self, y_offset: Duration) -> Self {
        self.y_offset = Some(y_offset);
        self
    }

    /// Set the ceiling for any single delay. Zero means uncapped.
    pub fn per_attempt_cap(mut self, cap: Duration) -> Self {
        self.per_attempt_cap = Some(cap);
        self
    }

    /// Build and validate the [`BackoffConfig`].
    pub fn build(self) -> Result<BackoffConfig, ConfigError> {
        let defaults = BackoffConfig::default();
        let shaped = self.base.is_some() || self.scaling.is_some();
        let y_offset = match (self.y_offset, shaped) {
            (Some(offset), _) => offset,
            (None, true) => Duration::ZERO,
            (None, false) => defaults.y_offset,
        };

        BackoffConfig {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            base: self.base.unwrap_or(defaults.base),
            scaling: self.scaling.unwrap_or(defaults.scaling),
            y_offset,
            per_attempt_cap: self.per_attempt_cap,
        }
        .validated()
    }
}
