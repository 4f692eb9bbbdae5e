use std::error::Error;
use std::fmt;

use crate::controller::StopReason;

/// Ordered record of every failed attempt in one retry call.
///
/// Returned by [`execute`](crate::retry::execute) when retrying stops without a
/// success. Entries are kept in attempt order, one per failed attempt, and the
/// value is never modified after it reaches the caller.
///
/// # Examples
///
/// ```rust
/// use rebound::prelude::*;
/// use std::time::Duration;
///
/// # async fn example() {
/// let policy = BackoffConfig::constant(3, Duration::from_millis(1)).unwrap();
/// let failures = policy
///     .retry(|attempt| async move { Err::<(), _>(format!("boom #{}", attempt.number())) })
///     .await
///     .unwrap_err();
///
/// assert_eq!(failures.len(), 3);
/// assert_eq!(failures.last().map(String::as_str), Some("boom #3"));
/// assert_eq!(failures.reason(), StopReason::Exhausted);
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Failures<E> {
    errors: Vec<E>,
    reason: StopReason,
}

impl<E> Failures<E> {
    pub(crate) fn new() -> Self {
        Self {
            errors: Vec::new(),
            reason: StopReason::Exhausted,
        }
    }

    pub(crate) fn push(&mut self, error: E) {
        self.errors.push(error);
    }

    pub(crate) fn stopped(mut self, reason: StopReason) -> Self {
        self.reason = reason;
        self
    }

    /// Every recorded failure, oldest first.
    pub fn all(&self) -> &[E] {
        &self.errors
    }

    /// The most recent failure, usually the one worth reporting.
    ///
    /// `None` when nothing was recorded.
    pub fn last(&self) -> Option<&E> {
        self.errors.last()
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether no failure was recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Why retrying stopped.
    pub fn reason(&self) -> StopReason {
        self.reason
    }

    /// Iterate over the failures, oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.errors.iter()
    }

    /// Take ownership of the most recent failure.
    pub fn into_last(mut self) -> Option<E> {
        self.errors.pop()
    }

    /// Take ownership of every failure, oldest first.
    pub fn into_vec(self) -> Vec<E> {
        self.errors
    }
}

impl<E: fmt::Display> Failures<E> {
    /// Human-readable message naming the stop reason and joining every failure.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl<E: fmt::Display> fmt::Display for Failures<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return write!(f, "retrying stopped ({}) before any attempt", self.reason);
        }
        write!(
            f,
            "retrying stopped ({}) after {} failed attempt(s); encountered errors: ",
            self.reason,
            self.errors.len()
        )?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl<E: Error + 'static> Error for Failures<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.last().map(|err| err as &(dyn Error + 'static))
    }
}

impl<E> IntoIterator for Failures<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a, E> IntoIterator for &'a Failures<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}
