#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Retry execution with pluggable backoff controllers.
//!
//! This crate runs a fallible async operation until it succeeds, a retry
//! budget is used up, or the call is aborted, inserting a computed pause
//! between attempts:
//!
//! - **Backoff formulas** via [`BackoffConfig`](backoff::BackoffConfig)
//!   - constant, constant-with-scaling, base 2 and arbitrary-base exponential
//!   - optional per-attempt cap
//! - **Per-call controllers** via the [`Controller`](controller::Controller) trait
//!   - attempt counting and early abort from inside the operation
//!   - cancellable pauses racing a [`CancellationToken`](tokio_util::sync::CancellationToken)
//!     or a [`Deadline`](controller::Deadline)
//! - **Failure accumulation** via [`Failures`](error::Failures), returned when
//!   retrying stops without a success
//!
//! # Examples
//!
//! ```rust
//! use rebound::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = BackoffConfig::builder()
//!     .max_attempts(4)
//!     .base(2.0)
//!     .scaling(Duration::from_millis(100))
//!     .per_attempt_cap(Duration::from_secs(2))
//!     .build()?;
//!
//! let value = policy
//!     .retry(|_attempt| async { Ok::<_, std::io::Error>(42) })
//!     .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod controller;
pub mod error;
pub mod retry;

/// Convenient re-exports of commonly used items.
///
/// Import all core abstractions with:
///
/// ```rust
/// use rebound::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backoff::{BackoffConfig, BackoffConfigBuilder};
    pub use crate::controller::{
        AbortHandle, Attempt, BackoffController, CancelSignal, Cancellable, Controller, Deadline,
        StopReason,
    };
    pub use crate::error::{ConfigError, Failures};
    pub use crate::retry::execute;
}
