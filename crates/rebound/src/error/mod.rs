//! Error types: configuration errors and the per-call failure accumulator.

mod failures;

pub use failures::Failures;

use thiserror::Error;

/// Errors raised while building or loading a [`BackoffConfig`](crate::backoff::BackoffConfig).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// An attempt budget of zero would never run the operation.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// The exponent base is negative, infinite or NaN.
    #[error("backoff base must be finite and non-negative, got {0}")]
    InvalidBase(f64),

    /// An environment variable held a value that does not parse.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// Name of the offending variable
        var: String,
        /// Raw value found in the environment
        value: String,
    },
}
