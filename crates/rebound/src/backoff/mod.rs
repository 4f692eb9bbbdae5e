//! Backoff formulas and their configuration.
//!
//! # Key Types
//!
//! - [`BackoffConfig`] - Immutable wait-time formula plus attempt budget
//! - [`BackoffConfigBuilder`] - Fluent construction with validation
//!
//! A [`BackoffConfig`] is shared read-only by any number of retry calls; each
//! call gets its own [`BackoffController`](crate::controller::BackoffController)
//! from [`BackoffConfig::new_controller`].

mod config;
mod load;

pub use config::{BackoffConfig, BackoffConfigBuilder};
