//! Example: Retrying a flaky operation with rebound
//!
//! This example demonstrates:
//! 1. Exponential backoff with a per-attempt cap
//! 2. Aborting from inside the operation on a non-retryable error
//! 3. Bounding the whole call with a deadline
//! 4. Loading a policy from environment variables
//!
//! Run with:
//! ```bash
//! RUST_LOG=rebound=debug cargo run -p rebound --example retry_example
//! ```

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use rebound::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// A simulated service that fails the first few calls
struct FlakyService {
    calls: Arc<AtomicU32>,
    fail_count: u32,
}

impl FlakyService {
    fn new(fail_count: u32) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            fail_count,
        }
    }

    async fn call(&self) -> Result<String, std::io::Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_count {
            println!("  Call {call}: FAILED (simulated transient error)");
            Err(std::io::Error::other(format!("transient error on call {call}")))
        } else {
            println!("  Call {call}: SUCCESS");
            Ok("payload".to_string())
        }
    }

    fn total_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Example 1: exponential backoff, capped
async fn example_capped_exponential() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 1: Capped Exponential Backoff ===\n");

    let policy = BackoffConfig::builder()
        .max_attempts(5)
        .base(2.0)
        .scaling(Duration::from_millis(50))
        .per_attempt_cap(Duration::from_millis(150))
        .build()?;

    for n in 1..=4 {
        println!("  delay after attempt {n}: {:?}", policy.delay_for(n));
    }

    let service = FlakyService::new(3);
    let start = Instant::now();
    let value = policy.retry(|_| service.call()).await?;

    println!("\nResult: {value}");
    println!("Total calls: {}", service.total_calls());
    println!("Total time: {:?}", start.elapsed());
    println!("Expected pauses: 50ms + 100ms + 150ms (capped) = ~300ms");

    Ok(())
}

/// Example 2: stop early when an error is not worth retrying
async fn example_abort() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 2: Abort on a Non-Retryable Error ===\n");

    let policy = BackoffConfig::constant(5, Duration::from_millis(100))?;

    let result = policy
        .retry(|attempt| async move {
            let err = if attempt.number() < 2 {
                std::io::Error::other("connection reset")
            } else {
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "auth failed")
            };
            if err.kind() == std::io::ErrorKind::PermissionDenied {
                println!("  Attempt {}: not retryable, aborting", attempt.number());
                attempt.abort();
            } else {
                println!("  Attempt {}: retryable, backing off", attempt.number());
            }
            Err::<(), _>(err)
        })
        .await;

    let failures = result.expect_err("every attempt fails");
    println!("\n{failures}");
    assert_eq!(failures.reason(), StopReason::Aborted);
    assert_eq!(failures.len(), 2);

    Ok(())
}

/// Example 3: a deadline and a token bound the time spent pausing
async fn example_cancellation() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 3: Deadline and Token Cancellation ===\n");

    let policy = BackoffConfig::base2(50, Duration::from_millis(20))?;

    let start = Instant::now();
    let failures = policy
        .retry_until(Deadline::after(Duration::from_millis(250)), |attempt| async move {
            Err::<(), _>(format!("still down (attempt {})", attempt.number()))
        })
        .await
        .expect_err("the service never recovers");
    println!(
        "Deadline: stopped after {} attempts in {:?} ({})",
        failures.len(),
        start.elapsed(),
        failures.reason()
    );

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        println!("  shutdown requested");
        trigger.cancel();
    });

    let failures = policy
        .retry_until(token, |_| async { Err::<(), _>("still down") })
        .await
        .expect_err("the service never recovers");
    println!(
        "Token: stopped after {} attempts ({})",
        failures.len(),
        failures.reason()
    );

    Ok(())
}

/// Example 4: policy from the environment
fn example_from_env() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 4: Policy From Environment ===\n");

    // Reads REBOUND_MAX_ATTEMPTS, REBOUND_BASE, REBOUND_SCALING_US,
    // REBOUND_Y_OFFSET_US and REBOUND_PER_ATTEMPT_CAP_US.
    let policy = BackoffConfig::from_env("REBOUND")?;
    println!("  max_attempts: {}", policy.max_attempts());
    println!("  first pause:  {:?}", policy.delay_for(1));

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("==============================================");
    println!("   Rebound: Retry Examples");
    println!("==============================================");

    example_capped_exponential().await?;
    example_abort().await?;
    example_cancellation().await?;
    example_from_env()?;

    println!("\n==============================================");
    println!("   All examples completed successfully!");
    println!("==============================================\n");

    Ok(())
}
