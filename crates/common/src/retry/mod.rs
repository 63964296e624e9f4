//! Blocking retry loop used around storage transactions.

use std::{fmt::Debug, thread, time::Duration};

use tracing::*;

pub mod policies;
mod predicate;

pub use predicate::RetryPolicy;

/// Delay schedule between attempts.
pub trait Backoff {
    /// Delay before the first retry, in milliseconds.
    fn base_delay_ms(&self) -> u64;

    /// Delay following one of `curr_delay_ms`.
    fn next_delay_ms(&self, curr_delay_ms: u64) -> u64;
}

/// Runs `operation` until it succeeds, at most `max_retries + 1` times.
///
/// Errors matched by one of the `policy` rules are returned on the spot. Any
/// other error is retried after the next `backoff` delay; the last one is
/// returned once retries run out.
pub fn retry_with_policy<R, E, F>(
    name: &str,
    max_retries: u16,
    backoff: &impl Backoff,
    policy: &RetryPolicy<E>,
    operation: F,
) -> Result<R, E>
where
    F: FnMut() -> Result<R, E>,
    E: Debug,
{
    run_attempts(name, max_retries, backoff, policy, operation, thread::sleep)
}

fn run_attempts<R, E, F, S>(
    name: &str,
    max_retries: u16,
    backoff: &impl Backoff,
    policy: &RetryPolicy<E>,
    mut operation: F,
    mut sleep: S,
) -> Result<R, E>
where
    F: FnMut() -> Result<R, E>,
    E: Debug,
    S: FnMut(Duration),
{
    let mut attempt: u16 = 0;
    let mut delay_ms = backoff.base_delay_ms();

    loop {
        let err = match operation() {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if let Some(rule) = policy.matching_rule(&err) {
            debug!(%name, %rule, ?err, "not retrying excluded error");
            return Err(err);
        }
        if attempt >= max_retries {
            error!(%name, attempts = attempt + 1, ?err, "giving up after retries");
            return Err(err);
        }

        attempt += 1;
        warn!(%name, %attempt, ?err, %delay_ms, "operation failed, retrying");
        sleep(Duration::from_millis(delay_ms));
        delay_ms = backoff.next_delay_ms(delay_ms);
    }
}
