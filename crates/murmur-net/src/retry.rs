//! Flat-interval retry for unreliable network operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Run `op` up to `attempts` times, sleeping `delay` between attempts.
///
/// The interval is flat, not exponential; references into the storage
/// network either resolve within a few attempts or are dealt with by the
/// caller's ban accounting. Exhausting the budget returns the last error.
/// Re-entrant; carries no state across calls.
pub async fn retry<T, E, F, Fut>(
    label: &str,
    attempts: u32,
    delay: Duration,
    mut op: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                debug!(label, attempt, %err, "operation failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(label, attempt, %err, "operation failed, budget exhausted");
                return Err(err);
            }
        }
    }
}
