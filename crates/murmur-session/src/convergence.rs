//! Broadcast convergence: retry-until-observed.
//!
//! The broadcast primitive is fire-and-forget; nothing confirms that any
//! peer saw a payload. This primitive converts that into a bounded-retry
//! confirmation: broadcast, then poll a local condition (typically "my
//! payload came back through the gossip layer") and re-broadcast until
//! the condition holds or the budget is gone.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::{Error, Result};

/// Budget of a convergence loop.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceParams {
    /// Condition checks (and re-broadcasts) before giving up.
    pub max_retries: u32,
    /// Sleep between checks.
    pub interval: Duration,
}

/// Broadcast once, then loop: sleep, check, re-broadcast.
///
/// Resolves when `condition` returns true; fails with
/// [`Error::ConvergenceTimeout`] when the budget is exhausted and with
/// [`Error::Cancelled`] when the shutdown channel fires. Broadcast
/// failures are logged and absorbed — the next round retries them.
pub async fn wait_for_broadcast<B, FB, E, C, FC>(
    params: &ConvergenceParams,
    mut shutdown: watch::Receiver<bool>,
    mut broadcast: B,
    mut condition: C,
) -> Result<()>
where
    B: FnMut() -> FB,
    FB: Future<Output = std::result::Result<(), E>>,
    E: Display,
    C: FnMut() -> FC,
    FC: Future<Output = bool>,
{
    if *shutdown.borrow() {
        return Err(Error::Cancelled);
    }
    if let Err(err) = broadcast().await {
        debug!(%err, "broadcast attempt failed");
    }

    for attempt in 1..=params.max_retries {
        tokio::select! {
            _ = tokio::time::sleep(params.interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return Err(Error::Cancelled);
                }
            }
        }

        if condition().await {
            debug!(attempt, "broadcast observed");
            return Ok(());
        }

        if attempt < params.max_retries {
            if let Err(err) = broadcast().await {
                debug!(%err, attempt, "broadcast attempt failed");
            }
        }
    }

    Err(Error::ConvergenceTimeout {
        retries: params.max_retries,
    })
}
