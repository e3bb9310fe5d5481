//! Expiry sweeps for the memory store

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info};

use super::MemoryRepository;
use crate::host::Clock;

/// Remove expired items once, returning how many rows went away
pub async fn sweep(repo: &MemoryRepository, now_ms: i64) -> Result<u64> {
    let deleted = repo.delete_expired(now_ms).await?;
    if deleted > 0 {
        info!("Housekeeping removed {} expired memory items", deleted);
    } else {
        debug!("Housekeeping found nothing to remove");
    }
    Ok(deleted)
}

/// Sweep immediately and then on every interval, until the task is aborted.
///
/// A failed sweep is logged and retried on the next interval.
pub async fn run_housekeeping(repo: MemoryRepository, period: Duration, clock: Arc<dyn Clock>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        if let Err(e) = sweep(&repo, clock.now_ms()).await {
            error!("Housekeeping sweep failed: {:#}", e);
        }
    }
}
