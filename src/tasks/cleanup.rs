//! Expiry Reaper
//!
//! Background task that periodically removes expired L1 entries. Reads
//! already treat expired entries as absent; the reaper only bounds memory.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::TieredCache;

/// Spawns a background task that purges expired L1 entries every
/// `cleanup_interval_secs` seconds.
///
/// Each pass works shard by shard under short-lived locks, so request
/// handling is never blocked for the length of a sweep.
///
/// Returns the task handle; abort it during graceful shutdown.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(cache.clone(), 1);
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: TieredCache, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            "starting expiry reaper"
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_expired();
            if removed > 0 {
                info!(removed, "expiry reaper removed expired entries");
            } else {
                debug!("expiry reaper found nothing to remove");
            }
        }
    })
}
