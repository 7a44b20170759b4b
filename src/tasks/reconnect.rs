//! Distributed Layer Reconnect
//!
//! When the distributed store is configured but unreachable at startup,
//! the server keeps serving from L1 and this task keeps trying to connect
//! in the background. The store is attached to the cache on first success.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{DistributedStore, TieredCache};
use crate::error::Result;

/// Upper bound on the wait between two attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Spawns a task that calls `connect` until it succeeds, then attaches the
/// store to `cache`. The wait starts at `first_delay` and doubles after each
/// failure, up to [`MAX_RETRY_DELAY`].
///
/// Returns the task handle; abort it during graceful shutdown.
pub fn spawn_distributed_connector<F, Fut>(
    cache: TieredCache,
    first_delay: Duration,
    connect: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn DistributedStore>>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut delay = first_delay.max(Duration::from_millis(1));
        let mut attempt: u32 = 0;

        loop {
            tokio::time::sleep(delay).await;
            attempt += 1;

            match connect().await {
                Ok(store) => {
                    if !cache.attach_distributed(store) {
                        debug!(attempt, "distributed cache already attached");
                    }
                    return;
                }
                Err(e) if attempt == 1 => {
                    warn!(error = %e, "distributed cache still unreachable, retrying in background");
                }
                Err(e) => {
                    debug!(attempt, error = %e, "distributed cache still unreachable");
                }
            }

            delay = (delay * 2).min(MAX_RETRY_DELAY);
        }
    })
}
