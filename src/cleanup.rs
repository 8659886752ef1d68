//! cleanup.rs — periodic expiry sweep for cooldown and dedup state.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::pipeline::ReportPipeline;

/// Default sweep cadence: every 10 minutes.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 600;

/// Spawn the background sweep task. Every lookup already checks expiry on
/// its own; this only bounds memory.
pub fn spawn_cleanup(pipeline: Arc<ReportPipeline>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        // The first tick fires immediately; skip it so a fresh process
        // doesn't sweep empty tables.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let (cooldowns, dedup) = pipeline.sweep();
            debug!(cooldowns, dedup, "expiry sweep tick");
        }
    })
}
