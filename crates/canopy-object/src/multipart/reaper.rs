use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::multipart::registry::UploadRegistry;

/// Background sweep that aborts upload sessions idle past the configured
/// retention window. Failures are logged per session and never stop the
/// loop.
pub fn spawn_reaper(registry: Arc<UploadRegistry>) -> JoinHandle<()> {
    let interval = registry.config.reap_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let reaped = registry.reap_idle().await;
            if reaped > 0 {
                debug!(reaped, "aborted idle upload sessions");
            }
        }
    })
}
