// src/pipeline/watcher.rs
//
// Shared idle watcher. One task sweeps every registered camera on a fixed
// interval and finalizes any trajectory that has gone quiet, turning it
// into a hit event for that camera's viewers.

use crate::broadcast::EventBroadcaster;
use crate::events::CameraEvent;
use crate::pipeline::registry::CameraRegistry;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

pub async fn idle_watcher(
    registry: Arc<CameraRegistry>,
    broadcaster: Arc<EventBroadcaster>,
    interval_ms: u64,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let now = Instant::now();

        for ctx in registry.all() {
            let polygon = ctx.calibrator.polygon();
            // one guard across the idle check and finalize, so an ingest
            // cannot slip in between them
            let tip = {
                let mut tracker = ctx.tracker();
                if !tracker.is_idle(now) {
                    continue;
                }
                tracker.finalize(now, polygon.as_ref())
            };
            if let Some(tip) = tip {
                info!(camera = %ctx.id, x = tip.x, y = tip.y, "hit detected");
                broadcaster.publish(&ctx.id, &CameraEvent::Hit { tip }, ctx.frame_size());
            }
        }
    }
}
