use std::sync::Weak;
use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at, Instant};

use super::UpdateCoordinator;

/// Drives timer-based refreshes every `period`.
///
/// The first tick is one full period after startup, since startup
/// performs its own refresh. Ticks go through the debounced entry
/// point like every other trigger.
///
/// The task ends on its own once the coordinator is dropped.
pub fn spawn_interval(coordinator: Weak<UpdateCoordinator>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let Some(coordinator) = coordinator.upgrade() else {
                break;
            };
            debug!("Scan interval elapsed, requesting refresh");
            coordinator.request_refresh();
        }
    })
}
