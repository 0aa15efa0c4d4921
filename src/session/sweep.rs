//! Process-wide inactivity sweep

use crate::session::manager::SessionManager;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Spawn the sweep timer; it runs until `shutdown` is cancelled
///
/// Every `sweep_interval` the manager deletes tracked sessions whose last
/// activity is older than the inactivity threshold.
pub fn spawn_sweep(manager: SessionManager, shutdown: CancellationToken) -> JoinHandle<()> {
    let configured = manager.config().sweep_interval();
    if configured < MIN_SWEEP_INTERVAL {
        warn!(
            interval_ms = configured.as_millis() as u64,
            "sweep interval too short, using one second"
        );
    }
    let period = configured.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = period.as_secs(),
            threshold_mins = manager.config().inactivity_minutes(),
            "inactivity sweep running"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let swept = manager.sweep_inactive().await;
                    if swept > 0 {
                        info!(swept, "inactive simulations deleted");
                    }
                }
            }
        }
        debug!("inactivity sweep stopped");
    })
}
