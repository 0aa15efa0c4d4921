//! Per-session poll loop
//!
//! Lives as long as its session is current and not Failed. It fetches state
//! only while the session is running or still loading, faster while running,
//! and gives up on loads that exceed the configured number of polls.

use crate::core::types::SessionId;
use crate::session::manager::SessionManager;
use crate::session::stage::LoadingStage;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub(crate) async fn run(manager: SessionManager, id: SessionId, stop: CancellationToken) {
    let config = manager.config().clone();
    let mut loading_polls: u32 = 0;
    debug!(session_id = %id, "poller started");

    loop {
        if stop.is_cancelled() {
            break;
        }
        let state = manager.snapshot();
        if !state.is_current(&id) || state.loading_stage == LoadingStage::Failed {
            break;
        }

        let interval = if state.running {
            config.running_poll_interval()
        } else {
            config.loading_poll_interval()
        };

        if state.is_pollable() {
            if !state.running {
                loading_polls += 1;
                if loading_polls > config.max_loading_polls {
                    manager.loading_timed_out(&id);
                    break;
                }
            }
            if !manager.poll_tick(&id).await {
                break;
            }
        }

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }

    debug!(session_id = %id, loading_polls, "poller stopped");
}
