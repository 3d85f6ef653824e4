use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::clock::Clock;
use crate::core::state::AppState;
use crate::services::assignment_lifecycle;

/// Drives every live attempt's timer. Expired attempts are auto-submitted here even when the
/// student never sends another request, and idle ones are dropped from memory.
pub(crate) async fn session_ticker(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let session = state.settings().session();
    let idle = time::Duration::seconds(i64::try_from(session.idle_evict_seconds).unwrap_or(i64::MAX));
    let mut tick = interval(Duration::from_millis(session.tick_interval_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let report = state.sessions().tick_all().await;
                if report.auto_submitted > 0 || report.failed > 0 {
                    tracing::info!(
                        auto_submitted = report.auto_submitted,
                        failed = report.failed,
                        released = report.released,
                        "session tick"
                    );
                }
                state.sessions().evict_idle(state.clock().now(), idle).await;
            }
        }
    }

    tracing::info!("session ticker stopped");
}

/// Persists the closed status of assignments whose window has ended.
pub(crate) async fn assignment_sweep(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick =
        interval(Duration::from_secs(state.settings().assignment().sweep_interval_seconds));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let now = state.clock().now();
                if let Err(err) =
                    assignment_lifecycle::close_expired(state.catalog().as_ref(), now).await
                {
                    tracing::error!(error = %err, "close_expired_assignments failed");
                }
            }
        }
    }

    tracing::info!("assignment sweep stopped");
}
