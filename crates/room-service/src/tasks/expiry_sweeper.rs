//! Expiry sweeper background task.
//!
//! The store drops a room silently when its TTL lapses. This task notices
//! that on behalf of the fan-out hub: it periodically asks the hub for rooms
//! past their deadline and runs them through the normal destroy path with
//! reason `expired`, so subscribers see the same terminal event as for an
//! explicit destroy.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is triggered, after finishing
//! the current sweep.

use crate::services::RoomLifecycle;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Start the expiry sweeper. Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "room.task.expiry_sweeper")]
pub async fn start_expiry_sweeper(
    lifecycle: RoomLifecycle,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "room.task.expiry_sweeper",
        interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        "Starting expiry sweeper"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_sweep(&lifecycle).await;
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "room.task.expiry_sweeper",
                    "Expiry sweeper received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "room.task.expiry_sweeper", "Expiry sweeper stopped");
}

/// Run a single sweep.
///
/// Separated from the loop so tests can drive it directly.
pub(crate) async fn run_sweep(lifecycle: &RoomLifecycle) {
    match lifecycle.sweep_expired(tokio::time::Instant::now()).await {
        Ok(0) => {}
        Ok(closed) => {
            info!(
                target: "room.task.expiry_sweeper",
                closed_count = closed,
                "Closed expired rooms"
            );
        }
        Err(e) => {
            tracing::error!(
                target: "room.task.expiry_sweeper",
                error = %e,
                "Expiry sweep failed"
            );
        }
    }
}
