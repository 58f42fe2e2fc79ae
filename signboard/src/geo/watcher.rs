//! Geo watcher: movement turns into "schedule is stale".
//!
//! The positioning driver broadcasts fixes on a tokio channel. The watcher
//! ignores unusable fixes, records the first valid one, and from then on
//! flags the schedule stale whenever the player has moved at least the
//! configured threshold from the last recorded position. A closed feed is
//! treated as the driver being disabled: the watcher keeps attempting to
//! resubscribe until shut down.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::GeoFix;
use crate::resolver::SharedScheduleState;

/// Delay between resubscription attempts when the feed is down.
const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Source of position subscriptions.
///
/// Called once at startup and again for every restart attempt after the
/// feed closes.
pub type SubscribeFn = Box<dyn Fn() -> broadcast::Receiver<GeoFix> + Send + Sync>;

/// Background task watching the position feed.
pub struct GeoWatcher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl GeoWatcher {
    /// Spawn the watcher on the current tokio runtime.
    ///
    /// `threshold_m` is the movement distance that marks the schedule stale.
    /// `on_stale` runs after a fix is accepted; wire it to the daemon's wake
    /// signal so movement re-resolves immediately instead of at the next
    /// tick.
    pub fn spawn(
        subscribe: SubscribeFn,
        state: SharedScheduleState,
        threshold_m: f64,
        on_stale: impl Fn() + Send + Sync + 'static,
        cancel: CancellationToken,
    ) -> Self {
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run(subscribe, state, threshold_m, on_stale, task_cancel).await;
        });

        Self { cancel, handle }
    }

    /// Stop the watcher.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait for the watcher task to finish.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

async fn run(
    subscribe: SubscribeFn,
    state: SharedScheduleState,
    threshold_m: f64,
    on_stale: impl Fn() + Send + Sync + 'static,
    cancel: CancellationToken,
) {
    info!(threshold_m, "geo watcher started");
    let mut rx = subscribe();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("geo watcher shutting down");
                break;
            }

            received = rx.recv() => match received {
                Ok(fix) => {
                    if !fix.is_valid() {
                        debug!("ignoring unusable fix");
                        continue;
                    }
                    if state.record_position(fix, threshold_m) {
                        on_stale();
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Only the latest position matters; skipped fixes are fine.
                    debug!(skipped, "position feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("position feed closed, attempting restart");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RESTART_DELAY) => {
                            rx = subscribe();
                        }
                    }
                }
            }
        }
    }
}
