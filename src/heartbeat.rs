// MIT License - Copyright (c) 2026 Peter Wright
// Heartbeat monitor

use std::ops::ControlFlow;

use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, trace, warn};

use crate::client::SessionLink;
use crate::constants::{HEARTBEAT_GRACE, MAX_HEARTBEAT_SECS};
use crate::error::PanelError;
use crate::event::DisconnectReason;

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Run the heartbeat for one session, tearing it down when the panel has
/// gone quiet or stops acknowledging probes.
pub(crate) async fn run(link: SessionLink, period: Duration) {
    if let Some(reason) = watch_liveness(&link, period).await {
        link.teardown(reason).await;
    }
}

/// Every `period`: fail if nothing has arrived for `period + 5s`, otherwise
/// send an empty probe through the write coordinator and fail if it isn't
/// acknowledged. The silence limit keeps running while the probe waits.
/// Ticks never overlap; a slow probe delays the next one.
///
/// Returns `None` when the session is shut down from elsewhere.
pub(crate) async fn watch_liveness(link: &SessionLink, period: Duration) -> Option<DisconnectReason> {
    let period = period.clamp(MIN_PERIOD, Duration::from_secs(MAX_HEARTBEAT_SECS));
    let limit = period.saturating_add(HEARTBEAT_GRACE);
    let mut shutdown = link.shutdown.clone();
    let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!("Heartbeat armed: every {:?}, silence limit {:?}", period, limit);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let ControlFlow::Break(reason) = beat(link, limit).await {
                    return reason;
                }
            }
            _ = shutdown.changed() => {
                debug!("Heartbeat shutting down");
                return None;
            }
        }
    }
}

/// One heartbeat: check the silence, then probe until ACKed or the limit
/// passes. `Break` ends the monitor.
async fn beat(link: &SessionLink, limit: Duration) -> ControlFlow<Option<DisconnectReason>> {
    let probe = link.engine.probe();
    tokio::pin!(probe);

    loop {
        let silent_for = link.engine.silence().await;
        if silent_for >= limit {
            warn!("No data from panel for {:?}", silent_for);
            return ControlFlow::Break(Some(DisconnectReason::HeartbeatExpired { silent_for }));
        }

        tokio::select! {
            biased;
            result = &mut probe => {
                return match result {
                    Ok(()) => {
                        trace!("Heartbeat acknowledged");
                        ControlFlow::Continue(())
                    }
                    // Someone else is already tearing the session down
                    Err(PanelError::Disconnected) => ControlFlow::Break(None),
                    Err(e) => {
                        warn!("Heartbeat failed: {}", e);
                        ControlFlow::Break(Some(DisconnectReason::HeartbeatFailed {
                            details: e.to_string(),
                        }))
                    }
                };
            }
            _ = sleep(limit - silent_for) => {}
        }
    }
}
