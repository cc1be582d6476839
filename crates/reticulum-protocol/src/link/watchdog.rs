//! Per-link liveness supervision.
//!
//! [`decide`] is a pure function of a [`LivenessSnapshot`] and the current
//! instant; [`spawn`] runs it in a loop, sleeping until the next deadline or
//! until the link closes, whichever comes first.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::constants::WATCHDOG_MIN_SLEEP;
use super::registry::LinkRegistry;
use super::state::{Link, LivenessSnapshot};
use super::types::{LinkStatus, TeardownReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogAction {
    /// Nothing is due; check again after this long.
    Sleep(Duration),
    GoStale,
    Close(TeardownReason),
    /// The link is closed; the watchdog is done.
    Exit,
}

fn wait_or(elapsed: Duration, bound: Duration, due: WatchdogAction) -> WatchdogAction {
    if elapsed > bound {
        due
    } else {
        WatchdogAction::Sleep((bound - elapsed).max(WATCHDOG_MIN_SLEEP))
    }
}

pub fn decide(snapshot: &LivenessSnapshot, now: Instant) -> WatchdogAction {
    match snapshot.status {
        LinkStatus::Pending | LinkStatus::Handshaking => wait_or(
            now.saturating_duration_since(snapshot.request_time),
            snapshot.establishment_timeout,
            WatchdogAction::Close(TeardownReason::EstablishmentTimeout),
        ),
        LinkStatus::Active => wait_or(
            now.saturating_duration_since(snapshot.last_inbound),
            snapshot.stale_time,
            WatchdogAction::GoStale,
        ),
        LinkStatus::Stale => {
            let since = snapshot.stale_since.unwrap_or(snapshot.last_inbound);
            wait_or(
                now.saturating_duration_since(since),
                snapshot.stale_grace,
                WatchdogAction::Close(TeardownReason::Inactivity),
            )
        }
        LinkStatus::Closed => WatchdogAction::Exit,
    }
}

/// Supervise `link` until it closes, then remove it from `registry` unless
/// another link has since taken its id.
///
/// The task exits as soon as the link reaches `Closed`, whether the watchdog
/// closed it or someone else did.
pub fn spawn(link: Arc<Link>, registry: Arc<dyn LinkRegistry>) -> JoinHandle<()> {
    let mut closed_rx = link.subscribe_closed();
    tokio::spawn(async move {
        loop {
            let now = Instant::now();
            match decide(&link.liveness(), now) {
                WatchdogAction::Sleep(d) => {
                    tokio::select! {
                        _ = tokio::time::sleep(d) => {}
                        _ = closed_rx.wait_for(|closed| *closed) => {}
                    }
                }
                WatchdogAction::GoStale => {
                    if let Err(e) = link.mark_stale(now) {
                        debug!(link_id = %link.id(), error = %e, "stale transition skipped");
                    }
                }
                WatchdogAction::Close(reason) => {
                    if reason == TeardownReason::EstablishmentTimeout {
                        warn!(
                            link_id = %link.id(),
                            timeout = ?link.establishment_timeout(),
                            "link establishment timed out"
                        );
                    }
                    link.close(reason);
                }
                WatchdogAction::Exit => break,
            }
        }
        if registry.deregister_if(&link) {
            debug!(link_id = %link.id(), "link deregistered");
        }
    })
}
