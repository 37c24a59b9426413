use std::time::Instant;

use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::state::{AppState, SharedState};

/// Entries reclaimed by one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Expired cooldown entries.
    pub rate_entries: usize,
    /// Poll locks nobody was holding.
    pub idle_locks: usize,
}

/// Periodically drop expired cooldowns and idle poll locks.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().sweep_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let report = sweep_once(&state, Instant::now());
        if report != SweepReport::default() {
            debug!(
                rate_entries = report.rate_entries,
                idle_locks = report.idle_locks,
                tracked_polls = state.ledger().tracked_polls(),
                "sweep reclaimed entries"
            );
        }
    }
}

/// One sweep pass at `now`.
pub fn sweep_once(state: &AppState, now: Instant) -> SweepReport {
    SweepReport {
        rate_entries: state.rate_limiter().sweep(now),
        idle_locks: state.ledger().prune_idle(),
    }
}
