use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{poll_store::PollStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect the poll store, install it, and keep the shared state in degraded
/// mode whenever it is unreachable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn PollStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_poll_store(store.clone()).await;
                info!("poll store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_health(&state, store.as_ref()).await;

                state.clear_poll_store().await;
                warn!("poll store lost; reconnecting from scratch");
            }
            Err(err) => {
                warn!(error = %err, "poll store connection attempt failed");
            }
        }

        sleep(delay).await;
        delay = backoff(delay);
    }
}

/// Poll `store` until it stays unhealthy through every reconnect attempt.
async fn watch_health(state: &SharedState, store: &dyn PollStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded().await {
                    info!("poll store healthy again; leaving degraded mode");
                    state.update_degraded(false).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "poll store health check failed; entering degraded mode");
                state.update_degraded(true).await;
                if !reconnect(store).await {
                    warn!("exhausted poll store reconnect attempts");
                    return;
                }
                state.update_degraded(false).await;
            }
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn reconnect(store: &dyn PollStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "poll store reconnected");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "poll store reconnect attempt failed");
                sleep(delay).await;
                delay = backoff(delay);
            }
        }
    }
    false
}

fn backoff(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}
