use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Report whether a healthy poll store is installed, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let status = match state.require_poll_store().await {
        Ok(store) => match store.health_check().await {
            Ok(()) => HealthStatus::Ok,
            Err(err) => {
                warn!(error = %err, "poll store health check failed");
                HealthStatus::Degraded
            }
        },
        Err(_) => {
            warn!("poll store unavailable (degraded mode)");
            HealthStatus::Degraded
        }
    };
    HealthResponse::new(status, state.rooms().open_rooms())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::poll_store::InMemoryPollStore, state::AppState};

    #[tokio::test]
    async fn reports_degraded_without_store() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn reports_failing_store_as_degraded() {
        let store = InMemoryPollStore::new();
        let state = AppState::with_store(AppConfig::default(), Arc::new(store.clone())).await;
        assert_eq!(health_status(&state).await.status, HealthStatus::Ok);

        store.set_failing(true);
        assert_eq!(health_status(&state).await.status, HealthStatus::Degraded);
    }
}
