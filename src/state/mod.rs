pub mod identity;
pub mod ledger;
pub mod poll;
pub mod rate_limit;
pub mod rooms;
pub mod vote_flow;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{config::AppConfig, dao::poll_store::PollStore, error::ServiceError};

use self::{
    ledger::VoteLedger,
    rate_limit::{RateLimiter, VOTE_COOLDOWN},
    rooms::RoomBroadcaster,
};

pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, room registry, ledger locks and cooldowns.
pub struct AppState {
    poll_store: RwLock<Option<Arc<dyn PollStore>>>,
    degraded: watch::Sender<bool>,
    rooms: RoomBroadcaster,
    ledger: VoteLedger,
    rate_limiter: RateLimiter,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            poll_store: RwLock::new(None),
            degraded: degraded_tx,
            rooms: RoomBroadcaster::new(),
            ledger: VoteLedger::new(config.storage_timeout()),
            rate_limiter: RateLimiter::new(VOTE_COOLDOWN),
            config,
        })
    }

    /// Same as [`AppState::new`] with a store already installed.
    pub async fn with_store(config: AppConfig, store: Arc<dyn PollStore>) -> SharedState {
        let state = Self::new(config);
        state.set_poll_store(store).await;
        state
    }

    /// Obtain a handle to the current poll store, if one is installed.
    pub async fn poll_store(&self) -> Option<Arc<dyn PollStore>> {
        let guard = self.poll_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current poll store, or [`ServiceError::Degraded`] when none is installed
    /// or the installed one is known to be unhealthy.
    pub async fn require_poll_store(&self) -> Result<Arc<dyn PollStore>, ServiceError> {
        if *self.degraded.borrow() {
            return Err(ServiceError::Degraded);
        }
        self.poll_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new poll store implementation and leave degraded mode.
    pub async fn set_poll_store(&self, store: Arc<dyn PollStore>) {
        {
            let mut guard = self.poll_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current poll store and enter degraded mode.
    pub async fn clear_poll_store(&self) {
        {
            let mut guard = self.poll_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Registry of poll rooms.
    pub fn rooms(&self) -> &RoomBroadcaster {
        &self.rooms
    }

    /// Per-poll vote serialization and persistence.
    pub fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }

    /// Vote cooldowns.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::poll_store::InMemoryPollStore;

    #[tokio::test]
    async fn starts_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.require_poll_store().await,
            Err(ServiceError::Degraded)
        ));

        let mut watcher = state.degraded_watcher();
        state.set_poll_store(Arc::new(InMemoryPollStore::new())).await;
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_poll_store().await.is_ok());

        state.clear_poll_store().await;
        assert!(state.poll_store().await.is_none());
        assert!(*watcher.borrow_and_update());
    }

    #[tokio::test]
    async fn unchanged_degraded_flag_does_not_notify() {
        let state = AppState::with_store(
            AppConfig::default(),
            Arc::new(InMemoryPollStore::new()),
        )
        .await;
        let mut watcher = state.degraded_watcher();
        let _ = watcher.borrow_and_update();

        state.update_degraded(false).await;
        assert!(!watcher.has_changed().unwrap());

        state.update_degraded(true).await;
        assert!(watcher.has_changed().unwrap());
        assert!(state.poll_store().await.is_some());
        assert!(state.require_poll_store().await.is_err());
    }
}
