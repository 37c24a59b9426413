use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;

use crate::dao::{
    models::PollEntity,
    poll_store::PollStore,
    storage::{StorageError, StorageResult},
};

/// Process-local poll store.
///
/// Used when no database is configured and by the test-suite, which can flip
/// it into a failing state to exercise storage errors.
#[derive(Clone, Default)]
pub struct InMemoryPollStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    polls: DashMap<String, PollEntity>,
    failing: AtomicBool,
    failing_saves: AtomicBool,
}

#[derive(Debug, thiserror::Error)]
#[error("in-memory store is switched off")]
struct SwitchedOff;

impl InMemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again) as if the backend were down.
    pub fn set_failing(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only `save_poll` fail, leaving reads intact.
    pub fn set_failing_saves(&self, failing: bool) {
        self.inner.failing_saves.store(failing, Ordering::SeqCst);
    }

    /// Number of stored polls.
    pub fn len(&self) -> usize {
        self.inner.polls.len()
    }

    /// Whether the store holds no poll.
    pub fn is_empty(&self) -> bool {
        self.inner.polls.is_empty()
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "in-memory store unavailable".into(),
                SwitchedOff,
            ));
        }
        Ok(())
    }

    fn create(&self, poll: PollEntity) -> StorageResult<()> {
        self.check_available()?;
        match self.inner.polls.entry(poll.id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Duplicate { id: poll.id }),
            Entry::Vacant(slot) => {
                slot.insert(poll);
                Ok(())
            }
        }
    }

    fn find(&self, id: &str) -> StorageResult<Option<PollEntity>> {
        self.check_available()?;
        Ok(self.inner.polls.get(id).map(|poll| poll.clone()))
    }

    fn save(&self, poll: PollEntity, expected_revision: u64) -> StorageResult<()> {
        self.check_available()?;
        if self.inner.failing_saves.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "in-memory store rejects writes".into(),
                SwitchedOff,
            ));
        }
        let Some(mut stored) = self.inner.polls.get_mut(&poll.id) else {
            return Err(StorageError::Missing { id: poll.id });
        };
        if stored.revision != expected_revision {
            return Err(StorageError::Conflict {
                id: poll.id,
                expected: expected_revision,
            });
        }
        *stored = poll;
        Ok(())
    }
}

impl PollStore for InMemoryPollStore {
    fn create_poll(&self, poll: PollEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create(poll) })
    }

    fn find_poll(&self, id: String) -> BoxFuture<'static, StorageResult<Option<PollEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find(&id) })
    }

    fn save_poll(
        &self,
        poll: PollEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save(poll, expected_revision) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_available() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_available() })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn entity(id: &str, revision: u64) -> PollEntity {
        PollEntity {
            id: id.into(),
            question: "Color?".into(),
            options: Vec::new(),
            voters: Vec::new(),
            revision,
            created_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = InMemoryPollStore::new();
        store.create_poll(entity("abc", 0)).await.unwrap();
        let err = store.create_poll(entity("abc", 0)).await.unwrap_err();
        assert!(matches!(err, StorageError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn save_checks_revision() {
        let store = InMemoryPollStore::new();
        store.create_poll(entity("abc", 0)).await.unwrap();

        store.save_poll(entity("abc", 1), 0).await.unwrap();
        let err = store.save_poll(entity("abc", 2), 0).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { expected: 0, .. }));

        let stored = store.find_poll("abc".into()).await.unwrap().unwrap();
        assert_eq!(stored.revision, 1);
    }

    #[tokio::test]
    async fn save_of_unknown_poll_is_missing() {
        let store = InMemoryPollStore::new();
        let err = store.save_poll(entity("nope", 1), 0).await.unwrap_err();
        assert!(matches!(err, StorageError::Missing { .. }));
    }

    #[tokio::test]
    async fn failing_switch_makes_calls_unavailable() {
        let store = InMemoryPollStore::new();
        store.set_failing(true);
        assert!(matches!(
            store.find_poll("abc".into()).await,
            Err(StorageError::Unavailable { .. })
        ));
        assert!(store.health_check().await.is_err());
        store.set_failing(false);
        assert!(store.find_poll("abc".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_saves_keep_reads_working() {
        let store = InMemoryPollStore::new();
        store.create_poll(entity("abc", 0)).await.unwrap();
        store.set_failing_saves(true);

        assert!(matches!(
            store.save_poll(entity("abc", 1), 0).await,
            Err(StorageError::Unavailable { .. })
        ));
        let stored = store.find_poll("abc".into()).await.unwrap().unwrap();
        assert_eq!(stored.revision, 0);
    }
}
