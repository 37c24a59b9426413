//! Authoritative per-poll voter ledger.
//!
//! Every mutation of a poll happens while holding that poll's [`PollLock`]; the
//! working copy is read from the store, changed, recounted and written back
//! with an optimistic revision check before the lock is released.

use std::{
    future::Future,
    sync::Arc,
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use thiserror::Error;
use tokio::{sync::Mutex, sync::OwnedMutexGuard, time::timeout};
use tracing::{debug, warn};

use crate::{
    dao::{
        poll_store::PollStore,
        storage::{StorageError, StorageResult},
    },
    state::{
        identity::VoterIdentity,
        poll::{Poll, TallySnapshot, VoteChange},
    },
};

/// Save attempts before giving up on a poll that keeps changing underneath us.
pub const MAX_SAVE_ATTEMPTS: u32 = 3;

/// Failures of ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No poll with this identifier.
    #[error("poll `{0}` not found")]
    UnknownPoll(String),
    /// The poll exists but has no such option.
    #[error("option `{option_id}` not found in poll `{poll_id}`")]
    UnknownOption {
        /// Poll that was searched.
        poll_id: String,
        /// Option that was requested.
        option_id: String,
    },
    /// The store refused the read or the write.
    #[error("storage failure")]
    Storage(#[from] StorageError),
    /// A store call exceeded the configured timeout.
    #[error("storage operation timed out")]
    Timeout,
    /// Every save attempt hit a revision conflict.
    #[error("poll `{0}` kept changing; gave up after {MAX_SAVE_ATTEMPTS} attempts")]
    Contention(String),
}

/// Result of [`VoteLedger::apply_vote`].
#[derive(Debug, Clone)]
pub struct LedgerOutcome {
    /// Counts after the vote.
    pub snapshot: TallySnapshot,
    /// What happened to the voter's record.
    pub change: VoteChange,
}

/// Exclusive access to one poll's ledger.
pub struct PollLock {
    poll_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl PollLock {
    /// Poll this lock covers.
    pub fn poll_id(&self) -> &str {
        &self.poll_id
    }
}

/// Serializes vote application per poll while letting different polls proceed in parallel.
pub struct VoteLedger {
    locks: DashMap<String, Arc<Mutex<()>>>,
    store_timeout: Duration,
}

impl VoteLedger {
    /// Create a ledger whose storage calls fail after `store_timeout`.
    pub fn new(store_timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            store_timeout,
        }
    }

    /// Wait for exclusive access to `poll_id`.
    pub async fn lock(&self, poll_id: &str) -> PollLock {
        let mutex = self.locks.entry(poll_id.to_owned()).or_default().clone();
        let guard = mutex.lock_owned().await;
        PollLock {
            poll_id: poll_id.to_owned(),
            _guard: guard,
        }
    }

    /// Point `identity` at `option_id` in the locked poll and persist the result.
    ///
    /// Re-voting for the currently selected option changes nothing and skips the
    /// write, but still returns the current counts. `before_save` runs once,
    /// right before the first write is attempted.
    pub async fn apply_vote(
        &self,
        lock: &PollLock,
        store: &dyn PollStore,
        identity: &VoterIdentity,
        option_id: &str,
        now: SystemTime,
        before_save: impl FnOnce(),
    ) -> Result<LedgerOutcome, LedgerError> {
        let poll_id = lock.poll_id();
        let mut before_save = Some(before_save);

        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let mut poll = self.load(store, poll_id).await?;
            if poll.option(option_id).is_none() {
                return Err(LedgerError::UnknownOption {
                    poll_id: poll_id.to_owned(),
                    option_id: option_id.to_owned(),
                });
            }

            let expected_revision = poll.revision;
            let change = poll.record_vote(identity, option_id, now);
            let snapshot = poll.tally();
            if !change.is_change() {
                debug!(poll_id, voter = %identity, "vote unchanged; nothing to persist");
                return Ok(LedgerOutcome { snapshot, change });
            }

            if let Some(hook) = before_save.take() {
                hook();
            }
            match self
                .bounded(store.save_poll(poll.into(), expected_revision))
                .await?
            {
                Ok(()) => return Ok(LedgerOutcome { snapshot, change }),
                Err(StorageError::Conflict { .. }) => {
                    warn!(poll_id, attempt, "poll revision moved during vote; retrying");
                }
                Err(StorageError::Missing { .. }) => {
                    return Err(LedgerError::UnknownPoll(poll_id.to_owned()));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(LedgerError::Contention(poll_id.to_owned()))
    }

    /// Current counts of a poll, read without taking its lock.
    pub async fn current_tally(
        &self,
        store: &dyn PollStore,
        poll_id: &str,
    ) -> Result<TallySnapshot, LedgerError> {
        Ok(self.load(store, poll_id).await?.tally())
    }

    /// Forget locks nobody is holding or waiting on. Returns how many were dropped.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.locks.len())
    }

    /// Number of polls with a lock entry.
    pub fn tracked_polls(&self) -> usize {
        self.locks.len()
    }

    async fn load(&self, store: &dyn PollStore, poll_id: &str) -> Result<Poll, LedgerError> {
        self.bounded(store.find_poll(poll_id.to_owned()))
            .await??
            .map(Poll::from)
            .ok_or_else(|| LedgerError::UnknownPoll(poll_id.to_owned()))
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = StorageResult<T>>,
    ) -> Result<StorageResult<T>, LedgerError> {
        timeout(self.store_timeout, operation)
            .await
            .map_err(|_| LedgerError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::future::{BoxFuture, pending};

    use super::*;
    use crate::dao::{models::PollEntity, poll_store::InMemoryPollStore};

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn seeded_store() -> (InMemoryPollStore, Poll) {
        let store = InMemoryPollStore::new();
        let poll = Poll::new("Color?".into(), vec!["Red".into(), "Blue".into()]);
        store.create_poll(poll.clone().into()).await.unwrap();
        (store, poll)
    }

    fn voter(name: &str) -> VoterIdentity {
        VoterIdentity::parse(name).unwrap()
    }

    async fn vote(
        ledger: &VoteLedger,
        store: &dyn PollStore,
        poll: &Poll,
        name: &str,
        option: usize,
    ) -> Result<LedgerOutcome, LedgerError> {
        let lock = ledger.lock(&poll.id).await;
        ledger
            .apply_vote(
                &lock,
                store,
                &voter(name),
                &poll.options[option].id,
                SystemTime::now(),
                || {},
            )
            .await
    }

    #[tokio::test]
    async fn first_vote_increments_only_chosen_option() {
        let ledger = VoteLedger::new(TIMEOUT);
        let (store, poll) = seeded_store().await;

        let outcome = vote(&ledger, &store, &poll, "alice", 0).await.unwrap();
        assert_eq!(outcome.change, VoteChange::Cast);
        assert_eq!(outcome.snapshot.count(&poll.options[0].id), Some(1));
        assert_eq!(outcome.snapshot.count(&poll.options[1].id), Some(0));
        assert_eq!(outcome.snapshot.revision, 1);

        let stored = store.find_poll(poll.id.clone()).await.unwrap().unwrap();
        assert_eq!(stored.voters.len(), 1);
        assert_eq!(stored.options[0].vote_count, 1);
    }

    #[tokio::test]
    async fn switching_moves_the_vote() {
        let ledger = VoteLedger::new(TIMEOUT);
        let (store, poll) = seeded_store().await;

        vote(&ledger, &store, &poll, "alice", 0).await.unwrap();
        let outcome = vote(&ledger, &store, &poll, "ALICE", 1).await.unwrap();

        assert!(matches!(outcome.change, VoteChange::Switched { .. }));
        assert_eq!(outcome.snapshot.count(&poll.options[0].id), Some(0));
        assert_eq!(outcome.snapshot.count(&poll.options[1].id), Some(1));
        assert_eq!(outcome.snapshot.total_voters, 1);
    }

    #[tokio::test]
    async fn repeated_vote_is_not_persisted() {
        let ledger = VoteLedger::new(TIMEOUT);
        let (store, poll) = seeded_store().await;

        vote(&ledger, &store, &poll, "alice", 0).await.unwrap();
        let outcome = vote(&ledger, &store, &poll, "alice", 0).await.unwrap();

        assert_eq!(outcome.change, VoteChange::Unchanged);
        assert_eq!(outcome.snapshot.revision, 1);
        assert_eq!(outcome.snapshot.total_voters, 1);
        let stored = store.find_poll(poll.id.clone()).await.unwrap().unwrap();
        assert_eq!(stored.revision, 1);
    }

    #[tokio::test]
    async fn unknown_poll_and_option_are_reported() {
        let ledger = VoteLedger::new(TIMEOUT);
        let (store, poll) = seeded_store().await;

        let lock = ledger.lock("missing").await;
        let err = ledger
            .apply_vote(&lock, &store, &voter("alice"), "x", SystemTime::now(), || {})
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownPoll(id) if id == "missing"));

        let lock = ledger.lock(&poll.id).await;
        let err = ledger
            .apply_vote(&lock, &store, &voter("alice"), "nope", SystemTime::now(), || {})
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownOption { .. }));
    }

    #[tokio::test]
    async fn storage_failure_leaves_poll_untouched() {
        let ledger = VoteLedger::new(TIMEOUT);
        let (store, poll) = seeded_store().await;
        store.set_failing(true);

        let err = vote(&ledger, &store, &poll, "alice", 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));

        store.set_failing(false);
        let stored = store.find_poll(poll.id.clone()).await.unwrap().unwrap();
        assert!(stored.voters.is_empty());
        assert_eq!(stored.revision, 0);
    }

    /// Store whose first `conflicts` saves report a concurrent modification.
    struct ConflictingStore {
        inner: InMemoryPollStore,
        conflicts: AtomicU32,
    }

    impl PollStore for ConflictingStore {
        fn create_poll(&self, poll: PollEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.create_poll(poll)
        }

        fn find_poll(&self, id: String) -> BoxFuture<'static, StorageResult<Option<PollEntity>>> {
            self.inner.find_poll(id)
        }

        fn save_poll(
            &self,
            poll: PollEntity,
            expected_revision: u64,
        ) -> BoxFuture<'static, StorageResult<()>> {
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                let id = poll.id;
                return Box::pin(async move {
                    Err(StorageError::Conflict {
                        id,
                        expected: expected_revision,
                    })
                });
            }
            self.inner.save_poll(poll, expected_revision)
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    #[tokio::test]
    async fn conflicts_are_retried() {
        let ledger = VoteLedger::new(TIMEOUT);
        let (inner, poll) = seeded_store().await;
        let store = ConflictingStore {
            inner,
            conflicts: AtomicU32::new(2),
        };

        let outcome = vote(&ledger, &store, &poll, "alice", 1).await.unwrap();
        assert_eq!(outcome.snapshot.count(&poll.options[1].id), Some(1));
    }

    #[tokio::test]
    async fn save_hook_runs_once_and_only_for_writes() {
        let ledger = VoteLedger::new(TIMEOUT);
        let (inner, poll) = seeded_store().await;
        let store = ConflictingStore {
            inner,
            conflicts: AtomicU32::new(2),
        };
        let hooked = AtomicU32::new(0);
        let count_hook = || {
            hooked.fetch_add(1, Ordering::SeqCst);
        };

        let lock = ledger.lock(&poll.id).await;
        let option = &poll.options[0].id;
        ledger
            .apply_vote(&lock, &store, &voter("alice"), option, SystemTime::now(), count_hook)
            .await
            .unwrap();
        assert_eq!(hooked.load(Ordering::SeqCst), 1);

        let outcome = ledger
            .apply_vote(&lock, &store, &voter("alice"), option, SystemTime::now(), count_hook)
            .await
            .unwrap();
        assert_eq!(outcome.change, VoteChange::Unchanged);
        assert_eq!(hooked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn endless_conflicts_give_up() {
        let ledger = VoteLedger::new(TIMEOUT);
        let (inner, poll) = seeded_store().await;
        let store = ConflictingStore {
            inner,
            conflicts: AtomicU32::new(MAX_SAVE_ATTEMPTS),
        };

        let err = vote(&ledger, &store, &poll, "alice", 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::Contention(_)));
    }

    /// Store whose saves never complete.
    struct StalledStore {
        inner: InMemoryPollStore,
    }

    impl PollStore for StalledStore {
        fn create_poll(&self, poll: PollEntity) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.create_poll(poll)
        }

        fn find_poll(&self, id: String) -> BoxFuture<'static, StorageResult<Option<PollEntity>>> {
            self.inner.find_poll(id)
        }

        fn save_poll(&self, _: PollEntity, _: u64) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(pending())
        }

        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.health_check()
        }

        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            self.inner.try_reconnect()
        }
    }

    #[tokio::test]
    async fn stalled_save_times_out_and_frees_the_poll() {
        let ledger = VoteLedger::new(Duration::from_millis(50));
        let (inner, poll) = seeded_store().await;
        let store = StalledStore { inner };

        let err = vote(&ledger, &store, &poll, "alice", 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout));

        let relock = timeout(Duration::from_secs(1), ledger.lock(&poll.id)).await;
        assert!(relock.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_votes_on_one_poll_all_land() {
        let ledger = Arc::new(VoteLedger::new(TIMEOUT));
        let (store, poll) = seeded_store().await;

        let mut handles = Vec::new();
        for n in 0..40 {
            let ledger = ledger.clone();
            let store = store.clone();
            let poll = poll.clone();
            handles.push(tokio::spawn(async move {
                let name = format!("voter{n}");
                vote(&ledger, &store, &poll, &name, n % 2).await.unwrap()
            }));
        }
        for handle in handles {
            let outcome = handle.await.unwrap();
            let sum: u64 = outcome.snapshot.options.iter().map(|o| o.vote_count).sum();
            assert_eq!(sum, outcome.snapshot.total_voters);
        }

        let tally = ledger.current_tally(&store, &poll.id).await.unwrap();
        assert_eq!(tally.total_voters, 40);
        assert_eq!(tally.count(&poll.options[0].id), Some(20));
        assert_eq!(tally.revision, 40);
    }

    #[tokio::test]
    async fn idle_locks_are_pruned() {
        let ledger = VoteLedger::new(TIMEOUT);
        let held = ledger.lock("a").await;
        drop(ledger.lock("b").await);
        assert_eq!(ledger.tracked_polls(), 2);

        assert_eq!(ledger.prune_idle(), 1);
        assert_eq!(ledger.tracked_polls(), 1);
        assert_eq!(held.poll_id(), "a");
    }
}
