pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::PollEntity;
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

pub use memory::InMemoryPollStore;

/// Abstraction over the persistence layer for poll documents.
pub trait PollStore: Send + Sync {
    /// Insert a brand-new poll. Fails with `Duplicate` if the id is taken.
    fn create_poll(&self, poll: PollEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_poll(&self, id: String) -> BoxFuture<'static, StorageResult<Option<PollEntity>>>;
    /// Replace a poll only if its stored revision still equals `expected_revision`.
    fn save_poll(
        &self,
        poll: PollEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
