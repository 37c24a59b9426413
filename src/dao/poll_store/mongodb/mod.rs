mod config;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoPollStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::RevisionConflict { id, expected } => {
                StorageError::Conflict { id, expected }
            }
            MongoDaoError::DuplicatePoll { id, .. } => StorageError::Duplicate { id },
            err => StorageError::unavailable(err.to_string(), err),
        }
    }
}
