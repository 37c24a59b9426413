use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB database `{database}` did not answer ping")]
    Unreachable {
        database: String,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("poll `{id}` already exists")]
    DuplicatePoll {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to insert poll `{id}`")]
    InsertPoll {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save poll `{id}`")]
    SavePoll {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("poll `{id}` changed since revision {expected}")]
    RevisionConflict { id: String, expected: u64 },
    #[error("failed to load poll `{id}`")]
    LoadPoll {
        id: String,
        #[source]
        source: MongoError,
    },
}
