/// Database model definitions.
pub mod models;
/// Poll persistence and retrieval operations.
pub mod poll_store;
/// Storage abstraction layer for database operations.
pub mod storage;
