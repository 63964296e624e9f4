//! Storage interfaces of the sync committee: the task store and the batch
//! lifecycle store.

pub mod errors;
pub mod traits;
pub mod types;

/// Wrapper result type for database operations.
pub type DbResult<T> = anyhow::Result<T, errors::DbError>;

pub use errors::DbError;
