pub mod batch;
pub mod task;

pub mod macros;
mod txn;
mod utils;

#[cfg(feature = "test_utils")]
pub mod test_utils;

use std::{fs, path::Path, sync::Arc};

use anyhow::Context;
use rockbound::{rocksdb, schema::ColumnFamilyName, Schema};

pub const ROCKSDB_NAME: &str = "sync_committee";

pub const STORE_COLUMN_FAMILIES: &[ColumnFamilyName] = &[
    // Task schemas
    TaskEntrySchema::COLUMN_FAMILY_NAME,
    FailedTaskEntrySchema::COLUMN_FAMILY_NAME,
    // Batch schemas
    BatchSchema::COLUMN_FAMILY_NAME,
    BatchParentIdxSchema::COLUMN_FAMILY_NAME,
    BlockSchema::COLUMN_FAMILY_NAME,
    LatestFetchedSchema::COLUMN_FAMILY_NAME,
    LatestBatchIdSchema::COLUMN_FAMILY_NAME,
    StateRootSchema::COLUMN_FAMILY_NAME,
    NextToProposeSchema::COLUMN_FAMILY_NAME,
    StoredBatchesCountSchema::COLUMN_FAMILY_NAME,
];

// Re-exports
pub use batch::db::BatchDb;
use batch::schemas::{
    BatchParentIdxSchema, BatchSchema, BlockSchema, LatestBatchIdSchema, LatestFetchedSchema,
    NextToProposeSchema, StateRootSchema, StoredBatchesCountSchema,
};
pub use task::db::TaskDb;
use task::schemas::{FailedTaskEntrySchema, TaskEntrySchema};

/// database operations configuration
#[derive(Clone, Copy, Debug)]
pub struct DbOpsConfig {
    /// Attempts per transaction, both for commit conflicts and for conflicts
    /// detected by the operation itself.
    pub retry_count: u16,
    pub backoff_base_ms: u64,
    pub max_jitter_ms: u64,
}

impl DbOpsConfig {
    pub fn new(retry_count: u16) -> Self {
        Self {
            retry_count,
            backoff_base_ms: 10,
            max_jitter_ms: 20,
        }
    }
}

/// Opens (creating if needed) the store under `datadir/rocksdb`.
pub fn open_rocksdb_database(
    datadir: &Path,
) -> anyhow::Result<Arc<rockbound::OptimisticTransactionDB>> {
    let database_dir = datadir.join("rocksdb");

    if !database_dir.exists() {
        fs::create_dir_all(&database_dir)?;
    }

    let dbname = ROCKSDB_NAME;
    let cfs = STORE_COLUMN_FAMILIES;
    let mut opts = rocksdb::Options::default();
    opts.create_if_missing(true);
    opts.create_missing_column_families(true);

    let rbdb = rockbound::OptimisticTransactionDB::open(
        &database_dir,
        dbname,
        cfs.iter().map(|s| s.to_string()),
        &opts,
    )
    .context("opening database")?;

    Ok(Arc::new(rbdb))
}
