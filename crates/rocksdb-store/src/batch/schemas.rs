use synccommittee_db::types::{BatchEntry, BlockEntry};
use synccommittee_primitives::{
    block::{BlockId, BlockRef, ShardId},
    buf::Buf32,
    ids::BatchId,
};

use crate::{define_table_with_default_codec, define_table_without_codec, impl_borsh_value_codec};

define_table_with_default_codec!(
    /// Stored batches
    (BatchSchema, "batches") BatchId => BatchEntry
);

define_table_with_default_codec!(
    /// Parent batch id to the id of its child
    (BatchParentIdxSchema, "batch_parent_idx") BatchId => BatchId
);

define_table_with_default_codec!(
    /// Bodies of the blocks of stored batches
    (BlockSchema, "blocks") BlockId => BlockEntry
);

define_table_with_default_codec!(
    /// Latest fetched block per shard
    (LatestFetchedSchema, "latest_fetched") ShardId => BlockRef
);

define_table_with_default_codec!(
    /// Id of the latest created batch, stored under the main shard id
    (LatestBatchIdSchema, "latest_batch_id") ShardId => BatchId
);

define_table_with_default_codec!(
    /// Latest proved state root, stored under the main shard id
    (StateRootSchema, "state_root") ShardId => Buf32
);

define_table_with_default_codec!(
    /// Parent hash of the next main shard block to propose, stored under the main shard id
    (NextToProposeSchema, "next_to_propose_parent_hash") ShardId => Buf32
);

define_table_with_default_codec!(
    /// Number of stored batches, stored under the main shard id
    (StoredBatchesCountSchema, "stored_batches_count") ShardId => u32
);
