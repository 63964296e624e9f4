//! Batch lifecycle operation interface.

use std::sync::Arc;

use synccommittee_db::{
    traits::BatchDatabase,
    types::{BatchEntry, BlockEntry},
    DbResult,
};
use synccommittee_primitives::{
    batch::{BlockBatch, ProposalData},
    block::{BlockId, BlockRefs},
    buf::Buf32,
    ids::BatchId,
};

use crate::exec::*;

/// Database context for the batch operation interface.
pub struct Context {
    db: Arc<dyn BatchDatabase>,
}

impl Context {
    pub fn new(db: Arc<dyn BatchDatabase>) -> Self {
        Self { db }
    }

    pub fn into_ops(self, pool: threadpool::ThreadPool) -> BatchDbOps {
        BatchDbOps::new(pool, Arc::new(self))
    }
}

inst_ops! {
    (BatchDbOps, Context) {
        set_block_batch(batch: BlockBatch) => ();
        set_batch_as_proved(id: BatchId) => bool;
        try_get_next_proposal_data() => Option<ProposalData>;
        set_batch_as_proposed(id: BatchId) => ();
        reset_batches_range(first_to_purge: BatchId) => Vec<BatchId>;
        reset_batches_not_proved() => Vec<BatchId>;
        batch_exists(id: BatchId) => bool;
        try_get_batch(id: BatchId) => Option<BatchEntry>;
        get_free_space_batch_count() => u32;
        try_get_latest_batch_id() => Option<BatchId>;
        try_get_latest_fetched() => BlockRefs;
        try_get_block(id: BlockId) => Option<BlockEntry>;
        try_get_proved_state_root() => Option<Buf32>;
        set_proved_state_root(root: Buf32) => ();
    }
}

fn set_block_batch(ctx: &Context, batch: BlockBatch) -> DbResult<()> {
    ctx.db.set_block_batch(&batch)
}

fn set_batch_as_proved(ctx: &Context, id: BatchId) -> DbResult<bool> {
    ctx.db.set_batch_as_proved(id)
}

fn try_get_next_proposal_data(ctx: &Context) -> DbResult<Option<ProposalData>> {
    ctx.db.try_get_next_proposal_data()
}

fn set_batch_as_proposed(ctx: &Context, id: BatchId) -> DbResult<()> {
    ctx.db.set_batch_as_proposed(id)
}

fn reset_batches_range(ctx: &Context, first_to_purge: BatchId) -> DbResult<Vec<BatchId>> {
    ctx.db.reset_batches_range(first_to_purge)
}

fn reset_batches_not_proved(ctx: &Context) -> DbResult<Vec<BatchId>> {
    ctx.db.reset_batches_not_proved()
}

fn batch_exists(ctx: &Context, id: BatchId) -> DbResult<bool> {
    ctx.db.batch_exists(id)
}

fn try_get_batch(ctx: &Context, id: BatchId) -> DbResult<Option<BatchEntry>> {
    ctx.db.try_get_batch(id)
}

fn get_free_space_batch_count(ctx: &Context) -> DbResult<u32> {
    ctx.db.get_free_space_batch_count()
}

fn try_get_latest_batch_id(ctx: &Context) -> DbResult<Option<BatchId>> {
    ctx.db.try_get_latest_batch_id()
}

fn try_get_latest_fetched(ctx: &Context) -> DbResult<BlockRefs> {
    ctx.db.try_get_latest_fetched()
}

fn try_get_block(ctx: &Context, id: BlockId) -> DbResult<Option<BlockEntry>> {
    ctx.db.try_get_block(id)
}

fn try_get_proved_state_root(ctx: &Context) -> DbResult<Option<Buf32>> {
    ctx.db.try_get_proved_state_root()
}

fn set_proved_state_root(ctx: &Context, root: Buf32) -> DbResult<()> {
    ctx.db.set_proved_state_root(root)
}
