use std::{collections::BTreeSet, sync::Arc};

use rockbound::{OptimisticTransactionDB, SchemaDBOperationsExt};
use synccommittee_common::clock::Clock;
use synccommittee_db::{
    errors::DbError,
    traits::BatchDatabase,
    types::{BatchEntry, BlockEntry},
    DbResult,
};
use synccommittee_primitives::{
    batch::{BlockBatch, ProposalData},
    block::{BlockId, BlockRef, BlockRefs, MAIN_SHARD_ID},
    buf::Buf32,
    errors::ChainError,
    ids::BatchId,
};
use tracing::*;

use super::schemas::{
    BatchParentIdxSchema, BatchSchema, BlockSchema, LatestBatchIdSchema, LatestFetchedSchema,
    NextToProposeSchema, StateRootSchema, StoredBatchesCountSchema,
};
use crate::{
    txn::{run_in_txn, Txn},
    utils::scan_table,
    DbOpsConfig,
};

/// Single-value tables are keyed by the main shard id.
const SINGLETON_KEY: u32 = MAIN_SHARD_ID;

pub struct BatchDb {
    db: Arc<OptimisticTransactionDB>,
    ops: DbOpsConfig,
    stored_batches_limit: u32,
    clock: Arc<dyn Clock>,
}

impl BatchDb {
    /// Wraps an existing database handle.
    ///
    /// Assumes it was opened with column families as defined in `STORE_COLUMN_FAMILIES`.
    pub fn new(
        db: Arc<OptimisticTransactionDB>,
        ops: DbOpsConfig,
        stored_batches_limit: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            ops,
            stored_batches_limit,
            clock,
        }
    }

    fn stored_count(&self, txn: &Txn) -> DbResult<u32> {
        Ok(txn
            .get_for_update::<StoredBatchesCountSchema>(&SINGLETON_KEY)?
            .unwrap_or_default())
    }

    fn set_stored_count(&self, txn: &Txn, count: u32) -> DbResult<()> {
        txn.put::<StoredBatchesCountSchema>(&SINGLETON_KEY, &count)?;
        Ok(())
    }

    /// Deletes a batch with its blocks and its parent index entries. Returns the
    /// deleted entry.
    fn delete_batch(&self, txn: &Txn, id: &BatchId) -> DbResult<Option<BatchEntry>> {
        let Some(entry) = txn.get_for_update::<BatchSchema>(id)? else {
            return Ok(None);
        };

        for block_id in entry.block_ids() {
            txn.delete::<BlockSchema>(block_id)?;
        }
        txn.delete::<BatchSchema>(id)?;
        txn.delete::<BatchParentIdxSchema>(id)?;
        if let Some(parent_id) = entry.parent_id {
            if txn.get_for_update::<BatchParentIdxSchema>(&parent_id)? == Some(*id) {
                txn.delete::<BatchParentIdxSchema>(&parent_id)?;
            }
        }

        Ok(Some(entry))
    }

    /// Collects `first` and every batch descending from it, oldest first.
    fn descendants_of(&self, txn: &Txn, first: BatchId) -> DbResult<Vec<BatchId>> {
        let mut chain = vec![first];
        let mut seen = BTreeSet::from([first]);
        let mut current = first;

        while let Some(child) = txn.get_for_update::<BatchParentIdxSchema>(&current)? {
            if !seen.insert(child) {
                return Err(DbError::BatchChainCycle(child));
            }
            chain.push(child);
            current = child;
        }
        Ok(chain)
    }

    fn get_block_in(&self, txn: &Txn, id: &BlockId) -> DbResult<BlockEntry> {
        txn.get::<BlockSchema>(id)?
            .ok_or(DbError::BlockNotFound(*id))
    }
}

impl BatchDatabase for BatchDb {
    fn set_block_batch(&self, batch: &BlockBatch) -> DbResult<()> {
        let now = self.clock.now_ms();
        let entry = BatchEntry::new(batch, now);

        run_in_txn(&self.db, &self.ops, "set_block_batch", |txn| {
            let count = self.stored_count(txn)?;
            if count >= self.stored_batches_limit {
                return Err(DbError::CapacityLimitReached {
                    current: count,
                    limit: self.stored_batches_limit,
                });
            }

            let latest_id = txn.get_for_update::<LatestBatchIdSchema>(&SINGLETON_KEY)?;
            if batch.parent_id != latest_id {
                return Err(DbError::BatchMismatch {
                    batch_id: batch.id,
                    parent_id: batch.parent_id,
                    latest_id,
                });
            }

            for segment in batch.segments().segments() {
                let shard_id = segment.shard_id();
                if let Some(latest) = txn.get_for_update::<LatestFetchedSchema>(&shard_id)? {
                    latest.validate_next(segment.earliest())?;
                }
                txn.put::<LatestFetchedSchema>(&shard_id, &segment.latest().to_ref())?;
            }

            for block in batch.blocks() {
                let block_entry = BlockEntry {
                    block: block.clone(),
                    batch_id: batch.id,
                    fetched_at: now,
                };
                txn.put::<BlockSchema>(&block.id(), &block_entry)?;
            }

            txn.put::<BatchSchema>(&batch.id, &entry)?;
            if let Some(parent_id) = batch.parent_id {
                txn.put::<BatchParentIdxSchema>(&parent_id, &batch.id)?;
            }
            txn.put::<LatestBatchIdSchema>(&SINGLETON_KEY, &batch.id)?;

            if txn
                .get_for_update::<NextToProposeSchema>(&SINGLETON_KEY)?
                .is_none()
            {
                txn.put::<NextToProposeSchema>(&SINGLETON_KEY, &entry.main_parent_block_hash)?;
            }

            self.set_stored_count(txn, count + 1)
        })?;

        debug!(batch_id = %batch.id, main_block = %batch.main_block().to_ref(), "stored block batch");
        Ok(())
    }

    fn set_batch_as_proved(&self, id: BatchId) -> DbResult<bool> {
        let changed = run_in_txn(&self.db, &self.ops, "set_batch_as_proved", |txn| {
            let mut entry = txn
                .get_for_update::<BatchSchema>(&id)?
                .ok_or(DbError::BatchNotFound(id))?;
            if entry.is_proved {
                return Ok(false);
            }

            entry.is_proved = true;
            txn.put::<BatchSchema>(&id, &entry)?;
            Ok(true)
        })?;

        if changed {
            info!(batch_id = %id, "batch proved");
        } else {
            debug!(batch_id = %id, "batch already proved");
        }
        Ok(changed)
    }

    fn try_get_next_proposal_data(&self) -> DbResult<Option<ProposalData>> {
        run_in_txn(&self.db, &self.ops, "try_get_next_proposal_data", |txn| {
            let state_root = txn
                .get::<StateRootSchema>(&SINGLETON_KEY)?
                .ok_or(DbError::StateRootNotInitialized)?;

            let Some(next_parent) = txn.get::<NextToProposeSchema>(&SINGLETON_KEY)? else {
                return Ok(None);
            };

            let batch = scan_table::<BatchSchema>(&self.db)?
                .into_iter()
                .map(|(_, entry)| entry)
                .find(|entry| entry.is_proved && entry.main_parent_block_hash == next_parent);
            let Some(batch) = batch else {
                return Ok(None);
            };

            let main = self.get_block_in(txn, &batch.main_block_id)?;
            let mut transactions = main.block.transactions.clone();
            for block_id in &batch.exec_block_ids {
                transactions.extend(self.get_block_in(txn, block_id)?.block.transactions);
            }

            Ok(Some(ProposalData {
                batch_id: batch.id,
                main_shard_block_hash: main.block.hash,
                transactions,
                old_proved_state_root: state_root,
                new_proved_state_root: main.block.hash,
                main_block_fetched_at: main.fetched_at,
                data_proofs: batch.data_proofs,
            }))
        })
    }

    fn set_batch_as_proposed(&self, id: BatchId) -> DbResult<()> {
        run_in_txn(&self.db, &self.ops, "set_batch_as_proposed", |txn| {
            let batch = txn
                .get_for_update::<BatchSchema>(&id)?
                .ok_or(DbError::BatchNotFound(id))?;
            if !batch.is_proved {
                return Err(DbError::BatchNotProved(id));
            }

            let main = self.get_block_in(txn, &batch.main_block_id)?.block;
            let next_parent = txn
                .get_for_update::<NextToProposeSchema>(&SINGLETON_KEY)?
                .ok_or(DbError::StateRootNotInitialized)?;
            if main.parent_hash != next_parent {
                let number = main.number.saturating_sub(1);
                return Err(ChainError::BlockMismatch {
                    reason: "batch does not follow the last proposed block",
                    expected: BlockRef::new(MAIN_SHARD_ID, number, next_parent),
                    actual: BlockRef::new(MAIN_SHARD_ID, number, main.parent_hash),
                }
                .into());
            }

            self.delete_batch(txn, &id)?;
            txn.put::<StateRootSchema>(&SINGLETON_KEY, &main.hash)?;
            txn.put::<NextToProposeSchema>(&SINGLETON_KEY, &main.hash)?;

            let count = self.stored_count(txn)?;
            self.set_stored_count(txn, count.saturating_sub(1))
        })?;

        info!(batch_id = %id, "batch proposed");
        Ok(())
    }

    fn reset_batches_range(&self, first_to_purge: BatchId) -> DbResult<Vec<BatchId>> {
        let purged = run_in_txn(&self.db, &self.ops, "reset_batches_range", |txn| {
            let first = txn
                .get_for_update::<BatchSchema>(&first_to_purge)?
                .ok_or(DbError::BatchNotFound(first_to_purge))?;

            let chain = self.descendants_of(txn, first_to_purge)?;
            let mut purged = Vec::with_capacity(chain.len());
            for id in &chain {
                if let Some(entry) = self.delete_batch(txn, id)? {
                    purged.push(entry);
                }
            }

            // newest first so that the earliest batch's parents win
            for entry in purged.iter().rev() {
                for latest in entry.latest_refs.iter() {
                    match entry.parent_refs.get(latest.shard_id) {
                        Some(parent) => txn.put::<LatestFetchedSchema>(&parent.shard_id, parent)?,
                        None => txn.delete::<LatestFetchedSchema>(&latest.shard_id)?,
                    }
                }
            }

            match first.parent_id {
                Some(parent_id) => txn.put::<LatestBatchIdSchema>(&SINGLETON_KEY, &parent_id)?,
                None => txn.delete::<LatestBatchIdSchema>(&SINGLETON_KEY)?,
            }

            let count = self.stored_count(txn)?;
            self.set_stored_count(txn, count.saturating_sub(purged.len() as u32))?;

            Ok(purged.into_iter().map(|e| e.id).collect::<Vec<_>>())
        })?;

        info!(first = %first_to_purge, count = purged.len(), "reset batches range");
        Ok(purged)
    }

    fn reset_batches_not_proved(&self) -> DbResult<Vec<BatchId>> {
        let purged = run_in_txn(&self.db, &self.ops, "reset_batches_not_proved", |txn| {
            let mut purged = Vec::new();
            for (id, entry) in scan_table::<BatchSchema>(&self.db)? {
                if entry.is_proved {
                    continue;
                }
                if self.delete_batch(txn, &id)?.is_some() {
                    purged.push(id);
                }
            }

            for (shard_id, _) in scan_table::<LatestFetchedSchema>(&self.db)? {
                txn.delete::<LatestFetchedSchema>(&shard_id)?;
            }

            let count = self.stored_count(txn)?;
            self.set_stored_count(txn, count.saturating_sub(purged.len() as u32))?;
            Ok(purged)
        })?;

        info!(count = purged.len(), "reset batches not proved");
        Ok(purged)
    }

    fn batch_exists(&self, id: BatchId) -> DbResult<bool> {
        Ok(self.db.get::<BatchSchema>(&id)?.is_some())
    }

    fn try_get_batch(&self, id: BatchId) -> DbResult<Option<BatchEntry>> {
        Ok(self.db.get::<BatchSchema>(&id)?)
    }

    fn get_free_space_batch_count(&self) -> DbResult<u32> {
        let count = self
            .db
            .get::<StoredBatchesCountSchema>(&SINGLETON_KEY)?
            .unwrap_or_default();
        Ok(self.stored_batches_limit.saturating_sub(count))
    }

    fn try_get_latest_batch_id(&self) -> DbResult<Option<BatchId>> {
        Ok(self.db.get::<LatestBatchIdSchema>(&SINGLETON_KEY)?)
    }

    fn try_get_latest_fetched(&self) -> DbResult<BlockRefs> {
        Ok(scan_table::<LatestFetchedSchema>(&self.db)?
            .into_iter()
            .map(|(_, r)| r)
            .collect())
    }

    fn try_get_block(&self, id: BlockId) -> DbResult<Option<BlockEntry>> {
        Ok(self.db.get::<BlockSchema>(&id)?)
    }

    fn try_get_proved_state_root(&self) -> DbResult<Option<Buf32>> {
        Ok(self.db.get::<StateRootSchema>(&SINGLETON_KEY)?)
    }

    fn set_proved_state_root(&self, root: Buf32) -> DbResult<()> {
        if root.is_zero() {
            return Err(DbError::EmptyStateRoot);
        }
        self.db.put::<StateRootSchema>(&SINGLETON_KEY, &root)?;
        info!(%root, "proved state root set");
        Ok(())
    }
}
