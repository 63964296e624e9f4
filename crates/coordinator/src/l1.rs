//! Rollup contract on L1: batch data commitments and state updates.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use synccommittee_primitives::{
    batch::{DataProofs, ProposalData},
    block::MAIN_SHARD_ID,
    buf::Buf32,
    ids::BatchId,
};
use synccommittee_storage::BatchDbOps;
use tracing::*;

use crate::{
    blob::Blob,
    errors::{CoordinatorError, FetchError, L1Error},
    fetch::{BlockFetcher, BlockSelector},
};

/// Blobs of a batch together with their commitments, ready to be attached to
/// an L1 transaction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlobSidecar {
    pub blobs: Vec<Blob>,
    pub commitments: Vec<Buf32>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RollupContract: Send + Sync + 'static {
    /// Computes blob commitments and the proofs the contract checks them with.
    async fn prepare_blobs(&self, blobs: Vec<Blob>) -> Result<(BlobSidecar, DataProofs), L1Error>;

    async fn commit_batch(&self, sidecar: BlobSidecar, batch_id: BatchId) -> Result<(), L1Error>;

    async fn update_state(&self, data: ProposalData) -> Result<(), L1Error>;

    /// Zero if no batch was finalized yet.
    async fn latest_finalized_state_root(&self) -> Result<Buf32, L1Error>;
}

/// Accepts everything and reports no finalized state.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRollupContract;

#[async_trait]
impl RollupContract for NoopRollupContract {
    async fn prepare_blobs(&self, blobs: Vec<Blob>) -> Result<(BlobSidecar, DataProofs), L1Error> {
        let proofs = vec![Vec::new(); blobs.len()];
        let sidecar = BlobSidecar {
            commitments: vec![Buf32::zero(); blobs.len()],
            blobs,
        };
        Ok((sidecar, proofs))
    }

    async fn commit_batch(&self, sidecar: BlobSidecar, batch_id: BatchId) -> Result<(), L1Error> {
        debug!(%batch_id, blobs = sidecar.blobs.len(), "L1 disabled, skipping batch commit");
        Ok(())
    }

    async fn update_state(&self, data: ProposalData) -> Result<(), L1Error> {
        debug!(batch_id = %data.batch_id, "L1 disabled, skipping state update");
        Ok(())
    }

    async fn latest_finalized_state_root(&self) -> Result<Buf32, L1Error> {
        Ok(Buf32::zero())
    }
}

/// Stores the latest state root finalized on L1 as the proved state root,
/// falling back to the genesis block hash while L1 has none.
pub(crate) async fn sync_proved_state_root(
    rollup: &dyn RollupContract,
    fetcher: &dyn BlockFetcher,
    batch_ops: &BatchDbOps,
) -> Result<Buf32, CoordinatorError> {
    info!("syncing proved state root with L1");

    let mut root = rollup.latest_finalized_state_root().await?;
    if root.is_zero() {
        warn!("L1 state root is not initialized, genesis state root will be used");
        let selector = BlockSelector::Earliest;
        let genesis = fetcher
            .get_block(MAIN_SHARD_ID, selector, false)
            .await?
            .ok_or(FetchError::NotFound {
                shard_id: MAIN_SHARD_ID,
                selector,
            })?;
        root = genesis.hash;
    }

    batch_ops.set_proved_state_root_async(root).await?;
    info!(%root, "proved state root updated");
    Ok(root)
}
