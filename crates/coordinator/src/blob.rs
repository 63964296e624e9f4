use synccommittee_primitives::batch::PrunedBatch;

use crate::errors::BlobError;

/// Size of a single EIP-4844 blob.
pub const BLOB_SIZE: usize = 4096 * 32;

pub type Blob = Vec<u8>;

/// Packs the borsh encoding of a pruned batch into zero-padded blobs.
#[derive(Clone, Copy, Debug)]
pub struct BorshBlobBuilder {
    max_blobs: usize,
}

impl BorshBlobBuilder {
    pub fn new(max_blobs: usize) -> Self {
        Self { max_blobs }
    }

    pub fn make_blobs(&self, batch: &PrunedBatch) -> Result<Vec<Blob>, BlobError> {
        let data = borsh::to_vec(batch)?;

        let needed = data.len().div_ceil(BLOB_SIZE).max(1);
        if needed > self.max_blobs {
            return Err(BlobError::BlobsLimitExceeded {
                needed,
                limit: self.max_blobs,
            });
        }

        let mut blobs: Vec<Blob> = data.chunks(BLOB_SIZE).map(<[u8]>::to_vec).collect();
        if blobs.is_empty() {
            blobs.push(Vec::new());
        }
        for blob in &mut blobs {
            blob.resize(BLOB_SIZE, 0);
        }
        Ok(blobs)
    }
}
