use std::fmt;

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

define_uuid_id!(
    /// Globally unique id of a block batch.
    BatchId
);

define_uuid_id!(
    /// Globally unique id of a proof task.
    TaskId
);

/// Id of an external proof producer pulling tasks from the scheduler.
#[derive(
    Copy,
    Clone,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct ExecutorId(u32);

impl ExecutorId {
    /// Null id, never a valid task owner.
    pub const UNKNOWN: ExecutorId = ExecutorId(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }

    pub fn inner(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ExecutorId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExecutorId({})", self.0)
    }
}
