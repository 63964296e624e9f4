use std::fmt;

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Kind of proof work. Declaration order is the tie-break order used by the
/// scheduler.
#[derive(
    Copy,
    Clone,
    Debug,
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
pub enum TaskType {
    /// Whole-batch proof, completing it marks the batch as proved.
    ProofBatch,
    ProofBlock,
    AggregateProofs,
    PartialProve,
    AggregatedChallenge,
    CombinedQ,
    AggregatedFri,
    FriConsistencyChecks,
    MergeProof,
}

impl TaskType {
    pub const ALL: [TaskType; 9] = [
        TaskType::ProofBatch,
        TaskType::ProofBlock,
        TaskType::AggregateProofs,
        TaskType::PartialProve,
        TaskType::AggregatedChallenge,
        TaskType::CombinedQ,
        TaskType::AggregatedFri,
        TaskType::FriConsistencyChecks,
        TaskType::MergeProof,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ProofBatch => "ProofBatch",
            TaskType::ProofBlock => "ProofBlock",
            TaskType::AggregateProofs => "AggregateProofs",
            TaskType::PartialProve => "PartialProve",
            TaskType::AggregatedChallenge => "AggregatedChallenge",
            TaskType::CombinedQ => "CombinedQ",
            TaskType::AggregatedFri => "AggregatedFri",
            TaskType::FriConsistencyChecks => "FriConsistencyChecks",
            TaskType::MergeProof => "MergeProof",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Copy,
    Clone,
    Debug,
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
pub enum CircuitType {
    #[default]
    None,
    Bytecode,
    ReadWrite,
    Zkevm,
    Copy,
}

#[derive(
    Copy,
    Clone,
    Debug,
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
pub enum TaskStatus {
    /// Some dependencies have not delivered their results yet.
    WaitingForInput,
    WaitingForExecutor,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::WaitingForInput => "WaitingForInput",
            TaskStatus::WaitingForExecutor => "WaitingForExecutor",
            TaskStatus::Running => "Running",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Kinds of artifacts an executor can report back.
#[derive(
    Copy,
    Clone,
    Debug,
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
pub enum ProverResultType {
    PartialProof,
    CommitmentState,
    PartialProofChallenges,
    AssignmentTableDescription,
    ThetaPower,
    AggregatedThetaPowers,
    PreprocessedCommonData,
    AggregatedChallenges,
    CombinedQPolynomial,
    AggregatedFriProof,
    ProofOfWork,
    ConsistencyCheckChallenges,
    LpcConsistencyCheckProof,
    FinalProof,
    BlockProof,
    AggregatedProof,
}
