//! Coordination core of the sync committee: turns the L2 chain into block
//! batches, schedules their proofs and proposes proved state to L1.

pub mod aggregator;
pub mod blob;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod handler;
pub mod l1;
pub mod lag_tracker;
pub mod proposer;
pub mod reset;
pub mod scheduler;
pub mod service;
pub mod worker;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
