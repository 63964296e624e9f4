//! Async access to the stores. Every operation runs on a dedicated thread
//! pool so that transaction retries never block the async runtime.

mod exec;
pub mod ops;

pub use exec::ops_pool;
pub use ops::{batch::BatchDbOps, task::TaskDbOps};
