//! Task graph model: proof tasks, their scheduling state and results.

mod entry;
mod errors;
pub mod graph;
mod result;
mod types;
mod view;

pub use entry::{Task, TaskEntry};
pub use errors::TaskError;
pub use result::{TaskErrType, TaskExecError, TaskResult, TaskResultDetails};
pub use types::{CircuitType, ProverResultType, TaskStatus, TaskType};
pub use view::{TaskFilter, TaskStats, TaskTreeView, TaskView};
