//! Critical task management: spawning, panic monitoring and graceful shutdown.

mod manager;
mod pending_tasks;
mod shutdown;

pub use manager::{PanickedTaskError, TaskExecutor, TaskManager};
pub use shutdown::{ShutdownGuard, ShutdownSignal};
