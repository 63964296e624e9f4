pub mod batch;
pub mod task;
