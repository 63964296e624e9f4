//! Rollback of fetched and proving progress after a fork or an unrecoverable
//! proof failure.

mod launcher;
mod resetter;

#[cfg(test)]
pub use launcher::MockResetLauncher;
pub use launcher::{ResetLauncher, StateResetLauncher};
pub use resetter::StateResetter;
