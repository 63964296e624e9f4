//! Crate includes reusable utils for the sync committee services, such as
//! initializing the tracing framework, retrying fallible operations and
//! telling the time.

pub mod clock;
pub mod logging;
pub mod retry;
