//! # courier-poller
//!
//! Update acquisition and dispatch: the long-polling loop, the handler
//! registry it fans updates out to, the concurrency limiter bounding handler
//! tasks, and the single-instance lock bracketing a run.

pub mod guard;
pub mod limiter;
pub mod poller;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use guard::{InstanceGuard, LockStatus};
pub use limiter::{ConcurrencyLimiter, Permit};
pub use poller::{backoff_delay, Poller, PollerState, StopHandle};
pub use registry::{HandlerRegistry, HandlerResult};
