//! The seam between stream runtimes and the health subsystem.

use std::sync::Arc;

use crate::types::LifecycleState;

/// Read-only view of one running stream runtime instance.
pub trait RuntimeHandle: Send + Sync {
    /// Stable identifier assigned by the runtime, if it has one.
    fn instance_id(&self) -> Option<String>;

    fn state(&self) -> LifecycleState;

    /// Number of live worker threads.
    fn thread_count(&self) -> usize;
}

/// Enumerates the runtime instances known to this process.
///
/// A `None` slot is an instance whose runtime has not been created yet.
pub trait InstanceProvider: Send + Sync {
    fn instances(&self) -> Vec<Option<Arc<dyn RuntimeHandle>>>;
}

impl<F> InstanceProvider for F
where
    F: Fn() -> Vec<Option<Arc<dyn RuntimeHandle>>> + Send + Sync,
{
    fn instances(&self) -> Vec<Option<Arc<dyn RuntimeHandle>>> {
        self()
    }
}
