//! Where blocking store calls run when an operation is awaited.
//!
//! Every prepared operation is blocking at heart. The async wrappers hand
//! the blocking call to a `Scheduler` so the calling task is parked, not
//! blocked. Results come back on whatever task awaits the future; there is
//! no hop back to a particular thread.

use tokio::runtime::Handle;

use crate::error::SchedulerError;

/// Execution target for blocking calls made through async wrappers.
#[derive(Debug, Clone, Default)]
pub enum Scheduler {
    /// The blocking pool of the runtime that polls the future.
    #[default]
    Io,
    /// The blocking pool of a specific runtime.
    Runtime(Handle),
    /// Run inline on the polling task. Only for tests and callers that
    /// already sit on a blocking thread.
    Immediate,
}

impl Scheduler {
    /// Runs `task` on this scheduler and returns its result.
    pub async fn run<F, T, E>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<SchedulerError> + Send + 'static,
    {
        match self {
            Scheduler::Io => tokio::task::spawn_blocking(task)
                .await
                .map_err(|e| E::from(SchedulerError::from(e)))?,
            Scheduler::Runtime(handle) => handle
                .spawn_blocking(task)
                .await
                .map_err(|e| E::from(SchedulerError::from(e)))?,
            Scheduler::Immediate => task(),
        }
    }
}
