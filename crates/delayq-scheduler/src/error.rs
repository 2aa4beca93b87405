use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `stop()` was called on a scheduler that was never started.
    #[error("Scheduler not started")]
    NotStarted,

    /// `start()` was called while the worker is already running.
    #[error("Scheduler already started")]
    AlreadyStarted,

    /// The scheduler has been stopped and accepts no more work.
    #[error("Scheduler stopped")]
    Stopped,

    /// `pop_min` on an empty queue. The wait protocol never does this.
    #[error("Deadline queue is empty")]
    EmptyQueue,

    /// The configured `max_pending` bound is reached.
    #[error("Limit exceeded: at most {max} pending jobs")]
    LimitExceeded { max: usize },

    /// The OS refused to spawn the worker thread.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The worker thread died instead of exiting cleanly.
    #[error("Worker thread panicked")]
    WorkerPanicked,

    /// `stop()` was called from inside a job, i.e. on the worker thread.
    #[error("Scheduler stop called from its own worker thread")]
    StopFromWorker,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
