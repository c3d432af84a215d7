use tm_types::{TargetId, TypeError};

/// Errors produced by the scheduling engine.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// A blocking peek was interrupted because the queue was closed.
    #[error("wait on the queue of target {0} was cancelled")]
    Cancelled(TargetId),

    /// `commit_remove` was called without an outstanding peek.
    #[error("commit on the queue of target {0} without a preceding peek")]
    CommitWithoutPeek(TargetId),

    /// The scheduler was stopped through its [`StopHandle`](crate::StopHandle).
    #[error("scheduler is stopped")]
    Stopped,

    /// The scheduler needs at least one target to merge.
    #[error("no targets configured")]
    NoTargets,

    /// Two targets share the same identity.
    #[error("duplicate target id {0}")]
    DuplicateTarget(TargetId),

    /// An event violated the stamping rules.
    #[error("event error: {0}")]
    Event(#[from] TypeError),

    /// A background eviction sweep panicked or was aborted.
    #[error("eviction sweep failed: {0}")]
    SweepFailed(String),
}

/// Convenience alias used throughout the scheduler crate.
pub type Result<T> = std::result::Result<T, SchedulerError>;
