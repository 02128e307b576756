use thiserror::Error;

use crate::domain::TaskState;

/// Errors produced by the scheduler core.
///
/// Validation and state errors surface synchronously to the caller;
/// generation failures never do — they are captured into the failing task's
/// result instead, so a bad task can never take the scheduler down with it.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The referenced task does not exist.
    #[error("task not found: {task_id}")]
    NotFound { task_id: String },

    /// A mutation was attempted on a task whose state forbids it.
    #[error("task {task_id} is {status}; operation requires a pending task")]
    InvalidState { task_id: String, status: TaskState },

    /// The submitted parameters failed admission validation.
    #[error("invalid parameters: {message}")]
    Validation { message: String },

    /// Propagated from the SQLite (or other) store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A terminal-state callback could not be delivered. Logged by the
    /// dispatcher; the task's terminal state is unaffected.
    #[error("callback delivery failed: {message}")]
    CallbackDelivery { message: String },

    /// The scheduler is shutting down and no longer accepts work.
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

impl SchedulerError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        SchedulerError::Validation {
            message: message.into(),
        }
    }
}
