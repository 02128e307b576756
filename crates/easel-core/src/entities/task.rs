use std::future::Future;

use super::dao::TaskRecord;
use crate::domain::TaskState;

/// Persistence seam for task records.
///
/// The scheduler only ever calls `delete_task` for pending rows (the state
/// check happens under its ordering lock first), and `set_bookmarked` must
/// never touch status or ordering columns.
pub trait TaskStore: Send + Sync + 'static {
    fn insert_task(
        &self,
        record: TaskRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_task(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<TaskRecord>, sqlx::Error>> + Send;

    /// Update the pending-task mutable fields; `None` leaves a field as-is.
    fn update_task_fields(
        &self,
        id: &str,
        name: Option<&str>,
        params: Option<&str>,
        priority: Option<i64>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Transition a task, stamping `updated_at` and storing the terminal
    /// result when one is supplied.
    fn set_task_status(
        &self,
        id: &str,
        status: TaskState,
        result: Option<&str>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn set_bookmarked(
        &self,
        id: &str,
        bookmarked: bool,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn delete_task(&self, id: &str) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// All pending rows, highest priority first, submission order within a
    /// tier. Used to rebuild the in-memory queue at startup.
    fn list_pending(&self) -> impl Future<Output = Result<Vec<TaskRecord>, sqlx::Error>> + Send;

    /// One page of terminal rows, most recent first, plus the total count.
    fn list_history(
        &self,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<(Vec<TaskRecord>, i64), sqlx::Error>> + Send;

    /// Mark rows left `running` by a dead process as failed with the given
    /// result payload. Returns the number of rows touched.
    fn interrupt_running_tasks(
        &self,
        result: &str,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}
