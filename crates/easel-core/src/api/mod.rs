//! Public-facing operations on the [`Scheduler`].
//!
//! Everything a transport (HTTP handler, IPC listener, UI) needs lives here;
//! the queue, the dispatch loop and the store remain private. All mutating
//! operations validate the task's current state before applying, and reads
//! snapshot the ordering domain so callers never observe torn state.
//!
//! # Quick-start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use easel_core::api::NewTask;
//! use easel_core::config::Config;
//! use easel_core::domain::TaskKind;
//! use easel_core::domain::params::TaskParams;
//! use easel_core::{GenerationEngine, GenerationOutput, Scheduler};
//!
//! struct NullEngine;
//!
//! #[async_trait::async_trait]
//! impl GenerationEngine for NullEngine {
//!     async fn generate(
//!         &self,
//!         _kind: TaskKind,
//!         _params: &TaskParams,
//!     ) -> Result<GenerationOutput, String> {
//!         Ok(GenerationOutput {
//!             images: Vec::new(),
//!             info: serde_json::Value::Null,
//!         })
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), easel_core::SchedulerError> {
//! let scheduler = Scheduler::from_config(&Config::from_env(), Arc::new(NullEngine)).await?;
//!
//! let task_id = scheduler
//!     .submit(NewTask::new(
//!         TaskKind::Txt2Img,
//!         serde_json::json!({"prompt": "a lighthouse at dusk"}),
//!     ))
//!     .await?;
//!
//! let status = scheduler.queue_status(20, 0).await?;
//! println!(
//!     "{} pending, running: {:?}",
//!     status.total_pending_tasks, status.current_task_id
//! );
//! # scheduler.shutdown().await;
//! # let _ = task_id;
//! # Ok(())
//! # }
//! ```

mod types;

pub use types::{History, NewTask, QueueStatus, TaskDetail, TaskModel, UpdateTaskArgs};

use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::Scheduler;
use crate::domain::TaskState;
use crate::domain::params::TaskParams;
use crate::entities::{TaskRecord, TaskStore};
use crate::error::SchedulerError;

impl Scheduler {
    /// Admit a new task: validate its parameters, persist the record and
    /// enqueue it. Returns the generated task id.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Validation`] when the params do not fit the task
    /// kind; [`SchedulerError::ShuttingDown`] after [`Scheduler::shutdown`].
    pub async fn submit(&self, new_task: NewTask) -> Result<String, SchedulerError> {
        if *self.shutdown_tx.borrow() {
            return Err(SchedulerError::ShuttingDown);
        }
        let params = TaskParams::parse(new_task.kind, new_task.params)?;

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let record = TaskRecord {
            id: id.clone(),
            api_task_id: new_task.api_task_id,
            api_task_callback: new_task.api_task_callback,
            name: new_task.name,
            kind: new_task.kind,
            status: TaskState::Pending,
            params: params.to_value().to_string(),
            priority: new_task.priority,
            result: None,
            bookmarked: false,
            created_at: now,
            updated_at: now,
        };

        // Persist before enqueueing so a crash in between is recovered by the
        // startup queue rebuild instead of losing the task.
        self.inner.store.insert_task(record).await?;
        {
            let mut state = self.inner.state.lock().await;
            state.queue.enqueue(id.clone(), new_task.priority);
        }
        self.inner.notify.notify_one();

        info!(
            task_id = %id,
            kind = %new_task.kind,
            priority = new_task.priority,
            "task enqueued"
        );
        Ok(id)
    }

    /// Consistent snapshot of the queue: the running task id, one page of
    /// pending tasks in position order, the total pending count and the
    /// paused flag.
    pub async fn queue_status(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<QueueStatus, SchedulerError> {
        // Snapshot the ordering domain first so positions, the running slot
        // and the paused flag agree with each other.
        let (ordered, current_task_id, paused) = {
            let state = self.inner.state.lock().await;
            (
                state.queue.ordered_ids(),
                state.running.clone(),
                state.paused,
            )
        };

        let total_pending_tasks = ordered.len();
        let mut pending_tasks = Vec::new();
        for (index, id) in ordered.iter().enumerate().skip(offset).take(limit) {
            match self.inner.store.get_task(id).await? {
                Some(record) => pending_tasks.push(TaskModel::from_record(&record, Some(index + 1))),
                None => warn!(task_id = %id, "queued task has no record"),
            }
        }

        Ok(QueueStatus {
            current_task_id,
            pending_tasks,
            total_pending_tasks,
            paused,
        })
    }

    /// One page of terminal (done/failed) tasks, most recent first, plus the
    /// total history count.
    pub async fn history(&self, limit: usize, offset: usize) -> Result<History, SchedulerError> {
        let (records, total) = self
            .inner
            .store
            .list_history(limit as i64, offset as i64)
            .await?;
        Ok(History {
            tasks: records
                .iter()
                .map(|record| TaskModel::from_record(record, None))
                .collect(),
            total: total as usize,
        })
    }

    /// Fetch a single task, with its queue position when pending.
    pub async fn get_task(&self, id: &str) -> Result<TaskDetail, SchedulerError> {
        let record = self.load(id).await?;
        let position = if record.status == TaskState::Pending {
            self.inner.state.lock().await.queue.position_of(id)
        } else {
            None
        };
        Ok(TaskModel::from_record(&record, position).to_detail())
    }

    /// Update a pending task's name, params and/or priority.
    ///
    /// The params patch is merged over the stored params and re-validated as
    /// a whole; `checkpoint` is shorthand for patching `params.checkpoint`.
    /// A priority change re-enters the task at the back of its new tier.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidState`] once the task is running or terminal.
    pub async fn update_task(
        &self,
        id: &str,
        args: UpdateTaskArgs,
    ) -> Result<TaskDetail, SchedulerError> {
        // Hold the ordering domain across check-and-mutate so the task cannot
        // start running between the state check and the write.
        let mut state = self.inner.state.lock().await;
        let record = self.load(id).await?;
        if !(record.status == TaskState::Pending && state.queue.contains(id)) {
            return Err(self.invalid_state(&state, &record));
        }

        let merged_params = if args.params.is_some() || args.checkpoint.is_some() {
            let current = TaskParams::parse(record.kind, record.params_value())?;
            let mut patch = args.params.unwrap_or_default();
            if let Some(checkpoint) = args.checkpoint {
                patch.insert("checkpoint".to_owned(), Value::String(checkpoint));
            }
            Some(current.merged_with(&patch)?.to_value().to_string())
        } else {
            None
        };

        self.inner
            .store
            .update_task_fields(
                id,
                args.name.as_deref(),
                merged_params.as_deref(),
                args.priority,
            )
            .await?;

        if let Some(priority) = args.priority
            && priority != record.priority
        {
            state.queue.reorder(id, priority);
            info!(task_id = %id, priority, "task re-ranked");
        }
        drop(state);

        self.get_task(id).await
    }

    /// Cancel a pending task: it leaves the queue and its record is deleted.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidState`] for running or terminal tasks — a
    /// running generation is never preempted.
    pub async fn cancel(&self, id: &str) -> Result<(), SchedulerError> {
        let mut state = self.inner.state.lock().await;
        let record = self.load(id).await?;
        if !(record.status == TaskState::Pending && state.queue.contains(id)) {
            return Err(self.invalid_state(&state, &record));
        }

        self.inner.store.delete_task(id).await?;
        state.queue.remove(id);
        drop(state);

        info!(task_id = %id, "task cancelled");
        Ok(())
    }

    /// Flip a task's bookmark flag. Works in any state and never affects
    /// ordering or status. Returns the new value.
    pub async fn toggle_bookmark(&self, id: &str) -> Result<bool, SchedulerError> {
        let record = self.load(id).await?;
        let bookmarked = !record.bookmarked;
        self.inner.store.set_bookmarked(id, bookmarked).await?;
        Ok(bookmarked)
    }

    /// Stop starting new tasks. A task that is already running completes.
    pub async fn pause(&self) {
        let mut state = self.inner.state.lock().await;
        if !state.paused {
            state.paused = true;
            info!("queue paused");
        }
    }

    /// Re-enable dequeuing; the loop re-checks the queue immediately.
    pub async fn resume(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if !state.paused {
                return;
            }
            state.paused = false;
        }
        self.inner.notify.notify_one();
        info!("queue resumed");
    }

    pub async fn is_paused(&self) -> bool {
        self.inner.state.lock().await.paused
    }

    // ── helpers ──────────────────────────────────────────────────────────────

    async fn load(&self, id: &str) -> Result<TaskRecord, SchedulerError> {
        self.inner
            .store
            .get_task(id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound {
                task_id: id.to_owned(),
            })
    }

    /// `InvalidState` with the status the caller effectively raced against:
    /// a task that was just claimed off the queue reports `Running` even if
    /// its row has not been stamped yet.
    fn invalid_state(
        &self,
        state: &crate::scheduler::SchedulerState,
        record: &TaskRecord,
    ) -> SchedulerError {
        let status = if state.running.as_deref() == Some(record.id.as_str()) {
            TaskState::Running
        } else {
            record.status
        };
        SchedulerError::InvalidState {
            task_id: record.id.clone(),
            status,
        }
    }
}
