//! Lifecycle manager: admission ordering, single-slot execution and the
//! pause/resume gate.
//!
//! One mutual-exclusion domain ([`SchedulerState`]) guards the pending queue,
//! the running slot and the pause flag, so enqueue, dequeue and status
//! transitions always observe a consistent snapshot. The generation call
//! itself runs outside that lock: admission and queries stay responsive while
//! an image is being rendered.
//!
//! The dispatch loop is event-driven — it sleeps on a [`Notify`] and is woken
//! by submissions, resume and task completion, never by polling.


use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::callback::{CallbackDispatcher, CallbackNotice, CallbackSink, HttpCallbackSink};
use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::domain::params::TaskParams;
use crate::domain::{TaskResult, TaskState};
use crate::engine::GenerationEngine;
use crate::entities::{TaskRecord, TaskStore};
use crate::error::SchedulerError;
use crate::queue::PendingQueue;

/// The single mutual-exclusion domain for scheduling decisions.
pub(crate) struct SchedulerState {
    pub(crate) queue: PendingQueue,
    /// Id of the task currently holding the generation slot, if any.
    pub(crate) running: Option<String>,
    pub(crate) paused: bool,
}

pub(crate) struct SchedulerInner {
    pub(crate) state: Mutex<SchedulerState>,
    pub(crate) store: SqliteStore,
    pub(crate) engine: Arc<dyn GenerationEngine>,
    pub(crate) callbacks: CallbackDispatcher,
    /// Woken on submit, resume and completion.
    pub(crate) notify: Notify,
}

/// Handle to a running scheduler. Cloning is cheap; all clones share state.
///
/// Operations on tasks and the queue live in [`crate::api`].
#[derive(Clone)]
pub struct Scheduler {
    pub(crate) inner: Arc<SchedulerInner>,
    pub(crate) shutdown_tx: Arc<watch::Sender<bool>>,
    join: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl Scheduler {
    /// Start the scheduler over the given store, engine and callback sink.
    ///
    /// Rows left `running` by a previous process are recovered first (they
    /// become `failed` with an interruption result), then the pending queue
    /// is rebuilt from the store and the dispatch loop is spawned.
    pub async fn start(
        store: SqliteStore,
        engine: Arc<dyn GenerationEngine>,
        sink: Arc<dyn CallbackSink>,
    ) -> Result<Self, SchedulerError> {
        let interrupted = store
            .interrupt_running_tasks(
                &TaskResult::failure("interrupted: scheduler restarted").to_json_string(),
            )
            .await?;
        if interrupted > 0 {
            warn!(
                count = interrupted,
                "recovered tasks left running by a previous process"
            );
        }

        let mut queue = PendingQueue::new();
        let pending = store.list_pending().await?;
        for record in &pending {
            queue.enqueue(record.id.clone(), record.priority);
        }
        if !pending.is_empty() {
            info!(count = pending.len(), "restored pending tasks");
        }

        let inner = Arc::new(SchedulerInner {
            state: Mutex::new(SchedulerState {
                queue,
                running: None,
                paused: false,
            }),
            store,
            engine,
            callbacks: CallbackDispatcher::new(sink),
            notify: Notify::new(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run_loop(Arc::clone(&inner), shutdown_rx));
        inner.notify.notify_one();

        Ok(Self {
            inner,
            shutdown_tx: Arc::new(shutdown_tx),
            join: Arc::new(std::sync::Mutex::new(Some(join))),
        })
    }

    /// Open the store and the default HTTP callback sink described by
    /// `config`, then start the scheduler.
    pub async fn from_config(
        config: &Config,
        engine: Arc<dyn GenerationEngine>,
    ) -> Result<Self, SchedulerError> {
        let store = SqliteStore::connect(&config.database_url).await?;
        let sink = HttpCallbackSink::new(Duration::from_secs(config.callback_timeout_secs))?;
        Self::start(store, engine, Arc::new(sink)).await
    }

    /// Stop the dispatch loop. A task that is already running completes
    /// first; no new tasks are started. Idempotent.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = match self.join.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "scheduler loop ended abnormally");
            }
            info!("scheduler stopped");
        }
    }
}

async fn run_loop(inner: Arc<SchedulerInner>, mut shutdown_rx: watch::Receiver<bool>) {
    info!("scheduler loop started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if let Some(id) = claim_next(&inner).await {
            execute_task(&inner, &id).await;
            // Completion may have made the next pending task runnable; check
            // again before sleeping.
            continue;
        }

        tokio::select! {
            _ = inner.notify.notified() => {}
            _ = shutdown_rx.changed() => {}
        }
    }
    info!("scheduler loop stopped");
}

/// Claim the next task id when the slot is free and the queue is not paused.
async fn claim_next(inner: &SchedulerInner) -> Option<String> {
    let mut state = inner.state.lock().await;
    if state.paused || state.running.is_some() {
        return None;
    }
    let id = state.queue.pop_next()?;
    state.running = Some(id.clone());
    Some(id)
}

/// Run one claimed task to a terminal state.
async fn execute_task(inner: &SchedulerInner, id: &str) {
    let record = match inner.store.get_task(id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            warn!(task_id = %id, "claimed task has no record; releasing the slot");
            release_slot(inner).await;
            return;
        }
        Err(e) => {
            error!(task_id = %id, error = %e, "failed to load claimed task");
            release_slot(inner).await;
            return;
        }
    };

    if let Err(e) = inner
        .store
        .set_task_status(id, TaskState::Running, None)
        .await
    {
        // Treat the broken transition as a task failure rather than retrying:
        // failure is data, and the loop must keep serving the queue.
        error!(task_id = %id, error = %e, "failed to mark task running");
        finish_task(
            inner,
            &record,
            TaskResult::failure(format!("could not start task: {e}")),
        )
        .await;
        return;
    }
    info!(task_id = %id, kind = %record.kind, "task started");

    let result = match TaskParams::parse(record.kind, record.params_value()) {
        Ok(params) => match inner.engine.generate(record.kind, &params).await {
            Ok(output) => {
                info!(task_id = %id, images = output.images.len(), "task finished");
                TaskResult::Success {
                    images: output.images,
                    info: output.info,
                }
            }
            Err(message) => {
                warn!(task_id = %id, error = %message, "task failed");
                TaskResult::failure(message)
            }
        },
        // Admission validated these params; a parse failure here means the
        // stored row was corrupted out-of-band.
        Err(e) => {
            warn!(task_id = %id, error = %e, "stored params no longer parse");
            TaskResult::failure(format!("invalid stored params: {e}"))
        }
    };

    finish_task(inner, &record, result).await;
}

/// Persist a terminal transition, free the slot and hand off the callback.
async fn finish_task(inner: &SchedulerInner, record: &TaskRecord, result: TaskResult) {
    let status = result.final_state();
    let result_json = result.to_json_string();
    if let Err(e) = inner
        .store
        .set_task_status(&record.id, status, Some(&result_json))
        .await
    {
        error!(task_id = %record.id, error = %e, "failed to persist terminal state");
    }

    release_slot(inner).await;

    inner.callbacks.dispatch(
        record.api_task_callback.as_deref(),
        CallbackNotice {
            task_id: record.id.clone(),
            api_task_id: record.api_task_id.clone(),
            status,
            result: serde_json::from_str(&result_json).ok(),
        },
    );
}

async fn release_slot(inner: &SchedulerInner) {
    inner.state.lock().await.running = None;
    inner.notify.notify_one();
}
