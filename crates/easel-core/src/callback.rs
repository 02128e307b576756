//! Terminal-transition callback delivery.
//!
//! Delivery is fire-and-forget with at most one attempt: the scheduler moves
//! on to the next pending task immediately, and a failed delivery is logged
//! without ever rolling back the task's terminal state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::TaskState;
use crate::error::SchedulerError;

/// JSON body posted to a task's callback URL on terminal transition.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackNotice {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_task_id: Option<String>,
    pub status: TaskState,
    pub result: Option<serde_json::Value>,
}

/// Transport for callback delivery; object-safe so tests can record calls.
#[async_trait]
pub trait CallbackSink: Send + Sync + 'static {
    async fn deliver(&self, url: &str, notice: &CallbackNotice) -> Result<(), SchedulerError>;
}

/// Default sink: one HTTP POST with a bounded timeout, no retries.
pub struct HttpCallbackSink {
    client: reqwest::Client,
}

impl HttpCallbackSink {
    pub fn new(timeout: Duration) -> Result<Self, SchedulerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::CallbackDelivery {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackSink for HttpCallbackSink {
    async fn deliver(&self, url: &str, notice: &CallbackNotice) -> Result<(), SchedulerError> {
        let response = self.client.post(url).json(notice).send().await.map_err(|e| {
            SchedulerError::CallbackDelivery {
                message: e.to_string(),
            }
        })?;
        response
            .error_for_status()
            .map_err(|e| SchedulerError::CallbackDelivery {
                message: e.to_string(),
            })?;
        Ok(())
    }
}

/// Dispatches terminal notifications without blocking the scheduler loop.
pub(crate) struct CallbackDispatcher {
    sink: Arc<dyn CallbackSink>,
}

impl CallbackDispatcher {
    pub fn new(sink: Arc<dyn CallbackSink>) -> Self {
        Self { sink }
    }

    /// Spawn the delivery for one finished task and log the outcome.
    ///
    /// No callback URL means no work. The spawned task owns the notice; the
    /// caller never learns whether delivery succeeded.
    pub fn dispatch(&self, callback_url: Option<&str>, notice: CallbackNotice) {
        let Some(url) = callback_url else {
            return;
        };
        let url = url.to_owned();
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            match sink.deliver(&url, &notice).await {
                Ok(()) => debug!(task_id = %notice.task_id, url = %url, "callback delivered"),
                Err(e) => {
                    warn!(task_id = %notice.task_id, url = %url, error = %e, "callback delivery failed")
                }
            }
        });
    }
}
