//! Wire representations for queue, history and task-detail reads.
//!
//! Two timestamp encodings are in play: list payloads ([`TaskModel`]) carry
//! millisecond-epoch integers, while the task-detail payload ([`TaskDetail`])
//! carries ISO-8601 strings with millisecond precision and a trailing `Z`.
//! Both encode the same instant.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{TaskKind, TaskState};
use crate::entities::TaskRecord;

/// Input for [`crate::Scheduler::submit`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub kind: TaskKind,
    /// Raw generation parameters; validated against `kind` at admission.
    pub params: Value,
    #[serde(default)]
    pub name: Option<String>,
    /// Higher values dequeue first. Defaults to `0`.
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub api_task_id: Option<String>,
    #[serde(default)]
    pub api_task_callback: Option<String>,
}

impl NewTask {
    pub fn new(kind: TaskKind, params: Value) -> Self {
        Self {
            kind,
            params,
            name: None,
            priority: 0,
            api_task_id: None,
            api_task_callback: None,
        }
    }
}

/// Partial update of a pending task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskArgs {
    pub name: Option<String>,
    /// Shorthand for patching `params.checkpoint`.
    pub checkpoint: Option<String>,
    /// Partial params patch, merged over the stored params and re-validated.
    pub params: Option<serde_json::Map<String, Value>>,
    pub priority: Option<i64>,
}

/// A task as it appears in queue-status and history payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskModel {
    pub id: String,
    pub api_task_id: Option<String>,
    pub api_task_callback: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub status: TaskState,
    pub params: Value,
    pub priority: i64,
    /// 1-based queue rank; `None` once the task has left the pending set.
    pub position: Option<usize>,
    pub result: Option<Value>,
    pub bookmarked: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl TaskModel {
    pub(crate) fn from_record(record: &TaskRecord, position: Option<usize>) -> Self {
        Self {
            id: record.id.clone(),
            api_task_id: record.api_task_id.clone(),
            api_task_callback: record.api_task_callback.clone(),
            name: record.name.clone(),
            kind: record.kind,
            status: record.status,
            params: record.params_value(),
            priority: record.priority,
            position,
            result: record.result_value(),
            bookmarked: record.bookmarked,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    pub fn to_detail(&self) -> TaskDetail {
        TaskDetail {
            id: self.id.clone(),
            api_task_id: self.api_task_id.clone(),
            api_task_callback: self.api_task_callback.clone(),
            name: self.name.clone(),
            kind: self.kind,
            status: self.status,
            params: self.params.clone(),
            priority: self.priority,
            position: self.position,
            result: self.result.clone(),
            bookmarked: self.bookmarked,
            created_at: iso8601(self.created_at),
            updated_at: iso8601(self.updated_at),
        }
    }
}

/// A single task as returned by [`crate::Scheduler::get_task`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDetail {
    pub id: String,
    pub api_task_id: Option<String>,
    pub api_task_callback: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub status: TaskState,
    pub params: Value,
    pub priority: i64,
    pub position: Option<usize>,
    pub result: Option<Value>,
    pub bookmarked: bool,
    /// ISO-8601 with millisecond precision and a trailing `Z`.
    pub created_at: String,
    pub updated_at: String,
}

/// Snapshot of the queue returned by [`crate::Scheduler::queue_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Id of the task currently holding the generation slot.
    pub current_task_id: Option<String>,
    pub pending_tasks: Vec<TaskModel>,
    pub total_pending_tasks: usize,
    pub paused: bool,
}

/// One page of terminal tasks returned by [`crate::Scheduler::history`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    pub tasks: Vec<TaskModel>,
    pub total: usize,
}

fn iso8601(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn model() -> TaskModel {
        TaskModel {
            id: "t-1".to_owned(),
            api_task_id: Some("api-1".to_owned()),
            api_task_callback: None,
            name: None,
            kind: TaskKind::Txt2Img,
            status: TaskState::Failed,
            params: json!({"prompt": "a pier at dawn"}),
            priority: 4,
            position: None,
            result: Some(json!({"error": "boom"})),
            bookmarked: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn task_model_round_trips_through_json() {
        let original = model();
        let encoded = serde_json::to_value(&original).unwrap();

        // Millisecond-epoch integers on the wire.
        assert_eq!(
            encoded["created_at"],
            json!(original.created_at.timestamp_millis())
        );
        assert_eq!(encoded["type"], "txt2img");
        assert_eq!(encoded["status"], "failed");

        let decoded: TaskModel = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.id, original.id);
        assert_eq!(decoded.status, original.status);
        assert_eq!(decoded.result, original.result);
        assert_eq!(
            decoded.created_at.timestamp_millis(),
            original.created_at.timestamp_millis()
        );
    }

    #[test]
    fn detail_timestamps_are_iso8601_with_z_and_same_instant() {
        let original = model();
        let detail = original.to_detail();

        assert!(detail.created_at.ends_with('Z'));
        let reparsed = DateTime::parse_from_rfc3339(&detail.created_at).unwrap();
        assert_eq!(
            reparsed.timestamp_millis(),
            original.created_at.timestamp_millis()
        );

        // The two encodings agree on the instant.
        let wire = serde_json::to_value(&original).unwrap();
        assert_eq!(wire["created_at"], json!(reparsed.timestamp_millis()));
    }
}
