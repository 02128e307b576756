use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{TaskKind, TaskState};

/// A row in the `tasks` table.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: String,
    /// Correlation id supplied by an external API caller, if any.
    pub api_task_id: Option<String>,
    /// URL notified when the task reaches a terminal state.
    pub api_task_callback: Option<String>,
    pub name: Option<String>,
    pub kind: TaskKind,
    pub status: TaskState,
    /// Generation parameters as JSON text, shaped per `kind`. Validated at
    /// admission; immutable once the task starts running.
    pub params: String,
    /// Higher values dequeue first.
    pub priority: i64,
    /// Terminal payload as JSON text; `Some` exactly when done or failed.
    pub result: Option<String>,
    pub bookmarked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    /// Stored params as a JSON value.
    pub fn params_value(&self) -> Value {
        serde_json::from_str(&self.params).unwrap_or(Value::Null)
    }

    /// Stored result as a JSON value, when terminal.
    pub fn result_value(&self) -> Option<Value> {
        self.result
            .as_ref()
            .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
    }
}
