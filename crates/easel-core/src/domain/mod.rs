//! Task domain model: lifecycle states, task kinds and terminal results.

pub mod params;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// High-level lifecycle state of a queued task.
///
/// Transitions:
/// - `Pending -> Running -> Done`
/// - `Pending -> Running -> Failed`
///
/// A `Pending` task may also be removed (cancelled) without ever running.
/// No transition leaves a terminal state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskState {
    /// Returns `true` if the task has reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

/// The generation operation a task requests. Fixed at creation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskKind {
    Txt2Img,
    Img2Img,
}

/// Terminal payload stored on a task once it leaves the running state.
///
/// Serialized untagged so the stored JSON is either the success shape
/// (`{"images": [...], "info": {...}}`) or the failure shape
/// (`{"error": "..."}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskResult {
    /// Successful generation: encoded images plus engine-reported metadata.
    Success {
        images: Vec<String>,
        info: serde_json::Value,
    },
    /// The generation operation failed or was interrupted.
    Failure { error: String },
}

impl TaskResult {
    pub fn failure(error: impl Into<String>) -> Self {
        TaskResult::Failure {
            error: error.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskResult::Failure { .. })
    }

    /// Final state this result transitions the task into.
    pub fn final_state(&self) -> TaskState {
        if self.is_failure() {
            TaskState::Failed
        } else {
            TaskState::Done
        }
    }

    /// Serialized form as stored on the task record.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"unserializable result"}"#.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn state_strings_round_trip() {
        for state in [
            TaskState::Pending,
            TaskState::Running,
            TaskState::Done,
            TaskState::Failed,
        ] {
            let s = state.to_string();
            assert_eq!(TaskState::from_str(&s).unwrap(), state);
        }
        assert_eq!(TaskState::Running.to_string(), "running");
        assert_eq!(TaskKind::Txt2Img.to_string(), "txt2img");
        assert_eq!(TaskKind::from_str("img2img").unwrap(), TaskKind::Img2Img);
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Done.is_terminal());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn result_shapes() {
        let ok = TaskResult::Success {
            images: vec!["abc".into()],
            info: serde_json::json!({"seed": 42}),
        };
        let v = serde_json::to_value(&ok).unwrap();
        assert_eq!(v["images"][0], "abc");
        assert_eq!(v["info"]["seed"], 42);

        let err = TaskResult::failure("out of memory");
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["error"], "out of memory");
        assert_eq!(err.final_state(), TaskState::Failed);
    }
}
