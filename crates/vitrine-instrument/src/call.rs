//! Call records and debugger state snapshots

use crate::error::ExceptionKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of one intercepted call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Recorded, not yet running (paused by the debugger)
    Waiting,
    /// Running
    Active,
    /// Resolved
    Done,
    /// Failed
    Error,
}

impl CallStatus {
    /// Whether the call already ran to an end
    #[inline]
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Exception captured from a failing call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallException {
    /// Display class
    pub kind: ExceptionKind,
    /// Message
    pub message: String,
}

impl CallException {
    /// Capture an error
    #[must_use]
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self {
            kind: ExceptionKind::classify(error),
            message: error.to_string(),
        }
    }
}

/// One intercepted interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    /// `"<storyId> [<cursor>] <method>"`
    pub id: String,
    /// Position in the run, starting at 1
    pub cursor: u64,
    /// Story the call belongs to
    pub story_id: String,
    /// Instrumented method name
    pub method: String,
    /// Arguments as passed
    pub args: Vec<Value>,
    /// Ids of enclosing calls, outermost first
    pub ancestors: Vec<String>,
    /// Whether the debugger may pause on this call
    pub interceptable: bool,
    /// Status
    pub status: CallStatus,
    /// Captured exception when `status` is `error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<CallException>,
}

impl Call {
    /// Create a waiting call
    #[must_use]
    pub fn new(
        story_id: &str,
        cursor: u64,
        method: &str,
        args: Vec<Value>,
        ancestors: Vec<String>,
        interceptable: bool,
    ) -> Self {
        Self {
            id: call_id(story_id, cursor, method),
            cursor,
            story_id: story_id.to_string(),
            method: method.to_string(),
            args,
            ancestors,
            interceptable,
            status: CallStatus::Waiting,
            exception: None,
        }
    }

    /// Whether this call is nested in another
    #[inline]
    #[must_use]
    pub fn is_nested(&self) -> bool {
        !self.ancestors.is_empty()
    }
}

/// Build a call id
#[must_use]
pub fn call_id(story_id: &str, cursor: u64, method: &str) -> String {
    format!("{story_id} [{cursor}] {method}")
}

/// Entry of the call log published with `instrumenter/sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogItem {
    /// Call id
    pub call_id: String,
    /// Status
    pub status: CallStatus,
    /// Enclosing calls
    pub ancestors: Vec<String>,
}

impl From<&Call> for LogItem {
    fn from(call: &Call) -> Self {
        Self {
            call_id: call.id.clone(),
            status: call.status,
            ancestors: call.ancestors.clone(),
        }
    }
}

/// Which debugger controls are currently usable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlStates {
    /// Restart in debugging mode
    pub start: bool,
    /// Step back one call
    pub back: bool,
    /// Jump to a call
    pub goto: bool,
    /// Run the paused call
    pub next: bool,
    /// Leave debugging mode
    pub end: bool,
}

/// Payload of `instrumenter/sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    /// Story id
    pub story_id: String,
    /// Call log in call order
    pub log_items: Vec<LogItem>,
    /// Call the run is paused at
    pub paused_at: Option<String>,
    /// Usable controls
    pub control_states: ControlStates,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_ids_carry_story_cursor_and_method() {
        let call = Call::new("form--submit", 3, "click", vec![json!("#go")], vec![], true);
        assert_eq!(call.id, "form--submit [3] click");
        assert_eq!(call.status, CallStatus::Waiting);
        assert!(!call.is_nested());
    }

    #[test]
    fn serializes_in_camel_case_without_empty_exception() {
        let call = Call::new("a--b", 1, "expect", vec![], vec!["a--b [0] step".into()], false);
        let value = serde_json::to_value(&call).unwrap();

        assert_eq!(value["storyId"], json!("a--b"));
        assert_eq!(value["status"], json!("waiting"));
        assert!(value.get("exception").is_none());
    }
}
