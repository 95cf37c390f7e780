//! Instrumenter errors and assertion failures

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Instrumenter errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentError {
    /// A paused call was dropped by a reset before it could run
    #[error("call {call_id} was interrupted before it ran")]
    Interrupted {
        /// Call id
        call_id: String,
    },

    /// The manager asked to re-run the story from a failing call
    #[error("story {story_id} is being re-run after call {call_id} failed")]
    Rerun {
        /// Story id
        story_id: String,
        /// Failing call
        call_id: String,
    },

    /// No method of that name was instrumented
    #[error("no instrumented method named '{0}'")]
    UnknownMethod(String),
}

impl InstrumentError {
    /// Whether this error ends the run in favour of a remount
    #[inline]
    #[must_use]
    pub fn is_rerun(&self) -> bool {
        matches!(self, Self::Rerun { .. })
    }
}

/// Failed expectation raised from a play function
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct AssertionError {
    /// Human readable message
    pub message: String,
    /// Expected value
    pub expected: Option<Value>,
    /// Actual value
    pub actual: Option<Value>,
}

impl AssertionError {
    /// Create with a message
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    /// Attach expected and actual values
    #[must_use]
    pub fn with_values(mut self, expected: Value, actual: Value) -> Self {
        self.expected = Some(expected);
        self.actual = Some(actual);
        self
    }
}

/// Compare two values, failing with an [`AssertionError`]
///
/// # Errors
/// When `actual != expected`.
pub fn expect_equal(actual: &Value, expected: &Value) -> Result<(), AssertionError> {
    if actual == expected {
        return Ok(());
    }
    Err(
        AssertionError::new(format!("expected {actual} to equal {expected}"))
            .with_values(expected.clone(), actual.clone()),
    )
}

/// Display class of an exception
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionKind {
    /// An [`AssertionError`]
    Assertion,
    /// Anything else
    Generic,
}

impl ExceptionKind {
    /// Classify an error by its concrete type
    #[must_use]
    pub fn classify(error: &anyhow::Error) -> Self {
        if error.downcast_ref::<AssertionError>().is_some() {
            Self::Assertion
        } else {
            Self::Generic
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assertion => f.write_str("AssertionError"),
            Self::Generic => f.write_str("Error"),
        }
    }
}
