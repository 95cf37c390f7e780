//! Render lifecycle errors
//!
//! Every [`StoryError`] is scoped to one story. The controller never returns
//! it to the render caller; it moves the render to `Errored` and reports it on
//! the channel.

use crate::phase::RenderPhase;
use serde::{Deserialize, Serialize};
use std::fmt;
use vitrine_store::NotFoundError;

/// Boxed user error, converted from the `anyhow::Error` user code returns
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where in the lifecycle a story failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// A loader failed
    Loader,
    /// A decorator, the render function or the mount failed
    Render,
    /// The play function failed
    Play,
    /// Unmounting failed
    Unmount,
}

impl ErrorCategory {
    /// Wire name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Loader => "loader",
            Self::Render => "render",
            Self::Play => "play",
            Self::Unmount => "unmount",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Story-scoped failure
#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    /// Loader failure
    #[error("loader failed for story '{story_id}': {source}")]
    Loader {
        /// Story id
        story_id: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// Decorator, render or mount failure
    #[error("render failed for story '{story_id}': {source}")]
    Render {
        /// Story id
        story_id: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// Play function failure
    #[error("play function failed for story '{story_id}': {source}")]
    Play {
        /// Story id
        story_id: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// Unmount failure
    #[error("unmount failed for story '{story_id}': {source}")]
    Unmount {
        /// Story id
        story_id: String,
        /// Underlying error
        #[source]
        source: BoxError,
    },

    /// Story id unknown to the store
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// Render was superseded or torn down
    #[error("render of story '{story_id}' was aborted")]
    Aborted {
        /// Story id
        story_id: String,
    },

    /// Phase transition rejected by the state machine
    #[error("illegal render phase transition {from} -> {to}")]
    IllegalTransition {
        /// Current phase
        from: RenderPhase,
        /// Requested phase
        to: RenderPhase,
    },
}

impl StoryError {
    /// Loader failure from a user error
    pub fn loader(story_id: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Loader {
            story_id: story_id.into(),
            source: source.into(),
        }
    }

    /// Render failure from a user error
    pub fn render(story_id: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Render {
            story_id: story_id.into(),
            source: source.into(),
        }
    }

    /// Play failure from a user error
    pub fn play(story_id: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Play {
            story_id: story_id.into(),
            source: source.into(),
        }
    }

    /// Unmount failure from a renderer error
    pub fn unmount(story_id: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Unmount {
            story_id: story_id.into(),
            source: source.into(),
        }
    }

    /// Lifecycle category, for errors that end in `Errored`
    #[must_use]
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Loader { .. } => Some(ErrorCategory::Loader),
            Self::Render { .. } => Some(ErrorCategory::Render),
            Self::Play { .. } => Some(ErrorCategory::Play),
            Self::Unmount { .. } => Some(ErrorCategory::Unmount),
            Self::NotFound(_) | Self::Aborted { .. } | Self::IllegalTransition { .. } => None,
        }
    }

    /// Message of the underlying user error, without the story prefix
    #[must_use]
    pub fn cause_message(&self) -> String {
        match self {
            Self::Loader { source, .. }
            | Self::Render { source, .. }
            | Self::Play { source, .. }
            | Self::Unmount { source, .. } => source.to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the render was cancelled rather than failing
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        let err = StoryError::loader("a--b", anyhow::anyhow!("network down"));
        assert_eq!(err.category(), Some(ErrorCategory::Loader));
        assert_eq!(err.cause_message(), "network down");
        assert_eq!(
            err.to_string(),
            "loader failed for story 'a--b': network down"
        );

        let aborted = StoryError::Aborted { story_id: "a--b".into() };
        assert!(aborted.is_aborted());
        assert_eq!(aborted.category(), None);
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error as _;
        let err = StoryError::play("a--b", anyhow::anyhow!("expected 1 got 2"));
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("expected 1 got 2"));
    }

    #[test]
    fn category_wire_names() {
        assert_eq!(
            serde_json::to_value(ErrorCategory::Unmount).unwrap(),
            serde_json::json!("unmount")
        );
        assert_eq!(ErrorCategory::Render.to_string(), "render");
    }
}
