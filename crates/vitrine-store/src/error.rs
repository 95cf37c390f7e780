//! Error types for the story store
//!
//! - [`ConfigurationError`]: unusable story metadata, fatal at registration
//! - [`NotFoundError`]: unknown story id, recoverable

/// Bad or missing story metadata
///
/// Raised by [`StoryStore::add`](crate::StoryStore::add) before any render is
/// attempted; it indicates an unusable module rather than a runtime failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// Neither an explicit title nor a derivable import path
    #[error("cannot derive a title for module {}: no explicit title and no matching stories specifier", .import_path.as_deref().unwrap_or("<unknown>"))]
    MissingTitle {
        /// Module path, when known
        import_path: Option<String>,
    },

    /// Title sanitizes to an empty id prefix
    #[error("title '{title}' does not produce a valid id")]
    InvalidTitle {
        /// Offending title
        title: String,
    },

    /// Export key sanitizes to an empty id suffix
    #[error("story export '{export}' in '{title}' does not produce a valid id")]
    InvalidStoryName {
        /// Title of the module
        title: String,
        /// Offending export key
        export: String,
    },

    /// Two stories resolve to the same id
    #[error("duplicate story id '{id}' (declared by '{existing}' and '{incoming}')")]
    DuplicateStoryId {
        /// Colliding id
        id: String,
        /// Title already owning the id
        existing: String,
        /// Title attempting to register it
        incoming: String,
    },
}

impl ConfigurationError {
    /// Create duplicate id error
    #[inline]
    pub fn duplicate(
        id: impl Into<String>,
        existing: impl Into<String>,
        incoming: impl Into<String>,
    ) -> Self {
        Self::DuplicateStoryId {
            id: id.into(),
            existing: existing.into(),
            incoming: incoming.into(),
        }
    }
}

/// Unknown story id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no story with id '{story_id}'")]
pub struct NotFoundError {
    /// Requested id
    pub story_id: String,
}

impl NotFoundError {
    /// Create not found error
    #[inline]
    pub fn new(story_id: impl Into<String>) -> Self {
        Self {
            story_id: story_id.into(),
        }
    }
}

/// Any store failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Registration failed
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Lookup failed
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
}

impl StoreError {
    /// Whether the error makes the build unusable
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
