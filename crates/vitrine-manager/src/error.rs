//! Manager errors

/// Manager-side failures
///
/// None of these reach the preview; they are returned to the addon or shell
/// code that made the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    /// An addon id was registered twice
    #[error("addon '{0}' is already registered")]
    DuplicateAddon(String),

    /// No addon item with this id
    #[error("unknown addon item '{0}'")]
    UnknownItem(String),

    /// The item exists but does not match the current story
    #[error("addon item '{0}' is not active for the current story")]
    InactiveItem(String),

    /// The index is known and does not contain the id
    #[error("story '{0}' is not in the index")]
    UnknownStory(String),
}

impl ManagerError {
    /// Whether the error names an addon item
    #[inline]
    #[must_use]
    pub fn is_addon_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateAddon(_) | Self::UnknownItem(_) | Self::InactiveItem(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(ManagerError::DuplicateAddon("a".into()).is_addon_error());
        assert!(ManagerError::InactiveItem("a/panel".into()).is_addon_error());
        assert!(!ManagerError::UnknownStory("x--y".into()).is_addon_error());
    }

    #[test]
    fn messages() {
        assert_eq!(
            ManagerError::UnknownStory("x--y".into()).to_string(),
            "story 'x--y' is not in the index"
        );
    }
}
