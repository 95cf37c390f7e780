//! Preview errors

use vitrine_render::StoryError;
use vitrine_store::ConfigurationError;

/// Preview bootstrap and reload failures
///
/// Story failures never show up here; they are reported on the channel.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// A module could not be registered
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Options could not be decoded
    #[error("invalid preview options: {0}")]
    Options(#[from] serde_json::Error),

    /// A module update arrived in a production build
    #[error("hot module replacement is disabled in production builds")]
    HotReloadDisabled,

    /// Teardown failed to unmount the mounted story
    #[error(transparent)]
    Unmount(#[from] StoryError),

    /// Created outside a tokio runtime
    #[error("preview requires a tokio runtime: {0}")]
    NoRuntime(String),

    /// Log subscriber setup failed
    #[error("failed to install log subscriber: {0}")]
    Telemetry(String),
}

impl PreviewError {
    /// Whether the preview cannot start
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Options(_) | Self::NoRuntime(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_in_production_is_not_fatal() {
        assert!(!PreviewError::HotReloadDisabled.is_fatal());
        assert!(!PreviewError::Telemetry("set twice".into()).is_fatal());
        assert!(PreviewError::NoRuntime("outside".into()).is_fatal());
    }

    #[test]
    fn configuration_errors_convert() {
        let err: PreviewError = ConfigurationError::MissingTitle { import_path: None }.into();
        assert!(err.is_fatal());
    }
}
