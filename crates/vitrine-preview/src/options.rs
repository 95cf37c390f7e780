//! Preview configuration
//!
//! Options arrive resolved (from a preset or a JSON document); nothing here
//! reads the command line.

use crate::error::PreviewError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vitrine_render::{PlayErrorPolicy, RenderOptions};
use vitrine_store::{StoreOptions, StoriesSpecifier, TagFilter};

/// Build flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Dev server: hot module replacement, verbose logs
    #[default]
    Development,
    /// Static build: no module updates after start
    Production,
}

impl BuildMode {
    /// Whether module updates are accepted
    #[inline]
    #[must_use]
    pub const fn hot_reload(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Filter used when `RUST_LOG` is unset
    #[inline]
    #[must_use]
    pub const fn default_log_directive(self) -> &'static str {
        match self {
            Self::Development => "info,vitrine_render=debug,vitrine_preview=debug",
            Self::Production => "warn",
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one line per event
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
    /// Output format
    pub format: LogFormat,
    /// Filter directive; overrides `RUST_LOG` when set
    pub filter: Option<String>,
}

impl LogOptions {
    /// Set format
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set filter directive
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Resolved preview options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreviewOptions {
    /// Directory holding the project configuration
    pub config_dir: PathBuf,
    /// Static build output directory
    pub output_dir: PathBuf,
    /// Build flavour
    pub build_mode: BuildMode,
    /// Run play functions after mount
    pub autoplay: bool,
    /// Play failure handling
    pub play_error_policy: PlayErrorPolicy,
    /// Filter applied to index entries
    pub tag_filter: TagFilter,
    /// Story locations used to derive titles
    pub stories: Vec<StoriesSpecifier>,
    /// Logging
    pub log: LogOptions,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(".vitrine"),
            output_dir: PathBuf::from("vitrine-static"),
            build_mode: BuildMode::Development,
            autoplay: true,
            play_error_policy: PlayErrorPolicy::Report,
            tag_filter: TagFilter::default(),
            stories: Vec::new(),
            log: LogOptions::default(),
        }
    }
}

impl PreviewOptions {
    /// Create default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode options from JSON; missing fields take their defaults
    ///
    /// # Errors
    /// [`PreviewError::Options`] for malformed documents.
    pub fn from_json(source: &str) -> Result<Self, PreviewError> {
        Ok(serde_json::from_str(source)?)
    }

    /// With config directory
    #[must_use]
    pub fn with_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// With output directory
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// With build mode
    #[inline]
    #[must_use]
    pub fn with_build_mode(mut self, mode: BuildMode) -> Self {
        self.build_mode = mode;
        self
    }

    /// With autoplay
    #[inline]
    #[must_use]
    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    /// With play failure handling
    #[inline]
    #[must_use]
    pub fn with_play_error_policy(mut self, policy: PlayErrorPolicy) -> Self {
        self.play_error_policy = policy;
        self
    }

    /// With index tag filter
    #[must_use]
    pub fn with_tag_filter(mut self, filter: TagFilter) -> Self {
        self.tag_filter = filter;
        self
    }

    /// With an additional stories specifier
    #[must_use]
    pub fn with_stories(mut self, specifier: StoriesSpecifier) -> Self {
        self.stories.push(specifier);
        self
    }

    /// With logging
    #[must_use]
    pub fn with_log(mut self, log: LogOptions) -> Self {
        self.log = log;
        self
    }

    /// Store configuration derived from these options
    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::default()
            .with_specifiers(self.stories.clone())
            .with_tag_filter(self.tag_filter.clone())
    }

    /// Controller configuration derived from these options
    #[must_use]
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions::default()
            .with_autoplay(self.autoplay)
            .with_play_error_policy(self.play_error_policy)
    }
}
