//! Log subscriber setup
//!
//! `RUST_LOG` wins over the build mode default; an explicit
//! [`LogOptions::filter`] wins over both.

use crate::error::PreviewError;
use crate::options::{BuildMode, LogFormat, LogOptions};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the filter for `log` in `mode`
///
/// # Errors
/// [`PreviewError::Telemetry`] when the explicit directive does not parse.
pub fn filter(log: &LogOptions, mode: BuildMode) -> Result<EnvFilter, PreviewError> {
    match &log.filter {
        Some(directive) => {
            EnvFilter::try_new(directive).map_err(|e| PreviewError::Telemetry(e.to_string()))
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(mode.default_log_directive()))),
    }
}

/// Install the global subscriber
///
/// # Errors
/// [`PreviewError::Telemetry`] for a bad filter or when a subscriber is
/// already installed.
pub fn init(log: &LogOptions, mode: BuildMode) -> Result<(), PreviewError> {
    let env_filter = filter(log, mode)?;
    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match log.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_current_span(false),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .try_init(),
    };
    installed.map_err(|e| PreviewError::Telemetry(e.to_string()))?;

    tracing::info!(format = ?log.format, mode = ?mode, "logging initialized");
    Ok(())
}
