//! Vitrine preview
//!
//! Boots the iframe side: registers story modules, publishes the index and
//! answers the manager's commands by rendering into one canvas.
//!
//! # Key types
//!
//! - [`Preview`]: store, render controller, docs renderer and instrumenter
//!   behind one channel
//! - [`PreviewOptions`]: resolved configuration, decodable from JSON
//! - [`SelectionOutcome`]: how showing a story or docs page ended
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vitrine_channel::Channel;
//! use vitrine_preview::{telemetry, Preview, PreviewOptions};
//! use vitrine_render::{MemoryCanvas, NodeRenderer};
//! use vitrine_store::{ProjectAnnotations, ViewMode};
//!
//! # async fn run() -> Result<(), vitrine_preview::PreviewError> {
//! let options = PreviewOptions::from_json(r#"{ "buildMode": "development" }"#)?;
//! telemetry::init(&options.log, options.build_mode)?;
//!
//! let preview = Preview::new(
//!     options,
//!     ProjectAnnotations::new().with_default_enhancers(),
//!     Arc::new(NodeRenderer::new()),
//!     Arc::new(MemoryCanvas::new("storybook-root")),
//!     Channel::new("preview"),
//! )?;
//! let index = preview.initialize(Vec::new())?;
//! if let Some(first) = index.first_story() {
//!     preview.select_story(&first.id, ViewMode::Story).await;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod options;
pub mod preview;
pub mod telemetry;

pub use error::PreviewError;
pub use options::{BuildMode, LogFormat, LogOptions, PreviewOptions};
pub use preview::{Preview, Selection, SelectionOutcome};

/// Preview version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for preview hosts
pub mod prelude {
    pub use crate::error::PreviewError;
    pub use crate::options::{BuildMode, PreviewOptions};
    pub use crate::preview::{Preview, SelectionOutcome};
}
