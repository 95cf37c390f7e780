//! Vitrine render lifecycle
//!
//! Drives stories through their render phases on a canvas: preparation,
//! loaders, the decorator chain, mount, play and teardown. Superseded renders
//! are cancelled at their next suspension point and never touch the canvas
//! again.
//!
//! # Key types
//!
//! - [`RenderController`]: per-canvas lifecycle driver
//! - [`StoryRender`]: phase and cancellation state of one run
//! - [`Renderer`]: framework adapter contract
//! - [`RenderPhase`]: lifecycle state machine
//! - [`MemoryCanvas`]: headless canvas that records mutations

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod canvas;
pub mod controller;
pub mod error;
pub mod phase;
pub mod renderer;
pub mod story_render;

pub use canvas::{CanvasMutation, MemoryCanvas};
pub use controller::{PlayErrorPolicy, RenderController, RenderMode, RenderOptions, RenderOutcome};
pub use error::{BoxError, ErrorCategory, StoryError};
pub use phase::{allowed_transitions, validate_transition, RenderPhase};
pub use renderer::{NodeRenderer, Renderer};
pub use story_render::StoryRender;

/// Render crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::canvas::MemoryCanvas;
    pub use crate::controller::{PlayErrorPolicy, RenderController, RenderMode, RenderOptions, RenderOutcome};
    pub use crate::error::{ErrorCategory, StoryError};
    pub use crate::phase::RenderPhase;
    pub use crate::renderer::{NodeRenderer, Renderer};
}
