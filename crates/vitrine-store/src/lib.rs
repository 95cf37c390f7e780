//! Vitrine story store
//!
//! Normalizes story modules into a canonical registry and resolves stories
//! against project, meta and story annotations.
//!
//! # Key types
//!
//! - [`StoryStore`]: registry of modules, index and prepared story cache
//! - [`ModuleExports`]: a story module as handed over by the loader
//! - [`PreparedStory`]: a story ready to render
//! - [`StoryContext`]: the per-render bag passed to user code
//! - [`ArgsStore`] / [`GlobalsStore`]: mutable args and globals
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use vitrine_store::prelude::*;
//!
//! let store = StoryStore::new(ProjectAnnotations::new());
//! store
//!     .add(
//!         ModuleExports::new(MetaAnnotations::titled("Example/Button"))
//!             .story("Primary", StoryAnnotations::new().with_args(json!({ "primary": true }))),
//!     )
//!     .unwrap();
//!
//! let story = store.from_id("example-button--primary").unwrap();
//! assert_eq!(story.name, "Primary");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod annotations;
pub mod args;
pub mod context;
pub mod enhancers;
pub mod error;
pub mod globals;
pub mod id;
pub mod index;
pub mod merge;
pub mod node;
pub mod prepared;
pub mod store;
pub mod tags;
pub mod title;

pub use annotations::{
    declarations, decorator, loader, object, play_fn, render_fn, ArgTypes, Args, ComponentHandle, DecoratorFn,
    GlobalTypes, Globals, LoaderFn, MetaAnnotations, ModuleExports, Parameters, PlayFn,
    ProjectAnnotations, RenderFn, StoryAnnotations, StoryDefinition, StoryFn,
};
pub use args::ArgsStore;
pub use context::{AbortSignal, Canvas, StoryContext, ViewMode};
pub use enhancers::{ArgTypesEnhancer, ArgsEnhancer, EnhancerInput};
pub use error::{ConfigurationError, NotFoundError, StoreError};
pub use globals::GlobalsStore;
pub use id::{sanitize, story_name_from_export, to_id, StoryId};
pub use index::{EntryType, IndexEntry, StoryIndex};
pub use node::Node;
pub use prepared::{CsfFile, NormalizedStory, PreparedStory};
pub use store::{docs_id, ModuleAdded, StoreOptions, StoryStore};
pub use tags::TagFilter;
pub use title::StoriesSpecifier;

/// Store version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {
    pub use crate::annotations::{
        declarations, decorator, loader, object, play_fn, render_fn, MetaAnnotations, ModuleExports, ProjectAnnotations,
        StoryAnnotations, StoryDefinition,
    };
    pub use crate::context::{StoryContext, ViewMode};
    pub use crate::error::{ConfigurationError, NotFoundError};
    pub use crate::node::Node;
    pub use crate::prepared::PreparedStory;
    pub use crate::store::StoryStore;
    pub use crate::tags::TagFilter;
}
