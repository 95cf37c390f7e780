//! Vitrine manager
//!
//! The UI-shell side of the channel: mirrors what the preview reports and
//! sends it commands. Knows nothing about how stories render.
//!
//! # Key types
//!
//! - [`Manager`]: registry, store and api over one channel
//! - [`AddonRegistry`]: addon setups and their panels, tools and tabs
//! - [`ManagerStore`]: index, selection, args, globals, phases and failures
//! - [`ManagerApi`]: `setCurrentStory`, `updateStoryArgs`, `resetStoryArgs`,
//!   `updateGlobals` and the interaction debugger controls
//!
//! # Example
//!
//! ```no_run
//! use vitrine_channel::Channel;
//! use vitrine_manager::{Addon, Manager};
//! use vitrine_store::Node;
//!
//! let manager = Manager::new(Channel::new("manager"));
//! manager
//!     .addons()
//!     .register("controls", |api| {
//!         api.addons().add(
//!             "controls/panel",
//!             Addon::panel("Controls", |ctx| {
//!                 Node::text(format!("{} args", ctx.state.current_args().map_or(0, |a| a.len())))
//!             }),
//!         );
//!     })
//!     .unwrap();
//! manager.load();
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod api;
pub mod error;
pub mod manager;
pub mod registry;
pub mod store;

pub use api::{ManagerApi, WeakManagerApi};
pub use error::ManagerError;
pub use manager::Manager;
pub use registry::{
    Addon, AddonKind, AddonRegistry, AddonRenderContext, AddonRenderFn, MatchContext, MatchFn, SetupFn,
};
pub use store::{CurrentStory, ManagerState, ManagerStore, StoryFailure};

/// Manager version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for addon authors
pub mod prelude {
    pub use crate::api::ManagerApi;
    pub use crate::error::ManagerError;
    pub use crate::manager::Manager;
    pub use crate::registry::{Addon, AddonKind, AddonRenderContext, MatchContext};
    pub use crate::store::ManagerState;
}
