//! Per-render story context
//!
//! A [`StoryContext`] is built once per render cycle and handed to loaders,
//! decorators, the render function and play. It owns copies of args and
//! globals, so mutating it never leaks into the stores.

use crate::annotations::{ArgTypes, Args, ComponentHandle, Globals, Parameters};
use crate::node::Node;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Where a story is being shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Single story canvas
    #[default]
    Story,
    /// Inside a docs page
    Docs,
}

impl ViewMode {
    /// Wire name
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Docs => "docs",
        }
    }
}

/// Mount target owned by one render at a time
///
/// Mutations are synchronous; renderer adapters decide when to apply them.
pub trait Canvas: Send + Sync {
    /// Canvas identifier (for logs)
    fn id(&self) -> &str;

    /// Replace the mounted tree
    fn replace_children(&self, nodes: Vec<Node>);

    /// Remove everything
    fn clear(&self);

    /// Currently mounted tree
    fn children(&self) -> Vec<Node>;
}

/// Cancellation flag shared by one render cycle
///
/// Cloning shares the flag. Once aborted it stays aborted.
#[derive(Clone)]
pub struct AbortSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortSignal {
    /// Create a signal in the non-aborted state
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Abort; wakes every waiter
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`abort`](Self::abort) has been called
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once aborted
    pub async fn aborted(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on abort.
        let _ = rx.wait_for(|aborted| *aborted).await;
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// Per-render bag passed to user code
#[derive(Clone)]
pub struct StoryContext {
    /// Story id
    pub id: String,
    /// Story title
    pub title: String,
    /// Story name
    pub name: String,
    /// Resolved tags
    pub tags: Vec<String>,
    /// Current args
    pub args: Args,
    /// Initial args before any update
    pub initial_args: Args,
    /// Computed arg types
    pub arg_types: ArgTypes,
    /// Current globals
    pub globals: Globals,
    /// Merged parameters
    pub parameters: Parameters,
    /// Loader output, merged in loader order
    pub loaded: Map<String, Value>,
    /// View mode
    pub view_mode: ViewMode,
    /// Component under test, if declared
    pub component: Option<ComponentHandle>,
    /// Mount target
    pub canvas: Option<Arc<dyn Canvas>>,
    /// Cancellation for this render cycle
    pub abort_signal: AbortSignal,
}

impl StoryContext {
    /// Create a bare context for a story id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            name: String::new(),
            tags: Vec::new(),
            args: Args::new(),
            initial_args: Args::new(),
            arg_types: ArgTypes::new(),
            globals: Globals::new(),
            parameters: Parameters::new(),
            loaded: Map::new(),
            view_mode: ViewMode::default(),
            component: None,
            canvas: None,
            abort_signal: AbortSignal::new(),
        }
    }

    /// Replace args
    #[must_use]
    pub fn with_args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    /// Replace globals
    #[must_use]
    pub fn with_globals(mut self, globals: Globals) -> Self {
        self.globals = globals;
        self
    }

    /// Set view mode
    #[must_use]
    pub fn with_view_mode(mut self, view_mode: ViewMode) -> Self {
        self.view_mode = view_mode;
        self
    }

    /// Attach canvas
    #[must_use]
    pub fn with_canvas(mut self, canvas: Arc<dyn Canvas>) -> Self {
        self.canvas = Some(canvas);
        self
    }

    /// Use an existing abort signal
    #[must_use]
    pub fn with_abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort_signal = signal;
        self
    }

    /// Arg value by name
    #[inline]
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }

    /// String arg by name
    #[must_use]
    pub fn arg_str(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }

    /// Global value by name
    #[inline]
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }
}

impl fmt::Debug for StoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryContext")
            .field("id", &self.id)
            .field("view_mode", &self.view_mode)
            .field("args", &self.args)
            .field("globals", &self.globals)
            .field("aborted", &self.abort_signal.is_aborted())
            .finish_non_exhaustive()
    }
}
