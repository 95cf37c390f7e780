//! Addon registry
//!
//! Addons register a setup callback under an addon id. Setups run once, in
//! registration order, when the manager loads (or immediately when registered
//! after that) and add items: panels, toolbar tools and tabs.
//!
//! Item visibility is decided by the item's `match` predicate and its
//! parameter key, both evaluated against a [`MatchContext`] built for the
//! current story. The store re-evaluates them on every navigation.

use crate::api::{ManagerApi, WeakManagerApi};
use crate::error::ManagerError;
use crate::store::ManagerState;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use vitrine_store::{IndexEntry, Node, ViewMode};

/// Where an addon item is shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AddonKind {
    /// Bottom/side panel, one selected at a time
    #[default]
    Panel,
    /// Toolbar button
    Tool,
    /// Toolbar button on the right-hand side
    ToolExtra,
    /// Tab next to the canvas
    Tab,
}

/// What `match` predicates see
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchContext {
    /// Selected story or docs id
    pub story_id: Option<String>,
    /// Current view mode
    pub view_mode: ViewMode,
    /// Tags of the selected entry
    pub tags: Vec<String>,
    /// Parameters of the selected story, once prepared
    pub parameters: Value,
}

impl MatchContext {
    /// Context for an index entry
    #[must_use]
    pub fn for_entry(entry: &IndexEntry, view_mode: ViewMode, parameters: Value) -> Self {
        Self {
            story_id: Some(entry.id.clone()),
            view_mode,
            tags: entry.tags.clone(),
            parameters,
        }
    }

    /// Whether the selected entry carries `tag`
    #[inline]
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// What an item's render callback sees
#[derive(Debug, Clone, Copy)]
pub struct AddonRenderContext<'a> {
    /// Whether the item is the selected panel (always true for tools)
    pub active: bool,
    /// Mirrored preview state
    pub state: &'a ManagerState,
}

/// Visibility predicate
pub type MatchFn = Arc<dyn Fn(&MatchContext) -> bool + Send + Sync>;

/// Item render callback
pub type AddonRenderFn = Arc<dyn Fn(&AddonRenderContext<'_>) -> Node + Send + Sync>;

/// Setup callback run when the manager loads
pub type SetupFn = Box<dyn FnOnce(&ManagerApi) + Send>;

/// One addon item
#[derive(Clone)]
pub struct Addon {
    /// Placement
    pub kind: AddonKind,
    /// Label
    pub title: String,
    /// Visibility predicate; absent means always visible
    pub match_fn: Option<MatchFn>,
    /// Render callback
    pub render: AddonRenderFn,
    /// `parameters[key].disable == true` hides the item
    pub param_key: Option<String>,
}

impl Addon {
    /// Create item
    pub fn new<F>(kind: AddonKind, title: impl Into<String>, render: F) -> Self
    where
        F: Fn(&AddonRenderContext<'_>) -> Node + Send + Sync + 'static,
    {
        Self {
            kind,
            title: title.into(),
            match_fn: None,
            render: Arc::new(render),
            param_key: None,
        }
    }

    /// Create panel
    pub fn panel<F>(title: impl Into<String>, render: F) -> Self
    where
        F: Fn(&AddonRenderContext<'_>) -> Node + Send + Sync + 'static,
    {
        Self::new(AddonKind::Panel, title, render)
    }

    /// Create toolbar tool
    pub fn tool<F>(title: impl Into<String>, render: F) -> Self
    where
        F: Fn(&AddonRenderContext<'_>) -> Node + Send + Sync + 'static,
    {
        Self::new(AddonKind::Tool, title, render)
    }

    /// Set visibility predicate
    #[must_use]
    pub fn with_match<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&MatchContext) -> bool + Send + Sync + 'static,
    {
        self.match_fn = Some(Arc::new(predicate));
        self
    }

    /// Set parameter key
    #[must_use]
    pub fn with_param_key(mut self, key: impl Into<String>) -> Self {
        self.param_key = Some(key.into());
        self
    }

    /// Whether the item is visible in `ctx`
    #[must_use]
    pub fn matches(&self, ctx: &MatchContext) -> bool {
        let disabled = self
            .param_key
            .as_deref()
            .and_then(|key| ctx.parameters.get(key))
            .and_then(|p| p.get("disable"))
            .and_then(Value::as_bool)
            == Some(true);
        !disabled && self.match_fn.as_ref().map_or(true, |m| m(ctx))
    }
}

impl fmt::Debug for Addon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Addon")
            .field("kind", &self.kind)
            .field("title", &self.title)
            .field("match", &self.match_fn.is_some())
            .field("param_key", &self.param_key)
            .finish_non_exhaustive()
    }
}

/// Registered addons and their items
///
/// Items keep insertion order; panels are listed in the order they were added.
#[derive(Default)]
pub struct AddonRegistry {
    setups: Mutex<IndexMap<String, Option<SetupFn>>>,
    items: RwLock<IndexMap<String, Addon>>,
    api: Mutex<Option<WeakManagerApi>>,
}

impl AddonRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an addon setup
    ///
    /// Runs immediately when the manager has already loaded.
    ///
    /// # Errors
    /// [`ManagerError::DuplicateAddon`] when `addon_id` is taken.
    pub fn register<F>(&self, addon_id: &str, setup: F) -> Result<(), ManagerError>
    where
        F: FnOnce(&ManagerApi) + Send + 'static,
    {
        let mut setup = Some(setup);
        let loaded = {
            let mut setups = self.setups.lock();
            if setups.contains_key(addon_id) {
                return Err(ManagerError::DuplicateAddon(addon_id.to_string()));
            }
            let loaded = self.api.lock().as_ref().and_then(WeakManagerApi::upgrade);
            let pending = match loaded {
                Some(_) => None,
                None => setup.take().map(|s| Box::new(s) as SetupFn),
            };
            setups.insert(addon_id.to_string(), pending);
            loaded
        };
        // Setups may call back into the registry, so no lock is held here
        match (loaded, setup) {
            (Some(api), Some(setup)) => {
                tracing::debug!(addon_id, "addon registered after load, running setup");
                run_setup(addon_id, Box::new(setup), &api);
            }
            _ => tracing::debug!(addon_id, "addon registered"),
        }
        Ok(())
    }

    /// Run pending setups in registration order
    pub fn load(&self, api: &ManagerApi) {
        *self.api.lock() = Some(api.downgrade());
        let pending: Vec<(String, SetupFn)> = self
            .setups
            .lock()
            .iter_mut()
            .filter_map(|(id, setup)| setup.take().map(|s| (id.clone(), s)))
            .collect();
        for (addon_id, setup) in pending {
            run_setup(&addon_id, setup, api);
        }
    }

    /// Whether [`AddonRegistry::load`] has run
    #[inline]
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.api.lock().is_some()
    }

    /// Add an item, returning the one it replaced
    pub fn add(&self, item_id: &str, addon: Addon) -> Option<Addon> {
        let replaced = self.items.write().insert(item_id.to_string(), addon);
        if replaced.is_some() {
            tracing::warn!(item_id, "addon item replaced");
        }
        replaced
    }

    /// Remove an item
    #[inline]
    pub fn remove(&self, item_id: &str) -> bool {
        self.items.write().shift_remove(item_id).is_some()
    }

    /// Check if item exists
    #[inline]
    #[must_use]
    pub fn contains(&self, item_id: &str) -> bool {
        self.items.read().contains_key(item_id)
    }

    /// Item by id
    #[must_use]
    pub fn get(&self, item_id: &str) -> Option<Addon> {
        self.items.read().get(item_id).cloned()
    }

    /// Registered addon ids
    #[must_use]
    pub fn addon_ids(&self) -> Vec<String> {
        self.setups.lock().keys().cloned().collect()
    }

    /// Items of one kind, in insertion order
    #[must_use]
    pub fn items(&self, kind: AddonKind) -> Vec<(String, Addon)> {
        self.items
            .read()
            .iter()
            .filter(|(_, addon)| addon.kind == kind)
            .map(|(id, addon)| (id.clone(), addon.clone()))
            .collect()
    }

    /// Ids of items visible in `ctx`, any kind
    #[must_use]
    pub fn active_items(&self, ctx: &MatchContext) -> Vec<String> {
        self.items
            .read()
            .iter()
            .filter(|(_, addon)| addon.matches(ctx))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of items
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Check if no items were added
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

fn run_setup(addon_id: &str, setup: SetupFn, api: &ManagerApi) {
    setup(api);
    tracing::debug!(addon_id, "addon setup complete");
}

impl fmt::Debug for AddonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddonRegistry")
            .field("addons", &self.addon_ids())
            .field("items", &self.items.read().keys().collect::<Vec<_>>())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(label: &'static str) -> impl Fn(&AddonRenderContext<'_>) -> Node + Send + Sync + 'static {
        move |_| Node::text(label)
    }

    fn ctx(story_id: &str, tags: &[&str], parameters: Value) -> MatchContext {
        MatchContext {
            story_id: Some(story_id.into()),
            view_mode: ViewMode::Story,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            parameters,
        }
    }

    #[test]
    fn items_keep_insertion_order_per_kind() {
        let registry = AddonRegistry::new();
        registry.add("controls/panel", Addon::panel("Controls", text("c")));
        registry.add("zoom/tool", Addon::tool("Zoom", text("z")));
        registry.add("actions/panel", Addon::panel("Actions", text("a")));

        let panels: Vec<String> = registry.items(AddonKind::Panel).into_iter().map(|(id, _)| id).collect();
        assert_eq!(panels, vec!["controls/panel", "actions/panel"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn match_and_param_key_decide_visibility() {
        let registry = AddonRegistry::new();
        registry.add(
            "a11y/panel",
            Addon::panel("Accessibility", text("a11y")).with_param_key("a11y"),
        );
        registry.add(
            "tests/panel",
            Addon::panel("Interactions", text("i")).with_match(|ctx| ctx.has_tag("play-fn")),
        );

        assert_eq!(
            registry.active_items(&ctx("x--plain", &[], Value::Null)),
            vec!["a11y/panel"]
        );
        assert_eq!(
            registry.active_items(&ctx("x--played", &["play-fn"], json!({ "a11y": { "disable": true } }))),
            vec!["tests/panel"]
        );
    }

    #[test]
    fn replacing_an_item_returns_the_old_one() {
        let registry = AddonRegistry::new();
        assert!(registry.add("x/panel", Addon::panel("One", text("1"))).is_none());
        let old = registry.add("x/panel", Addon::panel("Two", text("2"))).unwrap();
        assert_eq!(old.title, "One");
        assert_eq!(registry.get("x/panel").unwrap().title, "Two");
        assert!(registry.remove("x/panel"));
        assert!(registry.is_empty());
    }
}
