//! Manager-side mirror of preview state
//!
//! [`ManagerStore`] listens to the events the preview publishes and keeps a
//! [`ManagerState`] the shell and addons render from:
//!
//! - `setIndex` / `storyIndexInvalidated`: sidebar index and its staleness
//! - `currentStoryWasSet` / `storyMissing`: selection
//! - `storyPrepared` / `storyArgsUpdated`: args and parameters per story
//! - `setGlobals` / `globalsUpdated`: globals
//! - `storyRenderPhaseChanged`: render phase per story
//! - `storyErrored` / `storyThrewException`: last story failure
//! - `playFunctionThrewException`: failed interactions
//! - `instrumenter/sync`: interaction log per story
//!
//! The mirror is eventually consistent: between a navigation request and the
//! preview's first event it still shows the previous story.

use crate::error::ManagerError;
use crate::registry::{AddonKind, AddonRegistry, AddonRenderContext, MatchContext};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use vitrine_channel::{events, Channel, ChannelEvent, Listener};
use vitrine_instrument::SyncPayload;
use vitrine_render::{ErrorCategory, RenderPhase};
use vitrine_store::{Args, Globals, IndexEntry, Node, StoryIndex, ViewMode};

/// Selected entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentStory {
    /// Story or docs id
    pub story_id: String,
    /// View mode it is shown in
    pub view_mode: ViewMode,
}

/// A story failure reported by the preview
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryFailure {
    /// Failing story
    pub story_id: String,
    /// Lifecycle stage that failed
    pub category: ErrorCategory,
    /// Message shown in place of the canvas
    pub message: String,
}

/// Everything the manager knows about the preview
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagerState {
    /// Last index received
    pub index: Option<StoryIndex>,
    /// Set by `storyIndexInvalidated` until the next index arrives
    pub index_stale: bool,
    /// Selected entry
    pub current: Option<CurrentStory>,
    /// Id the preview could not find
    pub missing: Option<String>,
    /// Current args per story
    pub args: HashMap<String, Args>,
    /// Parameters per prepared story
    pub parameters: HashMap<String, Value>,
    /// Current globals
    pub globals: Globals,
    /// Last render phase per story
    pub phases: HashMap<String, RenderPhase>,
    /// Most recent story failure
    pub last_error: Option<StoryFailure>,
    /// Play function failures per story
    pub play_failures: HashMap<String, String>,
    /// Interaction log per story
    pub interactions: HashMap<String, SyncPayload>,
    /// Addon items visible for the current selection
    pub active_items: Vec<String>,
    /// Selected panel; kept across navigation while it stays visible, else
    /// the first visible panel
    pub selected_panel: Option<String>,
}

impl ManagerState {
    /// Selected id
    #[inline]
    #[must_use]
    pub fn current_story_id(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.story_id.as_str())
    }

    /// Index entry by id
    #[must_use]
    pub fn entry(&self, id: &str) -> Option<&IndexEntry> {
        self.index.as_ref().and_then(|index| index.get(id))
    }

    /// Args of the selected story
    #[must_use]
    pub fn current_args(&self) -> Option<&Args> {
        self.current_story_id().and_then(|id| self.args.get(id))
    }

    /// Render phase of the selected story
    #[must_use]
    pub fn current_phase(&self) -> Option<RenderPhase> {
        self.current_story_id().and_then(|id| self.phases.get(id).copied())
    }

    /// Failure of the selected story, shown instead of its canvas
    #[must_use]
    pub fn current_error(&self) -> Option<&StoryFailure> {
        let id = self.current_story_id()?;
        self.last_error.as_ref().filter(|e| e.story_id == id)
    }

    /// Whether `item_id` is visible for the current selection
    #[inline]
    #[must_use]
    pub fn is_active(&self, item_id: &str) -> bool {
        self.active_items.iter().any(|i| i == item_id)
    }

    fn match_context(&self) -> MatchContext {
        let Some(current) = &self.current else {
            return MatchContext::default();
        };
        let parameters = self
            .parameters
            .get(&current.story_id)
            .cloned()
            .unwrap_or(Value::Null);
        match self.entry(&current.story_id) {
            Some(entry) => MatchContext::for_entry(entry, current.view_mode, parameters),
            None => MatchContext {
                story_id: Some(current.story_id.clone()),
                view_mode: current.view_mode,
                tags: Vec::new(),
                parameters,
            },
        }
    }
}

struct StoreInner {
    state: RwLock<ManagerState>,
    registry: Arc<AddonRegistry>,
    version: watch::Sender<u64>,
}

impl StoreInner {
    fn update<R>(&self, f: impl FnOnce(&mut ManagerState) -> R) -> R {
        let result = f(&mut self.state.write());
        self.version.send_modify(|v| *v += 1);
        result
    }

    fn refresh_addons(&self) {
        let ctx = self.state.read().match_context();
        let active = self.registry.active_items(&ctx);
        let panels: Vec<String> = self
            .registry
            .items(AddonKind::Panel)
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| active.contains(id))
            .collect();
        tracing::trace!(story_id = ?ctx.story_id, active = active.len(), "addon items evaluated");
        self.update(|state| {
            let keep = state
                .selected_panel
                .as_ref()
                .is_some_and(|selected| panels.contains(selected));
            if !keep {
                state.selected_panel = panels.first().cloned();
            }
            state.active_items = active;
        });
    }

    fn fail(&self, event: &ChannelEvent, story_id: &str, message_key: &str) {
        let category = field::<ErrorCategory>(event, "category").unwrap_or(ErrorCategory::Render);
        let message = event.str_field(message_key).unwrap_or_default().to_string();
        tracing::debug!(story_id, %category, "story failure mirrored");
        self.update(|state| {
            state.last_error = Some(StoryFailure {
                story_id: story_id.to_string(),
                category,
                message,
            });
        });
    }
}

/// Mirror of preview state, fed by channel events
pub struct ManagerStore {
    inner: Arc<StoreInner>,
    channel: Channel,
    listeners: Vec<(&'static str, Listener)>,
}

impl ManagerStore {
    /// Create a store and subscribe it to `channel`
    #[must_use]
    pub fn new(channel: Channel, registry: Arc<AddonRegistry>) -> Self {
        let (version, _) = watch::channel(0);
        let inner = Arc::new(StoreInner {
            state: RwLock::new(ManagerState::default()),
            registry,
            version,
        });
        let weak = Arc::downgrade(&inner);
        let listeners = vec![
            subscribe(&channel, &weak, events::SET_INDEX, |inner, event| {
                match event.first_arg().cloned().map(serde_json::from_value::<StoryIndex>) {
                    Some(Ok(index)) => {
                        tracing::debug!(entries = index.len(), "index received");
                        inner.update(|state| {
                            state.index = Some(index);
                            state.index_stale = false;
                        });
                        inner.refresh_addons();
                    }
                    Some(Err(e)) => tracing::warn!(error = %e, "undecodable index"),
                    None => tracing::warn!("setIndex without payload"),
                }
            }),
            subscribe(&channel, &weak, events::STORY_INDEX_INVALIDATED, |inner, _| {
                inner.update(|state| state.index_stale = true);
            }),
            subscribe(&channel, &weak, events::CURRENT_STORY_WAS_SET, |inner, event| {
                let Some(story_id) = event.str_field("storyId") else {
                    return;
                };
                let view_mode = field::<ViewMode>(event, "viewMode").unwrap_or_default();
                inner.update(|state| {
                    state.current = Some(CurrentStory {
                        story_id: story_id.to_string(),
                        view_mode,
                    });
                    state.missing = None;
                });
                inner.refresh_addons();
            }),
            subscribe(&channel, &weak, events::STORY_MISSING, |inner, event| {
                let story_id = event
                    .first_arg()
                    .and_then(Value::as_str)
                    .or_else(|| event.str_field("storyId"))
                    .map(str::to_string);
                tracing::debug!(story_id = ?story_id, "preview reported a missing story");
                inner.update(|state| {
                    state.current = None;
                    state.missing = story_id;
                });
                inner.refresh_addons();
            }),
            subscribe(&channel, &weak, events::STORY_PREPARED, |inner, event| {
                let Some(story_id) = event.str_field("id") else {
                    return;
                };
                let args = field::<Args>(event, "args").unwrap_or_default();
                let parameters = event
                    .first_arg()
                    .and_then(|p| p.get("parameters"))
                    .cloned()
                    .unwrap_or(Value::Null);
                let is_current = inner.update(|state| {
                    state.args.insert(story_id.to_string(), args);
                    state.parameters.insert(story_id.to_string(), parameters);
                    state.current_story_id() == Some(story_id)
                });
                if is_current {
                    inner.refresh_addons();
                }
            }),
            subscribe(&channel, &weak, events::STORY_ARGS_UPDATED, |inner, event| {
                if let (Some(story_id), Some(args)) = (event.str_field("storyId"), field::<Args>(event, "args")) {
                    inner.update(|state| state.args.insert(story_id.to_string(), args));
                }
            }),
            subscribe(&channel, &weak, events::SET_GLOBALS, |inner, event| {
                if let Some(globals) = field::<Globals>(event, "globals") {
                    inner.update(|state| state.globals = globals);
                }
            }),
            subscribe(&channel, &weak, events::GLOBALS_UPDATED, |inner, event| {
                if let Some(globals) = field::<Globals>(event, "globals") {
                    inner.update(|state| state.globals = globals);
                }
            }),
            subscribe(&channel, &weak, events::STORY_RENDER_PHASE_CHANGED, |inner, event| {
                let (Some(story_id), Some(phase)) =
                    (event.str_field("storyId"), field::<RenderPhase>(event, "newPhase"))
                else {
                    return;
                };
                inner.update(|state| {
                    state.phases.insert(story_id.to_string(), phase);
                    if phase == RenderPhase::Preparing {
                        if state.last_error.as_ref().is_some_and(|e| e.story_id == story_id) {
                            state.last_error = None;
                        }
                        state.play_failures.remove(story_id);
                    }
                });
            }),
            subscribe(&channel, &weak, events::STORY_ERRORED, |inner, event| {
                if let Some(story_id) = event.str_field("storyId") {
                    inner.fail(event, story_id, "description");
                }
            }),
            subscribe(&channel, &weak, events::STORY_THREW_EXCEPTION, |inner, event| {
                if let Some(story_id) = event.str_field("storyId") {
                    inner.fail(event, story_id, "message");
                }
            }),
            subscribe(&channel, &weak, events::PLAY_FUNCTION_THREW_EXCEPTION, |inner, event| {
                if let Some(story_id) = event.str_field("storyId") {
                    let message = event.str_field("message").unwrap_or_default().to_string();
                    inner.update(|state| state.play_failures.insert(story_id.to_string(), message));
                }
            }),
            subscribe(&channel, &weak, events::INSTRUMENTER_SYNC, |inner, event| {
                match event.first_arg().cloned().map(serde_json::from_value::<SyncPayload>) {
                    Some(Ok(sync)) => {
                        inner.update(|state| state.interactions.insert(sync.story_id.clone(), sync));
                    }
                    Some(Err(e)) => tracing::warn!(error = %e, "undecodable interaction sync"),
                    None => {}
                }
            }),
        ];
        Self {
            inner,
            channel,
            listeners,
        }
    }

    /// Snapshot of the mirrored state
    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.inner.state.read().clone()
    }

    /// Read the state without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&ManagerState) -> R) -> R {
        f(&self.inner.state.read())
    }

    /// Addon registry the store evaluates
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<AddonRegistry> {
        &self.inner.registry
    }

    /// Receiver bumped after every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    /// Wait until `predicate` holds and return that state
    pub async fn wait_for<F>(&self, predicate: F) -> ManagerState
    where
        F: Fn(&ManagerState) -> bool,
    {
        let mut changes = self.subscribe();
        loop {
            changes.borrow_and_update();
            {
                let state = self.inner.state.read();
                if predicate(&state) {
                    return state.clone();
                }
            }
            if changes.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Re-evaluate addon visibility for the current selection
    pub fn refresh_addons(&self) {
        self.inner.refresh_addons();
    }

    /// Select an active panel
    ///
    /// # Errors
    /// [`ManagerError::UnknownItem`] when no such panel exists,
    /// [`ManagerError::InactiveItem`] when it is hidden for the current story.
    pub fn select_panel(&self, item_id: &str) -> Result<(), ManagerError> {
        match self.inner.registry.get(item_id) {
            Some(addon) if addon.kind == AddonKind::Panel => {}
            _ => return Err(ManagerError::UnknownItem(item_id.to_string())),
        }
        self.inner.update(|state| {
            if !state.is_active(item_id) {
                return Err(ManagerError::InactiveItem(item_id.to_string()));
            }
            state.selected_panel = Some(item_id.to_string());
            Ok(())
        })
    }

    /// Render one item against the current state
    ///
    /// # Errors
    /// [`ManagerError::UnknownItem`] for unregistered items,
    /// [`ManagerError::InactiveItem`] when the item is hidden.
    pub fn render_item(&self, item_id: &str) -> Result<Node, ManagerError> {
        let addon = self
            .inner
            .registry
            .get(item_id)
            .ok_or_else(|| ManagerError::UnknownItem(item_id.to_string()))?;
        let state = self.inner.state.read();
        if !state.is_active(item_id) {
            return Err(ManagerError::InactiveItem(item_id.to_string()));
        }
        let active = addon.kind != AddonKind::Panel || state.selected_panel.as_deref() == Some(item_id);
        Ok((addon.render)(&AddonRenderContext { active, state: &state }))
    }

    /// Render every active item of one kind, in insertion order
    #[must_use]
    pub fn render_active(&self, kind: AddonKind) -> Vec<(String, Node)> {
        self.inner
            .registry
            .items(kind)
            .into_iter()
            .filter_map(|(id, _)| self.render_item(&id).ok().map(|node| (id, node)))
            .collect()
    }
}

fn field<T: DeserializeOwned>(event: &ChannelEvent, key: &str) -> Option<T> {
    let value = event.first_arg()?.get(key)?.clone();
    serde_json::from_value(value).ok()
}

fn subscribe<F>(
    channel: &Channel,
    weak: &Weak<StoreInner>,
    event_type: &'static str,
    handler: F,
) -> (&'static str, Listener)
where
    F: Fn(&StoreInner, &ChannelEvent) + Send + Sync + 'static,
{
    let weak = weak.clone();
    let listener = channel.on(event_type, move |event| {
        if let Some(inner) = weak.upgrade() {
            handler(&inner, event);
        }
    });
    (event_type, listener)
}

impl Drop for ManagerStore {
    fn drop(&mut self) {
        for (event_type, listener) in &self.listeners {
            self.channel.off(event_type, listener);
        }
    }
}

impl fmt::Debug for ManagerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("ManagerStore")
            .field("current", &state.current)
            .field("index_entries", &state.index.as_ref().map(StoryIndex::len))
            .field("active_items", &state.active_items)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Addon;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store() -> (Channel, ManagerStore) {
        let channel = Channel::local();
        let store = ManagerStore::new(channel.clone(), Arc::new(AddonRegistry::new()));
        (channel, store)
    }

    #[test]
    fn selection_and_args_are_mirrored() {
        let (channel, store) = store();

        channel.emit(
            events::CURRENT_STORY_WAS_SET,
            vec![json!({ "storyId": "a--b", "viewMode": "story" })],
        );
        channel.emit(
            events::STORY_ARGS_UPDATED,
            vec![json!({ "storyId": "a--b", "args": { "label": "Hi" } })],
        );

        let state = store.state();
        assert_eq!(state.current_story_id(), Some("a--b"));
        assert_eq!(state.current_args().unwrap()["label"], json!("Hi"));
    }

    #[test]
    fn preparing_clears_the_previous_failure() {
        let (channel, store) = store();
        channel.emit(events::CURRENT_STORY_WAS_SET, vec![json!({ "storyId": "a--b" })]);
        channel.emit(
            events::STORY_ERRORED,
            vec![json!({ "storyId": "a--b", "category": "loader", "title": "Error in loader", "description": "offline" })],
        );

        let failure = store.read(|s| s.current_error().cloned()).unwrap();
        assert_eq!(failure.category, ErrorCategory::Loader);
        assert_eq!(failure.message, "offline");

        channel.emit(
            events::STORY_RENDER_PHASE_CHANGED,
            vec![json!({ "storyId": "a--b", "newPhase": "preparing" })],
        );
        assert_eq!(store.read(|s| s.last_error.clone()), None);
        assert_eq!(store.read(ManagerState::current_phase), Some(RenderPhase::Preparing));
    }

    #[test]
    fn dropped_store_unsubscribes() {
        let (channel, store) = store();
        assert_eq!(channel.listener_count(events::SET_INDEX), 1);
        drop(store);
        assert_eq!(channel.listener_count(events::SET_INDEX), 0);
    }

    #[test]
    fn first_active_panel_is_selected() {
        let (channel, store) = store();
        store
            .registry()
            .add("docs-only/panel", Addon::panel("Docs", |_| Node::text("d")).with_match(|c| c.view_mode == ViewMode::Docs));
        store.registry().add("controls/panel", Addon::panel("Controls", |_| Node::text("c")));

        channel.emit(events::CURRENT_STORY_WAS_SET, vec![json!({ "storyId": "a--b" })]);

        assert_eq!(store.read(|s| s.selected_panel.clone()).as_deref(), Some("controls/panel"));
        assert_eq!(
            store.select_panel("docs-only/panel"),
            Err(ManagerError::InactiveItem("docs-only/panel".into()))
        );
    }

    #[test]
    fn selected_panel_survives_navigation_while_visible() {
        let (channel, store) = store();
        store.registry().add("controls/panel", Addon::panel("Controls", |_| Node::text("c")));
        store
            .registry()
            .add("docs-only/panel", Addon::panel("Docs", |_| Node::text("d")).with_match(|c| c.view_mode == ViewMode::Docs));

        channel.emit(events::CURRENT_STORY_WAS_SET, vec![json!({ "storyId": "a--docs", "viewMode": "docs" })]);
        store.select_panel("docs-only/panel").unwrap();
        channel.emit(events::CURRENT_STORY_WAS_SET, vec![json!({ "storyId": "a--other", "viewMode": "docs" })]);
        assert_eq!(store.read(|s| s.selected_panel.clone()).as_deref(), Some("docs-only/panel"));

        channel.emit(events::CURRENT_STORY_WAS_SET, vec![json!({ "storyId": "a--b", "viewMode": "story" })]);
        assert_eq!(store.read(|s| s.selected_panel.clone()).as_deref(), Some("controls/panel"));
    }
}
