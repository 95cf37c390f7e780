//! Manager to preview commands
//!
//! [`ManagerApi`] is what the shell and addon setups use to drive the
//! preview. Commands are fire-and-forget channel events; their effect shows
//! up in the [`ManagerStore`] once the preview reports back.

use crate::error::ManagerError;
use crate::registry::AddonRegistry;
use crate::store::{ManagerState, ManagerStore};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Weak};
use vitrine_channel::{events, Channel, ChannelEvent, Listener};
use vitrine_store::{Args, Globals, ViewMode};

/// Handle for issuing preview commands
#[derive(Clone)]
pub struct ManagerApi {
    channel: Channel,
    store: Arc<ManagerStore>,
}

/// Non-owning [`ManagerApi`], held by the addon registry
#[derive(Clone)]
pub struct WeakManagerApi {
    channel: Channel,
    store: Weak<ManagerStore>,
}

impl WeakManagerApi {
    /// Upgrade while the store is alive
    #[must_use]
    pub fn upgrade(&self) -> Option<ManagerApi> {
        self.store.upgrade().map(|store| ManagerApi {
            channel: self.channel.clone(),
            store,
        })
    }
}

impl ManagerApi {
    /// Create api over a manager-side channel
    #[must_use]
    pub fn new(channel: Channel, store: Arc<ManagerStore>) -> Self {
        Self { channel, store }
    }

    /// Non-owning handle
    #[must_use]
    pub fn downgrade(&self) -> WeakManagerApi {
        WeakManagerApi {
            channel: self.channel.clone(),
            store: Arc::downgrade(&self.store),
        }
    }

    /// Manager-side channel
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Mirrored preview state
    #[inline]
    #[must_use]
    pub fn store(&self) -> &ManagerStore {
        &self.store
    }

    /// Addon registry
    #[inline]
    #[must_use]
    pub fn addons(&self) -> &AddonRegistry {
        self.store.registry()
    }

    /// Snapshot of the mirrored state
    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.store.state()
    }

    /// Ask the preview to show a story or docs entry
    ///
    /// # Errors
    /// [`ManagerError::UnknownStory`] when an index has been received and
    /// does not contain `story_id`. Before the first index every id is sent.
    pub fn select_story(&self, story_id: &str, view_mode: ViewMode) -> Result<(), ManagerError> {
        let known = self.store.read(|state| {
            state
                .index
                .as_ref()
                .map_or(true, |index| index.get(story_id).is_some())
        });
        if !known {
            return Err(ManagerError::UnknownStory(story_id.to_string()));
        }
        tracing::debug!(story_id, view_mode = view_mode.as_str(), "selecting story");
        self.emit(
            events::SET_CURRENT_STORY,
            json!({ "storyId": story_id, "viewMode": view_mode }),
        );
        Ok(())
    }

    /// Select the first story of the index, if any
    pub fn select_first_story(&self) -> Option<String> {
        let first = self.store.read(|state| {
            state
                .index
                .as_ref()
                .and_then(|index| index.first_story())
                .map(|entry| entry.id.clone())
        })?;
        self.emit(
            events::SET_CURRENT_STORY,
            json!({ "storyId": first, "viewMode": ViewMode::Story }),
        );
        Some(first)
    }

    /// Shallow-merge `updated` into a story's args; `null` removes a key
    pub fn update_story_args(&self, story_id: &str, updated: Args) {
        self.emit(
            events::UPDATE_STORY_ARGS,
            json!({ "storyId": story_id, "updatedArgs": updated }),
        );
    }

    /// Reset all args, or only `arg_names`, to their initial values
    pub fn reset_story_args(&self, story_id: &str, arg_names: Option<&[&str]>) {
        let mut payload = json!({ "storyId": story_id });
        if let Some(names) = arg_names {
            payload["argNames"] = json!(names);
        }
        self.emit(events::RESET_STORY_ARGS, payload);
    }

    /// Merge `globals` into the preview's globals
    pub fn update_globals(&self, globals: Globals) {
        self.emit(events::UPDATE_GLOBALS, json!({ "globals": globals }));
    }

    /// Re-render the current story without replaying play
    pub fn force_rerender(&self) {
        self.channel.emit(events::FORCE_RE_RENDER, Vec::new());
    }

    /// Tear down and remount a story, replaying play
    pub fn force_remount(&self, story_id: &str) {
        self.emit(events::FORCE_REMOUNT, json!({ "storyId": story_id }));
    }

    /// Hold failing interactions until continued or rerun
    pub fn set_pause_on_exception(&self, story_id: &str, enabled: bool) {
        self.emit(
            events::INSTRUMENTER_PAUSE_ON_EXCEPTION,
            json!({ "storyId": story_id, "enabled": enabled }),
        );
    }

    /// Let a held exception propagate
    pub fn continue_run(&self, story_id: &str) {
        self.instrumenter(events::INSTRUMENTER_CONTINUE, story_id);
    }

    /// Abandon a held exception and replay the story
    pub fn rerun(&self, story_id: &str) {
        self.instrumenter(events::INSTRUMENTER_RERUN, story_id);
    }

    /// Replay in debugging mode, pausing after `play_until`
    pub fn start_debugging(&self, story_id: &str, play_until: Option<&str>) {
        let mut payload = json!({ "storyId": story_id });
        if let Some(call_id) = play_until {
            payload["playUntil"] = json!(call_id);
        }
        self.emit(events::INSTRUMENTER_START, payload);
    }

    /// Run the paused call
    pub fn next(&self, story_id: &str) {
        self.instrumenter(events::INSTRUMENTER_NEXT, story_id);
    }

    /// Run to completion
    pub fn end(&self, story_id: &str) {
        self.instrumenter(events::INSTRUMENTER_END, story_id);
    }

    /// Replay up to the call before the paused one
    pub fn back(&self, story_id: &str) {
        self.instrumenter(events::INSTRUMENTER_BACK, story_id);
    }

    /// Replay up to `call_id`
    pub fn goto(&self, story_id: &str, call_id: &str) {
        self.emit(
            events::INSTRUMENTER_GOTO,
            json!({ "storyId": story_id, "callId": call_id }),
        );
    }

    /// Emit an addon-defined event with one payload
    pub fn emit(&self, event_type: &str, payload: Value) {
        self.channel.emit(event_type, vec![payload]);
    }

    /// Listen for an event from the preview or other addons
    pub fn on<F>(&self, event_type: &str, handler: F) -> Listener
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        self.channel.on(event_type, handler)
    }

    /// Remove a listener added with [`ManagerApi::on`]
    pub fn off(&self, event_type: &str, listener: &Listener) {
        self.channel.off(event_type, listener);
    }

    fn instrumenter(&self, event_type: &str, story_id: &str) {
        self.emit(event_type, json!({ "storyId": story_id }));
    }
}

impl fmt::Debug for ManagerApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerApi")
            .field("source", &self.channel.source())
            .field("store", &self.store)
            .finish()
    }
}

impl fmt::Debug for WeakManagerApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakManagerApi")
            .field("alive", &(self.store.strong_count() > 0))
            .finish_non_exhaustive()
    }
}
