//! Testing utilities for the Vitrine workspace
//!
//! Shared fixtures, a recording renderer and a channel event recorder.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vitrine_channel::{events, Channel, ChannelEvent};
use vitrine_render::{MemoryCanvas, RenderController, RenderOptions, Renderer};
use vitrine_store::prelude::*;
use vitrine_store::{Canvas, ComponentHandle};

/// Renderer that mounts trees as-is and records what it did
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    delays: Mutex<HashMap<String, Duration>>,
    stalls: Mutex<HashMap<String, Duration>>,
    mounted: Mutex<Vec<String>>,
    mounts: AtomicUsize,
    unmounts: AtomicUsize,
    fail_unmount: AtomicBool,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay mounts of one story
    pub fn with_mount_delay(self, story_id: &str, delay: Duration) -> Self {
        self.delays.lock().insert(story_id.to_string(), delay);
        self
    }

    /// Attach one story's tree right away but settle the mount only after
    /// `delay`
    pub fn with_stalled_mount(self, story_id: &str, delay: Duration) -> Self {
        self.stalls.lock().insert(story_id.to_string(), delay);
        self
    }

    pub fn fail_unmount(&self, failing: bool) {
        self.fail_unmount.store(failing, Ordering::SeqCst);
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.load(Ordering::SeqCst)
    }

    pub fn unmount_count(&self) -> usize {
        self.unmounts.load(Ordering::SeqCst)
    }

    /// Story ids in mount order
    pub fn mounted_ids(&self) -> Vec<String> {
        self.mounted.lock().clone()
    }
}

#[async_trait]
impl Renderer for RecordingRenderer {
    fn name(&self) -> &str {
        "recording"
    }

    async fn mount(&self, node: Node, canvas: Arc<dyn Canvas>, ctx: &StoryContext) -> anyhow::Result<()> {
        let delay = self.delays.lock().get(&ctx.id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        canvas.replace_children(vec![node]);
        let stall = self.stalls.lock().get(&ctx.id).copied();
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
        self.mounts.fetch_add(1, Ordering::SeqCst);
        self.mounted.lock().push(ctx.id.clone());
        Ok(())
    }

    async fn unmount(&self, canvas: Arc<dyn Canvas>) -> anyhow::Result<()> {
        self.unmounts.fetch_add(1, Ordering::SeqCst);
        if self.fail_unmount.load(Ordering::SeqCst) {
            anyhow::bail!("unmount refused");
        }
        canvas.clear();
        Ok(())
    }
}

/// Records channel events of the given types
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<ChannelEvent>>>,
}

impl EventRecorder {
    pub fn attach(channel: &Channel, event_types: &[&str]) -> Self {
        let recorder = Self::default();
        for event_type in event_types {
            let sink = Arc::clone(&recorder.events);
            channel.on(event_type, move |event| sink.lock().push(event.clone()));
        }
        recorder
    }

    pub fn events(&self) -> Vec<ChannelEvent> {
        self.events.lock().clone()
    }

    pub fn types(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.event_type.clone()).collect()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<ChannelEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Phases published for one story, in order
    pub fn phases(&self, story_id: &str) -> Vec<String> {
        self.of_type(events::STORY_RENDER_PHASE_CHANGED)
            .iter()
            .filter(|e| e.str_field("storyId") == Some(story_id))
            .filter_map(|e| e.str_field("newPhase").map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// Render a `<button>` with the `label` arg as text
pub fn label_button() -> vitrine_store::RenderFn {
    render_fn(|ctx| {
        let label = ctx.arg_str("label").unwrap_or_default();
        Ok(Node::element("button").with_text(label))
    })
}

/// `Example/Button` with `Primary` and `Secondary`
pub fn button_module() -> ModuleExports {
    ModuleExports::new(
        MetaAnnotations::titled("Example/Button")
            .with_component(ComponentHandle::named("Button"))
            .with_args(json!({ "label": "Button" }))
            .with_render(label_button()),
    )
    .with_import_path("./src/button.stories.rs")
    .story("Primary", StoryAnnotations::new().with_args(json!({ "primary": true })))
    .story("Secondary", StoryAnnotations::new().with_args(json!({ "label": "Second" })))
}

/// Single-story module
pub fn module_with(title: &str, export: &str, story: StoryAnnotations) -> ModuleExports {
    ModuleExports::new(MetaAnnotations::titled(title)).story(export, story)
}

pub fn store_with(modules: impl IntoIterator<Item = ModuleExports>) -> Arc<StoryStore> {
    let store = StoryStore::new(ProjectAnnotations::new());
    for module in modules {
        store.add(module).unwrap();
    }
    Arc::new(store)
}

/// Everything a render test needs
pub struct Harness {
    pub store: Arc<StoryStore>,
    pub channel: Channel,
    pub canvas: Arc<MemoryCanvas>,
    pub renderer: Arc<RecordingRenderer>,
    pub controller: RenderController,
    pub recorder: EventRecorder,
}

impl Harness {
    pub fn new(store: Arc<StoryStore>) -> Self {
        Self::with_renderer(store, RecordingRenderer::new())
    }

    pub fn with_renderer(store: Arc<StoryStore>, renderer: RecordingRenderer) -> Self {
        let channel = Channel::new("preview");
        let recorder = EventRecorder::attach(&channel, ALL_PREVIEW_EVENTS);
        let canvas = Arc::new(MemoryCanvas::new("storybook-root"));
        let renderer = Arc::new(renderer);
        let controller = RenderController::new(
            Arc::clone(&store),
            channel.clone(),
            renderer.clone(),
            canvas.clone(),
        );
        Self {
            store,
            channel,
            canvas,
            renderer,
            controller,
            recorder,
        }
    }

    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.controller = self.controller.with_options(options);
        self
    }
}

/// Events a preview emits
pub const ALL_PREVIEW_EVENTS: &[&str] = &[
    events::SET_INDEX,
    events::STORY_INDEX_INVALIDATED,
    events::SET_GLOBALS,
    events::CURRENT_STORY_WAS_SET,
    events::STORY_CHANGED,
    events::STORY_MISSING,
    events::STORY_PREPARED,
    events::STORY_RENDERED,
    events::STORY_RENDER_PHASE_CHANGED,
    events::STORY_ERRORED,
    events::STORY_THREW_EXCEPTION,
    events::PLAY_FUNCTION_THREW_EXCEPTION,
    events::STORY_UNCHANGED,
    events::DOCS_RENDERED,
    events::STORY_ARGS_UPDATED,
    events::GLOBALS_UPDATED,
    events::FORCE_REMOUNT,
];

/// First argument of the last event of a type
pub fn last_payload(recorder: &EventRecorder, event_type: &str) -> Option<Value> {
    recorder
        .of_type(event_type)
        .last()
        .and_then(|e| e.first_arg().cloned())
}
