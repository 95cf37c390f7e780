//! Preview bootstrap
//!
//! [`Preview`] owns the story store, the render controller, the docs
//! renderer and the instrumenter, and answers manager commands:
//!
//! | command                | effect                                         |
//! |------------------------|------------------------------------------------|
//! | `setCurrentStory`      | select, prepare, render (or mount a docs page) |
//! | `updateStoryArgs`      | merge args, rerender the current story         |
//! | `resetStoryArgs`       | restore initial args, rerender                 |
//! | `updateGlobals`        | merge globals, rerender whatever is shown      |
//! | `forceReRender`        | rerender without replaying play                |
//! | `forceRemount`         | tear down and remount, replaying play          |
//!
//! Handlers mutate store state inline, in channel order, and hand the
//! render itself to the runtime. A render started for an older selection
//! bails out instead of touching the canvas.

use crate::error::PreviewError;
use crate::options::PreviewOptions;
use parking_lot::Mutex;
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use vitrine_channel::{events, to_payload, Channel, ChannelEvent, Listener};
use vitrine_docs::DocsRenderer;
use vitrine_instrument::Instrumenter;
use vitrine_render::{RenderController, RenderMode, RenderOutcome, Renderer};
use vitrine_store::{
    object, Args, Canvas, Globals, ModuleAdded, ModuleExports, NotFoundError,
    ProjectAnnotations, StoryIndex, StoryStore, ViewMode,
};

/// Entry currently selected in the preview
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Story or docs id
    pub id: String,
    /// Resolved view mode
    pub view_mode: ViewMode,
}

/// How showing a selection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// A story render finished
    Story(RenderOutcome),
    /// A docs page was mounted
    Docs {
        /// Docs entry id
        docs_id: String,
        /// Stories embedded in the page
        stories: Vec<String>,
    },
    /// The docs page could not be composed
    DocsFailed {
        /// Docs entry id
        docs_id: String,
        /// Failure message
        message: String,
    },
    /// A newer selection arrived first
    Superseded {
        /// Id that was dropped
        id: String,
    },
}

impl SelectionOutcome {
    /// Whether the selection reached the canvas
    #[must_use]
    pub fn is_shown(&self) -> bool {
        matches!(
            self,
            Self::Docs { .. } | Self::Story(RenderOutcome::Completed { .. })
        )
    }
}

/// Decrements the pending-task count on drop, panics included
struct PendingTask(watch::Sender<usize>);

impl Drop for PendingTask {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

struct PreviewInner {
    options: PreviewOptions,
    store: Arc<StoryStore>,
    channel: Channel,
    controller: RenderController,
    docs: DocsRenderer,
    instrumenter: Instrumenter,
    canvas: Arc<dyn Canvas>,
    runtime: Handle,
    selection: Mutex<Option<(Selection, u64)>>,
    generation: AtomicU64,
    pending: watch::Sender<usize>,
}

impl PreviewInner {
    fn selection(&self) -> Option<(Selection, u64)> {
        self.selection.lock().clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.selection
            .lock()
            .as_ref()
            .is_some_and(|(_, current)| *current == generation)
    }

    fn is_selected_story(&self, story_id: &str) -> bool {
        self.selection
            .lock()
            .as_ref()
            .is_some_and(|(selection, _)| selection.id == story_id)
    }

    fn docs_title(&self, id: &str) -> Option<String> {
        self.store
            .story_index()
            .get(id)
            .filter(|entry| entry.is_docs())
            .map(|entry| entry.title.clone())
    }

    /// Record a new selection and tell the manager about it
    fn begin_selection(&self, id: &str, requested: ViewMode) -> (Selection, u64) {
        let view_mode = if self.docs_title(id).is_some() {
            ViewMode::Docs
        } else {
            if requested == ViewMode::Docs {
                tracing::debug!(id, "docs view requested for a story entry");
            }
            ViewMode::Story
        };
        let selection = Selection {
            id: id.to_string(),
            view_mode,
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.selection.lock() = Some((selection.clone(), generation));

        tracing::debug!(id, generation, view_mode = view_mode.as_str(), "selection changed");
        self.channel.emit(
            events::CURRENT_STORY_WAS_SET,
            vec![json!({ "storyId": id, "viewMode": view_mode })],
        );
        (selection, generation)
    }

    async fn show(&self, selection: Selection, generation: u64, mode: RenderMode) -> SelectionOutcome {
        if !self.is_current(generation) {
            return SelectionOutcome::Superseded { id: selection.id };
        }
        match self.docs_title(&selection.id) {
            Some(title) => self.show_docs(&selection.id, &title, generation).await,
            None => self.show_story(&selection.id, generation, mode).await,
        }
    }

    async fn show_story(&self, story_id: &str, generation: u64, mode: RenderMode) -> SelectionOutcome {
        if mode == RenderMode::Navigate {
            if let Ok(prepared) = self.controller.prepare(story_id).await {
                if !self.is_current(generation) {
                    return SelectionOutcome::Superseded {
                        id: story_id.to_string(),
                    };
                }
                let args = self.store.args();
                args.set_initial(story_id, &prepared.initial_args);
                let current = args
                    .get(story_id)
                    .unwrap_or_else(|| prepared.initial_args.clone());
                self.channel
                    .emit(events::STORY_PREPARED, vec![prepared.summary(&current)]);
            }
        }
        if !self.is_current(generation) {
            return SelectionOutcome::Superseded {
                id: story_id.to_string(),
            };
        }

        let outcome = self.controller.render(story_id, mode).await;
        if let RenderOutcome::Missing { story_id } = &outcome {
            self.channel
                .emit(events::STORY_MISSING, vec![json!(story_id)]);
        }
        SelectionOutcome::Story(outcome)
    }

    async fn show_docs(&self, docs_id: &str, title: &str, generation: u64) -> SelectionOutcome {
        if let Err(error) = self.controller.teardown().await {
            tracing::warn!(docs_id, error = %error, "story teardown failed before docs");
        }
        let page = self.docs.autodocs(title).await;
        if !self.is_current(generation) {
            return SelectionOutcome::Superseded {
                id: docs_id.to_string(),
            };
        }

        match page {
            Ok(page) => {
                self.canvas.replace_children(vec![page.to_node()]);
                self.channel
                    .emit(events::DOCS_RENDERED, vec![json!(docs_id)]);
                tracing::info!(docs_id, "docs page mounted");
                SelectionOutcome::Docs {
                    docs_id: docs_id.to_string(),
                    stories: page.story_ids().into_iter().map(str::to_string).collect(),
                }
            }
            Err(error) => {
                tracing::warn!(docs_id, error = %error, "docs page failed");
                self.channel.emit(
                    events::STORY_ERRORED,
                    vec![json!({
                        "storyId": docs_id,
                        "category": "render",
                        "title": format!("Error rendering docs for {title}"),
                        "description": error.to_string(),
                    })],
                );
                SelectionOutcome::DocsFailed {
                    docs_id: docs_id.to_string(),
                    message: error.to_string(),
                }
            }
        }
    }

    async fn refresh(&self, mode: RenderMode) -> Option<SelectionOutcome> {
        let (selection, generation) = self.selection()?;
        Some(self.show(selection, generation, mode).await)
    }

    /// Merge args; true when the story is the one on screen
    fn apply_args_update(&self, story_id: &str, updated: &Args) -> bool {
        let args = self.store.args().update(story_id, updated);
        self.channel.emit(
            events::STORY_ARGS_UPDATED,
            vec![json!({ "storyId": story_id, "args": args })],
        );
        self.is_selected_story(story_id)
    }

    fn apply_args_reset(
        &self,
        story_id: &str,
        arg_names: Option<&[String]>,
    ) -> Result<bool, NotFoundError> {
        let prepared = self.store.from_id(story_id)?;
        let args = self
            .store
            .args()
            .reset(story_id, &prepared.initial_args, arg_names);
        self.channel.emit(
            events::STORY_ARGS_UPDATED,
            vec![json!({ "storyId": story_id, "args": args })],
        );
        Ok(self.is_selected_story(story_id))
    }

    fn apply_globals_update(&self, updated: &Globals) {
        let globals = self.store.globals().update(updated);
        self.channel
            .emit(events::GLOBALS_UPDATED, vec![json!({ "globals": globals })]);
    }

    fn emit_globals(&self) {
        let globals = self.store.globals();
        self.channel.emit(
            events::SET_GLOBALS,
            vec![json!({ "globals": globals.get(), "globalTypes": globals.global_types() })],
        );
    }

    fn emit_index(&self) -> StoryIndex {
        let index = self.store.story_index();
        self.channel.emit(events::SET_INDEX, vec![to_payload(&index)]);
        index
    }

    /// Initial args, before replacement, of stories the manager has seen
    fn seen_initial_args(&self, exports: &ModuleExports) -> Vec<(String, Args)> {
        let title = exports.default.title.clone().or_else(|| {
            let path = exports.import_path.as_deref()?;
            self.store.titles().into_iter().find(|title| {
                self.store
                    .csf_file(title)
                    .is_some_and(|csf| csf.import_path.as_deref() == Some(path))
            })
        });
        let Some(csf) = title.and_then(|title| self.store.csf_file(&title)) else {
            return Vec::new();
        };
        csf.stories
            .keys()
            .filter(|id| self.store.args().contains(id))
            .filter_map(|id| {
                self.store
                    .from_id(id)
                    .ok()
                    .map(|prepared| (id.clone(), prepared.initial_args.clone()))
            })
            .collect()
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending.send_modify(|n| *n += 1);
        let guard = PendingTask(self.pending.clone());
        self.runtime.spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    fn spawn_show(self: &Arc<Self>, selection: Selection, generation: u64, mode: RenderMode) {
        let inner = Arc::clone(self);
        self.spawn(async move {
            inner.show(selection, generation, mode).await;
        });
    }

    fn spawn_refresh(self: &Arc<Self>, mode: RenderMode) {
        if let Some((selection, generation)) = self.selection() {
            self.spawn_show(selection, generation, mode);
        }
    }

    fn on_set_current_story(self: &Arc<Self>, event: &ChannelEvent) {
        let Some(story_id) = event.str_field("storyId") else {
            tracing::warn!("setCurrentStory without storyId");
            return;
        };
        let view_mode = event
            .first_arg()
            .and_then(|payload| payload.get("viewMode"))
            .and_then(|mode| serde_json::from_value(mode.clone()).ok())
            .unwrap_or_default();
        let (selection, generation) = self.begin_selection(story_id, view_mode);
        self.spawn_show(selection, generation, RenderMode::Navigate);
    }

    fn on_update_story_args(self: &Arc<Self>, event: &ChannelEvent) {
        let Some(story_id) = event.str_field("storyId") else {
            tracing::warn!("updateStoryArgs without storyId");
            return;
        };
        let updated = event
            .first_arg()
            .and_then(|payload| payload.get("updatedArgs"))
            .cloned()
            .map(object)
            .unwrap_or_default();
        if self.apply_args_update(story_id, &updated) {
            self.spawn_refresh(RenderMode::Rerender);
        }
    }

    fn on_reset_story_args(self: &Arc<Self>, event: &ChannelEvent) {
        let Some(story_id) = event.str_field("storyId") else {
            tracing::warn!("resetStoryArgs without storyId");
            return;
        };
        let arg_names = event
            .first_arg()
            .and_then(|payload| payload.get("argNames"))
            .and_then(|names| serde_json::from_value::<Vec<String>>(names.clone()).ok());
        match self.apply_args_reset(story_id, arg_names.as_deref()) {
            Ok(true) => self.spawn_refresh(RenderMode::Rerender),
            Ok(false) => {}
            Err(error) => tracing::warn!(story_id, error = %error, "args reset for unknown story"),
        }
    }

    fn on_update_globals(self: &Arc<Self>, event: &ChannelEvent) {
        let updated = event
            .first_arg()
            .and_then(|payload| payload.get("globals"))
            .cloned()
            .map(object)
            .unwrap_or_default();
        self.apply_globals_update(&updated);
        self.spawn_refresh(RenderMode::Rerender);
    }

    fn on_force_remount(self: &Arc<Self>, event: &ChannelEvent) {
        let Some(story_id) = event.str_field("storyId") else {
            return;
        };
        if self.is_selected_story(story_id) {
            self.spawn_refresh(RenderMode::Remount);
        } else {
            tracing::debug!(story_id, "remount for a story not on screen");
        }
    }
}

/// Preview runtime: story store, render loop and channel protocol
pub struct Preview {
    inner: Arc<PreviewInner>,
    listeners: Vec<(&'static str, Listener)>,
}

impl Preview {
    /// Create a preview rendering into `canvas` and talking over `channel`
    ///
    /// Must be called inside a Tokio runtime; channel-triggered renders are
    /// spawned on it.
    ///
    /// # Errors
    /// [`PreviewError::NoRuntime`] outside a runtime.
    pub fn new(
        options: PreviewOptions,
        project: ProjectAnnotations,
        renderer: Arc<dyn Renderer>,
        canvas: Arc<dyn Canvas>,
        channel: Channel,
    ) -> Result<Self, PreviewError> {
        let runtime = Handle::try_current().map_err(|e| PreviewError::NoRuntime(e.to_string()))?;
        let store = Arc::new(StoryStore::with_options(project, options.store_options()));
        let controller = RenderController::new(
            Arc::clone(&store),
            channel.clone(),
            Arc::clone(&renderer),
            Arc::clone(&canvas),
        )
        .with_options(options.render_options());
        let docs = DocsRenderer::new(Arc::clone(&store), Arc::clone(&renderer));
        let instrumenter = Instrumenter::new(channel.clone());
        let (pending, _) = watch::channel(0);

        tracing::info!(
            build_mode = ?options.build_mode,
            renderer = renderer.name(),
            canvas = canvas.id(),
            "preview created"
        );
        let inner = Arc::new(PreviewInner {
            options,
            store,
            channel: channel.clone(),
            controller,
            docs,
            instrumenter,
            canvas,
            runtime,
            selection: Mutex::new(None),
            generation: AtomicU64::new(0),
            pending,
        });

        let weak = Arc::downgrade(&inner);
        let listeners = vec![
            subscribe(&channel, &weak, events::SET_CURRENT_STORY, PreviewInner::on_set_current_story),
            subscribe(&channel, &weak, events::UPDATE_STORY_ARGS, PreviewInner::on_update_story_args),
            subscribe(&channel, &weak, events::RESET_STORY_ARGS, PreviewInner::on_reset_story_args),
            subscribe(&channel, &weak, events::UPDATE_GLOBALS, PreviewInner::on_update_globals),
            subscribe(&channel, &weak, events::FORCE_RE_RENDER, |inner, _| {
                inner.spawn_refresh(RenderMode::Rerender);
            }),
            subscribe(&channel, &weak, events::FORCE_REMOUNT, PreviewInner::on_force_remount),
        ];
        Ok(Self { inner, listeners })
    }

    /// Register story modules and publish globals and the index
    ///
    /// # Errors
    /// [`PreviewError::Configuration`] for the first module that fails to
    /// normalize; nothing is published in that case.
    pub fn initialize<I>(&self, modules: I) -> Result<StoryIndex, PreviewError>
    where
        I: IntoIterator<Item = ModuleExports>,
    {
        for exports in modules {
            self.inner.store.add(exports)?;
        }
        self.inner.emit_globals();
        let index = self.inner.emit_index();
        tracing::info!(entries = index.len(), "preview initialized");
        Ok(index)
    }

    /// Options in use
    #[inline]
    #[must_use]
    pub fn options(&self) -> &PreviewOptions {
        &self.inner.options
    }

    /// Story store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<StoryStore> {
        &self.inner.store
    }

    /// Preview-side channel
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.inner.channel
    }

    /// Render controller
    #[inline]
    #[must_use]
    pub fn controller(&self) -> &RenderController {
        &self.inner.controller
    }

    /// Docs renderer
    #[inline]
    #[must_use]
    pub fn docs(&self) -> &DocsRenderer {
        &self.inner.docs
    }

    /// Interaction instrumenter
    #[inline]
    #[must_use]
    pub fn instrumenter(&self) -> &Instrumenter {
        &self.inner.instrumenter
    }

    /// Current selection
    #[must_use]
    pub fn selection(&self) -> Option<Selection> {
        self.inner.selection().map(|(selection, _)| selection)
    }

    /// Select and show a story or docs entry
    pub async fn select_story(&self, story_id: &str, view_mode: ViewMode) -> SelectionOutcome {
        let (selection, generation) = self.inner.begin_selection(story_id, view_mode);
        self.inner
            .show(selection, generation, RenderMode::Navigate)
            .await
    }

    /// Merge `updated` into a story's args; rerenders when it is on screen
    pub async fn update_args(&self, story_id: &str, updated: &Args) -> Option<SelectionOutcome> {
        if self.inner.apply_args_update(story_id, updated) {
            self.inner.refresh(RenderMode::Rerender).await
        } else {
            None
        }
    }

    /// Restore initial args, all or only `arg_names`
    ///
    /// # Errors
    /// [`NotFoundError`] for unknown ids.
    pub async fn reset_args(
        &self,
        story_id: &str,
        arg_names: Option<&[String]>,
    ) -> Result<Option<SelectionOutcome>, NotFoundError> {
        if self.inner.apply_args_reset(story_id, arg_names)? {
            Ok(self.inner.refresh(RenderMode::Rerender).await)
        } else {
            Ok(None)
        }
    }

    /// Merge globals and rerender whatever is shown
    pub async fn update_globals(&self, updated: &Globals) -> Option<SelectionOutcome> {
        self.inner.apply_globals_update(updated);
        self.inner.refresh(RenderMode::Rerender).await
    }

    /// Rerender the current selection without replaying play
    pub async fn rerender(&self) -> Option<SelectionOutcome> {
        self.inner.refresh(RenderMode::Rerender).await
    }

    /// Tear down and remount the current selection, replaying play
    pub async fn remount(&self) -> Option<SelectionOutcome> {
        self.inner.refresh(RenderMode::Remount).await
    }

    /// Replace a story module after an edit
    ///
    /// Args the manager has seen are reset when their initial values changed.
    /// The current story is remounted when it belongs to the module, and
    /// reported missing when the edit removed it.
    ///
    /// # Errors
    /// [`PreviewError::HotReloadDisabled`] in production builds,
    /// [`PreviewError::Configuration`] when the new module does not normalize.
    pub async fn update_module(&self, exports: ModuleExports) -> Result<ModuleAdded, PreviewError> {
        let inner = &self.inner;
        if !inner.options.build_mode.hot_reload() {
            return Err(PreviewError::HotReloadDisabled);
        }
        let seen = inner.seen_initial_args(&exports);
        let added = inner.store.add(exports)?;
        tracing::info!(
            title = %added.title,
            stories = added.story_ids.len(),
            removed = added.removed.len(),
            "module updated"
        );

        for (story_id, previous) in seen {
            let Ok(prepared) = inner.store.from_id(&story_id) else {
                continue;
            };
            let args = inner.store.args();
            if args.reset_on_initial_change(&story_id, &previous, &prepared.initial_args) {
                let current = args
                    .get(&story_id)
                    .unwrap_or_else(|| prepared.initial_args.clone());
                inner.channel.emit(
                    events::STORY_ARGS_UPDATED,
                    vec![json!({ "storyId": story_id, "args": current })],
                );
            }
        }
        inner
            .channel
            .emit(events::STORY_INDEX_INVALIDATED, Vec::new());
        inner.emit_index();

        if let Some((selection, generation)) = inner.selection() {
            if added.removed.contains(&selection.id) {
                inner
                    .show(selection, generation, RenderMode::Navigate)
                    .await;
            } else if added.story_ids.contains(&selection.id) {
                inner
                    .channel
                    .emit(events::STORY_CHANGED, vec![json!(selection.id)]);
                inner.show(selection, generation, RenderMode::Remount).await;
            } else if inner.docs_title(&selection.id).as_deref() == Some(added.title.as_str()) {
                inner.show(selection, generation, RenderMode::Rerender).await;
            }
        }
        Ok(added)
    }

    /// Replace project annotations after an edit and remount
    ///
    /// # Errors
    /// [`PreviewError::HotReloadDisabled`] in production builds.
    pub async fn update_project(
        &self,
        project: ProjectAnnotations,
    ) -> Result<Option<SelectionOutcome>, PreviewError> {
        if !self.inner.options.build_mode.hot_reload() {
            return Err(PreviewError::HotReloadDisabled);
        }
        self.inner.store.set_project_annotations(project);
        self.inner.emit_globals();
        Ok(self.inner.refresh(RenderMode::Remount).await)
    }

    /// Wait until every channel-triggered render has finished
    pub async fn idle(&self) {
        let mut pending = self.inner.pending.subscribe();
        let _ = pending.wait_for(|n| *n == 0).await;
    }

    /// Tear down whatever is mounted and drop the selection
    ///
    /// # Errors
    /// [`PreviewError::Unmount`] when the renderer fails to unmount.
    pub async fn teardown(&self) -> Result<(), PreviewError> {
        *self.inner.selection.lock() = None;
        self.inner.controller.teardown().await?;
        self.inner.canvas.clear();
        Ok(())
    }
}

fn subscribe<F>(
    channel: &Channel,
    weak: &Weak<PreviewInner>,
    event_type: &'static str,
    handler: F,
) -> (&'static str, Listener)
where
    F: Fn(&Arc<PreviewInner>, &ChannelEvent) + Send + Sync + 'static,
{
    let weak = weak.clone();
    let listener = channel.on(event_type, move |event| {
        if let Some(inner) = weak.upgrade() {
            handler(&inner, event);
        }
    });
    (event_type, listener)
}

impl Drop for Preview {
    fn drop(&mut self) {
        for (event_type, listener) in &self.listeners {
            self.inner.channel.off(event_type, listener);
        }
    }
}

impl fmt::Debug for Preview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preview")
            .field("build_mode", &self.inner.options.build_mode)
            .field("selection", &self.selection())
            .field("pending", &*self.inner.pending.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shown_outcomes() {
        let completed = SelectionOutcome::Story(RenderOutcome::Completed {
            story_id: "a--b".into(),
            played: false,
        });
        assert!(completed.is_shown());
        assert!(SelectionOutcome::Docs {
            docs_id: "a--docs".into(),
            stories: Vec::new(),
        }
        .is_shown());
        assert!(!SelectionOutcome::Superseded { id: "a--b".into() }.is_shown());
        assert!(!SelectionOutcome::Story(RenderOutcome::Missing {
            story_id: "a--b".into()
        })
        .is_shown());
    }

    #[test]
    fn creation_requires_a_runtime() {
        let result = Preview::new(
            PreviewOptions::default(),
            ProjectAnnotations::new(),
            Arc::new(vitrine_render::NodeRenderer::new()),
            Arc::new(vitrine_render::MemoryCanvas::new("root")),
            Channel::local(),
        );
        assert!(matches!(result, Err(PreviewError::NoRuntime(_))));
    }
}
