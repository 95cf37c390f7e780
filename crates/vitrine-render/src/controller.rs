//! Render controller
//!
//! Drives one canvas through story renders:
//!
//! 1. abort the previous run (without waiting for it)
//! 2. resolve the prepared story, sharing in-flight preparations per id
//! 3. run loaders, build the context
//! 4. take the canvas, tear down its previous owner, decorate and mount
//! 5. run play when present and enabled
//!
//! Every suspension point is raced against the run's abort signal and followed
//! by a generation check, so a superseded run stops without touching the
//! canvas. Failures are reported on the channel; [`RenderController::render`]
//! always returns a [`RenderOutcome`].

use crate::error::{ErrorCategory, StoryError};
use crate::phase::RenderPhase;
use crate::renderer::Renderer;
use crate::story_render::StoryRender;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vitrine_channel::{events, Channel};
use vitrine_store::{Canvas, NotFoundError, PreparedStory, StoryContext, StoryStore, ViewMode};

type Preparation = Shared<BoxFuture<'static, Result<Arc<PreparedStory>, NotFoundError>>>;

/// What to do when a play function fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayErrorPolicy {
    /// Report on the channel; the story still reaches `Played`
    #[default]
    Report,
    /// Move the story to `Errored` with category `play`
    Propagate,
}

/// Controller behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Run play functions after mount
    pub autoplay: bool,
    /// Play failure handling
    pub play_error_policy: PlayErrorPolicy,
    /// View mode stamped into contexts
    pub view_mode: ViewMode,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            autoplay: true,
            play_error_policy: PlayErrorPolicy::Report,
            view_mode: ViewMode::Story,
        }
    }
}

impl RenderOptions {
    /// Enable or disable autoplay
    #[must_use]
    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }

    /// Set play failure handling
    #[must_use]
    pub fn with_play_error_policy(mut self, policy: PlayErrorPolicy) -> Self {
        self.play_error_policy = policy;
        self
    }

    /// Set view mode
    #[must_use]
    pub fn with_view_mode(mut self, view_mode: ViewMode) -> Self {
        self.view_mode = view_mode;
        self
    }
}

/// Kind of render request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Navigation: tear down the previous owner, mount, play
    Navigate,
    /// Args or globals changed: re-run loaders and decorators, remount in
    /// place, skip play
    Rerender,
    /// Forced remount: tear down and replay, play included
    Remount,
}

impl RenderMode {
    fn plays(self) -> bool {
        !matches!(self, Self::Rerender)
    }
}

/// How a render request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Mounted; `played` tells whether a play function ran
    Completed {
        /// Story id
        story_id: String,
        /// Whether a play function ran
        played: bool,
    },
    /// Ended in `Errored`
    Errored {
        /// Story id
        story_id: String,
        /// Failure category
        category: ErrorCategory,
        /// User-facing message
        message: String,
    },
    /// Superseded or torn down before finishing
    Aborted {
        /// Story id
        story_id: String,
    },
    /// No such story
    Missing {
        /// Story id
        story_id: String,
    },
}

impl RenderOutcome {
    /// Story id of the request
    #[must_use]
    pub fn story_id(&self) -> &str {
        match self {
            Self::Completed { story_id, .. }
            | Self::Errored { story_id, .. }
            | Self::Aborted { story_id }
            | Self::Missing { story_id } => story_id,
        }
    }

    /// Whether the story finished rendering
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Lifecycle controller for one canvas
pub struct RenderController {
    store: Arc<StoryStore>,
    channel: Channel,
    renderer: Arc<dyn Renderer>,
    canvas: Arc<dyn Canvas>,
    options: RenderOptions,
    generation: AtomicU64,
    current: Mutex<Option<Arc<StoryRender>>>,
    owner: Mutex<Option<Arc<StoryRender>>>,
    canvas_lock: tokio::sync::Mutex<()>,
    in_flight: DashMap<String, Preparation>,
}

impl RenderController {
    /// Create controller
    #[must_use]
    pub fn new(
        store: Arc<StoryStore>,
        channel: Channel,
        renderer: Arc<dyn Renderer>,
        canvas: Arc<dyn Canvas>,
    ) -> Self {
        Self {
            store,
            channel,
            renderer,
            canvas,
            options: RenderOptions::default(),
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
            owner: Mutex::new(None),
            canvas_lock: tokio::sync::Mutex::new(()),
            in_flight: DashMap::new(),
        }
    }

    /// Set options
    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Options in use
    #[inline]
    #[must_use]
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Canvas this controller renders into
    #[inline]
    #[must_use]
    pub fn canvas(&self) -> &Arc<dyn Canvas> {
        &self.canvas
    }

    /// Most recently requested render
    #[must_use]
    pub fn current(&self) -> Option<Arc<StoryRender>> {
        self.current.lock().clone()
    }

    /// Id of the most recently requested story
    #[must_use]
    pub fn current_story_id(&self) -> Option<String> {
        self.current
            .lock()
            .as_ref()
            .map(|r| r.story_id().to_string())
    }

    /// Number of preparations currently in flight
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Resolve a prepared story, attaching to an in-flight preparation for the
    /// same id when there is one
    ///
    /// # Errors
    /// [`NotFoundError`] for unknown ids.
    pub async fn prepare(&self, story_id: &str) -> Result<Arc<PreparedStory>, NotFoundError> {
        let shared = self
            .in_flight
            .entry(story_id.to_string())
            .or_insert_with(|| {
                let store = Arc::clone(&self.store);
                let id = story_id.to_string();
                async move {
                    tokio::task::yield_now().await;
                    store.from_id(&id)
                }
                .boxed()
                .shared()
            })
            .clone();

        let result = shared.clone().await;
        self.in_flight
            .remove_if(story_id, |_, existing| existing.ptr_eq(&shared));
        result
    }

    /// Render a story
    ///
    /// Never fails: errors are reported on the channel and summarized in the
    /// returned outcome.
    pub async fn render(&self, story_id: &str, mode: RenderMode) -> RenderOutcome {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let render = Arc::new(StoryRender::new(story_id, generation, self.channel.clone()));
        let previous = self.current.lock().replace(Arc::clone(&render));
        if let Some(previous) = previous {
            previous.abort();
        }

        tracing::info!(story_id, generation, ?mode, "render requested");
        let outcome = match self.run(&render, mode).await {
            Ok(played) => RenderOutcome::Completed {
                story_id: story_id.to_string(),
                played,
            },
            Err(StoryError::NotFound(e)) => {
                tracing::warn!(story_id, "story not found");
                self.release_missing(&render).await;
                let _ = render.transition(RenderPhase::Empty);
                RenderOutcome::Missing {
                    story_id: e.story_id,
                }
            }
            Err(StoryError::Aborted { .. }) | Err(StoryError::IllegalTransition { .. }) => {
                tracing::debug!(story_id, generation, "render superseded");
                RenderOutcome::Aborted {
                    story_id: story_id.to_string(),
                }
            }
            Err(error) => self.fail(&render, &error),
        };
        tracing::debug!(story_id, generation, outcome = ?outcome, "render finished");
        outcome
    }

    /// Tear down the current render and release the canvas
    ///
    /// Safe to call repeatedly.
    ///
    /// # Errors
    /// [`StoryError::Unmount`] when unmounting fails.
    pub async fn teardown(&self) -> Result<(), StoryError> {
        if let Some(current) = self.current.lock().take() {
            current.abort();
        }
        let _canvas = self.canvas_lock.lock().await;
        let owner = self.owner.lock().take();
        match owner {
            Some(owner) => owner.teardown(self.renderer.as_ref(), &self.canvas).await,
            None => Ok(()),
        }
    }

    fn is_current(&self, render: &StoryRender) -> bool {
        self.generation.load(Ordering::SeqCst) == render.generation()
    }

    fn check_current(&self, render: &StoryRender) -> Result<(), StoryError> {
        if self.is_current(render) && !render.is_aborted() {
            Ok(())
        } else {
            Err(StoryError::Aborted {
                story_id: render.story_id().to_string(),
            })
        }
    }

    async fn run(&self, render: &Arc<StoryRender>, mode: RenderMode) -> Result<bool, StoryError> {
        let story_id = render.story_id();
        render.transition(RenderPhase::Preparing)?;

        let prepared = until_aborted(render, self.prepare(story_id)).await??;
        self.check_current(render)?;

        let args = {
            let store_args = self.store.args();
            store_args.set_initial(story_id, &prepared.initial_args);
            store_args
                .get(story_id)
                .unwrap_or_else(|| prepared.initial_args.clone())
        };
        let mut ctx = prepared.context(
            args,
            self.store.globals().get(),
            self.options.view_mode,
            Some(Arc::clone(&self.canvas)),
            render.signal().clone(),
        );
        let loaded = until_aborted(render, prepared.load(&ctx))
            .await?
            .map_err(|e| StoryError::loader(story_id, e))?;
        ctx.loaded = loaded;
        self.check_current(render)?;
        render.transition(RenderPhase::Prepared)?;

        {
            let _canvas = until_aborted(render, self.canvas_lock.lock()).await?;
            self.release_canvas(render, mode).await?;
            self.check_current(render)?;
            render.transition(RenderPhase::Rendering)?;

            let fallback = self.renderer.default_render();
            let node = prepared
                .render_with_decorators(&ctx, fallback.as_ref())
                .map_err(|e| StoryError::render(story_id, e))?;
            // Owned from the first canvas mutation on, so a mount dropped
            // midway is still unmounted by whoever takes the canvas next.
            render.mark_mounted();
            *self.owner.lock() = Some(Arc::clone(render));
            until_aborted(
                render,
                self.renderer.mount(node, Arc::clone(&self.canvas), &ctx),
            )
            .await?
            .map_err(|e| StoryError::render(story_id, e))?;
        }
        self.check_current(render)?;

        let played = self.play(render, &prepared, &ctx, mode).await?;
        render.transition(RenderPhase::Played)?;
        self.channel
            .emit(events::STORY_RENDERED, vec![json!(story_id)]);
        Ok(played)
    }

    /// Unmount whatever is on the canvas when the requested story is gone
    async fn release_missing(&self, render: &StoryRender) {
        let _canvas = self.canvas_lock.lock().await;
        if !self.is_current(render) {
            return;
        }
        let owner = self.owner.lock().take();
        if let Some(owner) = owner {
            if let Err(error) = owner.teardown(self.renderer.as_ref(), &self.canvas).await {
                tracing::warn!(story_id = %render.story_id(), error = %error, "teardown before missing story failed");
            }
        }
    }

    /// Hand the canvas from its previous owner to `render`
    async fn release_canvas(&self, render: &StoryRender, mode: RenderMode) -> Result<(), StoryError> {
        let owner = self.owner.lock().take();
        let Some(owner) = owner else {
            return Ok(());
        };
        if mode == RenderMode::Rerender && owner.story_id() == render.story_id() {
            owner.retire();
            return Ok(());
        }
        owner
            .teardown(self.renderer.as_ref(), &self.canvas)
            .await
    }

    async fn play(
        &self,
        render: &StoryRender,
        prepared: &PreparedStory,
        ctx: &StoryContext,
        mode: RenderMode,
    ) -> Result<bool, StoryError> {
        let Some(play) = prepared.play() else {
            return Ok(false);
        };
        if !mode.plays() || !self.options.autoplay {
            return Ok(false);
        }

        render.transition(RenderPhase::Playing)?;
        let result = until_aborted(render, play(ctx.clone())).await?;
        self.check_current(render)?;

        if let Err(e) = result {
            let error = StoryError::play(render.story_id(), e);
            self.channel.emit(
                events::PLAY_FUNCTION_THREW_EXCEPTION,
                vec![json!({ "storyId": render.story_id(), "message": error.cause_message() })],
            );
            match self.options.play_error_policy {
                PlayErrorPolicy::Report => {
                    tracing::warn!(story_id = %render.story_id(), error = %error, "play function threw");
                }
                PlayErrorPolicy::Propagate => return Err(error),
            }
        }
        Ok(true)
    }

    fn fail(&self, render: &StoryRender, error: &StoryError) -> RenderOutcome {
        let story_id = render.story_id().to_string();
        let Some(category) = error.category() else {
            return RenderOutcome::Aborted { story_id };
        };
        if render.transition(RenderPhase::Errored).is_err() {
            return RenderOutcome::Aborted { story_id };
        }

        let message = error.cause_message();
        tracing::error!(story_id = %story_id, category = %category, error = %error, "story errored");
        match category {
            ErrorCategory::Render => self.channel.emit(
                events::STORY_THREW_EXCEPTION,
                vec![json!({ "storyId": story_id, "category": category, "message": message })],
            ),
            _ => self.channel.emit(
                events::STORY_ERRORED,
                vec![json!({
                    "storyId": story_id,
                    "category": category,
                    "title": format!("Error in {category}"),
                    "description": message,
                })],
            ),
        }

        RenderOutcome::Errored {
            story_id,
            category,
            message,
        }
    }
}

/// Race a future against the render's abort signal
async fn until_aborted<F: Future>(render: &StoryRender, future: F) -> Result<F::Output, StoryError> {
    tokio::select! {
        biased;
        () = render.signal().aborted() => Err(StoryError::Aborted {
            story_id: render.story_id().to_string(),
        }),
        output = future => Ok(output),
    }
}

impl fmt::Debug for RenderController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderController")
            .field("renderer", &self.renderer.name())
            .field("canvas", &self.canvas.id())
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
