//! One render of one story
//!
//! A [`StoryRender`] tracks the phase of a single run, owns its abort signal
//! and knows whether it mounted anything. Phase changes are published as
//! `storyRenderPhaseChanged` while the phase lock is held, so a run that has
//! been aborted can never publish a phase after `aborted`. Channel listeners
//! must therefore not call back into the render that emitted the event.

use crate::error::{ErrorCategory, StoryError};
use crate::phase::{validate_transition, RenderPhase};
use crate::renderer::Renderer;
use parking_lot::Mutex;
use serde_json::json;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vitrine_channel::{events, Channel};
use vitrine_store::{AbortSignal, Canvas};

/// State of a single story run
pub struct StoryRender {
    story_id: String,
    generation: u64,
    phase: Mutex<RenderPhase>,
    signal: AbortSignal,
    mounted: AtomicBool,
    torn_down: AtomicBool,
    channel: Channel,
}

impl StoryRender {
    /// Create a render in the `Empty` phase
    #[must_use]
    pub fn new(story_id: impl Into<String>, generation: u64, channel: Channel) -> Self {
        Self {
            story_id: story_id.into(),
            generation,
            phase: Mutex::new(RenderPhase::Empty),
            signal: AbortSignal::new(),
            mounted: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            channel,
        }
    }

    /// Story id
    #[inline]
    #[must_use]
    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    /// Generation this render was started with
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> RenderPhase {
        *self.phase.lock()
    }

    /// Abort signal shared with the story context
    #[inline]
    #[must_use]
    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    /// Whether the render was aborted
    #[inline]
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }

    /// Whether something was mounted and not yet unmounted
    #[inline]
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Whether teardown already ran
    #[inline]
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_mounted(&self) {
        self.mounted.store(true, Ordering::SeqCst);
    }

    /// Move to a new phase and publish it
    ///
    /// # Errors
    /// [`StoryError::Aborted`] once the render has been aborted, or
    /// [`StoryError::IllegalTransition`].
    pub fn transition(&self, to: RenderPhase) -> Result<(), StoryError> {
        let mut phase = self.phase.lock();
        if self.signal.is_aborted() || *phase == RenderPhase::Aborted {
            return Err(StoryError::Aborted {
                story_id: self.story_id.clone(),
            });
        }
        validate_transition(*phase, to)?;
        *phase = to;
        tracing::debug!(story_id = %self.story_id, generation = self.generation, phase = %to, "render phase changed");
        self.publish(to);
        Ok(())
    }

    /// Cancel the run
    ///
    /// An unsettled run moves to `Aborted` and publishes it; a settled run
    /// only gets its signal raised.
    pub fn abort(&self) {
        let mut phase = self.phase.lock();
        self.signal.abort();
        if phase.is_settled() {
            return;
        }
        *phase = RenderPhase::Aborted;
        tracing::debug!(story_id = %self.story_id, generation = self.generation, "render aborted");
        self.publish(RenderPhase::Aborted);
    }

    /// Give up the canvas without unmounting (the next render replaces it)
    pub fn retire(&self) {
        self.abort();
        self.torn_down.store(true, Ordering::SeqCst);
        self.mounted.store(false, Ordering::SeqCst);
        *self.phase.lock() = RenderPhase::Empty;
    }

    /// Abort, unmount if mounted, and return to `Empty`
    ///
    /// Idempotent: only the first call unmounts.
    ///
    /// # Errors
    /// [`StoryError::Unmount`] when the renderer fails to unmount; the error is
    /// also reported on the channel.
    pub async fn teardown(
        &self,
        renderer: &dyn Renderer,
        canvas: &Arc<dyn Canvas>,
    ) -> Result<(), StoryError> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.abort();

        let result = if self.mounted.swap(false, Ordering::SeqCst) {
            renderer
                .unmount(Arc::clone(canvas))
                .await
                .map_err(|e| StoryError::unmount(&self.story_id, e))
        } else {
            Ok(())
        };

        *self.phase.lock() = RenderPhase::Empty;
        match &result {
            Ok(()) => tracing::debug!(story_id = %self.story_id, "render torn down"),
            Err(e) => {
                tracing::error!(story_id = %self.story_id, category = %ErrorCategory::Unmount, error = %e, "teardown failed");
                self.channel.emit(
                    events::STORY_ERRORED,
                    vec![json!({
                        "storyId": self.story_id,
                        "category": ErrorCategory::Unmount,
                        "title": "Error while unmounting",
                        "description": e.cause_message(),
                    })],
                );
            }
        }
        result
    }

    fn publish(&self, phase: RenderPhase) {
        self.channel.emit(
            events::STORY_RENDER_PHASE_CHANGED,
            vec![json!({ "storyId": self.story_id, "newPhase": phase })],
        );
    }
}

impl fmt::Debug for StoryRender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryRender")
            .field("story_id", &self.story_id)
            .field("generation", &self.generation)
            .field("phase", &self.phase())
            .field("mounted", &self.is_mounted())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn phases(channel: &Channel) -> Arc<PlMutex<Vec<String>>> {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        channel.on(events::STORY_RENDER_PHASE_CHANGED, move |event| {
            if let Some(phase) = event.str_field("newPhase") {
                sink.lock().push(phase.to_string());
            }
        });
        seen
    }

    #[test]
    fn transitions_are_published() {
        let channel = Channel::local();
        let seen = phases(&channel);
        let render = StoryRender::new("a--b", 1, channel);

        render.transition(RenderPhase::Preparing).unwrap();
        render.transition(RenderPhase::Prepared).unwrap();

        assert_eq!(*seen.lock(), vec!["preparing", "prepared"]);
        assert_eq!(render.phase(), RenderPhase::Prepared);
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let render = StoryRender::new("a--b", 1, Channel::local());
        let err = render.transition(RenderPhase::Played).unwrap_err();
        assert!(matches!(err, StoryError::IllegalTransition { .. }));
        assert_eq!(render.phase(), RenderPhase::Empty);
    }

    #[test]
    fn nothing_is_published_after_abort() {
        let channel = Channel::local();
        let seen = phases(&channel);
        let render = StoryRender::new("a--b", 1, channel);
        render.transition(RenderPhase::Preparing).unwrap();

        render.abort();
        render.abort();
        let err = render.transition(RenderPhase::Prepared).unwrap_err();

        assert!(err.is_aborted());
        assert_eq!(*seen.lock(), vec!["preparing", "aborted"]);
    }

    #[test]
    fn abort_of_settled_render_is_silent() {
        let channel = Channel::local();
        let render = StoryRender::new("a--b", 1, channel.clone());
        let seen = phases(&channel);

        render.abort();

        assert!(render.is_aborted());
        assert!(seen.lock().is_empty());
    }
}
