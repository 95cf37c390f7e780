//! Call interception
//!
//! [`Instrumenter::instrument`] wraps async functions so each invocation made
//! while a story is playing is recorded as a [`Call`]. The instrumenter follows
//! `storyRenderPhaseChanged` on its channel to know which story is playing and
//! to reset the call log when a story starts preparing.
//!
//! Nesting is tracked with a task-local call stack: a call made while another
//! instrumented call is executing in the same task lists the outer ids in
//! `ancestors`. Only top-level calls are interceptable.
//!
//! Debugger controls arrive as `instrumenter/*` events or through the
//! equivalent methods. Replays are requested with `forceRemount`.

use crate::call::{Call, CallException, CallStatus, ControlStates, LogItem, SyncPayload};
use crate::error::InstrumentError;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use vitrine_channel::{events, to_payload, Channel, ChannelEvent, Listener};

tokio::task_local! {
    static CALL_STACK: Vec<String>;
}

/// An instrumentable async function
pub type TargetFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Wrap an async closure as a [`TargetFn`]
pub fn target<F, Fut>(f: F) -> TargetFn
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// Instrumentation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentOptions {
    /// Allow the debugger to pause on these calls
    pub intercept: bool,
}

impl InstrumentOptions {
    /// Options with interception enabled
    #[must_use]
    pub fn intercepting() -> Self {
        Self { intercept: true }
    }
}

/// What to do with a call held on exception
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionAction {
    /// Let the exception propagate
    Continue,
    /// Abort the run and remount the story
    Rerun,
}

struct Paused {
    call_id: String,
    cursor: u64,
    resume: oneshot::Sender<()>,
}

struct HeldException {
    call_id: String,
    action: oneshot::Sender<ExceptionAction>,
}

#[derive(Default)]
struct StoryState {
    calls: IndexMap<String, Call>,
    cursor: u64,
    pause_on_exception: bool,
    debugging: bool,
    play_until: Option<u64>,
    paused: Option<Paused>,
    held: Option<HeldException>,
}

impl StoryState {
    fn should_pause(&self, cursor: u64) -> bool {
        self.debugging && self.play_until.map_or(true, |until| cursor > until)
    }

    fn reset_run(&mut self) {
        self.calls.clear();
        self.cursor = 0;
        self.paused = None;
        self.held = None;
    }

    /// Cursors of interceptable calls that already ran, in order
    fn finished_interceptable(&self) -> Vec<u64> {
        self.calls
            .values()
            .filter(|c| c.interceptable && c.status.is_finished())
            .map(|c| c.cursor)
            .collect()
    }

    fn control_states(&self) -> ControlStates {
        let has_calls = !self.calls.is_empty();
        ControlStates {
            start: has_calls,
            back: self.debugging && !self.finished_interceptable().is_empty(),
            goto: has_calls,
            next: self.paused.is_some(),
            end: self.debugging,
        }
    }

    fn sync_payload(&self, story_id: &str) -> SyncPayload {
        SyncPayload {
            story_id: story_id.to_string(),
            log_items: self.calls.values().filter(|c| !c.is_nested()).map(LogItem::from).collect(),
            paused_at: self
                .paused
                .as_ref()
                .map(|p| p.call_id.clone())
                .or_else(|| self.held.as_ref().map(|h| h.call_id.clone())),
            control_states: self.control_states(),
        }
    }
}

struct Inner {
    channel: Channel,
    states: Mutex<HashMap<String, StoryState>>,
    playing: Mutex<Option<String>>,
}

impl Inner {
    fn publish_call(&self, call: &Call) {
        self.channel
            .emit(events::INSTRUMENTER_CALL, vec![to_payload(call)]);
    }

    fn sync(&self, story_id: &str) {
        let payload = {
            let states = self.states.lock();
            match states.get(story_id) {
                Some(state) => state.sync_payload(story_id),
                None => return,
            }
        };
        self.channel
            .emit(events::INSTRUMENTER_SYNC, vec![to_payload(&payload)]);
    }

    /// Update a call and publish it; calls dropped by a reset are ignored
    fn set_status(
        &self,
        story_id: &str,
        call_id: &str,
        status: CallStatus,
        exception: Option<CallException>,
    ) -> Option<Call> {
        let call = {
            let mut states = self.states.lock();
            let call = states.get_mut(story_id)?.calls.get_mut(call_id)?;
            call.status = status;
            call.exception = exception;
            call.clone()
        };
        self.publish_call(&call);
        Some(call)
    }

    async fn invoke(
        self: Arc<Self>,
        method: String,
        target: TargetFn,
        args: Vec<Value>,
        options: InstrumentOptions,
    ) -> anyhow::Result<Value> {
        let playing = self.playing.lock().clone();
        let Some(story_id) = playing else {
            return target(args).await;
        };
        let ancestors = CALL_STACK.try_with(Clone::clone).unwrap_or_default();
        let interceptable = options.intercept && ancestors.is_empty();

        let (call, pause) = {
            let mut states = self.states.lock();
            let state = states.entry(story_id.clone()).or_default();
            state.cursor += 1;
            let call = Call::new(
                &story_id,
                state.cursor,
                &method,
                args.clone(),
                ancestors.clone(),
                interceptable,
            );
            let pause = (interceptable && state.should_pause(call.cursor)).then(|| {
                let (resume, paused) = oneshot::channel();
                state.paused = Some(Paused {
                    call_id: call.id.clone(),
                    cursor: call.cursor,
                    resume,
                });
                paused
            });
            state.calls.insert(call.id.clone(), call.clone());
            (call, pause)
        };

        if let Some(paused) = pause {
            tracing::debug!(story_id = %story_id, call_id = %call.id, "call paused");
            self.publish_call(&call);
            self.sync(&story_id);
            if paused.await.is_err() {
                return Err(InstrumentError::Interrupted { call_id: call.id }.into());
            }
        }

        self.set_status(&story_id, &call.id, CallStatus::Active, None);
        let mut stack = ancestors;
        stack.push(call.id.clone());
        let result = CALL_STACK.scope(stack, target(args)).await;

        let error = match result {
            Ok(value) => {
                self.set_status(&story_id, &call.id, CallStatus::Done, None);
                self.sync(&story_id);
                return Ok(value);
            }
            Err(error) => error,
        };

        let exception = CallException::from_error(&error);
        tracing::debug!(story_id = %story_id, call_id = %call.id, kind = %exception.kind, "call failed");
        self.set_status(&story_id, &call.id, CallStatus::Error, Some(exception));

        let held = {
            let mut states = self.states.lock();
            states
                .get_mut(&story_id)
                .filter(|state| interceptable && state.pause_on_exception)
                .map(|state| {
                    let (action, held) = oneshot::channel();
                    state.held = Some(HeldException {
                        call_id: call.id.clone(),
                        action,
                    });
                    held
                })
        };
        self.sync(&story_id);

        let Some(held) = held else {
            return Err(error);
        };
        tracing::info!(story_id = %story_id, call_id = %call.id, "holding exception for the manager");
        match held.await {
            Ok(ExceptionAction::Rerun) => {
                self.channel
                    .emit(events::FORCE_REMOUNT, vec![json!({ "storyId": story_id })]);
                Err(InstrumentError::Rerun {
                    story_id,
                    call_id: call.id,
                }
                .into())
            }
            Ok(ExceptionAction::Continue) | Err(_) => Err(error),
        }
    }

    fn on_phase(&self, story_id: &str, phase: &str) {
        match phase {
            "preparing" => {
                self.states
                    .lock()
                    .entry(story_id.to_string())
                    .or_default()
                    .reset_run();
                *self.playing.lock() = None;
            }
            "playing" => *self.playing.lock() = Some(story_id.to_string()),
            "played" | "errored" => {
                self.stop_playing(story_id);
                if let Some(state) = self.states.lock().get_mut(story_id) {
                    state.debugging = false;
                    state.play_until = None;
                }
                self.sync(story_id);
            }
            "aborted" | "empty" => self.stop_playing(story_id),
            _ => {}
        }
    }

    fn stop_playing(&self, story_id: &str) {
        let mut playing = self.playing.lock();
        if playing.as_deref() == Some(story_id) {
            *playing = None;
        }
    }

    /// Enter debugging mode and replay until `play_until` (a cursor)
    ///
    /// A paused call stays parked until the replay starts preparing, so the
    /// run it belongs to is aborted rather than resumed.
    fn start_at(&self, story_id: &str, play_until: u64) {
        {
            let mut states = self.states.lock();
            let state = states.entry(story_id.to_string()).or_default();
            state.debugging = true;
            state.play_until = Some(play_until);
        }
        tracing::info!(story_id, play_until, "debugger replay requested");
        self.channel.emit(
            events::FORCE_REMOUNT,
            vec![json!({ "storyId": story_id, "isDebugging": true })],
        );
        self.sync(story_id);
    }
}

/// Play function call interceptor bound to a channel
pub struct Instrumenter {
    inner: Arc<Inner>,
    listeners: Vec<(&'static str, Listener)>,
}

impl Instrumenter {
    /// Create an instrumenter and subscribe it to `channel`
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        let inner = Arc::new(Inner {
            channel: channel.clone(),
            states: Mutex::new(HashMap::new()),
            playing: Mutex::new(None),
        });
        let weak = Arc::downgrade(&inner);
        let listeners = vec![
            subscribe(&channel, &weak, events::STORY_RENDER_PHASE_CHANGED, |inner, story_id, event| {
                if let Some(phase) = event.str_field("newPhase") {
                    inner.on_phase(story_id, phase);
                }
            }),
            subscribe(&channel, &weak, events::INSTRUMENTER_PAUSE_ON_EXCEPTION, |inner, story_id, event| {
                let enabled = event
                    .first_arg()
                    .and_then(|a| a.get("enabled"))
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                Instrumenter::set_pause_on_exception_inner(inner, story_id, enabled);
            }),
            subscribe(&channel, &weak, events::INSTRUMENTER_CONTINUE, |inner, story_id, _| {
                Instrumenter::resolve_exception_inner(inner, story_id, ExceptionAction::Continue);
            }),
            subscribe(&channel, &weak, events::INSTRUMENTER_RERUN, |inner, story_id, _| {
                Instrumenter::resolve_exception_inner(inner, story_id, ExceptionAction::Rerun);
            }),
            subscribe(&channel, &weak, events::INSTRUMENTER_START, |inner, story_id, event| {
                let play_until = event.str_field("playUntil");
                Instrumenter::start_inner(inner, story_id, play_until);
            }),
            subscribe(&channel, &weak, events::INSTRUMENTER_NEXT, |inner, story_id, _| {
                Instrumenter::next_inner(inner, story_id);
            }),
            subscribe(&channel, &weak, events::INSTRUMENTER_END, |inner, story_id, _| {
                Instrumenter::end_inner(inner, story_id);
            }),
            subscribe(&channel, &weak, events::INSTRUMENTER_BACK, |inner, story_id, _| {
                Instrumenter::back_inner(inner, story_id);
            }),
            subscribe(&channel, &weak, events::INSTRUMENTER_GOTO, |inner, story_id, event| {
                if let Some(call_id) = event.str_field("callId") {
                    Instrumenter::goto_inner(inner, story_id, call_id);
                }
            }),
        ];
        Self { inner, listeners }
    }

    /// Wrap `targets`
    ///
    /// Calls made while no story is playing run unrecorded.
    #[must_use]
    pub fn instrument<I, S>(&self, targets: I, options: InstrumentOptions) -> Instrumented
    where
        I: IntoIterator<Item = (S, TargetFn)>,
        S: Into<String>,
    {
        let methods = targets
            .into_iter()
            .map(|(name, target)| {
                let name = name.into();
                let inner = Arc::clone(&self.inner);
                let method = name.clone();
                let wrapped: TargetFn = Arc::new(move |args| {
                    Arc::clone(&inner)
                        .invoke(method.clone(), Arc::clone(&target), args, options)
                        .boxed()
                });
                (name, wrapped)
            })
            .collect();
        Instrumented {
            methods: Arc::new(methods),
        }
    }

    /// Calls recorded for the story's current run
    #[must_use]
    pub fn calls(&self, story_id: &str) -> Vec<Call> {
        self.inner
            .states
            .lock()
            .get(story_id)
            .map(|s| s.calls.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Call the story is paused or held at
    #[must_use]
    pub fn paused_at(&self, story_id: &str) -> Option<String> {
        self.inner
            .states
            .lock()
            .get(story_id)
            .and_then(|s| s.sync_payload(story_id).paused_at)
    }

    /// Whether the story is in debugging mode
    #[must_use]
    pub fn is_debugging(&self, story_id: &str) -> bool {
        self.inner
            .states
            .lock()
            .get(story_id)
            .is_some_and(|s| s.debugging)
    }

    /// Story currently playing
    #[must_use]
    pub fn playing(&self) -> Option<String> {
        self.inner.playing.lock().clone()
    }

    /// Enable or disable pause on exception for a story
    pub fn set_pause_on_exception(&self, story_id: &str, enabled: bool) {
        Self::set_pause_on_exception_inner(&self.inner, story_id, enabled);
    }

    /// Release a call held on exception
    pub fn resolve_exception(&self, story_id: &str, action: ExceptionAction) {
        Self::resolve_exception_inner(&self.inner, story_id, action);
    }

    /// Replay the story in debugging mode, pausing after `play_until`
    pub fn start(&self, story_id: &str, play_until: Option<&str>) {
        Self::start_inner(&self.inner, story_id, play_until);
    }

    /// Run the paused call
    pub fn next(&self, story_id: &str) {
        Self::next_inner(&self.inner, story_id);
    }

    /// Leave debugging mode and run to completion
    pub fn end(&self, story_id: &str) {
        Self::end_inner(&self.inner, story_id);
    }

    /// Replay up to the call before the last finished one
    pub fn back(&self, story_id: &str) {
        Self::back_inner(&self.inner, story_id);
    }

    /// Jump to a call, replaying when it already ran
    pub fn goto(&self, story_id: &str, call_id: &str) {
        Self::goto_inner(&self.inner, story_id, call_id);
    }

    fn set_pause_on_exception_inner(inner: &Inner, story_id: &str, enabled: bool) {
        inner
            .states
            .lock()
            .entry(story_id.to_string())
            .or_default()
            .pause_on_exception = enabled;
        tracing::debug!(story_id, enabled, "pause on exception");
    }

    fn resolve_exception_inner(inner: &Inner, story_id: &str, action: ExceptionAction) {
        let held = inner
            .states
            .lock()
            .get_mut(story_id)
            .and_then(|s| s.held.take());
        match held {
            Some(held) => {
                let _ = held.action.send(action);
                inner.sync(story_id);
            }
            None => tracing::debug!(story_id, ?action, "no exception held"),
        }
    }

    fn start_inner(inner: &Inner, story_id: &str, play_until: Option<&str>) {
        let until = {
            let states = inner.states.lock();
            play_until
                .and_then(|id| states.get(story_id)?.calls.get(id).map(|c| c.cursor))
                .unwrap_or(0)
        };
        inner.start_at(story_id, until);
    }

    fn next_inner(inner: &Inner, story_id: &str) {
        let paused = inner
            .states
            .lock()
            .get_mut(story_id)
            .and_then(|s| s.paused.take());
        if let Some(paused) = paused {
            tracing::debug!(story_id, call_id = %paused.call_id, "stepping");
            let _ = paused.resume.send(());
        }
    }

    fn end_inner(inner: &Inner, story_id: &str) {
        let paused = {
            let mut states = inner.states.lock();
            let Some(state) = states.get_mut(story_id) else {
                return;
            };
            state.debugging = false;
            state.play_until = None;
            state.paused.take()
        };
        if let Some(paused) = paused {
            let _ = paused.resume.send(());
        }
        inner.sync(story_id);
    }

    fn back_inner(inner: &Inner, story_id: &str) {
        let target = {
            let states = inner.states.lock();
            let Some(state) = states.get(story_id) else {
                return;
            };
            let mut finished = state.finished_interceptable();
            finished.pop();
            finished.last().copied().unwrap_or(0)
        };
        inner.start_at(story_id, target);
    }

    fn goto_inner(inner: &Inner, story_id: &str, call_id: &str) {
        let (target, resume) = {
            let mut states = inner.states.lock();
            let Some(state) = states.get_mut(story_id) else {
                return;
            };
            let Some(target) = state.calls.get(call_id).map(|c| c.cursor) else {
                tracing::debug!(story_id, call_id, "goto unknown call");
                return;
            };
            let ahead = state.debugging
                && state.paused.as_ref().is_some_and(|p| target >= p.cursor);
            if ahead {
                state.play_until = Some(target);
                (target, state.paused.take())
            } else {
                (target, None)
            }
        };
        match resume {
            Some(paused) => {
                let _ = paused.resume.send(());
            }
            None => inner.start_at(story_id, target),
        }
    }
}

fn subscribe<F>(
    channel: &Channel,
    weak: &Weak<Inner>,
    event_type: &'static str,
    handler: F,
) -> (&'static str, Listener)
where
    F: Fn(&Inner, &str, &ChannelEvent) + Send + Sync + 'static,
{
    let weak = weak.clone();
    let listener = channel.on(event_type, move |event| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        match event.str_field("storyId") {
            Some(story_id) => handler(&inner, story_id, event),
            None => tracing::warn!(event_type, "instrumenter event without storyId"),
        }
    });
    (event_type, listener)
}

impl Drop for Instrumenter {
    fn drop(&mut self) {
        for (event_type, listener) in &self.listeners {
            self.inner.channel.off(event_type, listener);
        }
    }
}

impl fmt::Debug for Instrumenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrumenter")
            .field("playing", &self.playing())
            .field("stories", &self.inner.states.lock().len())
            .finish()
    }
}

/// Instrumented functions by method name
#[derive(Clone)]
pub struct Instrumented {
    methods: Arc<IndexMap<String, TargetFn>>,
}

impl Instrumented {
    /// Wrapped function for a method
    #[must_use]
    pub fn get(&self, method: &str) -> Option<&TargetFn> {
        self.methods.get(method)
    }

    /// Invoke a method
    ///
    /// # Errors
    /// [`InstrumentError::UnknownMethod`], or whatever the call fails with.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        let f = self
            .methods
            .get(method)
            .ok_or_else(|| InstrumentError::UnknownMethod(method.to_string()))?;
        f(args).await
    }

    /// Method names in registration order
    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

impl fmt::Debug for Instrumented {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.methods.keys()).finish()
    }
}
