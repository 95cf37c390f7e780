//! Event names shared by the preview and manager contexts
//!
//! Both sides of the channel must agree on these constants; payload shapes are
//! documented next to each name.

// Index and bootstrap

/// Preview → manager: `{ v, entries }` index document
pub const SET_INDEX: &str = "setIndex";
/// Preview → manager: the index changed and should be refetched
pub const STORY_INDEX_INVALIDATED: &str = "storyIndexInvalidated";
/// Preview → manager: `{ globals, globalTypes }`
pub const SET_GLOBALS: &str = "setGlobals";

// Navigation

/// Manager → preview: `{ storyId, viewMode }`
pub const SET_CURRENT_STORY: &str = "setCurrentStory";
/// Preview → manager: `{ storyId, viewMode }`
pub const CURRENT_STORY_WAS_SET: &str = "currentStoryWasSet";
/// Preview → manager: `storyId` no longer matches the rendered story
pub const STORY_CHANGED: &str = "storyChanged";
/// Preview → manager: `storyId` is unknown
pub const STORY_MISSING: &str = "storyMissing";

// Lifecycle

/// Preview → manager: `{ id, args, argTypes, initialArgs, parameters }`
pub const STORY_PREPARED: &str = "storyPrepared";
/// Preview → manager: `storyId`
pub const STORY_RENDERED: &str = "storyRendered";
/// Preview → manager: `{ storyId, newPhase }`
pub const STORY_RENDER_PHASE_CHANGED: &str = "storyRenderPhaseChanged";
/// Preview → manager: `{ storyId, category, title, description }`
pub const STORY_ERRORED: &str = "storyErrored";
/// Preview → manager: `{ storyId, category, message }`
pub const STORY_THREW_EXCEPTION: &str = "storyThrewException";
/// Preview → manager: `{ storyId, message }`
pub const PLAY_FUNCTION_THREW_EXCEPTION: &str = "playFunctionThrewException";
/// Preview → manager: `{ storyId }`, render finished but nothing changed
pub const STORY_UNCHANGED: &str = "storyUnchanged";
/// Preview → manager: docs entry id, page mounted
pub const DOCS_RENDERED: &str = "docsRendered";

// Args and globals

/// Manager → preview: `{ storyId, updatedArgs }`
pub const UPDATE_STORY_ARGS: &str = "updateStoryArgs";
/// Preview → manager: `{ storyId, args }`
pub const STORY_ARGS_UPDATED: &str = "storyArgsUpdated";
/// Manager → preview: `{ storyId, argNames? }`
pub const RESET_STORY_ARGS: &str = "resetStoryArgs";
/// Manager → preview: `{ globals }`
pub const UPDATE_GLOBALS: &str = "updateGlobals";
/// Preview → manager: `{ globals }`
pub const GLOBALS_UPDATED: &str = "globalsUpdated";

// Re-rendering

/// Manager → preview: re-render the current story with current args
pub const FORCE_RE_RENDER: &str = "forceReRender";
/// Manager/instrumenter → preview: `{ storyId }`, tear down and replay
pub const FORCE_REMOUNT: &str = "forceRemount";

// Instrumenter

/// Preview → manager: a `Call` record after each status transition
pub const INSTRUMENTER_CALL: &str = "instrumenter/call";
/// Preview → manager: `{ storyId, logItems, pausedAt, controlStates }`
pub const INSTRUMENTER_SYNC: &str = "instrumenter/sync";
/// Manager → preview: `{ storyId, playUntil? }`, replay in debug mode
pub const INSTRUMENTER_START: &str = "instrumenter/start";
/// Manager → preview: `{ storyId }`, step back one call
pub const INSTRUMENTER_BACK: &str = "instrumenter/back";
/// Manager → preview: `{ storyId, callId }`, replay up to a call
pub const INSTRUMENTER_GOTO: &str = "instrumenter/goto";
/// Manager → preview: `{ storyId }`, execute the paused call
pub const INSTRUMENTER_NEXT: &str = "instrumenter/next";
/// Manager → preview: `{ storyId }`, run to completion
pub const INSTRUMENTER_END: &str = "instrumenter/end";
/// Manager → preview: `{ storyId, enabled }`
pub const INSTRUMENTER_PAUSE_ON_EXCEPTION: &str = "instrumenter/pause-on-exception";
/// Manager → preview: `{ storyId }`, propagate a held exception
pub const INSTRUMENTER_CONTINUE: &str = "instrumenter/continue";
/// Manager → preview: `{ storyId }`, discard a held exception and replay
pub const INSTRUMENTER_RERUN: &str = "instrumenter/rerun";
