//! Preview answering channel commands

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vitrine_channel::{events, Channel};
use vitrine_preview::{BuildMode, Preview, PreviewError, PreviewOptions, SelectionOutcome};
use vitrine_render::{MemoryCanvas, RenderOutcome};
use vitrine_store::prelude::*;
use vitrine_test_utils::{
    button_module, label_button, last_payload, module_with, EventRecorder, RecordingRenderer,
    ALL_PREVIEW_EVENTS,
};

const FORM: &str = "form--submit";

struct Fixture {
    preview: Preview,
    channel: Channel,
    canvas: Arc<MemoryCanvas>,
    renderer: Arc<RecordingRenderer>,
    recorder: EventRecorder,
    plays: Arc<AtomicUsize>,
}

fn fixture(options: PreviewOptions) -> Fixture {
    fixture_with(options, ProjectAnnotations::new(), RecordingRenderer::new())
}

fn fixture_with(options: PreviewOptions, project: ProjectAnnotations, renderer: RecordingRenderer) -> Fixture {
    let channel = Channel::new("preview");
    let recorder = EventRecorder::attach(&channel, ALL_PREVIEW_EVENTS);
    let canvas = Arc::new(MemoryCanvas::new("storybook-root"));
    let renderer = Arc::new(renderer);
    let preview = Preview::new(options, project, renderer.clone(), canvas.clone(), channel.clone()).unwrap();
    let plays = Arc::new(AtomicUsize::new(0));
    preview
        .initialize([button_module(), docs_module(), form_module(&plays)])
        .unwrap();
    recorder.clear();
    Fixture {
        preview,
        channel,
        canvas,
        renderer,
        recorder,
        plays,
    }
}

fn docs_module() -> ModuleExports {
    ModuleExports::new(
        MetaAnnotations::titled("Docs/Button")
            .with_tags(["autodocs"])
            .with_args(json!({ "label": "Docs" }))
            .with_render(label_button()),
    )
    .story("Primary", StoryAnnotations::new())
}

fn form_module(plays: &Arc<AtomicUsize>) -> ModuleExports {
    let plays = Arc::clone(plays);
    module_with(
        "Form",
        "Submit",
        StoryAnnotations::new()
            .with_args(json!({ "label": "Send" }))
            .with_render(label_button())
            .with_play(play_fn(move |_ctx| {
                let plays = Arc::clone(&plays);
                async move {
                    plays.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })),
    )
}

fn select(channel: &Channel, story_id: &str) {
    channel.emit(
        events::SET_CURRENT_STORY,
        vec![json!({ "storyId": story_id, "viewMode": "story" })],
    );
}

#[tokio::test]
async fn initialize_publishes_globals_before_the_index() {
    let channel = Channel::new("preview");
    let recorder = EventRecorder::attach(&channel, ALL_PREVIEW_EVENTS);
    let preview = Preview::new(
        PreviewOptions::default(),
        ProjectAnnotations::new().with_initial_globals(json!({ "theme": "light" })),
        Arc::new(RecordingRenderer::new()),
        Arc::new(MemoryCanvas::new("root")),
        channel,
    )
    .unwrap();

    let index = preview.initialize([button_module(), docs_module()]).unwrap();

    assert_eq!(recorder.types(), vec![events::SET_GLOBALS, events::SET_INDEX]);
    assert_eq!(
        last_payload(&recorder, events::SET_GLOBALS).unwrap()["globals"],
        json!({ "theme": "light" })
    );
    assert_eq!(index.len(), 4);
    assert!(index.get("docs-button--docs").unwrap().is_docs());
    assert_eq!(
        last_payload(&recorder, events::SET_INDEX).unwrap()["entries"]
            .as_object()
            .map(|entries| entries.len()),
        Some(4)
    );
}

#[tokio::test]
async fn initialize_stops_at_the_first_bad_module() {
    let f = fixture(PreviewOptions::default());
    let untitled = ModuleExports::new(MetaAnnotations::default()).story("Lost", StoryAnnotations::new());

    let err = f.preview.initialize([untitled]).unwrap_err();

    assert!(matches!(err, PreviewError::Configuration(_)));
    assert!(err.is_fatal());
    assert!(f.recorder.events().is_empty());
}

#[tokio::test]
async fn set_current_story_prepares_then_renders() {
    let f = fixture(PreviewOptions::default());

    select(&f.channel, "example-button--primary");
    f.preview.idle().await;

    assert_eq!(f.canvas.html(), "<button>Button</button>");
    let types = f.recorder.types();
    assert_eq!(types.first().map(String::as_str), Some(events::CURRENT_STORY_WAS_SET));
    assert_eq!(types.get(1).map(String::as_str), Some(events::STORY_PREPARED));
    assert_eq!(types.last().map(String::as_str), Some(events::STORY_RENDERED));

    let prepared = last_payload(&f.recorder, events::STORY_PREPARED).unwrap();
    assert_eq!(prepared["id"], json!("example-button--primary"));
    assert_eq!(prepared["args"], json!({ "label": "Button", "primary": true }));
    assert_eq!(
        f.recorder.phases("example-button--primary"),
        vec!["preparing", "prepared", "rendering", "played"]
    );
    assert_eq!(f.preview.selection().unwrap().id, "example-button--primary");
}

#[tokio::test]
async fn args_updates_rerender_without_replaying_play() {
    let f = fixture(PreviewOptions::default());
    let outcome = f.preview.select_story(FORM, ViewMode::Story).await;
    assert!(outcome.is_shown());
    assert_eq!(f.plays.load(Ordering::SeqCst), 1);

    f.channel.emit(
        events::UPDATE_STORY_ARGS,
        vec![json!({ "storyId": FORM, "updatedArgs": { "label": "Go", "extra": 1 } })],
    );
    f.preview.idle().await;

    assert_eq!(f.canvas.html(), "<button>Go</button>");
    assert_eq!(f.plays.load(Ordering::SeqCst), 1);
    assert_eq!(
        last_payload(&f.recorder, events::STORY_ARGS_UPDATED),
        Some(json!({ "storyId": FORM, "args": { "label": "Go", "extra": 1 } }))
    );

    f.channel.emit(
        events::RESET_STORY_ARGS,
        vec![json!({ "storyId": FORM, "argNames": ["label"] })],
    );
    f.preview.idle().await;

    assert_eq!(f.canvas.html(), "<button>Send</button>");
    assert_eq!(
        last_payload(&f.recorder, events::STORY_ARGS_UPDATED),
        Some(json!({ "storyId": FORM, "args": { "label": "Send", "extra": 1 } }))
    );
    assert_eq!(f.renderer.unmount_count(), 0);
}

#[tokio::test]
async fn args_of_a_hidden_story_do_not_render() {
    let f = fixture(PreviewOptions::default());
    f.preview.select_story(FORM, ViewMode::Story).await;
    let mounts = f.renderer.mount_count();

    let outcome = f
        .preview
        .update_args("example-button--primary", &object(json!({ "label": "Elsewhere" })))
        .await;

    assert_eq!(outcome, None);
    assert_eq!(f.renderer.mount_count(), mounts);
    assert_eq!(
        f.preview.store().args().get("example-button--primary").unwrap()["label"],
        json!("Elsewhere")
    );
}

#[tokio::test]
async fn reset_of_an_unknown_story_is_an_error() {
    let f = fixture(PreviewOptions::default());
    let err = f.preview.reset_args("nope--nope", None).await.unwrap_err();
    assert_eq!(err.story_id, "nope--nope");
}

#[tokio::test]
async fn globals_updates_rerender_the_selection() {
    let project = ProjectAnnotations::new().with_initial_globals(json!({ "theme": "light" }));
    let f = fixture_with(PreviewOptions::default(), project, RecordingRenderer::new());
    f.preview
        .store()
        .add(module_with(
            "Themed",
            "Box",
            StoryAnnotations::new().with_render(render_fn(|ctx| {
                let theme = ctx.global("theme").and_then(|t| t.as_str()).unwrap_or("none");
                Ok(Node::element("div").with_text(theme))
            })),
        ))
        .unwrap();
    f.preview.select_story("themed--box", ViewMode::Story).await;
    assert_eq!(f.canvas.html(), "<div>light</div>");

    f.channel
        .emit(events::UPDATE_GLOBALS, vec![json!({ "globals": { "theme": "dark" } })]);
    f.preview.idle().await;

    assert_eq!(f.canvas.html(), "<div>dark</div>");
    assert_eq!(
        last_payload(&f.recorder, events::GLOBALS_UPDATED),
        Some(json!({ "globals": { "theme": "dark" } }))
    );
}

#[tokio::test]
async fn unknown_stories_are_reported_missing() {
    let f = fixture(PreviewOptions::default());
    f.preview.select_story("example-button--primary", ViewMode::Story).await;

    let outcome = f.preview.select_story("nope--nope", ViewMode::Story).await;

    assert_eq!(
        outcome,
        SelectionOutcome::Story(RenderOutcome::Missing {
            story_id: "nope--nope".into()
        })
    );
    assert_eq!(last_payload(&f.recorder, events::STORY_MISSING), Some(json!("nope--nope")));
    assert!(f.recorder.of_type(events::STORY_PREPARED).len() == 1);
    assert_eq!(f.canvas.html(), "");
    assert_eq!(f.renderer.unmount_count(), 1);
}

#[tokio::test]
async fn docs_entries_mount_a_docs_page() {
    let f = fixture(PreviewOptions::default());
    f.preview.select_story("example-button--primary", ViewMode::Story).await;

    let outcome = f.preview.select_story("docs-button--docs", ViewMode::Story).await;

    assert_eq!(
        outcome,
        SelectionOutcome::Docs {
            docs_id: "docs-button--docs".into(),
            stories: vec!["docs-button--primary".into()],
        }
    );
    let html = f.canvas.html();
    assert!(html.contains("data-docs-id=\"docs-button--docs\""));
    assert!(html.contains("<button>Docs</button>"));
    assert_eq!(f.renderer.unmount_count(), 1);
    assert_eq!(
        last_payload(&f.recorder, events::CURRENT_STORY_WAS_SET),
        Some(json!({ "storyId": "docs-button--docs", "viewMode": "docs" }))
    );
    assert_eq!(last_payload(&f.recorder, events::DOCS_RENDERED), Some(json!("docs-button--docs")));

    f.preview.select_story("example-button--primary", ViewMode::Story).await;
    assert_eq!(f.canvas.html(), "<button>Button</button>");
}

#[tokio::test]
async fn force_rerender_keeps_play_and_remount_replays_it() {
    let f = fixture(PreviewOptions::default());
    f.preview.select_story(FORM, ViewMode::Story).await;

    f.channel.emit(events::FORCE_RE_RENDER, Vec::new());
    f.preview.idle().await;
    assert_eq!(f.plays.load(Ordering::SeqCst), 1);
    assert_eq!(f.renderer.mount_count(), 2);

    f.channel
        .emit(events::FORCE_REMOUNT, vec![json!({ "storyId": "example-button--primary" })]);
    f.preview.idle().await;
    assert_eq!(f.renderer.mount_count(), 2);

    f.channel
        .emit(events::FORCE_REMOUNT, vec![json!({ "storyId": FORM })]);
    f.preview.idle().await;
    assert_eq!(f.plays.load(Ordering::SeqCst), 2);
    assert_eq!(f.renderer.unmount_count(), 1);
}

#[tokio::test]
async fn latest_selection_wins() {
    let renderer = RecordingRenderer::new().with_mount_delay(FORM, Duration::from_millis(50));
    let f = fixture_with(PreviewOptions::default(), ProjectAnnotations::new(), renderer);

    select(&f.channel, FORM);
    select(&f.channel, "example-button--secondary");
    f.preview.idle().await;

    assert_eq!(f.canvas.html(), "<button>Second</button>");
    assert_eq!(f.renderer.mounted_ids(), vec!["example-button--secondary"]);
    assert_eq!(f.plays.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn module_updates_reset_changed_initial_args_and_remount() {
    let f = fixture(PreviewOptions::default());
    f.preview.select_story("example-button--primary", ViewMode::Story).await;
    f.preview
        .update_args("example-button--primary", &object(json!({ "label": "Edited" })))
        .await;
    f.recorder.clear();

    let mut edited = button_module();
    edited.default = edited.default.with_args(json!({ "label": "Click" }));
    let added = f.preview.update_module(edited).await.unwrap();

    assert!(added.replaced);
    assert!(added.removed.is_empty());
    assert_eq!(f.canvas.html(), "<button>Click</button>");
    assert_eq!(
        f.recorder.of_type(events::STORY_ARGS_UPDATED)[0].first_arg().cloned(),
        Some(json!({ "storyId": "example-button--primary", "args": { "label": "Click", "primary": true } }))
    );
    let types = f.recorder.types();
    let position = |event: &str| types.iter().position(|t| t == event).unwrap();
    assert!(position(events::STORY_INDEX_INVALIDATED) < position(events::SET_INDEX));
    assert!(position(events::SET_INDEX) < position(events::STORY_CHANGED));
    assert_eq!(
        last_payload(&f.recorder, events::STORY_CHANGED),
        Some(json!("example-button--primary"))
    );
    assert_eq!(f.renderer.unmount_count(), 1);
}

#[tokio::test]
async fn module_updates_report_a_removed_current_story() {
    let f = fixture(PreviewOptions::default());
    f.preview.select_story("example-button--secondary", ViewMode::Story).await;

    let trimmed = ModuleExports::new(
        MetaAnnotations::titled("Example/Button")
            .with_args(json!({ "label": "Button" }))
            .with_render(label_button()),
    )
    .with_import_path("./src/button.stories.rs")
    .story("Primary", StoryAnnotations::new());
    let added = f.preview.update_module(trimmed).await.unwrap();

    assert_eq!(added.removed, vec!["example-button--secondary".to_string()]);
    assert_eq!(
        last_payload(&f.recorder, events::STORY_MISSING),
        Some(json!("example-button--secondary"))
    );
    assert!(f.preview.store().story_index().get("example-button--secondary").is_none());
    assert_eq!(f.canvas.html(), "");
    assert_eq!(f.renderer.unmount_count(), 1);
}

#[tokio::test]
async fn project_updates_republish_globals_and_remount() {
    let f = fixture(PreviewOptions::default());
    f.preview.select_story(FORM, ViewMode::Story).await;

    let outcome = f
        .preview
        .update_project(ProjectAnnotations::new().with_initial_globals(json!({ "locale": "fr" })))
        .await
        .unwrap();

    assert!(outcome.unwrap().is_shown());
    assert_eq!(f.plays.load(Ordering::SeqCst), 2);
    assert_eq!(
        last_payload(&f.recorder, events::SET_GLOBALS).unwrap()["globals"],
        json!({ "locale": "fr" })
    );
}

#[tokio::test]
async fn production_builds_refuse_updates() {
    let f = fixture(PreviewOptions::default().with_build_mode(BuildMode::Production));

    let err = f.preview.update_module(button_module()).await.unwrap_err();
    assert!(matches!(err, PreviewError::HotReloadDisabled));
    assert!(!err.is_fatal());
    assert!(matches!(
        f.preview.update_project(ProjectAnnotations::new()).await,
        Err(PreviewError::HotReloadDisabled)
    ));
    assert!(f.recorder.events().is_empty());
}

#[tokio::test]
async fn teardown_clears_the_canvas() {
    let f = fixture(PreviewOptions::default());
    f.preview.select_story(FORM, ViewMode::Story).await;

    f.preview.teardown().await.unwrap();

    assert!(f.canvas.is_empty());
    assert_eq!(f.preview.selection(), None);
    assert_eq!(f.preview.rerender().await, None);
}
