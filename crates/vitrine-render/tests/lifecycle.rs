//! Render lifecycle scenarios driven through the controller

use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vitrine_channel::events;
use vitrine_render::prelude::*;
use vitrine_render::CanvasMutation;
use vitrine_store::prelude::*;
use vitrine_test_utils::{button_module, last_payload, module_with, store_with, Harness, RecordingRenderer};

fn layer(name: &'static str) -> vitrine_store::DecoratorFn {
    decorator(move |story, ctx| Ok(Node::element("div").with_attr("data-layer", name).with_child(story(ctx)?)))
}

fn counting_play(counter: &Arc<AtomicUsize>) -> vitrine_store::PlayFn {
    let counter = Arc::clone(counter);
    play_fn(move |_ctx| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

fn failing_play() -> vitrine_store::PlayFn {
    play_fn(|_ctx| async { anyhow::bail!("expected 1 to be 2") })
}

#[tokio::test]
async fn navigate_renders_button_with_merged_args() {
    let h = Harness::new(store_with([button_module()]));

    let outcome = h.controller.render("example-button--secondary", RenderMode::Navigate).await;

    assert!(outcome.is_completed());
    assert_eq!(h.canvas.html(), "<button>Second</button>");
    assert_eq!(
        h.recorder.phases("example-button--secondary"),
        vec!["preparing", "prepared", "rendering", "played"]
    );
    assert_eq!(
        last_payload(&h.recorder, events::STORY_RENDERED),
        Some(json!("example-button--secondary"))
    );
}

#[tokio::test]
async fn decorators_wrap_project_outermost() {
    let store = StoryStore::new(ProjectAnnotations::new().with_decorator(layer("P")));
    store
        .add(
            ModuleExports::new(MetaAnnotations::titled("Layers").with_decorator(layer("M"))).story(
                "Story",
                StoryAnnotations::new()
                    .with_decorator(layer("S"))
                    .with_render(render_fn(|_| Ok(Node::element("span")))),
            ),
        )
        .unwrap();
    let h = Harness::new(Arc::new(store));

    h.controller.render("layers--story", RenderMode::Navigate).await;

    assert_eq!(
        h.canvas.html(),
        "<div data-layer=\"P\"><div data-layer=\"M\"><div data-layer=\"S\"><span></span></div></div></div>"
    );
}

#[tokio::test(start_paused = true)]
async fn superseded_render_never_reaches_the_canvas() {
    let store = store_with([button_module()]);
    let renderer = RecordingRenderer::new().with_mount_delay("example-button--primary", Duration::from_millis(50));
    let h = Harness::with_renderer(store, renderer);

    let (a, b) = tokio::join!(
        h.controller.render("example-button--primary", RenderMode::Navigate),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.controller.render("example-button--secondary", RenderMode::Navigate).await
        }
    );

    assert_eq!(a, RenderOutcome::Aborted { story_id: "example-button--primary".into() });
    assert!(b.is_completed());
    assert_eq!(h.canvas.html(), "<button>Second</button>");
    assert_eq!(h.renderer.mounted_ids(), vec!["example-button--secondary"]);
    assert_eq!(
        h.recorder.phases("example-button--primary"),
        vec!["preparing", "prepared", "rendering", "aborted"]
    );
}

#[tokio::test]
async fn navigating_tears_down_previous_story_first() {
    let h = Harness::new(store_with([button_module()]));

    h.controller.render("example-button--primary", RenderMode::Navigate).await;
    h.controller.render("example-button--secondary", RenderMode::Navigate).await;

    let kinds: Vec<&str> = h
        .canvas
        .mutations()
        .iter()
        .map(|m| match m {
            CanvasMutation::Replaced(_) => "replace",
            CanvasMutation::Cleared => "clear",
        })
        .collect();
    assert_eq!(kinds, vec!["replace", "clear", "replace"]);
    assert_eq!(h.renderer.unmount_count(), 1);
}

#[tokio::test]
async fn teardown_twice_unmounts_once() {
    let h = Harness::new(store_with([button_module()]));
    h.controller.render("example-button--primary", RenderMode::Navigate).await;

    h.controller.teardown().await.unwrap();
    h.controller.teardown().await.unwrap();

    assert_eq!(h.renderer.unmount_count(), 1);
    assert!(h.canvas.is_empty());
}

#[tokio::test]
async fn failing_unmount_is_reported() {
    let h = Harness::new(store_with([button_module()]));
    h.controller.render("example-button--primary", RenderMode::Navigate).await;
    h.renderer.fail_unmount(true);

    let err = h.controller.teardown().await.unwrap_err();

    assert_eq!(err.category(), Some(ErrorCategory::Unmount));
    let payload = last_payload(&h.recorder, events::STORY_ERRORED).unwrap();
    assert_eq!(payload["category"], json!("unmount"));
}

#[tokio::test]
async fn loader_failure_errors_without_mounting() {
    let story = StoryAnnotations::new()
        .with_loader(loader(|_| async { anyhow::bail!("network down") }))
        .with_render(render_fn(|_| Ok(Node::element("p"))));
    let h = Harness::new(store_with([module_with("Loading", "Fails", story)]));

    let outcome = h.controller.render("loading--fails", RenderMode::Navigate).await;

    assert_eq!(
        outcome,
        RenderOutcome::Errored {
            story_id: "loading--fails".into(),
            category: ErrorCategory::Loader,
            message: "network down".into(),
        }
    );
    assert_eq!(h.canvas.mutation_count(), 0);
    let payload = last_payload(&h.recorder, events::STORY_ERRORED).unwrap();
    assert_eq!(payload["category"], json!("loader"));
    assert_eq!(payload["description"], json!("network down"));
}

#[tokio::test]
async fn loaded_values_reach_render() {
    let story = StoryAnnotations::new()
        .with_loader(loader(|_| async { Ok(object(json!({ "user": "ada" }))) }))
        .with_render(render_fn(|ctx| {
            let user = ctx.loaded.get("user").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(Node::element("p").with_text(user))
        }));
    let h = Harness::new(store_with([module_with("Loading", "Works", story)]));

    h.controller.render("loading--works", RenderMode::Navigate).await;

    assert_eq!(h.canvas.html(), "<p>ada</p>");
}

#[tokio::test]
async fn render_failure_emits_threw_exception() {
    let story = StoryAnnotations::new().with_render(render_fn(|_| anyhow::bail!("bad markup")));
    let h = Harness::new(store_with([module_with("Broken", "Render", story)]));

    let outcome = h.controller.render("broken--render", RenderMode::Navigate).await;

    assert!(matches!(outcome, RenderOutcome::Errored { category: ErrorCategory::Render, .. }));
    let payload = last_payload(&h.recorder, events::STORY_THREW_EXCEPTION).unwrap();
    assert_eq!(payload["message"], json!("bad markup"));
    assert!(h.recorder.of_type(events::STORY_RENDERED).is_empty());
}

#[tokio::test]
async fn play_failure_is_reported_by_default() {
    let story = StoryAnnotations::new()
        .with_render(render_fn(|_| Ok(Node::element("form"))))
        .with_play(failing_play());
    let h = Harness::new(store_with([module_with("Form", "Submit", story)]));

    let outcome = h.controller.render("form--submit", RenderMode::Navigate).await;

    assert_eq!(outcome, RenderOutcome::Completed { story_id: "form--submit".into(), played: true });
    assert_eq!(h.recorder.phases("form--submit").last().map(String::as_str), Some("played"));
    let payload = last_payload(&h.recorder, events::PLAY_FUNCTION_THREW_EXCEPTION).unwrap();
    assert_eq!(payload["message"], json!("expected 1 to be 2"));
}

#[tokio::test]
async fn play_failure_propagates_when_configured() {
    let story = StoryAnnotations::new()
        .with_render(render_fn(|_| Ok(Node::element("form"))))
        .with_play(failing_play());
    let h = Harness::new(store_with([module_with("Form", "Submit", story)]))
        .with_options(RenderOptions::default().with_play_error_policy(PlayErrorPolicy::Propagate));

    let outcome = h.controller.render("form--submit", RenderMode::Navigate).await;

    assert!(matches!(outcome, RenderOutcome::Errored { category: ErrorCategory::Play, .. }));
    assert_eq!(h.recorder.phases("form--submit").last().map(String::as_str), Some("errored"));
    let payload = last_payload(&h.recorder, events::STORY_ERRORED).unwrap();
    assert_eq!(payload["category"], json!("play"));
}

#[tokio::test]
async fn rerender_skips_play_and_remount_replays_it() {
    let plays = Arc::new(AtomicUsize::new(0));
    let story = StoryAnnotations::new()
        .with_args(json!({ "label": "One" }))
        .with_render(render_fn(|ctx| Ok(Node::element("b").with_text(ctx.arg_str("label").unwrap_or_default()))))
        .with_play(counting_play(&plays));
    let h = Harness::new(store_with([module_with("Counter", "Story", story)]));

    h.controller.render("counter--story", RenderMode::Navigate).await;
    h.store.args().update("counter--story", &object(json!({ "label": "Two" })));
    let rerender = h.controller.render("counter--story", RenderMode::Rerender).await;

    assert_eq!(rerender, RenderOutcome::Completed { story_id: "counter--story".into(), played: false });
    assert_eq!(h.canvas.html(), "<b>Two</b>");
    assert_eq!(plays.load(Ordering::SeqCst), 1);
    assert_eq!(h.renderer.unmount_count(), 0);

    h.controller.render("counter--story", RenderMode::Remount).await;

    assert_eq!(plays.load(Ordering::SeqCst), 2);
    assert_eq!(h.renderer.unmount_count(), 1);
}

#[tokio::test]
async fn autoplay_off_skips_play() {
    let plays = Arc::new(AtomicUsize::new(0));
    let story = StoryAnnotations::new()
        .with_render(render_fn(|_| Ok(Node::element("i"))))
        .with_play(counting_play(&plays));
    let h = Harness::new(store_with([module_with("Quiet", "Story", story)]))
        .with_options(RenderOptions::default().with_autoplay(false));

    let outcome = h.controller.render("quiet--story", RenderMode::Navigate).await;

    assert_eq!(outcome, RenderOutcome::Completed { story_id: "quiet--story".into(), played: false });
    assert_eq!(plays.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_story_unmounts_the_previous_one() {
    let h = Harness::new(store_with([button_module()]));
    h.controller.render("example-button--primary", RenderMode::Navigate).await;

    let outcome = h.controller.render("example-button--nope", RenderMode::Navigate).await;

    assert_eq!(outcome, RenderOutcome::Missing { story_id: "example-button--nope".into() });
    assert!(h.canvas.is_empty());
    assert_eq!(h.renderer.unmount_count(), 1);

    h.controller.teardown().await.unwrap();
    assert_eq!(h.renderer.unmount_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn interrupted_mount_is_unmounted_by_the_next_render() {
    let store = store_with([button_module()]);
    let renderer = RecordingRenderer::new().with_stalled_mount("example-button--primary", Duration::from_millis(50));
    let h = Harness::with_renderer(store, renderer);

    let (a, b) = tokio::join!(
        h.controller.render("example-button--primary", RenderMode::Navigate),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.controller.render("example-button--secondary", RenderMode::Navigate).await
        }
    );

    assert_eq!(a, RenderOutcome::Aborted { story_id: "example-button--primary".into() });
    assert!(b.is_completed());
    assert_eq!(h.renderer.unmount_count(), 1);
    let kinds: Vec<&str> = h
        .canvas
        .mutations()
        .iter()
        .map(|m| match m {
            CanvasMutation::Replaced(_) => "replace",
            CanvasMutation::Cleared => "clear",
        })
        .collect();
    assert_eq!(kinds, vec!["replace", "clear", "replace"]);
    assert_eq!(h.canvas.html(), "<button>Second</button>");
}
