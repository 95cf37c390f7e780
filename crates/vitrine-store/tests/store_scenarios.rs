//! Registration, indexing and preparation through the public API

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use vitrine_store::prelude::*;
use vitrine_store::{
    ComponentHandle, EntryType, StoreOptions, StoriesSpecifier,
};

fn button_module() -> ModuleExports {
    ModuleExports::new(
        MetaAnnotations::titled("Example/Button")
            .with_component(ComponentHandle::named("Button"))
            .with_args(json!({ "label": "Button" })),
    )
    .with_import_path("./src/Button.stories.rs")
    .story(
        "Primary",
        StoryAnnotations::new().with_args(json!({ "primary": true })),
    )
    .story("withIcon", StoryAnnotations::new())
}

#[test]
fn example_button_primary() {
    let store = StoryStore::new(ProjectAnnotations::new());
    store.add(button_module()).unwrap();

    let entries: Vec<_> = store.story_index_entries().collect();
    let primary = entries
        .iter()
        .find(|e| e.id == "example-button--primary")
        .expect("primary entry");
    assert_eq!(primary.name, "Primary");
    assert_eq!(primary.title, "Example/Button");
    assert_eq!(primary.entry_type, EntryType::Story);

    let prepared = store.from_id("example-button--primary").unwrap();
    assert_eq!(
        Value::Object(prepared.initial_args.clone()),
        json!({ "label": "Button", "primary": true })
    );

    let icon = store.from_id("example-button--withicon").unwrap();
    assert_eq!(icon.name, "With Icon");
}

#[test]
fn same_id_from_another_title_is_rejected() {
    let store = StoryStore::new(ProjectAnnotations::new());
    store.add(button_module()).unwrap();

    let clash = ModuleExports::new(MetaAnnotations::titled("example / button"))
        .story("primary", StoryAnnotations::new());
    let err = store.add(clash).unwrap_err();

    assert_eq!(
        err,
        ConfigurationError::DuplicateStoryId {
            id: "example-button--primary".into(),
            existing: "Example/Button".into(),
            incoming: "example / button".into(),
        }
    );
    // The failed registration leaves the store untouched.
    assert_eq!(store.titles(), vec!["Example/Button"]);
}

#[test]
fn docs_id_clashing_with_another_title_is_rejected() {
    let store = StoryStore::new(ProjectAnnotations::new());
    store
        .add(ModuleExports::new(MetaAnnotations::titled("Button")).story("Docs", StoryAnnotations::new()))
        .unwrap();

    let autodocs = ModuleExports::new(MetaAnnotations::titled("button").with_tags(["autodocs"]))
        .story("Other", StoryAnnotations::new());
    let err = store.add(autodocs).unwrap_err();

    assert_eq!(
        err,
        ConfigurationError::DuplicateStoryId {
            id: "button--docs".into(),
            existing: "Button".into(),
            incoming: "button".into(),
        }
    );
    assert_eq!(store.story_index().len(), 1);

    // The reverse order clashes on the story id instead.
    let store = StoryStore::new(ProjectAnnotations::new());
    store
        .add(
            ModuleExports::new(MetaAnnotations::titled("button").with_tags(["autodocs"]))
                .story("Other", StoryAnnotations::new()),
        )
        .unwrap();
    let err = store
        .add(ModuleExports::new(MetaAnnotations::titled("Button")).story("Docs", StoryAnnotations::new()))
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::DuplicateStoryId { ref id, .. } if id == "button--docs"));
}

#[test]
fn removed_module_frees_its_docs_id() {
    let store = StoryStore::new(ProjectAnnotations::new());
    store
        .add(
            ModuleExports::new(MetaAnnotations::titled("button").with_tags(["autodocs"]))
                .story("Other", StoryAnnotations::new()),
        )
        .unwrap();

    store.remove("button");
    store
        .add(ModuleExports::new(MetaAnnotations::titled("Button")).story("Docs", StoryAnnotations::new()))
        .unwrap();

    assert!(!store.story_index().get("button--docs").unwrap().is_docs());
}

#[test]
fn duplicate_within_module_is_rejected() {
    let store = StoryStore::new(ProjectAnnotations::new());
    let module = ModuleExports::new(MetaAnnotations::titled("A"))
        .story("Primary", StoryAnnotations::new())
        .story("primary", StoryAnnotations::new());

    assert!(matches!(
        store.add(module),
        Err(ConfigurationError::DuplicateStoryId { .. })
    ));
}

#[test]
fn missing_title_without_path_is_fatal() {
    let store = StoryStore::new(ProjectAnnotations::new());
    let module = ModuleExports::new(MetaAnnotations::default()).story("A", StoryAnnotations::new());

    assert_eq!(
        store.add(module).unwrap_err(),
        ConfigurationError::MissingTitle { import_path: None }
    );
}

#[test]
fn invalid_title_is_fatal() {
    let store = StoryStore::new(ProjectAnnotations::new());
    let module = ModuleExports::new(MetaAnnotations::titled("***")).story("A", StoryAnnotations::new());

    assert!(matches!(
        store.add(module),
        Err(ConfigurationError::InvalidTitle { .. })
    ));
}

#[test]
fn title_is_derived_from_path() {
    let options = StoreOptions::default()
        .with_specifiers(vec![StoriesSpecifier::new("./src").with_title_prefix("Design")]);
    let store = StoryStore::with_options(ProjectAnnotations::new(), options);
    let module = ModuleExports::new(MetaAnnotations::default())
        .with_import_path("./src/forms/Input/Input.stories.rs")
        .story("Empty", StoryAnnotations::new());

    let added = store.add(module).unwrap();

    assert_eq!(added.title, "Design/forms/Input");
    assert_eq!(added.story_ids, vec!["design-forms-input--empty"]);
}

#[test]
fn hot_reload_replaces_in_place() {
    let store = StoryStore::new(ProjectAnnotations::new());
    store
        .add(ModuleExports::new(MetaAnnotations::titled("First")).story("One", StoryAnnotations::new()))
        .unwrap();
    store.add(button_module()).unwrap();
    store
        .add(ModuleExports::new(MetaAnnotations::titled("Last")).story("One", StoryAnnotations::new()))
        .unwrap();
    let untouched = store.from_id("first--one").unwrap();
    let stale = store.from_id("example-button--primary").unwrap();

    let reloaded = ModuleExports::new(MetaAnnotations::titled("Example/Button"))
        .story("Primary", StoryAnnotations::new().with_args(json!({ "primary": false })))
        .story("Large", StoryAnnotations::new());
    let added = store.add(reloaded).unwrap();

    assert!(added.replaced);
    assert_eq!(added.removed, vec!["example-button--withicon"]);
    assert_eq!(store.titles(), vec!["First", "Example/Button", "Last"]);
    assert!(Arc::ptr_eq(&untouched, &store.from_id("first--one").unwrap()));

    let fresh = store.from_id("example-button--primary").unwrap();
    assert!(!Arc::ptr_eq(&stale, &fresh));
    assert_eq!(fresh.initial_args["primary"], json!(false));
    assert!(store.from_id("example-button--withicon").is_err());

    let ids: Vec<String> = store.story_index_entries().map(|e| e.id).collect();
    assert_eq!(
        ids,
        vec!["first--one", "example-button--primary", "example-button--large", "last--one"]
    );
}

#[test]
fn index_respects_tag_filter_and_autodocs() {
    let store = StoryStore::new(ProjectAnnotations::new());
    let module = ModuleExports::new(MetaAnnotations::titled("Docs/Card").with_tags(["autodocs"]))
        .story("Visible", StoryAnnotations::new())
        .story("Hidden", StoryAnnotations::new().with_tags(["!dev"]));
    store.add(module).unwrap();

    let entries: Vec<_> = store.story_index_entries().collect();
    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();

    assert_eq!(ids, vec!["docs-card--docs", "docs-card--visible"]);
    assert_eq!(entries[0].entry_type, EntryType::Docs);
    assert_eq!(entries[0].name, "Docs");
    assert_eq!(entries[1].tags, vec!["dev", "test", "autodocs"]);
}

#[test]
fn hidden_story_is_still_renderable() {
    let store = StoryStore::new(ProjectAnnotations::new());
    let module = ModuleExports::new(MetaAnnotations::titled("A"))
        .story("Hidden", StoryAnnotations::new().with_tags(["!dev"]));
    store.add(module).unwrap();

    assert_eq!(store.story_index().len(), 0);
    assert!(store.from_id("a--hidden").is_ok());
}

#[test]
fn index_document_shape() {
    let store = StoryStore::new(ProjectAnnotations::new());
    store.add(button_module()).unwrap();

    let doc = serde_json::to_value(store.story_index()).unwrap();

    assert_eq!(doc["v"], json!(5));
    assert_eq!(
        doc["entries"]["example-button--primary"],
        json!({
            "id": "example-button--primary",
            "title": "Example/Button",
            "name": "Primary",
            "importPath": "./src/Button.stories.rs",
            "type": "story",
            "tags": ["dev", "test"]
        })
    );
}

#[test]
fn declared_arg_types_win_over_enhancers() {
    let project = ProjectAnnotations::new().with_default_enhancers();
    let store = StoryStore::new(project);
    let module = ModuleExports::new(
        MetaAnnotations::titled("A").with_arg_types(json!({
            "count": { "type": { "name": "string" }, "control": { "type": "range", "min": 0 } }
        })),
    )
    .story(
        "B",
        StoryAnnotations::new().with_args(json!({ "count": 3, "label": "x", "backgroundColor": "#fff" })),
    );
    store.add(module).unwrap();

    let prepared = store.from_id("a--b").unwrap();

    assert_eq!(
        prepared.arg_types["count"],
        json!({ "name": "count", "type": { "name": "string" }, "control": { "type": "range", "min": 0 } })
    );
    assert_eq!(prepared.arg_types["label"]["control"], json!({ "type": "text" }));
    assert_eq!(prepared.arg_types["backgroundColor"]["control"], json!({ "type": "color" }));
}

#[test]
fn parameters_merge_across_layers() {
    let project = ProjectAnnotations::new().with_parameters(json!({ "layout": "centered", "docs": { "source": "auto" } }));
    let store = StoryStore::new(project);
    let module = ModuleExports::new(
        MetaAnnotations::titled("A").with_parameters(json!({ "docs": { "description": "meta" } })),
    )
    .story(
        "B",
        StoryAnnotations::new().with_parameters(json!({ "layout": "fullscreen" })),
    );
    store.add(module).unwrap();

    let prepared = store.from_id("a--b").unwrap();

    assert_eq!(
        Value::Object(prepared.parameters.clone()),
        json!({ "layout": "fullscreen", "docs": { "source": "auto", "description": "meta" } })
    );
}

#[test]
fn explicit_name_is_kept() {
    let store = StoryStore::new(ProjectAnnotations::new());
    let module = ModuleExports::new(MetaAnnotations::titled("A"))
        .story("primaryButton", StoryAnnotations::new())
        .story("custom", StoryAnnotations::new().with_name("So Custom"));
    store.add(module).unwrap();

    assert_eq!(store.from_id("a--primarybutton").unwrap().name, "Primary Button");
    assert_eq!(store.from_id("a--custom").unwrap().name, "So Custom");
}
