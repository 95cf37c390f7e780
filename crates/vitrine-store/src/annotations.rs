//! User-authored annotations
//!
//! Three layers feed a prepared story:
//! - [`ProjectAnnotations`]: project-wide defaults, globals and enhancers
//! - [`MetaAnnotations`]: the default export of a story module
//! - [`StoryAnnotations`]: one named story export
//!
//! A module is handed to the store as [`ModuleExports`].

use crate::context::StoryContext;
use crate::enhancers::{ArgTypesEnhancer, ArgsEnhancer};
use crate::node::Node;
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Story args
pub type Args = Map<String, Value>;

/// Free-form parameters
pub type Parameters = Map<String, Value>;

/// Global values shared by every story
pub type Globals = Map<String, Value>;

/// Arg type declarations keyed by arg name, in declaration order
pub type ArgTypes = IndexMap<String, Value>;

/// Global type declarations keyed by global name
pub type GlobalTypes = IndexMap<String, Value>;

/// Undecorated story function as seen by a decorator
pub type StoryFn<'a> = dyn Fn(&StoryContext) -> anyhow::Result<Node> + 'a;

/// Render function
pub type RenderFn = Arc<dyn Fn(&StoryContext) -> anyhow::Result<Node> + Send + Sync>;

/// Decorator: wraps the inner story function
pub type DecoratorFn =
    Arc<dyn for<'s> Fn(&'s StoryFn<'s>, &StoryContext) -> anyhow::Result<Node> + Send + Sync>;

/// Loader: async data fetched before render, merged into `loaded`
pub type LoaderFn =
    Arc<dyn Fn(StoryContext) -> BoxFuture<'static, anyhow::Result<Map<String, Value>>> + Send + Sync>;

/// Play function: scripted interaction run after mount
pub type PlayFn = Arc<dyn Fn(StoryContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wrap a closure as a [`RenderFn`]
pub fn render_fn<F>(f: F) -> RenderFn
where
    F: Fn(&StoryContext) -> anyhow::Result<Node> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`DecoratorFn`]
pub fn decorator<F>(f: F) -> DecoratorFn
where
    F: for<'s> Fn(&'s StoryFn<'s>, &StoryContext) -> anyhow::Result<Node> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap an async closure as a [`LoaderFn`]
pub fn loader<F, Fut>(f: F) -> LoaderFn
where
    F: Fn(StoryContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Map<String, Value>>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// Wrap an async closure as a [`PlayFn`]
pub fn play_fn<F, Fut>(f: F) -> PlayFn
where
    F: Fn(StoryContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// Convert a JSON object into a map; anything else yields an empty map
#[must_use]
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            tracing::warn!(value = %other, "expected a JSON object, ignoring");
            Map::new()
        }
    }
}

/// Convert a JSON object into an ordered declaration map
#[must_use]
pub fn declarations(value: Value) -> IndexMap<String, Value> {
    object(value).into_iter().collect()
}

/// Opaque reference to the component under test
///
/// The core never interprets the value; renderer adapters downcast it.
#[derive(Clone)]
pub struct ComponentHandle {
    name: String,
    value: Arc<dyn Any + Send + Sync>,
}

impl ComponentHandle {
    /// Wrap a component value
    pub fn new<T: Any + Send + Sync>(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value: Arc::new(value),
        }
    }

    /// Handle carrying only a display name
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, ())
    }

    /// Display name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Downcast the wrapped value
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ComponentHandle").field(&self.name).finish()
    }
}

impl PartialEq for ComponentHandle {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.value, &other.value)
    }
}

/// Default project tags
pub const DEFAULT_PROJECT_TAGS: [&str; 2] = ["dev", "test"];

/// Project-wide annotations
#[derive(Clone)]
pub struct ProjectAnnotations {
    /// Default args
    pub args: Args,
    /// Default arg types
    pub arg_types: ArgTypes,
    /// Default parameters
    pub parameters: Parameters,
    /// Outermost decorators
    pub decorators: Vec<DecoratorFn>,
    /// Loaders run before every story's own
    pub loaders: Vec<LoaderFn>,
    /// Base tags
    pub tags: Vec<String>,
    /// Fallback render function
    pub render: Option<RenderFn>,
    /// Initial global values
    pub initial_globals: Globals,
    /// Global declarations (`defaultValue` seeds globals)
    pub global_types: GlobalTypes,
    /// Arg type enhancers, applied in order
    pub arg_types_enhancers: Vec<ArgTypesEnhancer>,
    /// Args enhancers, applied in order
    pub args_enhancers: Vec<ArgsEnhancer>,
}

impl Default for ProjectAnnotations {
    fn default() -> Self {
        Self {
            args: Args::new(),
            arg_types: ArgTypes::new(),
            parameters: Parameters::new(),
            decorators: Vec::new(),
            loaders: Vec::new(),
            tags: DEFAULT_PROJECT_TAGS.iter().map(ToString::to_string).collect(),
            render: None,
            initial_globals: Globals::new(),
            global_types: GlobalTypes::new(),
            arg_types_enhancers: Vec::new(),
            args_enhancers: Vec::new(),
        }
    }
}

impl ProjectAnnotations {
    /// Create with default tags and no enhancers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the built-in arg type enhancers
    #[must_use]
    pub fn with_default_enhancers(mut self) -> Self {
        self.arg_types_enhancers
            .push(Arc::new(crate::enhancers::infer_arg_types));
        self.arg_types_enhancers
            .push(Arc::new(crate::enhancers::infer_controls));
        self
    }

    /// Set default args
    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = object(args);
        self
    }

    /// Set default arg types
    #[must_use]
    pub fn with_arg_types(mut self, arg_types: Value) -> Self {
        self.arg_types = declarations(arg_types);
        self
    }

    /// Set default parameters
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = object(parameters);
        self
    }

    /// Append a decorator
    #[must_use]
    pub fn with_decorator(mut self, decorator: DecoratorFn) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Append a loader
    #[must_use]
    pub fn with_loader(mut self, loader: LoaderFn) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Replace base tags
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set fallback render function
    #[must_use]
    pub fn with_render(mut self, render: RenderFn) -> Self {
        self.render = Some(render);
        self
    }

    /// Set initial globals
    #[must_use]
    pub fn with_initial_globals(mut self, globals: Value) -> Self {
        self.initial_globals = object(globals);
        self
    }

    /// Set global declarations
    #[must_use]
    pub fn with_global_types(mut self, global_types: Value) -> Self {
        self.global_types = declarations(global_types);
        self
    }

    /// Append an arg types enhancer
    #[must_use]
    pub fn with_arg_types_enhancer(mut self, enhancer: ArgTypesEnhancer) -> Self {
        self.arg_types_enhancers.push(enhancer);
        self
    }

    /// Append an args enhancer
    #[must_use]
    pub fn with_args_enhancer(mut self, enhancer: ArgsEnhancer) -> Self {
        self.args_enhancers.push(enhancer);
        self
    }
}

impl fmt::Debug for ProjectAnnotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectAnnotations")
            .field("args", &self.args)
            .field("tags", &self.tags)
            .field("decorators", &self.decorators.len())
            .field("loaders", &self.loaders.len())
            .field("initial_globals", &self.initial_globals)
            .finish_non_exhaustive()
    }
}

/// Default export of a story module
#[derive(Clone, Default)]
pub struct MetaAnnotations {
    /// Hierarchical title, `/`-separated
    pub title: Option<String>,
    /// Component under test
    pub component: Option<ComponentHandle>,
    /// Component-level args
    pub args: Args,
    /// Component-level arg types
    pub arg_types: ArgTypes,
    /// Component-level parameters
    pub parameters: Parameters,
    /// Decorators between project and story decorators
    pub decorators: Vec<DecoratorFn>,
    /// Loaders between project and story loaders
    pub loaders: Vec<LoaderFn>,
    /// Component-level tags
    pub tags: Vec<String>,
    /// Render function shared by the module's stories
    pub render: Option<RenderFn>,
    /// Play function shared by the module's stories
    pub play: Option<PlayFn>,
}

impl MetaAnnotations {
    /// Create meta with an explicit title
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Set component
    #[must_use]
    pub fn with_component(mut self, component: ComponentHandle) -> Self {
        self.component = Some(component);
        self
    }

    /// Set args
    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = object(args);
        self
    }

    /// Set arg types
    #[must_use]
    pub fn with_arg_types(mut self, arg_types: Value) -> Self {
        self.arg_types = declarations(arg_types);
        self
    }

    /// Set parameters
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = object(parameters);
        self
    }

    /// Append a decorator
    #[must_use]
    pub fn with_decorator(mut self, decorator: DecoratorFn) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Append a loader
    #[must_use]
    pub fn with_loader(mut self, loader: LoaderFn) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Set tags
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set render function
    #[must_use]
    pub fn with_render(mut self, render: RenderFn) -> Self {
        self.render = Some(render);
        self
    }

    /// Set play function
    #[must_use]
    pub fn with_play(mut self, play: PlayFn) -> Self {
        self.play = Some(play);
        self
    }
}

impl fmt::Debug for MetaAnnotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaAnnotations")
            .field("title", &self.title)
            .field("component", &self.component)
            .field("args", &self.args)
            .field("tags", &self.tags)
            .field("decorators", &self.decorators.len())
            .finish_non_exhaustive()
    }
}

/// One named story export
#[derive(Clone, Default)]
pub struct StoryAnnotations {
    /// Display name; start case of the export key when absent
    pub name: Option<String>,
    /// Story args
    pub args: Args,
    /// Story arg types
    pub arg_types: ArgTypes,
    /// Story parameters
    pub parameters: Parameters,
    /// Innermost decorators
    pub decorators: Vec<DecoratorFn>,
    /// Loaders run after project and meta loaders
    pub loaders: Vec<LoaderFn>,
    /// Story tags (`!tag` removes an inherited tag)
    pub tags: Vec<String>,
    /// Render function
    pub render: Option<RenderFn>,
    /// Play function
    pub play: Option<PlayFn>,
}

impl StoryAnnotations {
    /// Create empty annotations
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set args
    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = object(args);
        self
    }

    /// Set arg types
    #[must_use]
    pub fn with_arg_types(mut self, arg_types: Value) -> Self {
        self.arg_types = declarations(arg_types);
        self
    }

    /// Set parameters
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = object(parameters);
        self
    }

    /// Append a decorator
    #[must_use]
    pub fn with_decorator(mut self, decorator: DecoratorFn) -> Self {
        self.decorators.push(decorator);
        self
    }

    /// Append a loader
    #[must_use]
    pub fn with_loader(mut self, loader: LoaderFn) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Set tags
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set render function
    #[must_use]
    pub fn with_render(mut self, render: RenderFn) -> Self {
        self.render = Some(render);
        self
    }

    /// Set play function
    #[must_use]
    pub fn with_play(mut self, play: PlayFn) -> Self {
        self.play = Some(play);
        self
    }
}

impl fmt::Debug for StoryAnnotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryAnnotations")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("tags", &self.tags)
            .field("has_play", &self.play.is_some())
            .finish_non_exhaustive()
    }
}

/// A story export as written by the user
#[derive(Clone)]
pub enum StoryDefinition {
    /// Bare render function
    LegacyFn(RenderFn),
    /// Annotation object
    Annotations(StoryAnnotations),
}

impl StoryDefinition {
    /// Canonical annotation form
    #[must_use]
    pub fn into_annotations(self) -> StoryAnnotations {
        match self {
            Self::LegacyFn(render) => StoryAnnotations {
                render: Some(render),
                ..StoryAnnotations::default()
            },
            Self::Annotations(annotations) => annotations,
        }
    }
}

impl From<StoryAnnotations> for StoryDefinition {
    fn from(annotations: StoryAnnotations) -> Self {
        Self::Annotations(annotations)
    }
}

impl From<RenderFn> for StoryDefinition {
    fn from(render: RenderFn) -> Self {
        Self::LegacyFn(render)
    }
}

impl fmt::Debug for StoryDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LegacyFn(_) => f.write_str("LegacyFn(..)"),
            Self::Annotations(a) => f.debug_tuple("Annotations").field(a).finish(),
        }
    }
}

/// A loaded story module
#[derive(Clone, Debug, Default)]
pub struct ModuleExports {
    /// Module path relative to the project root
    pub import_path: Option<String>,
    /// Default export
    pub default: MetaAnnotations,
    /// Named story exports, in source order
    pub stories: IndexMap<String, StoryDefinition>,
}

impl ModuleExports {
    /// Create module from its default export
    #[must_use]
    pub fn new(default: MetaAnnotations) -> Self {
        Self {
            import_path: None,
            default,
            stories: IndexMap::new(),
        }
    }

    /// Set import path
    #[must_use]
    pub fn with_import_path(mut self, path: impl Into<String>) -> Self {
        self.import_path = Some(path.into());
        self
    }

    /// Add a named story export
    #[must_use]
    pub fn story(mut self, export: impl Into<String>, definition: impl Into<StoryDefinition>) -> Self {
        self.stories.insert(export.into(), definition.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_fn_becomes_render() {
        let definition = StoryDefinition::LegacyFn(render_fn(|_| Ok(Node::element("div"))));
        let annotations = definition.into_annotations();
        assert!(annotations.render.is_some());
        assert!(annotations.args.is_empty());
    }

    #[test]
    fn object_ignores_non_objects() {
        assert!(object(json!([1, 2])).is_empty());
        assert!(object(Value::Null).is_empty());
        assert_eq!(object(json!({ "a": 1 })).len(), 1);
    }

    #[test]
    fn declarations_keep_order() {
        let decl = declarations(json!({ "b": {}, "a": {} }));
        assert_eq!(decl.len(), 2);
        assert!(decl.contains_key("a"));
    }

    #[test]
    fn component_handle_downcasts() {
        #[derive(Debug, PartialEq)]
        struct Button {
            variant: &'static str,
        }
        let handle = ComponentHandle::new("Button", Button { variant: "primary" });
        assert_eq!(handle.name(), "Button");
        assert_eq!(handle.downcast_ref::<Button>().map(|b| b.variant), Some("primary"));
        assert!(handle.downcast_ref::<String>().is_none());
    }

    #[test]
    fn project_defaults_carry_dev_and_test_tags() {
        assert_eq!(ProjectAnnotations::default().tags, vec!["dev", "test"]);
    }

    #[test]
    fn module_builder_keeps_export_order() {
        let module = ModuleExports::new(MetaAnnotations::titled("Example/Button"))
            .story("Primary", StoryAnnotations::new())
            .story("Secondary", StoryAnnotations::new());
        let keys: Vec<&str> = module.stories.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Primary", "Secondary"]);
    }
}
