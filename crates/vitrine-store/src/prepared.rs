//! Prepared stories
//!
//! A [`PreparedStory`] is a story resolved against its meta and the project:
//! merged args, arg types and parameters, the decorator chain, the loader list
//! and the bound render and play functions. Preparation is pure; the store
//! caches the result.

use crate::annotations::{
    ArgTypes, Args, ComponentHandle, DecoratorFn, LoaderFn, MetaAnnotations, Parameters, PlayFn,
    ProjectAnnotations, RenderFn, StoryAnnotations,
};
use crate::context::{AbortSignal, Canvas, StoryContext, ViewMode};
use crate::enhancers::{self, EnhancerInput};
use crate::node::Node;
use crate::{merge, tags};
use futures::future::join_all;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

/// Story as registered, before project annotations are applied
#[derive(Clone, Debug)]
pub struct NormalizedStory {
    /// Story id
    pub id: String,
    /// Display name
    pub name: String,
    /// Export key in the module
    pub export_name: String,
    /// Story annotations
    pub annotations: StoryAnnotations,
}

/// A registered module
#[derive(Clone, Debug)]
pub struct CsfFile {
    /// Resolved title
    pub title: String,
    /// Module path
    pub import_path: Option<String>,
    /// Default export
    pub meta: MetaAnnotations,
    /// Stories keyed by id, in export order
    pub stories: indexmap::IndexMap<String, NormalizedStory>,
}

/// A story ready to render
#[derive(Clone)]
pub struct PreparedStory {
    /// Story id
    pub id: String,
    /// Display name
    pub name: String,
    /// Owning title
    pub title: String,
    /// Export key
    pub export_name: String,
    /// Module path
    pub import_path: Option<String>,
    /// Resolved tags
    pub tags: Vec<String>,
    /// Component under test
    pub component: Option<ComponentHandle>,
    /// Merged parameters
    pub parameters: Parameters,
    /// Merged and enhanced initial args
    pub initial_args: Args,
    /// Merged and enhanced arg types
    pub arg_types: ArgTypes,
    decorators: Vec<DecoratorFn>,
    loaders: Vec<LoaderFn>,
    render: Option<RenderFn>,
    play: Option<PlayFn>,
}

/// Resolve a story against its module and the project
#[must_use]
pub fn prepare(project: &ProjectAnnotations, csf: &CsfFile, story: &NormalizedStory) -> PreparedStory {
    let meta = &csf.meta;
    let own = &story.annotations;

    let parameters = merge::parameters(&[&project.parameters, &meta.parameters, &own.parameters]);
    let merged_args = merge::args(&[&project.args, &meta.args, &own.args]);
    let declared = merge::arg_types(&[&project.arg_types, &meta.arg_types, &own.arg_types]);
    let tags = tags::combine(&[&project.tags[..], &meta.tags[..], &own.tags[..]]);

    let input = EnhancerInput {
        id: &story.id,
        title: &csf.title,
        name: &story.name,
        component: meta.component.as_ref(),
        parameters: &parameters,
        initial_args: &merged_args,
        arg_types: &declared,
    };
    let arg_types = enhancers::apply_arg_types(&project.arg_types_enhancers, &declared, &input);
    let initial_args = enhancers::apply_args(
        &project.args_enhancers,
        &merged_args,
        &EnhancerInput {
            arg_types: &arg_types,
            ..input.clone()
        },
    );

    let decorators = project
        .decorators
        .iter()
        .chain(&meta.decorators)
        .chain(&own.decorators)
        .cloned()
        .collect();
    let loaders = project
        .loaders
        .iter()
        .chain(&meta.loaders)
        .chain(&own.loaders)
        .cloned()
        .collect();
    let render = own
        .render
        .clone()
        .or_else(|| meta.render.clone())
        .or_else(|| project.render.clone());
    let play = own.play.clone().or_else(|| meta.play.clone());

    tracing::debug!(story_id = %story.id, tags = ?tags, "story prepared");

    PreparedStory {
        id: story.id.clone(),
        name: story.name.clone(),
        title: csf.title.clone(),
        export_name: story.export_name.clone(),
        import_path: csf.import_path.clone(),
        tags,
        component: meta.component.clone(),
        parameters,
        initial_args,
        arg_types,
        decorators,
        loaders,
        render,
        play,
    }
}

impl PreparedStory {
    /// Whether a play function is bound
    #[inline]
    #[must_use]
    pub fn has_play(&self) -> bool {
        self.play.is_some()
    }

    /// Bound play function
    #[inline]
    #[must_use]
    pub fn play(&self) -> Option<&PlayFn> {
        self.play.as_ref()
    }

    /// Bound render function
    #[inline]
    #[must_use]
    pub fn render_fn(&self) -> Option<&RenderFn> {
        self.render.as_ref()
    }

    /// Number of loaders, project first
    #[inline]
    #[must_use]
    pub fn loader_count(&self) -> usize {
        self.loaders.len()
    }

    /// Number of decorators, outermost first
    #[inline]
    #[must_use]
    pub fn decorator_count(&self) -> usize {
        self.decorators.len()
    }

    /// Whether a tag is present
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Build a context for one render cycle
    #[must_use]
    pub fn context(
        &self,
        args: Args,
        globals: crate::annotations::Globals,
        view_mode: ViewMode,
        canvas: Option<Arc<dyn Canvas>>,
        abort_signal: AbortSignal,
    ) -> StoryContext {
        StoryContext {
            id: self.id.clone(),
            title: self.title.clone(),
            name: self.name.clone(),
            tags: self.tags.clone(),
            args,
            initial_args: self.initial_args.clone(),
            arg_types: self.arg_types.clone(),
            globals,
            parameters: self.parameters.clone(),
            loaded: Map::new(),
            view_mode,
            component: self.component.clone(),
            canvas,
            abort_signal,
        }
    }

    /// Run every loader concurrently and merge their output in loader order
    ///
    /// All loaders settle before this returns; the first failure (in loader
    /// order) is reported.
    ///
    /// # Errors
    /// Returns the first loader error.
    pub async fn load(&self, ctx: &StoryContext) -> anyhow::Result<Map<String, Value>> {
        let results = join_all(self.loaders.iter().map(|loader| loader(ctx.clone()))).await;

        let mut loaded = Map::new();
        let mut first_error = None;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(values) => loaded.extend(values),
                Err(e) => {
                    tracing::debug!(story_id = %self.id, loader = index, error = %e, "loader failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(loaded),
        }
    }

    /// Render through the decorator chain
    ///
    /// `fallback` is the renderer's default render, used when no layer binds
    /// one.
    ///
    /// # Errors
    /// Propagates decorator and render failures, or reports a missing render
    /// function.
    pub fn render_with_decorators(
        &self,
        ctx: &StoryContext,
        fallback: Option<&RenderFn>,
    ) -> anyhow::Result<Node> {
        let render = self
            .render
            .as_ref()
            .or(fallback)
            .ok_or_else(|| anyhow::anyhow!("no render function for story '{}'", self.id))?;
        run_chain(&self.decorators, render, ctx)
    }

    /// Payload of the `storyPrepared` event
    #[must_use]
    pub fn summary(&self, args: &Args) -> Value {
        json!({
            "id": self.id,
            "title": self.title,
            "name": self.name,
            "args": args,
            "initialArgs": self.initial_args,
            "argTypes": self.arg_types,
            "parameters": self.parameters,
        })
    }
}

/// Decorators are outermost first: `chain[0](chain[1](..(render)))`
fn run_chain(chain: &[DecoratorFn], render: &RenderFn, ctx: &StoryContext) -> anyhow::Result<Node> {
    match chain.split_first() {
        None => render(ctx),
        Some((outer, rest)) => {
            let inner = |inner_ctx: &StoryContext| run_chain(rest, render, inner_ctx);
            outer(&inner, ctx)
        }
    }
}

impl fmt::Debug for PreparedStory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStory")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("initial_args", &self.initial_args)
            .field("decorators", &self.decorators.len())
            .field("loaders", &self.loaders.len())
            .field("has_play", &self.play.is_some())
            .finish_non_exhaustive()
    }
}
