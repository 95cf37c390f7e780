//! Renderer adapter contract
//!
//! A [`Renderer`] mounts a node tree produced by the decorated story function
//! into a canvas. Framework adapters implement this trait; [`NodeRenderer`]
//! mounts trees as-is.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use vitrine_store::{render_fn, Canvas, Node, RenderFn, StoryContext};

/// Framework adapter
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Adapter name (for logs)
    fn name(&self) -> &str;

    /// Mount a tree under the canvas, replacing what is there
    ///
    /// The future may be dropped before completion when the render is
    /// superseded; an adapter must not mutate the canvas after being dropped.
    ///
    /// # Errors
    /// Adapter-specific mount failures.
    async fn mount(
        &self,
        node: Node,
        canvas: Arc<dyn Canvas>,
        ctx: &StoryContext,
    ) -> anyhow::Result<()>;

    /// Remove whatever this adapter mounted
    ///
    /// # Errors
    /// Adapter-specific unmount failures.
    async fn unmount(&self, canvas: Arc<dyn Canvas>) -> anyhow::Result<()>;

    /// Render function used when no annotation layer provides one
    fn default_render(&self) -> Option<RenderFn> {
        None
    }
}

/// Renderer that mounts node trees directly
///
/// Its default render turns the component into an element named after it,
/// with scalar args as attributes.
#[derive(Debug, Clone, Default)]
pub struct NodeRenderer;

impl NodeRenderer {
    /// Create renderer
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Renderer for NodeRenderer {
    fn name(&self) -> &str {
        "node"
    }

    async fn mount(
        &self,
        node: Node,
        canvas: Arc<dyn Canvas>,
        ctx: &StoryContext,
    ) -> anyhow::Result<()> {
        tracing::trace!(story_id = %ctx.id, canvas = canvas.id(), "mounting");
        canvas.replace_children(vec![node]);
        Ok(())
    }

    async fn unmount(&self, canvas: Arc<dyn Canvas>) -> anyhow::Result<()> {
        canvas.clear();
        Ok(())
    }

    fn default_render(&self) -> Option<RenderFn> {
        Some(render_fn(|ctx| {
            let component = ctx
                .component
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("story '{}' has no component to render", ctx.id))?;
            let mut node = Node::element(component.name());
            for (name, value) in &ctx.args {
                match value {
                    Value::String(s) => node = node.with_attr(name.clone(), s.clone()),
                    Value::Bool(_) | Value::Number(_) => node = node.with_attr(name.clone(), value.to_string()),
                    _ => {}
                }
            }
            Ok(node)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MemoryCanvas;
    use serde_json::json;
    use vitrine_store::ComponentHandle;

    #[tokio::test]
    async fn mount_and_unmount() {
        let canvas = Arc::new(MemoryCanvas::new("root"));
        let renderer = NodeRenderer::new();
        let ctx = StoryContext::new("a--b");

        renderer
            .mount(Node::element("div"), canvas.clone(), &ctx)
            .await
            .unwrap();
        assert_eq!(canvas.html(), "<div></div>");

        renderer.unmount(canvas.clone()).await.unwrap();
        assert!(canvas.is_empty());
    }

    #[test]
    fn default_render_uses_component_and_scalar_args() {
        let render = NodeRenderer::new().default_render().unwrap();
        let mut ctx = StoryContext::new("a--b");
        ctx.component = Some(ComponentHandle::named("Button"));
        ctx.args.insert("label".into(), json!("Go"));
        ctx.args.insert("primary".into(), json!(true));
        ctx.args.insert("style".into(), json!({ "x": 1 }));

        let node = render(&ctx).unwrap();

        assert_eq!(node.to_html(), "<Button label=\"Go\" primary=\"true\"></Button>");
    }

    #[test]
    fn default_render_without_component_fails() {
        let render = NodeRenderer::new().default_render().unwrap();
        assert!(render(&StoryContext::new("a--b")).is_err());
    }
}
