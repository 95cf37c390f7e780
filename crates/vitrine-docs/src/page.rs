//! Docs page composition
//!
//! A [`DocsRenderer`] resolves [`Block`]s against the store and renders the
//! stories they reference in docs view mode. A story that fails to render is
//! shown with its error in place; the rest of the page still renders.

use crate::blocks::{default_template, Block};
use crate::markdown;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use vitrine_render::Renderer;
use vitrine_store::tags::AUTODOCS;
use vitrine_store::{docs_id, AbortSignal, Node, NotFoundError, PreparedStory, StoryStore, ViewMode};

/// Docs errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocsError {
    /// No module registered under the title
    #[error("no stories for title '{0}'")]
    UnknownTitle(String),

    /// A block references a missing story
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
}

/// One rendered story on a docs page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPreview {
    /// Story id
    pub id: String,
    /// Story name
    pub name: String,
    /// `parameters.docs.description.story`, as nodes
    pub description: Vec<Node>,
    /// Rendered tree
    pub node: Option<Node>,
    /// Render failure message
    pub error: Option<String>,
}

/// One row of an args table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgRow {
    /// Arg name
    pub name: String,
    /// Plain text description
    pub description: Option<String>,
    /// Type name
    pub type_name: Option<String>,
    /// Default value summary
    pub default_value: Option<String>,
    /// Control kind
    pub control: Option<String>,
    /// Current value
    pub value: Option<Value>,
}

/// Rendered page section
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Section {
    /// Page title
    Title {
        /// Text
        text: String,
    },
    /// Subtitle
    Subtitle {
        /// Text
        text: String,
    },
    /// Markdown content
    Markdown {
        /// Parsed nodes
        nodes: Vec<Node>,
    },
    /// Section heading
    Heading {
        /// Text
        text: String,
    },
    /// A story
    Story {
        /// Rendered story
        preview: StoryPreview,
        /// Whether it is the primary story
        primary: bool,
    },
    /// Args table
    ArgsTable {
        /// Story the table describes
        story_id: String,
        /// Rows in declaration order
        rows: Vec<ArgRow>,
    },
}

/// A composed docs page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsPage {
    /// Docs entry id
    pub id: String,
    /// Title the page documents
    pub title: String,
    /// Sections in block order
    pub sections: Vec<Section>,
}

impl DocsPage {
    /// Ids of stories rendered on the page, in order
    #[must_use]
    pub fn story_ids(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter_map(|s| match s {
                Section::Story { preview, .. } => Some(preview.id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Page as a node tree
    #[must_use]
    pub fn to_node(&self) -> Node {
        let children = self.sections.iter().map(|section| match section {
            Section::Title { text } => Node::element("h1").with_text(text.clone()),
            Section::Subtitle { text } => Node::element("h2").with_attr("class", "subtitle").with_text(text.clone()),
            Section::Markdown { nodes } => Node::element("div")
                .with_attr("class", "markdown")
                .with_children(nodes.iter().cloned()),
            Section::Heading { text } => Node::element("h3").with_text(text.clone()),
            Section::Story { preview, primary } => story_node(preview, *primary),
            Section::ArgsTable { story_id, rows } => args_table_node(story_id, rows),
        });
        Node::element("div")
            .with_attr("class", "docs")
            .with_attr("data-docs-id", self.id.clone())
            .with_children(children)
    }

    /// Page as HTML
    #[must_use]
    pub fn to_html(&self) -> String {
        self.to_node().to_html()
    }
}

fn story_node(preview: &StoryPreview, primary: bool) -> Node {
    let mut node = Node::element("section")
        .with_attr("class", if primary { "story primary" } else { "story" })
        .with_attr("data-story-id", preview.id.clone());
    if !primary {
        node = node.with_child(Node::element("h4").with_text(preview.name.clone()));
    }
    node = node.with_children(preview.description.iter().cloned());
    match (&preview.node, &preview.error) {
        (_, Some(error)) => node.with_child(Node::element("pre").with_attr("class", "error").with_text(error.clone())),
        (Some(rendered), None) => node.with_child(rendered.clone()),
        (None, None) => node,
    }
}

fn args_table_node(story_id: &str, rows: &[ArgRow]) -> Node {
    let header = Node::element("tr").with_children(
        ["Name", "Description", "Default", "Control"]
            .into_iter()
            .map(|h| Node::element("th").with_text(h)),
    );
    let body = rows.iter().map(|row| {
        let cell = |text: Option<&str>| Node::element("td").with_text(text.unwrap_or("-"));
        Node::element("tr").with_children([
            cell(Some(row.name.as_str())),
            cell(row.description.as_deref()),
            cell(row.default_value.as_deref()),
            cell(row.control.as_deref()),
        ])
    });
    Node::element("table")
        .with_attr("class", "args")
        .with_attr("data-story-id", story_id.to_string())
        .with_child(header)
        .with_children(body)
}

/// Composes docs pages from the store
pub struct DocsRenderer {
    store: Arc<StoryStore>,
    renderer: Arc<dyn Renderer>,
}

impl DocsRenderer {
    /// Create renderer
    #[must_use]
    pub fn new(store: Arc<StoryStore>, renderer: Arc<dyn Renderer>) -> Self {
        Self { store, renderer }
    }

    /// Compose the default autodocs page for a title
    ///
    /// # Errors
    /// See [`DocsRenderer::compose`].
    pub async fn autodocs(&self, title: &str) -> Result<DocsPage, DocsError> {
        self.compose(title, &default_template()).await
    }

    /// Compose a page from blocks
    ///
    /// # Errors
    /// [`DocsError::UnknownTitle`] for unregistered titles,
    /// [`DocsError::NotFound`] when a `Canvas` block names a missing story.
    pub async fn compose(&self, title: &str, blocks: &[Block]) -> Result<DocsPage, DocsError> {
        let stories = self
            .store
            .stories_for_title(title)
            .map_err(|_| DocsError::UnknownTitle(title.to_string()))?;
        let autodocs = self.store.story_index().get(&docs_id(title)).is_some();
        let listed: Vec<&Arc<PreparedStory>> = stories
            .iter()
            .filter(|s| !autodocs || s.has_tag(AUTODOCS))
            .collect();
        let primary = listed.first().copied();
        let docs = primary.map_or(Value::Null, |p| docs_parameters(p));

        let mut sections = Vec::new();
        for block in blocks {
            match block {
                Block::Title => sections.push(Section::Title {
                    text: title.rsplit('/').next().unwrap_or(title).to_string(),
                }),
                Block::Subtitle => {
                    let subtitle = docs
                        .get("subtitle")
                        .or_else(|| primary.and_then(|p| p.parameters.get("componentSubtitle")))
                        .and_then(Value::as_str);
                    if let Some(text) = subtitle {
                        sections.push(Section::Subtitle { text: text.to_string() });
                    }
                }
                Block::Description => {
                    if let Some(text) = docs.pointer("/description/component").and_then(Value::as_str) {
                        sections.push(Section::Markdown {
                            nodes: markdown::to_nodes(text),
                        });
                    }
                }
                Block::Primary => {
                    if let Some(story) = primary {
                        sections.push(Section::Story {
                            preview: self.preview(story).await,
                            primary: true,
                        });
                    }
                }
                Block::Controls => {
                    if let Some(story) = primary {
                        sections.push(Section::ArgsTable {
                            story_id: story.id.clone(),
                            rows: self.arg_rows(story),
                        });
                    }
                }
                Block::Stories => {
                    let rest: Vec<_> = listed.iter().skip(1).collect();
                    if rest.is_empty() {
                        continue;
                    }
                    sections.push(Section::Heading { text: "Stories".into() });
                    for story in rest {
                        sections.push(Section::Story {
                            preview: self.preview(story).await,
                            primary: false,
                        });
                    }
                }
                Block::Canvas(story_id) => {
                    let story = self.store.from_id(story_id)?;
                    sections.push(Section::Story {
                        preview: self.preview(&story).await,
                        primary: false,
                    });
                }
                Block::Markdown(source) => sections.push(Section::Markdown {
                    nodes: markdown::to_nodes(source),
                }),
            }
        }

        tracing::debug!(title, sections = sections.len(), "docs page composed");
        Ok(DocsPage {
            id: docs_id(title),
            title: title.to_string(),
            sections,
        })
    }

    async fn preview(&self, story: &PreparedStory) -> StoryPreview {
        let description = docs_parameters(story)
            .pointer("/description/story")
            .and_then(Value::as_str)
            .map(markdown::to_nodes)
            .unwrap_or_default();
        let mut preview = StoryPreview {
            id: story.id.clone(),
            name: story.name.clone(),
            description,
            node: None,
            error: None,
        };

        let args = self
            .store
            .args()
            .get(&story.id)
            .unwrap_or_else(|| story.initial_args.clone());
        let mut ctx = story.context(args, self.store.globals().get(), ViewMode::Docs, None, AbortSignal::new());
        let rendered = match story.load(&ctx).await {
            Ok(loaded) => {
                ctx.loaded = loaded;
                let fallback = self.renderer.default_render();
                story.render_with_decorators(&ctx, fallback.as_ref())
            }
            Err(e) => Err(e),
        };
        match rendered {
            Ok(node) => preview.node = Some(node),
            Err(e) => {
                tracing::warn!(story_id = %story.id, error = %e, "docs story failed to render");
                preview.error = Some(e.to_string());
            }
        }
        preview
    }

    fn arg_rows(&self, story: &PreparedStory) -> Vec<ArgRow> {
        let current = self.store.args().get(&story.id);
        story
            .arg_types
            .iter()
            .filter(|(_, arg_type)| arg_type.pointer("/table/disable").and_then(Value::as_bool) != Some(true))
            .map(|(name, arg_type)| ArgRow {
                name: name.clone(),
                description: arg_type
                    .get("description")
                    .and_then(Value::as_str)
                    .map(markdown::plain_text),
                type_name: arg_type
                    .pointer("/type/name")
                    .or_else(|| arg_type.get("type"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                default_value: arg_type
                    .pointer("/table/defaultValue/summary")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| story.initial_args.get(name).map(summary)),
                control: arg_type
                    .pointer("/control/type")
                    .or_else(|| arg_type.get("control"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                value: current
                    .as_ref()
                    .and_then(|args| args.get(name))
                    .or_else(|| story.initial_args.get(name))
                    .cloned(),
            })
            .collect()
    }
}

fn docs_parameters(story: &PreparedStory) -> Value {
    story.parameters.get("docs").cloned().unwrap_or(Value::Null)
}

fn summary(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl std::fmt::Debug for DocsRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocsRenderer")
            .field("renderer", &self.renderer.name())
            .finish_non_exhaustive()
    }
}
