//! Declarative doc blocks

use serde::{Deserialize, Serialize};

/// One building block of a docs page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Block {
    /// Last segment of the title
    Title,
    /// `parameters.docs.subtitle` (or `componentSubtitle`)
    Subtitle,
    /// `parameters.docs.description.component`, as markdown
    Description,
    /// First story of the title, rendered
    Primary,
    /// Args table of the primary story
    Controls,
    /// Every other story, with its own description
    Stories,
    /// One story by id
    Canvas(String),
    /// Free markdown
    Markdown(String),
}

/// Blocks of the generated autodocs page
#[must_use]
pub fn default_template() -> Vec<Block> {
    vec![
        Block::Title,
        Block::Subtitle,
        Block::Description,
        Block::Primary,
        Block::Controls,
        Block::Stories,
    ]
}
