//! Story index document
//!
//! The index is what the manager uses to build its sidebar. Serialized shape:
//! `{ "v": 5, "entries": { id: { id, title, name, importPath, type, tags } } }`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Index format version
pub const INDEX_VERSION: u32 = 5;

/// Kind of index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// A single story
    Story,
    /// A generated docs page
    Docs,
}

/// One sidebar entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    /// Story or docs id
    pub id: String,
    /// Owning title
    pub title: String,
    /// Display name
    pub name: String,
    /// Module path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_path: Option<String>,
    /// Entry kind
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    /// Resolved tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl IndexEntry {
    /// Whether this is a docs entry
    #[inline]
    #[must_use]
    pub fn is_docs(&self) -> bool {
        self.entry_type == EntryType::Docs
    }
}

/// Versioned index document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryIndex {
    /// Format version
    pub v: u32,
    /// Entries keyed by id, in registration order
    pub entries: IndexMap<String, IndexEntry>,
}

impl StoryIndex {
    /// Build from entries
    pub fn from_entries(entries: impl IntoIterator<Item = IndexEntry>) -> Self {
        Self {
            v: INDEX_VERSION,
            entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    /// Entry by id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First story entry (used when nothing is selected)
    #[must_use]
    pub fn first_story(&self) -> Option<&IndexEntry> {
        self.entries.values().find(|e| !e.is_docs())
    }
}

impl Default for StoryIndex {
    fn default() -> Self {
        Self::from_entries(Vec::new())
    }
}
