//! Tag inheritance and filtering
//!
//! Tags are folded project → meta → story. A plain `t` (re)adds `t`, `!t`
//! removes it; the last write per tag name wins and the result keeps insertion
//! order.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Tag that turns on generated docs for a module
pub const AUTODOCS: &str = "autodocs";

/// Tag included by the default filter
pub const DEV: &str = "dev";

/// Fold tag layers, lowest precedence first
#[must_use]
pub fn combine<S: AsRef<str>>(layers: &[&[S]]) -> Vec<String> {
    let mut tags: IndexSet<String> = IndexSet::new();
    for layer in layers {
        for tag in *layer {
            let tag = tag.as_ref();
            match tag.strip_prefix('!') {
                Some(removed) => {
                    tags.shift_remove(removed);
                }
                None => {
                    tags.shift_remove(tag);
                    tags.insert(tag.to_string());
                }
            }
        }
    }
    tags.into_iter().collect()
}

/// Include/exclude filter applied to index entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagFilter {
    /// An entry needs at least one of these (empty = no requirement)
    pub include: Vec<String>,
    /// An entry with any of these is dropped
    pub exclude: Vec<String>,
}

impl Default for TagFilter {
    fn default() -> Self {
        Self {
            include: vec![DEV.to_string()],
            exclude: Vec::new(),
        }
    }
}

impl TagFilter {
    /// Filter that keeps everything
    #[must_use]
    pub fn all() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Add required tag
    #[must_use]
    pub fn with_include(mut self, tag: impl Into<String>) -> Self {
        self.include.push(tag.into());
        self
    }

    /// Add excluded tag
    #[must_use]
    pub fn with_exclude(mut self, tag: impl Into<String>) -> Self {
        self.exclude.push(tag.into());
        self
    }

    /// Whether a tag list passes
    #[must_use]
    pub fn matches<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        let has = |wanted: &String| tags.iter().any(|t| t.as_ref() == wanted);
        let included = self.include.is_empty() || self.include.iter().any(has);
        included && !self.exclude.iter().any(has)
    }
}
