//! Title derivation from module paths
//!
//! `./src/components/Button/Button.stories.rs` with the specifier
//! `{ directory: "./src", title_prefix: "Design" }` becomes
//! `Design/components/Button`.

use serde::{Deserialize, Serialize};

/// Where stories live and how their titles are prefixed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoriesSpecifier {
    /// Directory, relative to the project root
    pub directory: String,
    /// Prefix prepended to derived titles
    #[serde(default)]
    pub title_prefix: String,
}

impl StoriesSpecifier {
    /// Create specifier for a directory
    #[must_use]
    pub fn new(directory: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            title_prefix: String::new(),
        }
    }

    /// Set title prefix
    #[must_use]
    pub fn with_title_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.title_prefix = prefix.into();
        self
    }

    fn relative<'p>(&self, path: &'p str) -> Option<&'p str> {
        let dir = normalize(&self.directory);
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() {
            return Some(path);
        }
        path.strip_prefix(dir)?.strip_prefix('/')
    }
}

/// Derive a title for a module path
///
/// With no specifiers the whole path is used. Returns `None` when no specifier
/// matches or the result is empty.
#[must_use]
pub fn derive_title(import_path: &str, specifiers: &[StoriesSpecifier]) -> Option<String> {
    let path = normalize(import_path);
    if specifiers.is_empty() {
        return title_from(&path, "");
    }
    specifiers
        .iter()
        .find_map(|spec| spec.relative(&path).map(|rel| (spec, rel)))
        .and_then(|(spec, rel)| title_from(rel, &spec.title_prefix))
}

fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.trim_start_matches("./").to_string()
}

fn title_from(relative: &str, prefix: &str) -> Option<String> {
    let mut segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();
    let file = segments.pop()?;
    let stem = strip_story_suffix(file);
    if stem != "index" {
        segments.push(stem);
    }
    if segments.len() >= 2 && segments[segments.len() - 1] == segments[segments.len() - 2] {
        segments.pop();
    }

    let mut parts: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
    parts.extend(segments);
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

fn strip_story_suffix(file: &str) -> &str {
    for marker in [".stories.", ".story."] {
        if let Some(idx) = file.find(marker) {
            return &file[..idx];
        }
    }
    file.rsplit_once('.').map_or(file, |(stem, _)| stem)
}
