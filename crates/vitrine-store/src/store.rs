//! The story store
//!
//! Holds every registered module keyed by title, the project annotations, a
//! cache of prepared stories and the args/globals stores.
//!
//! - Registration validates titles and ids and rejects duplicates.
//! - Re-adding a title replaces it in place; other titles keep their position.
//! - Prepared stories are built on first request and cached until their module
//!   is replaced or the project annotations change.

use crate::annotations::{ModuleExports, ProjectAnnotations};
use crate::args::ArgsStore;
use crate::error::{ConfigurationError, NotFoundError};
use crate::globals::GlobalsStore;
use crate::id::{self, sanitize, story_name_from_export, StoryId, ID_SEPARATOR};
use crate::index::{EntryType, IndexEntry, StoryIndex};
use crate::prepared::{prepare, CsfFile, NormalizedStory, PreparedStory};
use crate::tags::{self, TagFilter, AUTODOCS};
use crate::title::{derive_title, StoriesSpecifier};
use indexmap::IndexMap;
use moka::sync::Cache;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Default prepared story cache capacity
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Name of generated docs entries
pub const DOCS_ENTRY_NAME: &str = "Docs";

/// Store configuration
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Specifiers used to derive titles from paths
    pub specifiers: Vec<StoriesSpecifier>,
    /// Filter applied to story index entries
    pub tag_filter: TagFilter,
    /// Prepared story cache capacity (0 = default)
    pub cache_capacity: u64,
}

impl StoreOptions {
    /// Set specifiers
    #[must_use]
    pub fn with_specifiers(mut self, specifiers: Vec<StoriesSpecifier>) -> Self {
        self.specifiers = specifiers;
        self
    }

    /// Set tag filter
    #[must_use]
    pub fn with_tag_filter(mut self, filter: TagFilter) -> Self {
        self.tag_filter = filter;
        self
    }
}

/// What a successful [`StoryStore::add`] changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleAdded {
    /// Resolved title
    pub title: String,
    /// Story ids in export order
    pub story_ids: Vec<StoryId>,
    /// Ids that existed under this title before and are gone now
    pub removed: Vec<StoryId>,
    /// Whether an existing module was replaced
    pub replaced: bool,
}

#[derive(Default)]
struct Registry {
    files: IndexMap<String, Arc<CsfFile>>,
    owners: HashMap<StoryId, String>,
}

/// Normalized registry of stories
pub struct StoryStore {
    project: RwLock<Arc<ProjectAnnotations>>,
    options: StoreOptions,
    registry: RwLock<Registry>,
    prepared: Cache<StoryId, Arc<PreparedStory>>,
    args: ArgsStore,
    globals: GlobalsStore,
}

impl StoryStore {
    /// Create store with default options
    #[must_use]
    pub fn new(project: ProjectAnnotations) -> Self {
        Self::with_options(project, StoreOptions::default())
    }

    /// Create store with options
    #[must_use]
    pub fn with_options(project: ProjectAnnotations, options: StoreOptions) -> Self {
        let capacity = if options.cache_capacity == 0 {
            DEFAULT_CACHE_CAPACITY
        } else {
            options.cache_capacity
        };
        let globals = GlobalsStore::new(&project.initial_globals, &project.global_types);
        Self {
            project: RwLock::new(Arc::new(project)),
            options,
            registry: RwLock::new(Registry::default()),
            prepared: Cache::new(capacity),
            args: ArgsStore::new(),
            globals,
        }
    }

    /// Current project annotations
    #[must_use]
    pub fn project(&self) -> Arc<ProjectAnnotations> {
        Arc::clone(&self.project.read())
    }

    /// Replace project annotations; every prepared story is invalidated
    pub fn set_project_annotations(&self, project: ProjectAnnotations) {
        self.globals
            .set(&project.initial_globals, &project.global_types);
        *self.project.write() = Arc::new(project);
        self.prepared.invalidate_all();
        tracing::info!("project annotations replaced");
    }

    /// Args store
    #[inline]
    #[must_use]
    pub fn args(&self) -> &ArgsStore {
        &self.args
    }

    /// Globals store
    #[inline]
    #[must_use]
    pub fn globals(&self) -> &GlobalsStore {
        &self.globals
    }

    /// Tag filter applied to the index
    #[inline]
    #[must_use]
    pub fn tag_filter(&self) -> &TagFilter {
        &self.options.tag_filter
    }

    /// Register a module, or replace the module with the same title
    ///
    /// # Errors
    /// [`ConfigurationError`] when no title can be resolved, the title or an
    /// export key produces an empty id, or a story or docs id is already owned
    /// by another title.
    pub fn add(&self, exports: ModuleExports) -> Result<ModuleAdded, ConfigurationError> {
        let ModuleExports {
            import_path,
            default: meta,
            stories,
        } = exports;

        let title = self.resolve_title(meta.title.as_deref(), import_path.as_deref())?;
        if sanitize(&title).is_empty() {
            return Err(ConfigurationError::InvalidTitle { title });
        }

        let mut normalized = IndexMap::new();
        for (export, definition) in stories {
            let story_id = id::to_id(&title, &export)?;
            if normalized.contains_key(&story_id) {
                return Err(ConfigurationError::duplicate(&story_id, &title, &title));
            }
            let annotations = definition.into_annotations();
            let name = annotations
                .name
                .clone()
                .unwrap_or_else(|| story_name_from_export(&export));
            normalized.insert(
                story_id.clone(),
                NormalizedStory {
                    id: story_id,
                    name,
                    export_name: export,
                    annotations,
                },
            );
        }
        let docs_entry = self.has_autodocs(&meta.tags).then(|| docs_id(&title));
        if let Some(docs_id) = &docs_entry {
            if normalized.contains_key(docs_id) {
                return Err(ConfigurationError::duplicate(docs_id, &title, &title));
            }
        }

        let csf = Arc::new(CsfFile {
            title: title.clone(),
            import_path,
            meta,
            stories: normalized,
        });

        let mut registry = self.registry.write();
        for story_id in csf.stories.keys().chain(&docs_entry) {
            if let Some(owner) = registry.owners.get(story_id) {
                if *owner != title {
                    return Err(ConfigurationError::duplicate(story_id, owner, &title));
                }
            }
        }

        let previous = registry.files.insert(title.clone(), Arc::clone(&csf));
        let mut removed = Vec::new();
        if let Some(previous) = &previous {
            for old_id in previous.stories.keys() {
                self.prepared.invalidate(old_id);
                if !csf.stories.contains_key(old_id) {
                    self.args.remove(old_id);
                    removed.push(old_id.clone());
                }
            }
        }
        registry.owners.retain(|_, owner| *owner != title);
        for story_id in csf.stories.keys().chain(&docs_entry) {
            registry.owners.insert(story_id.clone(), title.clone());
        }
        drop(registry);

        let story_ids: Vec<StoryId> = csf.stories.keys().cloned().collect();
        tracing::info!(
            title = %title,
            stories = story_ids.len(),
            replaced = previous.is_some(),
            "module registered"
        );

        Ok(ModuleAdded {
            title,
            story_ids,
            removed,
            replaced: previous.is_some(),
        })
    }

    /// Remove a module by title; returns the ids it owned
    pub fn remove(&self, title: &str) -> Vec<StoryId> {
        let mut registry = self.registry.write();
        let Some(csf) = registry.files.shift_remove(title) else {
            return Vec::new();
        };
        let ids: Vec<StoryId> = csf.stories.keys().cloned().collect();
        registry.owners.retain(|_, owner| owner.as_str() != title);
        for story_id in &ids {
            self.prepared.invalidate(story_id);
            self.args.remove(story_id);
        }
        tracing::info!(title, stories = ids.len(), "module removed");
        ids
    }

    /// Registered titles in registration order
    #[must_use]
    pub fn titles(&self) -> Vec<String> {
        self.registry.read().files.keys().cloned().collect()
    }

    /// Registered module by title
    #[must_use]
    pub fn csf_file(&self, title: &str) -> Option<Arc<CsfFile>> {
        self.registry.read().files.get(title).cloned()
    }

    /// Whether a story id is registered
    #[must_use]
    pub fn contains(&self, story_id: &str) -> bool {
        self.registry.read().owners.contains_key(story_id)
    }

    /// Prepared story by id, built and cached on first request
    ///
    /// # Errors
    /// [`NotFoundError`] if no module registers the id.
    pub fn from_id(&self, story_id: &str) -> Result<Arc<PreparedStory>, NotFoundError> {
        if let Some(prepared) = self.prepared.get(story_id) {
            return Ok(prepared);
        }

        let csf = {
            let registry = self.registry.read();
            registry
                .owners
                .get(story_id)
                .and_then(|title| registry.files.get(title))
                .cloned()
                .ok_or_else(|| NotFoundError::new(story_id))?
        };
        let story = csf
            .stories
            .get(story_id)
            .ok_or_else(|| NotFoundError::new(story_id))?;

        let prepared = Arc::new(prepare(&self.project(), &csf, story));
        self.prepared
            .insert(story_id.to_string(), Arc::clone(&prepared));
        Ok(prepared)
    }

    /// Every prepared story of a title, in export order
    ///
    /// # Errors
    /// [`NotFoundError`] if the title is unknown.
    pub fn stories_for_title(&self, title: &str) -> Result<Vec<Arc<PreparedStory>>, NotFoundError> {
        let csf = self
            .csf_file(title)
            .ok_or_else(|| NotFoundError::new(title))?;
        csf.stories.keys().map(|id| self.from_id(id)).collect()
    }

    /// Lazy sequence of index entries
    ///
    /// Story entries failing the tag filter are skipped; docs entries always
    /// pass. The sequence reflects the registry at the time of the call.
    pub fn story_index_entries(&self) -> impl Iterator<Item = IndexEntry> {
        let files: Vec<Arc<CsfFile>> = self.registry.read().files.values().cloned().collect();
        let project = self.project();
        let filter = self.options.tag_filter.clone();

        files.into_iter().flat_map(move |csf| {
            let meta_tags = tags::combine(&[&project.tags[..], &csf.meta.tags[..]]);
            let docs = meta_tags.iter().any(|t| t == AUTODOCS).then(|| IndexEntry {
                id: docs_id(&csf.title),
                title: csf.title.clone(),
                name: DOCS_ENTRY_NAME.to_string(),
                import_path: csf.import_path.clone(),
                entry_type: EntryType::Docs,
                tags: meta_tags.clone(),
            });

            let stories: Vec<IndexEntry> = csf
                .stories
                .values()
                .filter_map(|story| {
                    let story_tags = tags::combine(&[&meta_tags[..], &story.annotations.tags[..]]);
                    filter.matches(&story_tags).then(|| IndexEntry {
                        id: story.id.clone(),
                        title: csf.title.clone(),
                        name: story.name.clone(),
                        import_path: csf.import_path.clone(),
                        entry_type: EntryType::Story,
                        tags: story_tags,
                    })
                })
                .collect();

            docs.into_iter().chain(stories)
        })
    }

    /// Full index document
    #[must_use]
    pub fn story_index(&self) -> StoryIndex {
        StoryIndex::from_entries(self.story_index_entries())
    }

    /// Number of cached prepared stories
    #[must_use]
    pub fn prepared_count(&self) -> u64 {
        self.prepared.run_pending_tasks();
        self.prepared.entry_count()
    }

    fn resolve_title(
        &self,
        explicit: Option<&str>,
        import_path: Option<&str>,
    ) -> Result<String, ConfigurationError> {
        if let Some(title) = explicit {
            return Ok(title.to_string());
        }
        import_path
            .and_then(|path| derive_title(path, &self.options.specifiers))
            .ok_or_else(|| ConfigurationError::MissingTitle {
                import_path: import_path.map(str::to_string),
            })
    }

    fn has_autodocs(&self, meta_tags: &[String]) -> bool {
        let project = self.project.read();
        tags::combine(&[&project.tags[..], meta_tags])
            .iter()
            .any(|t| t == AUTODOCS)
    }
}

/// Id of the generated docs entry for a title
#[must_use]
pub fn docs_id(title: &str) -> String {
    format!("{}{ID_SEPARATOR}docs", sanitize(title))
}

impl std::fmt::Debug for StoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("StoryStore")
            .field("titles", &registry.files.len())
            .field("stories", &registry.owners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{MetaAnnotations, StoryAnnotations};
    use serde_json::json;

    fn button(title: &str) -> ModuleExports {
        ModuleExports::new(MetaAnnotations::titled(title))
            .story("Primary", StoryAnnotations::new().with_args(json!({ "primary": true })))
            .story("Secondary", StoryAnnotations::new())
    }

    #[test]
    fn add_returns_ids_in_export_order() {
        let store = StoryStore::new(ProjectAnnotations::new());
        let added = store.add(button("Example/Button")).unwrap();
        assert_eq!(
            added.story_ids,
            vec!["example-button--primary", "example-button--secondary"]
        );
        assert!(!added.replaced);
    }

    #[test]
    fn prepared_stories_are_cached() {
        let store = StoryStore::new(ProjectAnnotations::new());
        store.add(button("Example/Button")).unwrap();

        let a = store.from_id("example-button--primary").unwrap();
        let b = store.from_id("example-button--primary").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn project_change_invalidates_cache() {
        let store = StoryStore::new(ProjectAnnotations::new());
        store.add(button("Example/Button")).unwrap();
        let before = store.from_id("example-button--primary").unwrap();

        store.set_project_annotations(ProjectAnnotations::new().with_args(json!({ "theme": "dark" })));
        let after = store.from_id("example-button--primary").unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.initial_args["theme"], json!("dark"));
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = StoryStore::new(ProjectAnnotations::new());
        let err = store.from_id("nope--nothing").unwrap_err();
        assert_eq!(err.story_id, "nope--nothing");
    }

    #[test]
    fn remove_forgets_module() {
        let store = StoryStore::new(ProjectAnnotations::new());
        store.add(button("Example/Button")).unwrap();
        let removed = store.remove("Example/Button");
        assert_eq!(removed.len(), 2);
        assert!(!store.contains("example-button--primary"));
        assert!(store.remove("Example/Button").is_empty());
    }
}
