//! Current args per story
//!
//! Args are seeded from a story's initial args the first time it is rendered
//! and survive re-renders and navigation. `null` in an update removes the key.

use crate::annotations::Args;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Mutable args, keyed by story id
#[derive(Debug, Default)]
pub struct ArgsStore {
    by_story: RwLock<HashMap<String, Args>>,
}

impl ArgsStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a story's args unless already present
    pub fn set_initial(&self, story_id: &str, initial: &Args) {
        self.by_story
            .write()
            .entry(story_id.to_string())
            .or_insert_with(|| initial.clone());
    }

    /// Current args
    #[must_use]
    pub fn get(&self, story_id: &str) -> Option<Args> {
        self.by_story.read().get(story_id).cloned()
    }

    /// Whether args are tracked for a story
    #[must_use]
    pub fn contains(&self, story_id: &str) -> bool {
        self.by_story.read().contains_key(story_id)
    }

    /// Shallow-merge an update; returns the new args
    pub fn update(&self, story_id: &str, updated: &Args) -> Args {
        let mut by_story = self.by_story.write();
        let args = by_story.entry(story_id.to_string()).or_default();
        for (key, value) in updated {
            if value.is_null() {
                args.remove(key);
            } else {
                args.insert(key.clone(), value.clone());
            }
        }
        tracing::debug!(story_id, keys = updated.len(), "args updated");
        args.clone()
    }

    /// Restore initial values for the given keys, or all keys when `None`
    pub fn reset(&self, story_id: &str, initial: &Args, arg_names: Option<&[String]>) -> Args {
        let mut by_story = self.by_story.write();
        let args = by_story.entry(story_id.to_string()).or_default();
        match arg_names {
            None => *args = initial.clone(),
            Some(names) => {
                for name in names {
                    match initial.get(name) {
                        Some(value) => {
                            args.insert(name.clone(), value.clone());
                        }
                        None => {
                            args.remove(name);
                        }
                    }
                }
            }
        }
        tracing::debug!(story_id, "args reset");
        args.clone()
    }

    /// After a reload: reset a story whose initial args changed
    ///
    /// Returns `true` when a reset happened.
    pub fn reset_on_initial_change(&self, story_id: &str, previous: &Args, next: &Args) -> bool {
        if previous == next || !self.contains(story_id) {
            return false;
        }
        self.reset(story_id, next, None);
        true
    }

    /// Forget a story
    pub fn remove(&self, story_id: &str) {
        self.by_story.write().remove(story_id);
    }
}

/// Keys whose value differs from the initial one
#[must_use]
pub fn changed_keys(current: &Args, initial: &Args) -> Vec<String> {
    let mut keys: Vec<String> = current
        .iter()
        .filter(|(k, v)| initial.get(*k) != Some(*v))
        .map(|(k, _)| k.clone())
        .collect();
    keys.extend(
        initial
            .keys()
            .filter(|k| !current.contains_key(*k))
            .cloned(),
    );
    keys
}
