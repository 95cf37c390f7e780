//! Project-wide globals
//!
//! Seeded from `initial_globals` with `global_types[*].defaultValue` filling
//! any gaps. Updates to keys that are neither declared nor initial are applied
//! but reported.

use crate::annotations::{GlobalTypes, Globals};
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct GlobalsState {
    initial: Globals,
    current: Globals,
    declared: GlobalTypes,
}

/// Current globals
#[derive(Debug, Default)]
pub struct GlobalsStore {
    state: RwLock<GlobalsState>,
}

impl GlobalsStore {
    /// Create store from project declarations
    #[must_use]
    pub fn new(initial_globals: &Globals, global_types: &GlobalTypes) -> Self {
        let store = Self::default();
        store.set(initial_globals, global_types);
        store
    }

    /// Replace declarations, keeping current values of still-known keys
    pub fn set(&self, initial_globals: &Globals, global_types: &GlobalTypes) {
        let mut initial = initial_globals.clone();
        for (name, declaration) in global_types {
            if initial.contains_key(name) {
                continue;
            }
            if let Some(default) = declaration.get("defaultValue") {
                initial.insert(name.clone(), default.clone());
            }
        }

        let mut state = self.state.write();
        let mut current = initial.clone();
        for (name, value) in &state.current {
            if initial.contains_key(name) || global_types.contains_key(name) {
                current.insert(name.clone(), value.clone());
            }
        }
        state.initial = initial;
        state.current = current;
        state.declared = global_types.clone();
    }

    /// Current values
    #[must_use]
    pub fn get(&self) -> Globals {
        self.state.read().current.clone()
    }

    /// Declarations
    #[must_use]
    pub fn global_types(&self) -> GlobalTypes {
        self.state.read().declared.clone()
    }

    /// Merge new values in; returns the result
    pub fn update(&self, new_globals: &Globals) -> Globals {
        let mut state = self.state.write();
        for (name, value) in new_globals {
            if !state.initial.contains_key(name) && !state.declared.contains_key(name) {
                tracing::warn!(global = %name, "updating an undeclared global");
            }
            state.current.insert(name.clone(), value.clone());
        }
        state.current.clone()
    }

    /// Restore initial values
    pub fn reset(&self) -> Globals {
        let mut state = self.state.write();
        state.current = state.initial.clone();
        state.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::{declarations, object};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    #[test]
    fn seeded_from_initial_and_defaults() {
        let store = GlobalsStore::new(
            &object(json!({ "theme": "light" })),
            &declarations(json!({
                "theme": { "defaultValue": "dark" },
                "locale": { "defaultValue": "en" },
                "grid": {}
            })),
        );
        assert_eq!(Value::Object(store.get()), json!({ "theme": "light", "locale": "en" }));
    }

    #[test]
    fn update_and_reset() {
        let store = GlobalsStore::new(&object(json!({ "theme": "light" })), &GlobalTypes::new());
        let updated = store.update(&object(json!({ "theme": "dark", "undeclared": 1 })));
        assert_eq!(updated["theme"], json!("dark"));
        assert_eq!(updated["undeclared"], json!(1));

        let reset = store.reset();
        assert_eq!(Value::Object(reset), json!({ "theme": "light" }));
    }

    #[test]
    fn redeclaring_keeps_known_values() {
        let types = declarations(json!({ "theme": { "defaultValue": "light" } }));
        let store = GlobalsStore::new(&Globals::new(), &types);
        store.update(&object(json!({ "theme": "dark", "stale": true })));

        store.set(&Globals::new(), &types);

        assert_eq!(Value::Object(store.get()), json!({ "theme": "dark" }));
    }
}
