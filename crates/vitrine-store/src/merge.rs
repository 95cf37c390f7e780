//! Three-tier annotation merging
//!
//! Layers are given lowest precedence first (project, meta, story):
//! - [`args`]: shallow, key by key
//! - [`parameters`]: deep; objects merge recursively, everything else
//!   (arrays included) is replaced
//! - [`arg_types`]: per arg name, each declaration deep-merged

use crate::annotations::{ArgTypes, Args, Parameters};
use serde_json::{Map, Value};

/// Shallow merge, later layers win per key
#[must_use]
pub fn args(layers: &[&Args]) -> Args {
    let mut out = Args::new();
    for layer in layers {
        for (key, value) in *layer {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

/// Deep merge, later layers win; arrays are replaced, not concatenated
#[must_use]
pub fn parameters(layers: &[&Parameters]) -> Parameters {
    let mut out = Map::new();
    for layer in layers {
        merge_objects(&mut out, layer);
    }
    out
}

/// Per-key deep merge, later layers win field by field
#[must_use]
pub fn arg_types(layers: &[&ArgTypes]) -> ArgTypes {
    let mut out = ArgTypes::new();
    for layer in layers {
        for (name, declaration) in *layer {
            match out.get_mut(name) {
                Some(existing) => deep_merge_into(existing, declaration),
                None => {
                    out.insert(name.clone(), declaration.clone());
                }
            }
        }
    }
    out
}

/// Deep merge `over` into `base`
pub fn deep_merge_into(base: &mut Value, over: &Value) {
    match (base, over) {
        (Value::Object(base), Value::Object(over)) => merge_objects(base, over),
        (base, over) => *base = over.clone(),
    }
}

fn merge_objects(base: &mut Map<String, Value>, over: &Map<String, Value>) {
    for (key, value) in over {
        match base.get_mut(key) {
            Some(existing) => deep_merge_into(existing, value),
            None => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
