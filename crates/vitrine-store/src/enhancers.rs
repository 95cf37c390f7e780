//! Arg and arg type enhancers
//!
//! Enhancers run once per story preparation, after the three annotation layers
//! are merged. Their output is combined with user declarations as follows:
//! - arg types: enhancer output first, declared fields deep-merged on top, so a
//!   declared field always survives
//! - args: enhancer output overrides the merged initial args key by key

use crate::annotations::{ArgTypes, Args, ComponentHandle, Parameters};
use crate::merge;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

/// Read-only view of a story being prepared
#[derive(Debug, Clone)]
pub struct EnhancerInput<'a> {
    /// Story id
    pub id: &'a str,
    /// Story title
    pub title: &'a str,
    /// Story name
    pub name: &'a str,
    /// Component, if declared
    pub component: Option<&'a ComponentHandle>,
    /// Merged parameters
    pub parameters: &'a Parameters,
    /// Merged initial args
    pub initial_args: &'a Args,
    /// Arg types accumulated so far
    pub arg_types: &'a ArgTypes,
}

/// Computes arg types for a story
pub type ArgTypesEnhancer = Arc<dyn Fn(&EnhancerInput<'_>) -> ArgTypes + Send + Sync>;

/// Computes extra initial args for a story
pub type ArgsEnhancer = Arc<dyn Fn(&EnhancerInput<'_>) -> Args + Send + Sync>;

/// Apply arg types enhancers in order
///
/// After each enhancer the declared arg types are merged back on top.
#[must_use]
pub fn apply_arg_types(
    enhancers: &[ArgTypesEnhancer],
    declared: &ArgTypes,
    input: &EnhancerInput<'_>,
) -> ArgTypes {
    let mut current = declared.clone();
    for enhancer in enhancers {
        let produced = enhancer(&EnhancerInput {
            arg_types: &current,
            ..input.clone()
        });
        current = merge::arg_types(&[&produced, declared]);
    }
    current
}

/// Apply args enhancers in order, each overriding earlier values
#[must_use]
pub fn apply_args(enhancers: &[ArgsEnhancer], initial: &Args, input: &EnhancerInput<'_>) -> Args {
    let mut current = initial.clone();
    for enhancer in enhancers {
        let produced = enhancer(&EnhancerInput {
            initial_args: &current,
            ..input.clone()
        });
        current.extend(produced);
    }
    current
}

/// JSON type name for an arg value
#[must_use]
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "other",
    }
}

/// Built-in: give every arg a `name` and a `type` inferred from its value
///
/// Arg types that already declare a type keep it.
#[must_use]
pub fn infer_arg_types(input: &EnhancerInput<'_>) -> ArgTypes {
    let mut out = input.arg_types.clone();

    for (name, value) in input.initial_args {
        out.entry(name.clone()).or_insert_with(|| json!({}));
        if let Some(Value::Object(entry)) = out.get_mut(name) {
            entry
                .entry("type")
                .or_insert_with(|| json!({ "name": type_name(value) }));
        }
    }
    for (name, entry) in &mut out {
        if let Value::Object(entry) = entry {
            entry
                .entry("name")
                .or_insert_with(|| Value::String(name.clone()));
        }
    }
    out
}

const DEFAULT_COLOR_MATCHER: &str = "(?i)(background|color)$";
const DEFAULT_DATE_MATCHER: &str = "Date$";

static COLOR: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(DEFAULT_COLOR_MATCHER).unwrap()
});

static DATE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(DEFAULT_DATE_MATCHER).unwrap()
});

/// Built-in: infer a `control` for every arg type lacking one
///
/// Order of precedence: declared `options` → `select`; name matchers from
/// `parameters.controls.matchers` (`color`, `date`); then the arg's type.
#[must_use]
pub fn infer_controls(input: &EnhancerInput<'_>) -> ArgTypes {
    let color = matcher(input.parameters, "color").unwrap_or_else(|| COLOR.clone());
    let date = matcher(input.parameters, "date").unwrap_or_else(|| DATE.clone());

    let mut out = input.arg_types.clone();
    for (name, entry) in &mut out {
        let Value::Object(entry) = entry else {
            continue;
        };
        if entry.contains_key("control") {
            continue;
        }
        let control = if entry.get("options").is_some_and(Value::is_array) {
            Some("select")
        } else if color.is_match(name) {
            Some("color")
        } else if date.is_match(name) {
            Some("date")
        } else {
            entry
                .get("type")
                .and_then(|t| t.get("name"))
                .and_then(Value::as_str)
                .and_then(control_for_type)
        };
        if let Some(control) = control {
            entry.insert("control".into(), json!({ "type": control }));
        }
    }
    out
}

fn control_for_type(type_name: &str) -> Option<&'static str> {
    match type_name {
        "boolean" => Some("boolean"),
        "number" => Some("number"),
        "string" => Some("text"),
        "object" | "array" => Some("object"),
        _ => None,
    }
}

fn matcher(parameters: &Parameters, key: &str) -> Option<Regex> {
    let pattern = parameters
        .get("controls")?
        .get("matchers")?
        .get(key)?
        .as_str()?;
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(matcher = key, pattern, error = %e, "invalid controls matcher");
            None
        }
    }
}
