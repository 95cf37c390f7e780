//! Story ids and display names
//!
//! An id is `sanitize(title) + "--" + sanitize(export)`. Ids are stable across
//! reloads as long as the title and export key do not change.

use crate::error::ConfigurationError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Separator between the title part and the story part of an id
pub const ID_SEPARATOR: &str = "--";

static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"[^\p{L}\p{N}]+").unwrap()
});

/// Story identifier
pub type StoryId = String;

/// Lowercase and collapse runs of non-alphanumeric characters into one `-`
///
/// Leading and trailing separators are trimmed, so the result never starts or
/// ends with `-` and never contains `--`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    let lowered = input.to_lowercase();
    NON_ALPHANUMERIC
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Build a story id from a title and an export key
///
/// # Errors
/// [`ConfigurationError::InvalidTitle`] if the title sanitizes to nothing,
/// [`ConfigurationError::InvalidStoryName`] if the export key does.
pub fn to_id(title: &str, export: &str) -> Result<StoryId, ConfigurationError> {
    let prefix = sanitize(title);
    if prefix.is_empty() {
        return Err(ConfigurationError::InvalidTitle {
            title: title.to_string(),
        });
    }
    let suffix = sanitize(export);
    if suffix.is_empty() {
        return Err(ConfigurationError::InvalidStoryName {
            title: title.to_string(),
            export: export.to_string(),
        });
    }
    Ok(format!("{prefix}{ID_SEPARATOR}{suffix}"))
}

/// Convert an export key to start case: `primaryButton` → `Primary Button`
///
/// Words are split on `_`, `-`, whitespace, lower→upper transitions and
/// letter/digit transitions.
#[must_use]
pub fn story_name_from_export(export: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev: Option<char> = None;

    for c in export.chars() {
        if !c.is_alphanumeric() {
            flush(&mut words, &mut current);
            prev = None;
            continue;
        }
        if let Some(p) = prev {
            let boundary = (p.is_lowercase() && c.is_uppercase())
                || (p.is_alphabetic() && c.is_numeric())
                || (p.is_numeric() && c.is_alphabetic());
            if boundary {
                flush(&mut words, &mut current);
            }
        }
        current.push(c);
        prev = Some(c);
    }
    flush(&mut words, &mut current);

    words
        .iter()
        .map(|w| capitalize(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn flush(words: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        words.push(std::mem::take(current));
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
