//! Channel event envelope and payload cloning
//!
//! Every payload crossing the channel is a `serde_json::Value` copy. Values are
//! cloned best-effort: anything nested deeper than [`MAX_PAYLOAD_DEPTH`] is
//! replaced by a `"[Truncated]"` marker, and values that fail to serialize are
//! replaced by an `"[Unserializable: ...]"` marker instead of failing the emit.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key identifying vitrine envelopes on a shared wire
pub const CHANNEL_KEY: &str = "vitrine-channel";

/// Maximum nesting depth kept when cloning payloads
pub const MAX_PAYLOAD_DEPTH: usize = 16;

const TRUNCATED: &str = "[Truncated]";

/// A single event travelling over the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    /// Event type (see [`crate::events`])
    #[serde(rename = "type")]
    pub event_type: String,

    /// Positional arguments
    #[serde(default)]
    pub args: Vec<Value>,

    /// Name of the emitting context, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl ChannelEvent {
    /// Create new event
    #[inline]
    #[must_use]
    pub fn new(event_type: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            args,
            from: None,
        }
    }

    /// Set the emitting context
    #[inline]
    #[must_use]
    pub fn with_from(mut self, from: Option<String>) -> Self {
        self.from = from;
        self
    }

    /// First argument, if any
    #[inline]
    #[must_use]
    pub fn first_arg(&self) -> Option<&Value> {
        self.args.first()
    }

    /// Read a string field from the first argument object
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.first_arg()?.get(key)?.as_str()
    }
}

/// On-the-wire envelope used by serializing transports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// Always [`CHANNEL_KEY`]
    pub key: String,
    /// Wrapped event
    pub event: ChannelEvent,
}

impl WireEnvelope {
    /// Wrap event
    #[inline]
    #[must_use]
    pub fn new(event: ChannelEvent) -> Self {
        Self {
            key: CHANNEL_KEY.to_string(),
            event,
        }
    }

    /// Whether this envelope belongs to a vitrine channel
    #[inline]
    #[must_use]
    pub fn is_vitrine(&self) -> bool {
        self.key == CHANNEL_KEY
    }
}

/// Clone a payload, truncating anything below [`MAX_PAYLOAD_DEPTH`]
#[must_use]
pub fn structured_clone(value: &Value) -> Value {
    clone_at_depth(value, 0)
}

fn clone_at_depth(value: &Value, depth: usize) -> Value {
    if depth >= MAX_PAYLOAD_DEPTH && is_container(value) {
        return Value::String(TRUNCATED.to_string());
    }

    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| clone_at_depth(item, depth + 1))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), clone_at_depth(item, depth + 1));
            }
            Value::Object(out)
        }
        scalar => scalar.clone(),
    }
}

#[inline]
fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Convert any serializable value into a payload, never failing
///
/// Serialization errors (non-string map keys, non-finite floats inside
/// custom serializers, ...) produce an `"[Unserializable: ...]"` marker.
pub fn to_payload<T: Serialize + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => structured_clone(&v),
        Err(e) => {
            tracing::debug!(error = %e, "payload replaced by unserializable marker");
            Value::String(format!("[Unserializable: {e}]"))
        }
    }
}
