//! Input shapes and coercions shared by the capability modules.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::fetch::FetchError;

/// Input for actions that take no arguments.
#[derive(Debug, Default, Deserialize)]
pub struct NoInput {}

/// Accepts `7`, `7.0` and `"7"` for integer identifiers; models are loose
/// about numeric types.
pub fn flexible_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    coerce_i64(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("expected an integer, got {value}")))
}

pub fn flexible_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => coerce_i64(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("expected an integer, got {value}"))),
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number.as_f64().filter(|float| float.fract() == 0.0).map(|float| float as i64)
        }),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// A label given either by name or as `{ "name": ... }`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LabelInput {
    Name(String),
    Object { name: String },
}

impl LabelInput {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Name(name) | Self::Object { name } => json!({ "name": name }),
        }
    }
}

/// Builds a JSON object from optional fields, dropping the `None`s.
pub fn compact_object<I>(fields: I) -> Value
where
    I: IntoIterator<Item = (&'static str, Option<Value>)>,
{
    let map: Map<String, Value> = fields
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
        .collect();
    Value::Object(map)
}

/// Dashboard reads never fail outward: a backend error yields the empty value.
pub fn degrade<T: Default>(module: &str, read: &str, result: Result<T, FetchError>) -> T {
    result.unwrap_or_else(|error| {
        warn!(
            event_name = "integrations.read.failed",
            module,
            read,
            error = %error,
            "dashboard read failed; returning empty result"
        );
        T::default()
    })
}

/// Decodes a backend payload into a typed record.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(|error| FetchError::Decode(error.to_string()))
}

pub fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// First `limit` characters, with `...` appended when anything was cut.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
