//! Response body decoding
//!
//! Burrow answers with JSON. The codec is streaming in the sense that one
//! body may decode to zero, one or several objects: whitespace-only bodies
//! yield nothing, a top-level array yields one object per element, and
//! concatenated documents yield one object per document.

use crate::error::{PollerError, RecordError};
use serde_json::{Map, Value as JsonValue};

/// A decoded JSON object
pub type JsonObject = Map<String, JsonValue>;

/// Decodes a response body into zero or more JSON objects.
pub trait Codec: Send + Sync {
    /// Codec name as written in configuration
    fn name(&self) -> &'static str;

    /// Decode `body`.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Decode` if the body is malformed or contains
    /// something other than JSON objects.
    fn decode(&self, body: &[u8]) -> Result<Vec<JsonObject>, RecordError>;
}

/// JSON codec
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, body: &[u8]) -> Result<Vec<JsonObject>, RecordError> {
        let mut objects = Vec::new();

        for value in serde_json::Deserializer::from_slice(body).into_iter::<JsonValue>() {
            match value.map_err(|e| RecordError::Decode(e.to_string()))? {
                JsonValue::Object(object) => objects.push(object),
                JsonValue::Array(items) => {
                    for item in items {
                        match item {
                            JsonValue::Object(object) => objects.push(object),
                            other => return Err(not_an_object(&other)),
                        }
                    }
                }
                other => return Err(not_an_object(&other)),
            }
        }

        Ok(objects)
    }
}

fn not_an_object(value: &JsonValue) -> RecordError {
    let kind = match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a nested array",
        JsonValue::Object(_) => "an object",
    };
    RecordError::Decode(format!("expected a JSON object, got {}", kind))
}

/// Look up a codec by its configured name.
///
/// # Errors
///
/// Returns `PollerError::Config` for anything but `json`.
pub fn codec_for_name(name: &str) -> Result<Box<dyn Codec>, PollerError> {
    match name {
        "json" => Ok(Box::new(JsonCodec)),
        other => Err(PollerError::Config(format!(
            "this plugin needs codec to be json, got '{}'",
            other
        ))),
    }
}

/// Collect the string entries of `key` across decoded objects.
///
/// A missing key or a non-array value contributes nothing. Non-string
/// entries are skipped.
pub fn string_list(objects: &[JsonObject], key: &str) -> Vec<String> {
    objects
        .iter()
        .filter_map(|object| object.get(key).and_then(JsonValue::as_array))
        .flatten()
        .filter_map(|entry| entry.as_str().map(str::to_string))
        .collect()
}
