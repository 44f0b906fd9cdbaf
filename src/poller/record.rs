//! Output records
//!
//! A [`Record`] is the unit handed to a sink: a flat JSON object with a
//! timestamp, a version marker, arbitrary fields and a tag list. It
//! serializes to one JSON object per record, with `@timestamp` and
//! `@version` alongside the payload fields.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

const TIMESTAMP_FIELD: &str = "@timestamp";
const VERSION_FIELD: &str = "@version";
const TAGS_FIELD: &str = "tags";

/// Tag added when a payload `@timestamp` cannot be parsed
pub const TIMESTAMP_FAILURE_TAG: &str = "_timestampparsefailure";
/// Tag added when a payload `tags` value is not a string or string list
pub const TAGS_FAILURE_TAG: &str = "_tagsparsefailure";

/// A single emitted record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    #[serde(rename = "@timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "@version")]
    version: String,
    #[serde(flatten)]
    fields: Map<String, JsonValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

impl Record {
    /// An empty record stamped with the current time
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            version: "1".to_string(),
            fields: Map::new(),
            tags: Vec::new(),
        }
    }

    /// Build a record from a decoded JSON object.
    ///
    /// A parseable `@timestamp` replaces the generated one, `@version` is
    /// dropped, and a `tags` string or array of strings becomes the record's
    /// tags. Reserved keys that do not parse are kept under an underscored
    /// name with a parse-failure tag, so every key is written once.
    pub fn from_fields(fields: Map<String, JsonValue>) -> Self {
        let mut record = Self::new();
        for (key, value) in fields {
            record.set(key, value);
        }
        record
    }

    /// Record timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.fields.get(key)
    }

    /// Whether a field is present
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Set a field, replacing any previous value.
    ///
    /// `@timestamp`, `@version` and `tags` are routed to the record's own
    /// slots rather than the payload; tags are appended.
    pub fn set(&mut self, key: impl Into<String>, value: JsonValue) {
        let key = key.into();
        match key.as_str() {
            TIMESTAMP_FIELD => self.set_timestamp(value),
            VERSION_FIELD => {}
            TAGS_FIELD => self.set_tags(value),
            _ => {
                self.fields.insert(key, value);
            }
        }
    }

    fn set_timestamp(&mut self, value: JsonValue) {
        let parsed = value
            .as_str()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok());
        match parsed {
            Some(parsed) => self.timestamp = parsed.with_timezone(&Utc),
            None => {
                self.fields.insert(format!("_{}", TIMESTAMP_FIELD), value);
                self.add_tag(TIMESTAMP_FAILURE_TAG);
            }
        }
    }

    fn set_tags(&mut self, value: JsonValue) {
        let tags = match &value {
            JsonValue::String(tag) => Some(vec![tag.clone()]),
            JsonValue::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>(),
            _ => None,
        };
        match tags {
            Some(tags) => tags.into_iter().for_each(|tag| self.add_tag(tag)),
            None => {
                self.fields.insert(format!("_{}", TAGS_FIELD), value);
                self.add_tag(TAGS_FAILURE_TAG);
            }
        }
    }

    /// All payload fields
    pub fn fields(&self) -> &Map<String, JsonValue> {
        &self.fields
    }

    /// Tags attached to the record
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Whether the record carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Add a tag unless already present
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.has_tag(&tag) {
            self.tags.push(tag);
        }
    }

    /// Serialize as a single JSON line (no trailing newline)
    ///
    /// # Errors
    ///
    /// Returns the serializer error if a field cannot be encoded
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
