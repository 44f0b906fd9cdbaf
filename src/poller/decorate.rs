//! Record decoration
//!
//! Every successful record passes through a [`Decorator`] before it reaches
//! the sink. The standard [`PipelineDecorator`] stamps the host name and the
//! configured `type`, `tags` and `add_field` values.

use crate::config::Config;
use crate::error::{PollerError, RecordError};
use crate::poller::record::Record;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Hook that enriches a record before emission.
pub trait Decorator: Send + Sync {
    /// Enrich `record` in place.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::Emission` if the record cannot be decorated.
    fn decorate(&self, record: &mut Record) -> Result<(), RecordError>;
}

/// Adds host and pipeline metadata.
///
/// - `host` and `type` are set only when the record does not already carry them
/// - tags are appended
/// - `add_field` values support `%{field}` references to existing fields; a
///   field that already exists is turned into an array holding both values
#[derive(Debug, Clone, Default)]
pub struct PipelineDecorator {
    host: Option<String>,
    record_type: Option<String>,
    tags: Vec<String>,
    add_field: BTreeMap<String, String>,
}

impl PipelineDecorator {
    /// Decorator with nothing configured
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration, using the local host name
    ///
    /// # Errors
    ///
    /// Returns `PollerError::Config` if a tag or `add_field` template has an
    /// unterminated `%{` reference.
    pub fn from_config(config: &Config) -> Result<Self, PollerError> {
        validate_templates(&config.tags, &config.add_field)?;
        Ok(Self {
            host: Some(hostname()),
            record_type: config.record_type.clone(),
            tags: config.tags.clone(),
            add_field: config.add_field.clone(),
        })
    }

    /// Set the host name
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the record type
    pub fn with_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Append a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add a field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_field.insert(key.into(), value.into());
        self
    }
}

impl Decorator for PipelineDecorator {
    fn decorate(&self, record: &mut Record) -> Result<(), RecordError> {
        if let Some(host) = &self.host {
            if !record.contains("host") {
                record.set("host", JsonValue::String(host.clone()));
            }
        }

        if let Some(record_type) = &self.record_type {
            if !record.contains("type") {
                record.set("type", JsonValue::String(record_type.clone()));
            }
        }

        for tag in &self.tags {
            record.add_tag(interpolate(tag, record)?);
        }

        for (key, template) in &self.add_field {
            let key = interpolate(key, record)?;
            let value = JsonValue::String(interpolate(template, record)?);
            let merged = match record.get(&key) {
                None => value,
                Some(JsonValue::Array(existing)) => {
                    let mut items = existing.clone();
                    items.push(value);
                    JsonValue::Array(items)
                }
                Some(existing) => JsonValue::Array(vec![existing.clone(), value]),
            };
            record.set(key, merged);
        }

        Ok(())
    }
}

/// Replace `%{field}` references with the field's value.
///
/// Strings are inserted verbatim, other values as JSON. Unknown fields are
/// left as written.
fn interpolate(template: &str, record: &Record) -> Result<String, RecordError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(RecordError::Emission(format!(
                "unterminated field reference in '{}'",
                template
            )));
        };
        let name = &after[..end];
        match record.get(name) {
            Some(JsonValue::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => {
                out.push_str("%{");
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// Check that every `%{` in the tag and `add_field` templates is closed.
///
/// # Errors
///
/// Returns `PollerError::Config` naming the first malformed template.
pub fn validate_templates(
    tags: &[String],
    add_field: &BTreeMap<String, String>,
) -> Result<(), PollerError> {
    let templates = tags
        .iter()
        .chain(add_field.iter().flat_map(|(key, value)| [key, value]));
    for template in templates {
        interpolate(template, &Record::new())
            .map_err(|e| PollerError::Config(format!("Invalid template: {}", e)))?;
    }
    Ok(())
}

/// Local host name, falling back to `HOSTNAME` and then `localhost`.
pub fn hostname() -> String {
    os_hostname()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(unix)]
fn os_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes; gethostname writes at most that many.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..len].to_vec()).ok()
}

#[cfg(not(unix))]
fn os_hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
