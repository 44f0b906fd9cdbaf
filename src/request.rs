//! Request normalization for the Burrow endpoint
//!
//! Turns the user-supplied `client_config` (a bare URL or a structured
//! mapping with headers and credentials) into a [`RequestDescriptor`]: an
//! absolute URL pointing at `{base}/{api_version}/kafka` plus a typed option
//! bag. Validation happens here once, so the fetcher never has to look at
//! option shapes again.
//!
//! # Example
//!
//! ```
//! use burrow_poller::request::{normalize_request, ClientSpec};
//!
//! let spec = ClientSpec::Url("http://localhost:8000".to_string());
//! let request = normalize_request(&spec, "v3").unwrap();
//! assert_eq!(request.url().as_str(), "http://localhost:8000/v3/kafka");
//! ```

use crate::error::PollerError;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Placeholder written instead of the password whenever a request is logged
/// or embedded in a record.
pub const REDACTED: &str = "[REDACTED]";

/// Nested credentials as written in older configurations
/// (`auth: {user: .., password: ..}`).
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSpec {
    /// User name
    #[serde(default)]
    pub user: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for AuthSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSpec")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .finish()
    }
}

/// Structured endpoint specification.
///
/// Flat `user`/`password` keys are the preferred form and take precedence
/// over the nested `auth` block. `method` is accepted and ignored: every
/// request this crate makes is a GET.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuredSpec {
    /// Base URL of the Burrow service
    #[serde(default)]
    pub url: Option<String>,
    /// HTTP method (discarded)
    #[serde(default)]
    pub method: Option<String>,
    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Nested credentials
    #[serde(default)]
    pub auth: Option<AuthSpec>,
    /// User name
    #[serde(default)]
    pub user: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for StructuredSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredSpec")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("auth", &self.auth)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .finish()
    }
}

/// Raw endpoint specification as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "JsonValue")]
pub enum ClientSpec {
    /// A bare base URL
    Url(String),
    /// A mapping with `url` and optional headers/credentials
    Structured(StructuredSpec),
}

impl TryFrom<JsonValue> for ClientSpec {
    type Error = PollerError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::String(url) => Ok(ClientSpec::Url(url)),
            JsonValue::Object(_) => serde_json::from_value(value)
                .map(ClientSpec::Structured)
                .map_err(|e| PollerError::Config(format!("Invalid request spec: {}", e))),
            other => Err(PollerError::Config(format!(
                "Invalid URL or request spec: '{}', expected a String or Mapping!",
                other
            ))),
        }
    }
}

/// Credentials attached to every request.
///
/// `eager` means the credentials are sent preemptively instead of waiting
/// for a `401` challenge.
#[derive(Clone, PartialEq, Eq)]
pub struct Auth {
    /// User name
    pub user: String,
    /// Password
    pub pass: String,
    /// Send credentials without waiting for a challenge
    pub eager: bool,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("user", &self.user)
            .field("pass", &REDACTED)
            .field("eager", &self.eager)
            .finish()
    }
}

/// Options applied to every request derived from the base descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Extra headers
    pub headers: BTreeMap<String, String>,
    /// Optional credentials
    pub auth: Option<Auth>,
}

/// A validated request: absolute URL plus options.
///
/// The URL always carries a path (never `cannot-be-a-base`), so sub-paths can
/// be appended with [`RequestDescriptor::consumers`] and
/// [`RequestDescriptor::lag`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    url: Url,
    options: RequestOptions,
}

impl RequestDescriptor {
    /// Returns the request URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the request options
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// `{base}/{cluster}/consumer`, sharing this descriptor's options.
    pub fn consumers(&self, cluster: &str) -> Self {
        self.child(&[cluster, "consumer"])
    }

    /// `{base}/{cluster}/consumer/{consumer}/lag`, sharing this descriptor's options.
    pub fn lag(&self, cluster: &str, consumer: &str) -> Self {
        self.child(&[cluster, "consumer", consumer, "lag"])
    }

    fn child(&self, segments: &[&str]) -> Self {
        let mut url = self.url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        Self {
            url,
            options: self.options.clone(),
        }
    }
}

/// Normalize a raw endpoint specification into a [`RequestDescriptor`].
///
/// The API path `{api_version}/kafka` is appended to the base URL, inserting
/// a `/` only when the base does not already end with one.
///
/// # Errors
///
/// Returns `PollerError::Config` when the URL is missing or not absolute, or
/// when only one half of the `user`/`password` pair is given.
pub fn normalize_request(
    spec: &ClientSpec,
    api_version: &str,
) -> Result<RequestDescriptor, PollerError> {
    let request = match spec {
        ClientSpec::Url(base) => RequestDescriptor {
            url: api_url(base, api_version)?,
            options: RequestOptions::default(),
        },
        ClientSpec::Structured(structured) => {
            let base = structured
                .url
                .as_deref()
                .filter(|url| is_absolute_url(url))
                .ok_or_else(|| {
                    PollerError::Config(format!(
                        "Invalid URL {}",
                        structured.url.as_deref().unwrap_or("<none>")
                    ))
                })?;

            let nested = structured.auth.as_ref();
            let user = structured
                .user
                .clone()
                .or_else(|| nested.and_then(|a| a.user.clone()));
            let password = structured
                .password
                .clone()
                .or_else(|| nested.and_then(|a| a.password.clone()));

            let auth = match (user, password) {
                (Some(user), Some(pass)) => Some(Auth {
                    user,
                    pass,
                    eager: true,
                }),
                (None, None) => None,
                _ => {
                    return Err(PollerError::Config(
                        "'user' and 'password' must both be specified for the burrow input!"
                            .to_string(),
                    ))
                }
            };

            RequestDescriptor {
                url: api_url(base, api_version)?,
                options: RequestOptions {
                    headers: structured.headers.clone(),
                    auth,
                },
            }
        }
    };

    validate_request(&request)?;
    Ok(request)
}

/// Re-check a descriptor independently of how it was built.
///
/// # Errors
///
/// Returns `PollerError::Config` if the URL is not an absolute hierarchical
/// URL, or if an auth block has an empty user or password.
pub fn validate_request(request: &RequestDescriptor) -> Result<(), PollerError> {
    if !is_absolute_url(request.url.as_str()) {
        return Err(PollerError::Config(format!("Invalid URL {}", request.url)));
    }

    if let Some(auth) = &request.options.auth {
        if auth.user.is_empty() {
            return Err(PollerError::Config(
                "Auth was specified, but 'user' was not!".to_string(),
            ));
        }
        if auth.pass.is_empty() {
            return Err(PollerError::Config(
                "Auth was specified, but 'password' was not!".to_string(),
            ));
        }
    }

    Ok(())
}

/// Flatten a request into a mapping for logs and failure records.
///
/// Options are merged with the URL under the `url` key. Headers are omitted
/// when empty and the password is always redacted.
pub fn structure_request(request: &RequestDescriptor) -> Map<String, JsonValue> {
    let mut map = Map::new();

    if !request.options.headers.is_empty() {
        let headers = request
            .options
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
            .collect();
        map.insert("headers".to_string(), JsonValue::Object(headers));
    }

    if let Some(auth) = &request.options.auth {
        map.insert(
            "auth".to_string(),
            serde_json::json!({
                "user": auth.user,
                "pass": REDACTED,
                "eager": auth.eager,
            }),
        );
    }

    map.insert(
        "url".to_string(),
        JsonValue::String(request.url.as_str().to_string()),
    );
    map
}

fn api_url(base: &str, api_version: &str) -> Result<Url, PollerError> {
    let separator = if base.ends_with('/') { "" } else { "/" };
    let joined = format!("{}{}{}/kafka", base, separator, api_version);
    Url::parse(&joined)
        .ok()
        .filter(|url| !url.cannot_be_a_base())
        .ok_or_else(|| PollerError::Config(format!("Invalid URL {}", joined)))
}

fn is_absolute_url(candidate: &str) -> bool {
    Url::parse(candidate)
        .map(|url| !url.cannot_be_a_base() && url.has_host())
        .unwrap_or(false)
}
