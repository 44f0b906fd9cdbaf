//! Configuration management for burrow-poller
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{PollerError, Result};
use crate::poller::{codec, decorate};
use crate::request::{normalize_request, ClientSpec, StructuredSpec};
use crate::schedule::ScheduleDescriptor;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The only Burrow API version this crate speaks
pub const SUPPORTED_API_VERSION: &str = "v3";

/// Main configuration structure
///
/// Mirrors the YAML configuration file. Everything here is read once at
/// startup and never changes afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Burrow endpoint: a base URL or a mapping with url/headers/credentials
    pub client_config: ClientSpec,

    /// Burrow API version (only `v3` is supported)
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Poll schedule: exactly one of `cron`, `every`, `at`, `in`
    #[serde(default = "default_schedule", deserialize_with = "deserialize_schedule")]
    pub schedule: BTreeMap<String, String>,

    /// Response codec (only `json` is supported)
    #[serde(default = "default_codec")]
    pub codec: String,

    /// Value written to the `type` field of each record, if not already set
    #[serde(default, rename = "type")]
    pub record_type: Option<String>,

    /// Tags appended to each record
    #[serde(default)]
    pub tags: Vec<String>,

    /// Fields added to each record
    #[serde(default)]
    pub add_field: BTreeMap<String, String>,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Total timeout for one request (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for establishing a connection (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum idle pooled connections per host
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Maximum requests in flight at once within one poll cycle
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// User-Agent header
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Proxy URL applied to all requests
    #[serde(default)]
    pub proxy: Option<String>,

    /// PEM file with an extra trusted CA certificate
    #[serde(default)]
    pub cacert: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or an EnvFilter directive
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON-formatted logs
    #[serde(default)]
    pub json_format: bool,

    /// Log file path (if None, STDERR only)
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

/// Reject any Burrow API version other than [`SUPPORTED_API_VERSION`].
///
/// # Errors
///
/// Returns `PollerError::Config` for an unsupported version.
pub fn ensure_api_version(version: &str) -> std::result::Result<(), PollerError> {
    if version != SUPPORTED_API_VERSION {
        return Err(PollerError::Config(format!(
            "at the moment only Burrow API version {} is supported, got '{}'",
            SUPPORTED_API_VERSION, version
        )));
    }
    Ok(())
}

fn default_api_version() -> String {
    SUPPORTED_API_VERSION.to_string()
}

fn default_schedule() -> BTreeMap<String, String> {
    BTreeMap::from([("every".to_string(), "30s".to_string())])
}

fn default_codec() -> String {
    "json".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_pool_max_idle() -> usize {
    50
}

fn default_max_concurrent_requests() -> usize {
    8
}

fn default_user_agent() -> String {
    format!("burrow-poller/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Schedule values may be written as YAML numbers (`in: 10`); keep them as text.
fn deserialize_schedule<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, JsonValue>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| match value {
            JsonValue::String(s) => Ok((key, s)),
            JsonValue::Number(n) => Ok((key, n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "schedule value for '{}' must be a string, got {}",
                key, other
            ))),
        })
        .collect()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            pool_max_idle_per_host: default_pool_max_idle(),
            max_concurrent_requests: default_max_concurrent_requests(),
            user_agent: default_user_agent(),
            proxy: None,
            cacert: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_config: ClientSpec::Url("http://localhost:8000".to_string()),
            api_version: default_api_version(),
            schedule: default_schedule(),
            codec: default_codec(),
            record_type: None,
            tags: Vec::new(),
            add_field: BTreeMap::new(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parse configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns `PollerError::Config` if the file cannot be read or parsed
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PollerError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns `PollerError::Config` if the text is not a valid configuration
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| PollerError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(url) = std::env::var("BURROW_URL") {
            match &mut self.client_config {
                ClientSpec::Url(current) => *current = url.clone(),
                ClientSpec::Structured(spec) => spec.url = Some(url.clone()),
            }
            tracing::debug!(url = %url, "Env override: BURROW_URL");
        }

        let user = std::env::var("BURROW_USER").ok();
        let password = std::env::var("BURROW_PASSWORD").ok();
        if user.is_some() || password.is_some() {
            self.override_credentials(user, password);
            tracing::debug!("Env override: BURROW_USER/BURROW_PASSWORD");
        }

        if let Ok(version) = std::env::var("BURROW_API_VERSION") {
            tracing::debug!(api_version = %version, "Env override: BURROW_API_VERSION");
            self.api_version = version;
        }

        if let Ok(every) = std::env::var("BURROW_SCHEDULE_EVERY") {
            tracing::debug!(every = %every, "Env override: BURROW_SCHEDULE_EVERY");
            self.schedule = BTreeMap::from([("every".to_string(), every)]);
        }

        if let Ok(cron) = std::env::var("BURROW_SCHEDULE_CRON") {
            tracing::debug!(cron = %cron, "Env override: BURROW_SCHEDULE_CRON");
            self.schedule = BTreeMap::from([("cron".to_string(), cron)]);
        }

        if let Ok(timeout) = std::env::var("BURROW_REQUEST_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(v) => {
                    self.http.request_timeout_secs = v;
                    tracing::debug!(
                        request_timeout_secs = v,
                        "Env override: BURROW_REQUEST_TIMEOUT_SECS"
                    );
                }
                Err(_) => {
                    tracing::warn!("Invalid value for BURROW_REQUEST_TIMEOUT_SECS: {}", timeout);
                }
            }
        }

        if let Ok(level) = std::env::var("BURROW_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(json_logs) = std::env::var("BURROW_JSON_LOGS") {
            match json_logs.parse::<bool>() {
                Ok(v) => self.logging.json_format = v,
                Err(_) => {
                    tracing::warn!("Invalid value for BURROW_JSON_LOGS: {}", json_logs);
                }
            }
        }

        if let Ok(log_file) = std::env::var("BURROW_LOG_FILE") {
            self.logging.file_path = Some(PathBuf::from(log_file));
        }
    }

    /// Attach credentials, promoting a bare URL to a structured spec.
    fn override_credentials(&mut self, user: Option<String>, password: Option<String>) {
        let placeholder = ClientSpec::Url(String::new());
        let mut spec = match std::mem::replace(&mut self.client_config, placeholder) {
            ClientSpec::Url(url) => StructuredSpec {
                url: Some(url),
                ..StructuredSpec::default()
            },
            ClientSpec::Structured(spec) => spec,
        };
        if user.is_some() {
            spec.user = user;
        }
        if password.is_some() {
            spec.password = password;
        }
        self.client_config = ClientSpec::Structured(spec);
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Validate the configuration
    ///
    /// Checks the API version, codec, schedule shape, HTTP timeouts, and
    /// normalizes the endpoint specification.
    ///
    /// # Errors
    ///
    /// Returns `PollerError::Config` if any validation check fails
    pub fn validate(&self) -> Result<()> {
        ensure_api_version(&self.api_version)?;
        codec::codec_for_name(&self.codec)?;
        ScheduleDescriptor::from_map(&self.schedule)?;
        normalize_request(&self.client_config, &self.api_version)?;
        decorate::validate_templates(&self.tags, &self.add_field)?;

        if self.http.request_timeout_secs == 0 {
            return Err(PollerError::Config(
                "http.request_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.http.connect_timeout_secs == 0 {
            return Err(PollerError::Config(
                "http.connect_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.http.max_concurrent_requests == 0 {
            return Err(PollerError::Config(
                "http.max_concurrent_requests must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_version, "v3");
        assert_eq!(config.codec, "json");
        assert_eq!(config.schedule.get("every").map(String::as_str), Some("30s"));
        assert_eq!(config.http.request_timeout_secs, 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation_success() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_unsupported_api_version() {
        let config = Config {
            api_version: "v2".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_unsupported_codec() {
        let config = Config {
            codec: "plain".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_schedule() {
        let config = Config {
            schedule: BTreeMap::from([
                ("every".to_string(), "30s".to_string()),
                ("cron".to_string(), "* * * * *".to_string()),
            ]),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_unterminated_template() {
        let config = Config {
            add_field: BTreeMap::from([("env".to_string(), "%{oops".to_string())]),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unterminated field reference"));

        let config = Config {
            tags: vec!["lag-%{cluster".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.http.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml_with_bare_url() {
        let yaml = r#"
client_config: "http://burrow.internal:8000"
schedule:
  cron: "* * * * * UTC"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(
            config.client_config,
            ClientSpec::Url("http://burrow.internal:8000".to_string())
        );
        assert_eq!(
            config.schedule.get("cron").map(String::as_str),
            Some("* * * * * UTC")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_yaml_with_structured_spec() {
        let yaml = r#"
client_config:
  url: "http://burrow.internal:8000"
  headers:
    X-Team: data
  user: monitor
  password: secret
type: burrow
tags: [lag, kafka]
add_field:
  env: prod
http:
  request_timeout_secs: 5
logging:
  level: debug
  json_format: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        match &config.client_config {
            ClientSpec::Structured(spec) => {
                assert_eq!(spec.url.as_deref(), Some("http://burrow.internal:8000"));
                assert_eq!(spec.headers.get("X-Team").map(String::as_str), Some("data"));
                assert_eq!(spec.user.as_deref(), Some("monitor"));
            }
            other => panic!("expected structured spec, got {:?}", other),
        }
        assert_eq!(config.record_type.as_deref(), Some("burrow"));
        assert_eq!(config.tags, vec!["lag".to_string(), "kafka".to_string()]);
        assert_eq!(config.http.request_timeout_secs, 5);
        assert_eq!(config.http.connect_timeout_secs, 10);
        assert!(config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_numeric_schedule_value_is_kept_as_text() {
        let yaml = r#"
client_config: "http://localhost:8000"
schedule:
  in: 10
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.schedule.get("in").map(String::as_str), Some("10"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_client_config_fails_to_parse() {
        let yaml = "api_version: v3\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_invalid_client_config_shape_fails_to_parse() {
        let yaml = "client_config: 42\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_half_credentials_fail_validation() {
        let yaml = r#"
client_config:
  url: "http://localhost:8000"
  user: monitor
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_missing_is_error() {
        assert!(Config::from_file("/nonexistent/burrow.yaml").is_err());
    }

    #[test]
    fn test_from_file_reads_yaml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("burrow.yaml");
        std::fs::write(&path, "client_config: \"http://localhost:9000\"\n").unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(
            config.client_config,
            ClientSpec::Url("http://localhost:9000".to_string())
        );
    }

    #[test]
    fn test_credential_override_keeps_url() {
        let mut config = Config::default();
        config.override_credentials(Some("monitor".to_string()), None);
        match &config.client_config {
            ClientSpec::Structured(spec) => {
                assert_eq!(spec.url.as_deref(), Some("http://localhost:8000"));
                assert_eq!(spec.user.as_deref(), Some("monitor"));
            }
            other => panic!("expected structured spec, got {:?}", other),
        }
    }

    #[test]
    #[ignore = "modifies global environment variables"]
    fn test_apply_env_vars_overrides_endpoint() {
        // NOTE: This test mutates global environment variables. Run with:
        // `cargo test -- --ignored --test-threads=1`
        std::env::set_var("BURROW_URL", "http://env-burrow:8000");
        std::env::set_var("BURROW_USER", "env-user");
        std::env::set_var("BURROW_PASSWORD", "env-pass");
        std::env::set_var("BURROW_SCHEDULE_EVERY", "1m");
        std::env::set_var("BURROW_REQUEST_TIMEOUT_SECS", "not-a-number");

        let mut config = Config::default();
        config.apply_env_vars();

        match &config.client_config {
            ClientSpec::Structured(spec) => {
                assert_eq!(spec.url.as_deref(), Some("http://env-burrow:8000"));
                assert_eq!(spec.user.as_deref(), Some("env-user"));
                assert_eq!(spec.password.as_deref(), Some("env-pass"));
            }
            other => panic!("expected structured spec, got {:?}", other),
        }
        assert_eq!(config.schedule.get("every").map(String::as_str), Some("1m"));
        assert_eq!(config.http.request_timeout_secs, 60);

        std::env::remove_var("BURROW_URL");
        std::env::remove_var("BURROW_USER");
        std::env::remove_var("BURROW_PASSWORD");
        std::env::remove_var("BURROW_SCHEDULE_EVERY");
        std::env::remove_var("BURROW_REQUEST_TIMEOUT_SECS");
    }
}
