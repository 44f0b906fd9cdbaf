use burrow_poller::error::RecordError;
use burrow_poller::poller::{
    BurrowInput, Decorator, MemorySink, PipelineDecorator, Record, ReqwestClient,
};
use burrow_poller::Config;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Decorator that counts invocations and delegates to a pipeline decorator.
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingDecorator {
    calls: AtomicUsize,
    inner: PipelineDecorator,
}

impl CountingDecorator {
    #[allow(dead_code)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decorator for CountingDecorator {
    fn decorate(&self, record: &mut Record) -> Result<(), RecordError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.decorate(record)
    }
}

/// Serve `body` as JSON for `GET {route}`.
#[allow(dead_code)]
pub async fn mount_json(server: &MockServer, route: &str, body: JsonValue) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Answer `GET {route}` with a bare status code.
#[allow(dead_code)]
pub async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Parse a configuration, pointing `client_config` at `base_url`.
#[allow(dead_code)]
pub fn config_for(base_url: &str, extra: &str) -> Config {
    let yaml = format!("client_config: \"{}\"\n{}", base_url, extra);
    Config::from_yaml(&yaml).expect("valid test config")
}

/// Build an input wired to a memory sink and a counting decorator.
#[allow(dead_code)]
pub fn build_input(config: &Config) -> (BurrowInput, Arc<MemorySink>, Arc<CountingDecorator>) {
    let sink = Arc::new(MemorySink::new());
    let decorator = Arc::new(CountingDecorator::default());
    let client = Arc::new(ReqwestClient::new(&config.http).expect("http client"));
    let input = BurrowInput::with_parts(config, client, decorator.clone(), sink.clone())
        .expect("valid input");
    (input, sink, decorator)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("burrow.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
