//! Burrow input lifecycle
//!
//! [`BurrowInput`] ties configuration, the fetcher and the scheduler
//! together. `register` validates everything up front, so a running input
//! can only fail per branch, never as a whole.

use crate::config::{ensure_api_version, Config};
use crate::error::PollerError;
use crate::poller::client::{HttpClient, ReqwestClient};
use crate::poller::codec::{codec_for_name, Codec};
use crate::poller::decorate::{Decorator, PipelineDecorator};
use crate::poller::emitter::Emitter;
use crate::poller::fetcher::{CascadingFetcher, CycleSummary};
use crate::poller::sink::RecordSink;
use crate::request::{normalize_request, RequestDescriptor};
use crate::schedule::{ScheduleDescriptor, Scheduler};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, info_span, Instrument};

/// A registered Burrow input.
///
/// # Examples
///
/// ```no_run
/// use burrow_poller::config::Config;
/// use burrow_poller::poller::{BurrowInput, MemorySink};
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let sink = Arc::new(MemorySink::new());
/// let mut input = BurrowInput::register(&Config::default(), sink.clone())?;
/// input.run()?;
/// input.stop();
/// input.join().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BurrowInput {
    request: RequestDescriptor,
    schedule: ScheduleDescriptor,
    fetcher: Arc<CascadingFetcher>,
    scheduler: Scheduler,
    cycles: Arc<AtomicU64>,
}

impl BurrowInput {
    /// Validate `config` and build an input with the default HTTP client and
    /// decorator.
    ///
    /// # Errors
    ///
    /// Returns `PollerError::Config` for any invalid setting, and
    /// `PollerError::Http` if the HTTP client cannot be built.
    pub fn register(config: &Config, sink: Arc<dyn RecordSink>) -> Result<Self, PollerError> {
        let client = Arc::new(ReqwestClient::new(&config.http)?);
        let decorator = Arc::new(PipelineDecorator::from_config(config)?);
        Self::with_parts(config, client, decorator, sink)
    }

    /// Build an input from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns `PollerError::Config` for an unsupported API version or codec,
    /// a malformed schedule, or an invalid endpoint specification.
    pub fn with_parts(
        config: &Config,
        client: Arc<dyn HttpClient>,
        decorator: Arc<dyn Decorator>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, PollerError> {
        ensure_api_version(&config.api_version)?;
        let codec: Arc<dyn Codec> = Arc::from(codec_for_name(&config.codec)?);
        let schedule = ScheduleDescriptor::from_map(&config.schedule)?;
        let request = normalize_request(&config.client_config, &config.api_version)?;

        let emitter = Emitter::new(codec, decorator, sink);
        let fetcher = CascadingFetcher::new(client, emitter, config.http.max_concurrent_requests);

        info!(url = %request.url(), schedule = %schedule, "Registered Burrow input");

        Ok(Self {
            request,
            schedule,
            fetcher: Arc::new(fetcher),
            scheduler: Scheduler::new(),
            cycles: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Run a single poll cycle now, outside the schedule.
    pub async fn run_once(&self) -> CycleSummary {
        run_cycle(&self.fetcher, &self.request, &self.cycles).await
    }

    /// Start polling on the configured schedule.
    ///
    /// # Errors
    ///
    /// Returns `PollerError::Config` if the input is already running or has
    /// been stopped.
    pub fn run(&mut self) -> Result<(), PollerError> {
        let fetcher = self.fetcher.clone();
        let request = self.request.clone();
        let cycles = self.cycles.clone();

        self.scheduler.start(self.schedule.clone(), move || {
            let fetcher = fetcher.clone();
            let request = request.clone();
            let cycles = cycles.clone();
            async move {
                run_cycle(&fetcher, &request, &cycles).await;
            }
        })
    }

    /// Stop scheduling new cycles. A cycle in progress runs to completion.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Wait for the scheduler to wind down after [`BurrowInput::stop`].
    pub async fn join(&mut self) {
        self.scheduler.join().await;
    }

    /// Whether the scheduler is still active
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// The normalized base request
    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    /// The validated schedule
    pub fn schedule(&self) -> &ScheduleDescriptor {
        &self.schedule
    }

    /// Number of cycles started so far
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }
}

async fn run_cycle(
    fetcher: &CascadingFetcher,
    request: &RequestDescriptor,
    cycles: &AtomicU64,
) -> CycleSummary {
    let cycle = cycles.fetch_add(1, Ordering::SeqCst) + 1;
    let span = info_span!("poll_cycle", cycle);

    async {
        let summary = fetcher.poll(request).await;
        info!(
            clusters = summary.clusters,
            consumers = summary.consumers,
            records = summary.records,
            failures = summary.failures,
            "Poll cycle complete"
        );
        summary
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poller::sink::MemorySink;
    use crate::request::ClientSpec;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_register_with_defaults() {
        let input = BurrowInput::register(&Config::default(), Arc::new(MemorySink::new())).unwrap();
        assert_eq!(input.request().url().as_str(), "http://localhost:8000/v3/kafka");
        assert_eq!(input.schedule().to_string(), "every 30s");
        assert!(!input.is_running());
        assert_eq!(input.cycles(), 0);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_api_version() {
        let config = Config {
            api_version: "v2".to_string(),
            ..Config::default()
        };
        let result = BurrowInput::register(&config, Arc::new(MemorySink::new()));
        assert!(matches!(result, Err(PollerError::Config(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_schedule() {
        let config = Config {
            schedule: BTreeMap::from([
                ("every".to_string(), "1s".to_string()),
                ("cron".to_string(), "* * * * *".to_string()),
            ]),
            ..Config::default()
        };
        let result = BurrowInput::register(&config, Arc::new(MemorySink::new()));
        assert!(matches!(result, Err(PollerError::Config(_))));
    }

    #[tokio::test]
    async fn test_register_rejects_relative_url() {
        let config = Config {
            client_config: ClientSpec::Url("not a url".to_string()),
            ..Config::default()
        };
        let result = BurrowInput::register(&config, Arc::new(MemorySink::new()));
        assert!(matches!(result, Err(PollerError::Config(_))));
    }

    #[tokio::test]
    async fn test_stop_before_run_is_harmless() {
        let mut input =
            BurrowInput::register(&Config::default(), Arc::new(MemorySink::new())).unwrap();
        input.stop();
        input.join().await;
        assert!(input.run().is_err());
    }
}
