//! Three-level cascading fetch
//!
//! One poll cycle walks Burrow's hierarchy:
//!
//! ```text
//! GET {base}                                  -> {"clusters": [...]}
//! GET {base}/{cluster}/consumer               -> {"consumers": [...]}
//! GET {base}/{cluster}/consumer/{group}/lag   -> lag report, emitted as a record
//! ```
//!
//! Each branch is an awaited pipeline of its own. A failed request emits one
//! failure record and ends only its own branch; an empty or missing list ends
//! a branch silently. Discovery levels never emit records. Nothing is retried:
//! the next scheduled cycle starts over from the top.

use crate::poller::client::{HttpClient, HttpResponse, TransportError};
use crate::poller::codec::string_list;
use crate::poller::emitter::Emitter;
use crate::request::RequestDescriptor;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Counters for one poll cycle, or one branch of it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Clusters discovered
    pub clusters: usize,
    /// Consumer groups discovered, across all clusters
    pub consumers: usize,
    /// Lag records handed to the sink
    pub records: usize,
    /// Failure records emitted
    pub failures: usize,
}

impl CycleSummary {
    /// Add another summary's counters to this one
    pub fn merge(&mut self, other: CycleSummary) {
        self.clusters += other.clusters;
        self.consumers += other.consumers;
        self.records += other.records;
        self.failures += other.failures;
    }
}

/// Runs poll cycles against one Burrow endpoint.
pub struct CascadingFetcher {
    client: Arc<dyn HttpClient>,
    emitter: Emitter,
    permits: Semaphore,
}

impl std::fmt::Debug for CascadingFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadingFetcher")
            .field("emitter", &self.emitter)
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl CascadingFetcher {
    /// Create a fetcher allowing at most `max_concurrent` requests in flight.
    pub fn new(client: Arc<dyn HttpClient>, emitter: Emitter, max_concurrent: usize) -> Self {
        Self {
            client,
            emitter,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }

    /// Run one complete poll cycle from `base`.
    ///
    /// Never fails: every problem is reported as a failure record or a log
    /// line, and the returned summary counts what reached the sink.
    pub async fn poll(&self, base: &RequestDescriptor) -> CycleSummary {
        let started = Instant::now();
        let mut summary = CycleSummary::default();

        let Some(clusters) = self.discover(base, "clusters", started, &mut summary).await else {
            return summary;
        };
        summary.clusters = clusters.len();

        let branches = clusters
            .iter()
            .map(|cluster| self.poll_cluster(base, cluster, started));
        for branch in join_all(branches).await {
            summary.merge(branch);
        }

        debug!(
            clusters = summary.clusters,
            consumers = summary.consumers,
            records = summary.records,
            failures = summary.failures,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Poll cycle finished"
        );
        summary
    }

    async fn poll_cluster(
        &self,
        base: &RequestDescriptor,
        cluster: &str,
        started: Instant,
    ) -> CycleSummary {
        let mut summary = CycleSummary::default();
        let request = base.consumers(cluster);

        let Some(consumers) = self
            .discover(&request, "consumers", started, &mut summary)
            .await
        else {
            return summary;
        };
        summary.consumers = consumers.len();

        let leaves = consumers
            .iter()
            .map(|consumer| self.poll_lag(base.lag(cluster, consumer), started));
        for leaf in join_all(leaves).await {
            summary.merge(leaf);
        }

        summary
    }

    async fn poll_lag(&self, request: RequestDescriptor, started: Instant) -> CycleSummary {
        let mut summary = CycleSummary::default();
        match self.fetch(&request).await {
            Ok(response) => {
                summary.records = self.emitter.emit_success(&request, &response.body);
            }
            Err(e) => self.report_failure(&request, &e, started, &mut summary),
        }
        summary
    }

    /// Fetch a discovery level and extract the names listed under `key`.
    ///
    /// Returns `None` when the branch ends here: the request failed, the body
    /// was empty or undecodable, or the list was empty.
    async fn discover(
        &self,
        request: &RequestDescriptor,
        key: &str,
        started: Instant,
        summary: &mut CycleSummary,
    ) -> Option<Vec<String>> {
        let response = match self.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                self.report_failure(request, &e, started, summary);
                return None;
            }
        };

        let objects = match self.emitter.codec().decode(&response.body) {
            Ok(objects) => objects,
            Err(e) => {
                warn!(url = %request.url(), error = %e, "Dropping branch with undecodable {}", key);
                return None;
            }
        };

        let names = string_list(&objects, key);
        if names.is_empty() {
            debug!(url = %request.url(), "No {} listed", key);
            return None;
        }

        debug!(url = %request.url(), ?names, "Discovered {}", key);
        Some(names)
    }

    async fn fetch(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
        // The semaphore is never closed; a missing permit only lifts the limit.
        let _permit = self.permits.acquire().await.ok();
        self.client.get(request).await
    }

    fn report_failure(
        &self,
        request: &RequestDescriptor,
        error: &TransportError,
        started: Instant,
        summary: &mut CycleSummary,
    ) {
        let elapsed = started.elapsed();
        warn!(
            url = %request.url(),
            error = %error,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request failed"
        );
        if self.emitter.emit_failure(request, error, elapsed) {
            summary.failures += 1;
        }
    }
}
