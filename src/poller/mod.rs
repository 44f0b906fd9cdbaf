//! Polling subsystem
//!
//! This module turns Burrow's hierarchical REST API into a stream of
//! records.
//!
//! # Overview
//!
//! Each poll cycle:
//! 1. Lists the clusters Burrow tracks
//! 2. Lists the consumer groups of every cluster
//! 3. Fetches the lag report of every consumer group
//! 4. Emits one record per lag report, or one failure record per failed request
//!
//! # Modules
//!
//! - [`client`]: HTTP client trait and reqwest implementation
//! - [`codec`]: JSON body decoding
//! - [`decorate`]: Record enrichment (host, type, tags, fields)
//! - [`emitter`]: Record construction and hand-off to the sink
//! - [`fetcher`]: The three-level cascading fetch
//! - [`input`]: Lifecycle wrapper combining fetcher and scheduler
//! - [`record`]: Output record type
//! - [`sink`]: Record destinations

pub mod client;
pub mod codec;
pub mod decorate;
pub mod emitter;
pub mod fetcher;
pub mod input;
pub mod record;
pub mod sink;

pub use client::{HttpClient, HttpResponse, ReqwestClient, TransportError, TransportErrorKind};
pub use codec::{Codec, JsonCodec};
pub use decorate::{Decorator, PipelineDecorator};
pub use emitter::{Emitter, FAILURE_FIELD, FAILURE_TAG};
pub use fetcher::{CascadingFetcher, CycleSummary};
pub use input::BurrowInput;
pub use record::Record;
pub use sink::{MemorySink, RecordSink};
