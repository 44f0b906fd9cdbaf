//! burrow-poller - Kafka consumer lag poller library
//!
//! This library polls a Burrow consumer-lag service and turns its
//! hierarchical REST responses into a stream of JSON records.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `request`: Endpoint normalization into validated request descriptors
//! - `schedule`: Schedule parsing and the single-worker scheduler
//! - `poller`: Cascading fetch, record emission, sinks and the input lifecycle
//! - `config`: Configuration management and validation
//! - `logging`: Tracing subscriber setup
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use burrow_poller::{BurrowInput, Config, MemorySink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/burrow.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let sink = Arc::new(MemorySink::new());
//!     let input = BurrowInput::register(&config, sink.clone())?;
//!     let summary = input.run_once().await;
//!     println!("{} records, {} failures", summary.records, summary.failures);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod poller;
pub mod request;
pub mod schedule;

// Re-export commonly used types
pub use config::Config;
pub use error::{PollerError, RecordError, Result};
pub use poller::{BurrowInput, CycleSummary, MemorySink, Record, RecordSink};
pub use request::{normalize_request, validate_request, ClientSpec, RequestDescriptor};
pub use schedule::{ScheduleDescriptor, ScheduleKind, Scheduler};
