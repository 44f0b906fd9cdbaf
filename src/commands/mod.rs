/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `run`  : Poll on the configured schedule until interrupted
- `once` : Run a single poll cycle
- `check`: Validate configuration and show the normalized request

Records are written as JSON lines, either to STDOUT or appended to a file.
*/

use crate::config::Config;
use crate::error::{PollerError, Result};
use crate::poller::{BurrowInput, Record};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long to wait for an in-flight cycle and the writer after shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Drain `records` into `output` (or STDOUT) as JSON lines.
///
/// Returns the number of records written once every sender is dropped.
///
/// # Errors
///
/// Returns an error if the output file cannot be opened or written.
pub async fn write_records(
    mut records: mpsc::UnboundedReceiver<Record>,
    output: Option<PathBuf>,
) -> Result<usize> {
    let mut writer: Box<dyn AsyncWrite + Unpin + Send> = match &output {
        Some(path) => Box::new(
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(PollerError::Io)?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let mut written = 0;
    while let Some(record) = records.recv().await {
        let mut line = record.to_json_line().map_err(PollerError::Serialization)?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(PollerError::Io)?;
        writer.flush().await.map_err(PollerError::Io)?;
        written += 1;
    }

    Ok(written)
}

fn spawn_writer(
    output: Option<PathBuf>,
) -> (mpsc::UnboundedSender<Record>, JoinHandle<Result<usize>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, tokio::spawn(write_records(rx, output)))
}

async fn finish_writer(writer: JoinHandle<Result<usize>>) -> Result<usize> {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, writer).await {
        Ok(joined) => joined?,
        Err(_) => {
            tracing::warn!("Record writer did not finish before the shutdown timeout");
            Ok(0)
        }
    }
}

// Scheduled polling
pub mod r#run {
    use super::*;
    use tokio::signal;

    /// Poll on the configured schedule until Ctrl-C or the schedule ends.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `output` - Optional file to append records to
    pub async fn run_poller(config: Config, output: Option<PathBuf>) -> Result<()> {
        let (tx, writer) = spawn_writer(output);
        let mut input = BurrowInput::register(&config, Arc::new(tx))?;
        input.run()?;

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
            }
            _ = input.join() => {
                tracing::info!("Schedule has no further runs");
            }
        }

        input.stop();
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, input.join())
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
                "Poll cycle still running at shutdown, abandoning it"
            );
        }
        let cycles = input.cycles();
        drop(input);

        let written = finish_writer(writer).await?;
        tracing::info!(cycles, records = written, "Poller stopped");
        Ok(())
    }
}

// Single cycle
pub mod once {
    use super::*;

    /// Run exactly one poll cycle and exit.
    pub async fn run_once(config: Config, output: Option<PathBuf>) -> Result<()> {
        let (tx, writer) = spawn_writer(output);
        let input = BurrowInput::register(&config, Arc::new(tx))?;

        let summary = input.run_once().await;
        drop(input);

        let written = finish_writer(writer).await?;
        tracing::debug!(records = written, failures = summary.failures, "Single cycle done");
        Ok(())
    }
}

// Configuration check
pub mod check {
    use super::*;
    use crate::poller::MemorySink;
    use crate::request::structure_request;

    /// Print the normalized request (credentials redacted) and the schedule.
    pub fn check_config(config: &Config) -> Result<()> {
        let input = BurrowInput::register(config, Arc::new(MemorySink::new()))?;
        let request = serde_json::Value::Object(structure_request(input.request()));

        println!("Configuration OK");
        println!("request: {}", serde_json::to_string_pretty(&request)?);
        println!("schedule: {}", input.schedule());
        Ok(())
    }
}
