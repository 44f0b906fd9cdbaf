//! Periodic scheduling of poll cycles
//!
//! A schedule is written in configuration as a mapping with exactly one key:
//!
//! - `every`: fixed interval (`30s`, `1h30m`, `5m`, or a bare number of seconds)
//! - `cron`: five-field (or six-field, with seconds) cron expression, with an
//!   optional trailing `UTC`
//! - `in`: run once after a delay
//! - `at`: run once at an absolute time (RFC 3339, or `YYYY-MM-DD HH:MM[:SS]` in UTC)
//!
//! [`Scheduler`] drives a job from a single worker task. The job future is
//! awaited to completion before the next tick is considered, so two cycles
//! never overlap; a long cycle simply delays the next one.
//!
//! # Example
//!
//! ```no_run
//! use burrow_poller::schedule::{ScheduleDescriptor, Scheduler};
//! use std::collections::BTreeMap;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut raw = BTreeMap::new();
//! raw.insert("every".to_string(), "30s".to_string());
//! let schedule = ScheduleDescriptor::from_map(&raw)?;
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.start(schedule, || async { println!("tick") })?;
//! scheduler.stop();
//! scheduler.join().await;
//! # Ok(())
//! # }
//! ```

use crate::error::PollerError;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Delay before the first run of an `every` schedule.
pub const FIRST_TICK_DELAY: Duration = Duration::from_millis(10);

const INVALID_SCHEDULE: &str = "Invalid config. schedule hash must contain \
     exactly one of the following keys - cron, at, every or in";

/// The four recognized schedule kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    /// Cron expression
    Cron,
    /// Fixed interval
    Every,
    /// One-shot absolute time
    At,
    /// One-shot delay
    In,
}

impl ScheduleKind {
    /// Returns the configuration key for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cron => "cron",
            Self::Every => "every",
            Self::At => "at",
            Self::In => "in",
        }
    }
}

impl FromStr for ScheduleKind {
    type Err = PollerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cron" => Ok(Self::Cron),
            "every" => Ok(Self::Every),
            "at" => Ok(Self::At),
            "in" => Ok(Self::In),
            _ => Err(PollerError::Config(INVALID_SCHEDULE.to_string())),
        }
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
enum Plan {
    Cron(Box<cron::Schedule>),
    Every(Duration),
    At(DateTime<Utc>),
    In(Duration),
}

/// A validated schedule: one kind and its parsed value.
#[derive(Debug, Clone)]
pub struct ScheduleDescriptor {
    kind: ScheduleKind,
    value: String,
    plan: Plan,
}

impl ScheduleDescriptor {
    /// Parse a schedule value of the given kind.
    ///
    /// # Errors
    ///
    /// Returns `PollerError::Config` if the value does not parse, or if an
    /// interval is zero.
    pub fn new(kind: ScheduleKind, value: &str) -> Result<Self, PollerError> {
        let plan = match kind {
            ScheduleKind::Cron => Plan::Cron(Box::new(parse_cron(value)?)),
            ScheduleKind::Every => {
                let period = parse_duration(value)?;
                if period.is_zero() {
                    return Err(PollerError::Config(format!(
                        "Invalid every schedule '{}': interval must be greater than 0",
                        value
                    )));
                }
                Plan::Every(period)
            }
            ScheduleKind::In => Plan::In(parse_duration(value)?),
            ScheduleKind::At => Plan::At(parse_time(value)?),
        };

        Ok(Self {
            kind,
            value: value.to_string(),
            plan,
        })
    }

    /// Build a schedule from its configuration mapping.
    ///
    /// # Errors
    ///
    /// Returns `PollerError::Config` unless the mapping holds exactly one of
    /// `cron`, `every`, `at` or `in`, with a parseable value.
    pub fn from_map(raw: &BTreeMap<String, String>) -> Result<Self, PollerError> {
        if raw.len() != 1 {
            return Err(PollerError::Config(INVALID_SCHEDULE.to_string()));
        }
        let (key, value) = raw
            .iter()
            .next()
            .ok_or_else(|| PollerError::Config(INVALID_SCHEDULE.to_string()))?;
        Self::new(key.parse()?, value)
    }

    /// Returns the schedule kind
    pub fn kind(&self) -> ScheduleKind {
        self.kind
    }

    /// Returns the raw value as written in configuration
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ScheduleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.value)
    }
}

/// Long-lived scheduler with an explicit start/stop lifecycle.
///
/// Stopping is cooperative: no further runs start after [`Scheduler::stop`],
/// while a run already in progress is allowed to finish.
#[derive(Debug, Default)]
pub struct Scheduler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Create an idle scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Start driving `job` according to `schedule`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `PollerError::Config` if this scheduler was already started or
    /// has been stopped.
    pub fn start<F, Fut>(&mut self, schedule: ScheduleDescriptor, job: F) -> Result<(), PollerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.handle.is_some() {
            return Err(PollerError::Config(
                "scheduler has already been started".to_string(),
            ));
        }
        if self.cancel.is_cancelled() {
            return Err(PollerError::Config(
                "scheduler has been stopped".to_string(),
            ));
        }

        info!(schedule = %schedule, "Starting scheduler");
        let cancel = self.cancel.clone();
        self.handle = Some(tokio::spawn(drive(schedule.plan, job, cancel)));
        Ok(())
    }

    /// Signal the worker to stop. Never fails, and is safe to call repeatedly
    /// or before [`Scheduler::start`].
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping scheduler");
            self.cancel.cancel();
        }
    }

    /// Whether the worker task is still alive
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the worker task to exit, including any run in progress.
    pub async fn join(&mut self) {
        // Polled by reference so a cancelled join leaves the handle in place.
        if let Some(handle) = self.handle.as_mut() {
            let outcome = handle.await;
            self.handle = None;
            if let Err(e) = outcome {
                warn!(error = %e, "Scheduler worker ended abnormally");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drive<F, Fut>(plan: Plan, job: F, cancel: CancellationToken)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    match plan {
        Plan::Every(period) => {
            let mut ticker = tokio::time::interval_at(Instant::now() + FIRST_TICK_DELAY, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                job().await;
            }
        }
        Plan::Cron(schedule) => loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                info!("Cron schedule has no upcoming runs");
                break;
            };
            debug!(next = %next, "Next cron run");
            if !sleep_until(next, &cancel).await {
                break;
            }
            job().await;
        },
        Plan::In(delay) => {
            if sleep_for(delay, &cancel).await {
                job().await;
            }
        }
        Plan::At(at) => {
            if at < Utc::now() {
                warn!(at = %at, "Scheduled time is in the past, running now");
            }
            if sleep_until(at, &cancel).await {
                job().await;
            }
        }
    }
    debug!("Scheduler worker exiting");
}

/// Sleep until `when`. Returns false if cancelled first.
async fn sleep_until(when: DateTime<Utc>, cancel: &CancellationToken) -> bool {
    let wait = (when - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    sleep_for(wait, cancel).await
}

async fn sleep_for(wait: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

fn parse_duration(value: &str) -> Result<Duration, PollerError> {
    let trimmed = value.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Duration::try_from_secs_f64(seconds).map_err(|e| {
                PollerError::Config(format!("Invalid duration '{}': {}", value, e))
            });
        }
    }
    humantime::parse_duration(trimmed)
        .map_err(|e| PollerError::Config(format!("Invalid duration '{}': {}", value, e)))
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, PollerError> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
    ];

    let trimmed = value.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(time.with_timezone(&Utc));
    }

    let naive = trimmed.strip_suffix("UTC").map(str::trim).unwrap_or(trimmed);
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(naive, format).ok())
        .map(|time| time.and_utc())
        .ok_or_else(|| PollerError::Config(format!("Invalid time '{}'", value)))
}

/// Accepts classic five-field cron (minute precision) or six fields with
/// seconds. Day-of-week numbers use the classic `0-7`, Sunday = 0 or 7.
fn parse_cron(value: &str) -> Result<cron::Schedule, PollerError> {
    let mut fields: Vec<&str> = value.split_whitespace().collect();

    if let Some(&last) = fields.last().filter(|token| is_time_zone(token)) {
        if !matches!(last, "UTC" | "Etc/UTC" | "GMT") {
            return Err(PollerError::Config(format!(
                "Invalid cron '{}': only UTC is supported, got time zone '{}'",
                value, last
            )));
        }
        fields.pop();
    }

    let expression = match fields.len() {
        5 => format!(
            "0 {} {} {} {} {}",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            translate_day_of_week(fields[4])
        ),
        6 => format!(
            "{} {} {} {} {} {}",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            fields[4],
            translate_day_of_week(fields[5])
        ),
        _ => {
            return Err(PollerError::Config(format!(
                "Invalid cron '{}': expected 5 or 6 fields",
                value
            )))
        }
    };

    cron::Schedule::from_str(&expression)
        .map_err(|e| PollerError::Config(format!("Invalid cron '{}': {}", value, e)))
}

fn is_time_zone(token: &str) -> bool {
    let starts_alpha = token.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    matches!(token, "UTC" | "GMT")
        || (starts_alpha && token.contains('/'))
        || (token.len() > 3 && token.chars().all(|c| c.is_ascii_alphabetic() || c == '_'))
}

/// The `cron` crate numbers days 1-7 from Sunday; classic cron uses 0-7.
fn translate_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(translate_day_item)
        .collect::<Vec<_>>()
        .join(",")
}

fn translate_day_item(item: &str) -> String {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (item, None),
    };
    let (start, end) = match range.split_once('-') {
        Some((start, end)) => (start.parse::<u8>(), end.parse::<u8>()),
        None => (range.parse::<u8>(), range.parse::<u8>()),
    };
    let (Ok(start), Ok(end)) = (start, end) else {
        return item.to_string();
    };
    let end = if step.is_some() && !range.contains('-') { 7 } else { end };
    if start > end || end > 7 {
        return item.to_string();
    }

    match step {
        None if end < 7 || start == 0 => {
            let start = start % 7 + 1;
            let end = if end == 7 { 7 } else { end + 1 };
            if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            }
        }
        // A range ending on Sunday (7) wraps past Saturday.
        None if start == 7 => "1".to_string(),
        None if start == 6 => "7,1".to_string(),
        None => format!("{}-7,1", start + 1),
        Some(step) => {
            let step = match step.parse::<usize>() {
                Ok(step) if step > 0 => step,
                _ => return item.to_string(),
            };
            let days: std::collections::BTreeSet<u8> = (start..=end)
                .step_by(step)
                .map(|day| day % 7 + 1)
                .collect();
            days.iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(",")
        }
    }
}
