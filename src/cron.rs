//! Periodic dispatch of administrative commands on cron schedules.
//!
//! The [`Scheduler`] owns its job table. Jobs are registered and removed
//! through explicit calls, and [`Scheduler::run`] checks the table once per
//! second, dispatching each job whose schedule matches whenever a new
//! minute begins.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Length of a scheduling slice, in seconds.
pub const PERIOD: u64 = 60;

/// Start of the `period`-long slice that contains `when`. A zero period
/// leaves `when` unchanged.
pub fn timeslice(period: u64, when: u64) -> u64 {
    if period == 0 {
        return when;
    }
    when - when % period
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronError {
    #[error("expected 5 schedule fields in {0:?}")]
    FieldCount(String),
    #[error("invalid {field} field {value:?}")]
    InvalidField { field: &'static str, value: String },
    #[error("job spec {0:?} has no command")]
    MissingCommand(String),
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const FIELDS: [FieldSpec; 5] = [
    FieldSpec { name: "minute", min: 0, max: 59 },
    FieldSpec { name: "hour", min: 0, max: 23 },
    FieldSpec { name: "day-of-month", min: 1, max: 31 },
    FieldSpec { name: "month", min: 1, max: 12 },
    // 7 is accepted as Sunday
    FieldSpec { name: "day-of-week", min: 0, max: 7 },
];

/// A five-field cron expression: minute, hour, day of month, month, day of
/// week. Each field accepts `*`, single values, `a-b` ranges, `,` lists and
/// `/n` steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    source: String,
    masks: [u64; 5],
}

impl Schedule {
    pub fn matches<Tz: TimeZone>(&self, when: &DateTime<Tz>) -> bool {
        let values = [
            when.minute(),
            when.hour(),
            when.day(),
            when.month(),
            when.weekday().num_days_from_sunday(),
        ];
        self.masks
            .iter()
            .zip(values)
            .all(|(mask, value)| mask & (1 << value) != 0)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Schedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != FIELDS.len() {
            return Err(CronError::FieldCount(s.to_string()));
        }
        let mut masks = [0u64; 5];
        for (i, (text, spec)) in fields.iter().zip(&FIELDS).enumerate() {
            masks[i] = parse_field(text, spec)?;
        }
        // fold Sunday-as-7 onto 0
        if masks[4] & (1 << 7) != 0 {
            masks[4] = (masks[4] & !(1 << 7)) | 1;
        }
        Ok(Self {
            source: fields.join(" "),
            masks,
        })
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_field(text: &str, spec: &FieldSpec) -> Result<u64, CronError> {
    let invalid = || CronError::InvalidField {
        field: spec.name,
        value: text.to_string(),
    };
    let number = |s: &str| s.parse::<u32>().map_err(|_| invalid());

    let mut mask = 0u64;
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => (range, Some(number(step)?)),
            None => (part, None),
        };
        let (lo, hi) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (number(a)?, number(b)?)
        } else {
            let v = number(range)?;
            if step.is_some() { (v, spec.max) } else { (v, v) }
        };
        let step = step.unwrap_or(1);
        if step == 0 || lo > hi || lo < spec.min || hi > spec.max {
            return Err(invalid());
        }
        for v in (lo..=hi).step_by(step as usize) {
            mask |= 1 << v;
        }
    }
    Ok(mask)
}

/// Splits `"<5 schedule fields> <command>"` into its schedule and command.
pub fn parse_job(spec: &str) -> Result<(Schedule, String), CronError> {
    let mut rest = spec.trim_start();
    let mut fields = Vec::with_capacity(FIELDS.len());
    for _ in 0..FIELDS.len() {
        let (field, tail) = rest
            .split_once(char::is_whitespace)
            .ok_or_else(|| CronError::MissingCommand(spec.to_string()))?;
        fields.push(field);
        rest = tail.trim_start();
    }
    let command = rest.trim_end();
    if command.is_empty() {
        return Err(CronError::MissingCommand(spec.to_string()));
    }
    Ok((fields.join(" ").parse()?, command.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub schedule: Schedule,
    pub command: String,
}

#[derive(Default)]
struct JobTable {
    next_id: u64,
    jobs: BTreeMap<JobId, Job>,
}

/// Runs a scheduled command.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn dispatch(&self, command: &str) -> anyhow::Result<()>;
}

/// Runs commands through `sh -c`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellDispatcher;

#[async_trait]
impl CommandDispatcher for ShellDispatcher {
    async fn dispatch(&self, command: &str) -> anyhow::Result<()> {
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .status()
            .await
            .with_context(|| format!("spawning {command:?}"))?;
        if !status.success() {
            bail!("{command:?} exited with {status}");
        }
        Ok(())
    }
}

/// Handle to a job table plus the tick state of one runner. Clones share
/// the table.
#[derive(Clone, Default)]
pub struct Scheduler {
    table: Arc<Mutex<JobTable>>,
    last_tick: Option<u64>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, schedule: Schedule, command: impl Into<String>) -> JobId {
        let mut table = self.table();
        table.next_id += 1;
        let id = JobId(table.next_id);
        let command = command.into();
        info!(%schedule, %command, "cron job registered");
        table.jobs.insert(id, Job { id, schedule, command });
        id
    }

    /// Removes the given jobs; unknown ids are ignored. Returns how many
    /// were removed.
    pub fn unregister(&self, ids: &[JobId]) -> usize {
        let mut table = self.table();
        ids.iter().filter(|&&id| table.jobs.remove(&id).is_some()).count()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.table().jobs.values().cloned().collect()
    }

    /// Jobs to run at `now`. Only the first call within a new minute yields
    /// anything, and the very first call only records the current minute.
    pub fn due<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Vec<Job> {
        let this_tick = timeslice(PERIOD, now.timestamp().max(0) as u64);
        let Some(last) = self.last_tick.replace(this_tick) else {
            return Vec::new();
        };
        if last == this_tick {
            return Vec::new();
        }
        self.table()
            .jobs
            .values()
            .filter(|job| job.schedule.matches(now))
            .cloned()
            .collect()
    }

    pub async fn tick(&mut self, now: DateTime<Local>, dispatcher: &dyn CommandDispatcher) -> usize {
        let due = self.due(&now);
        for job in &due {
            info!(schedule = %job.schedule, command = %job.command, "cron dispatch");
            if let Err(err) = dispatcher.dispatch(&job.command).await {
                warn!(command = %job.command, "cron command failed: {err:#}");
            }
        }
        due.len()
    }

    /// Ticks once per second until `shutdown` is cancelled.
    pub async fn run(mut self, dispatcher: Arc<dyn CommandDispatcher>, shutdown: CancellationToken) {
        info!("cron: start");
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick(Local::now(), dispatcher.as_ref()).await;
                }
            }
        }
        info!("cron: end");
    }
}
