//! Data types handed to subscribers.
//! Sinks persist these shapes, so field changes are format changes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessRef {
    pub pid: u32,
    pub name: String,
}

/// One normalized CPU reading, or the marker for a pid that could not be sampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Usage(f32),
    Unavailable,
}

impl Reading {
    pub fn value(self) -> Option<f32> {
        match self {
            Reading::Usage(v) => Some(v),
            Reading::Unavailable => None,
        }
    }

    pub fn is_unavailable(self) -> bool {
        matches!(self, Reading::Unavailable)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub pid: u32,
    pub usage: Reading,
    pub timestamp: DateTime<Utc>,
    pub process_name: String,
}

/// All samples of one tick, keyed (and ordered) by pid.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    samples: BTreeMap<u32, Sample>,
}

impl SampleBatch {
    pub fn new(tick: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            tick,
            timestamp,
            samples: BTreeMap::new(),
        }
    }

    /// Inserts a sample, replacing (and returning) any previous one for the same pid.
    pub fn insert(&mut self, sample: Sample) -> Option<Sample> {
        self.samples.insert(sample.pid, sample)
    }

    pub fn get(&self, pid: u32) -> Option<&Sample> {
        self.samples.get(&pid)
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.samples.contains_key(&pid)
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.values()
    }

    pub fn pids(&self) -> impl Iterator<Item = u32> + '_ {
        self.samples.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Per-pid persistence records for this tick.
    pub fn records(&self) -> impl Iterator<Item = UsageRecord> + '_ {
        self.samples
            .values()
            .map(move |s| UsageRecord::from_sample(self.tick, s))
    }
}

/// One row for the persistence channel: a single pid in a single tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub pid: u32,
    pub process_name: String,
    /// `None` when the process could not be sampled in this tick.
    pub usage_percent: Option<f32>,
}

impl UsageRecord {
    pub fn from_sample(tick: u64, sample: &Sample) -> Self {
        Self {
            tick,
            timestamp: sample.timestamp,
            pid: sample.pid,
            process_name: sample.process_name.clone(),
            usage_percent: sample.usage.value(),
        }
    }
}

/// Dense per-pid series, one point per tick of the current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub pid: u32,
    pub name: String,
    // None = pid absent or unavailable in that tick
    pub points: Vec<Option<f32>>,
}

impl Series {
    pub fn last(&self) -> Option<f32> {
        self.points.last().copied().flatten()
    }
}

/// What the chart channel carries: the whole session projected for plotting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartUpdate {
    pub session: u64,
    pub ticks: usize,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WatchState::Idle => "idle",
            WatchState::Running => "running",
            WatchState::Paused => "paused",
            WatchState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Session lifecycle events. `Stopped` is sent exactly once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    Started { session: u64, watched: Vec<String> },
    Paused { session: u64 },
    Resumed { session: u64 },
    Stopped { session: u64, ticks: usize },
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::Started { session, watched } => {
                write!(f, "monitoring started (session {session}): {}", watched.join(", "))
            }
            Notification::Paused { session } => write!(f, "monitoring paused (session {session})"),
            Notification::Resumed { session } => {
                write!(f, "monitoring resumed (session {session})")
            }
            Notification::Stopped { session, ticks } => {
                write!(f, "monitoring stopped (session {session}) after {ticks} ticks")
            }
        }
    }
}
