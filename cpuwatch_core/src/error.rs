//! Error type shared by the sampling engine.

use std::time::Duration;

use thiserror::Error;

use crate::types::WatchState;

pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Error)]
pub enum WatchError {
    /// The OS process list could not be read.
    #[error("process directory query failed: {0}")]
    Directory(String),

    #[error("process {pid} no longer exists")]
    ProcessVanished { pid: u32 },

    #[error("cpu measurement for process {pid} failed: {reason}")]
    Measure { pid: u32, reason: String },

    #[error("sampling interval must be positive, got {0:?}")]
    InvalidInterval(Duration),

    #[error("record queue capacity must be at least 1")]
    InvalidQueueCapacity,

    #[error("cannot {op} while {state}")]
    InvalidTransition { op: &'static str, state: WatchState },

    #[error("watch loop must be started from within a tokio runtime")]
    NoRuntime,

    #[error("watch worker is no longer running")]
    WorkerGone,
}
