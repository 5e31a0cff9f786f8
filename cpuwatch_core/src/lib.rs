//! Sampling engine for per-process CPU monitoring.
//!
//! A [`WatchLoop`] resolves watched process names through a cached
//! [`ProcessDirectory`], samples each matching pid with a [`Sampler`], keeps the
//! session in a [`HistoryStore`] and publishes chart projections, per-pid records
//! and lifecycle notifications to subscribers.

pub mod backend;
pub mod config;
pub mod directory;
pub mod error;
pub mod history;
pub mod publisher;
pub mod sampler;
pub mod types;
pub mod watch_loop;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use backend::{normalize_cpu, ProcessBackend, SysinfoBackend};
pub use config::WatchConfig;
pub use directory::ProcessDirectory;
pub use error::{Result, WatchError};
pub use history::HistoryStore;
pub use publisher::{ChartSubscription, NotificationSubscription, Publisher, RecordSubscription};
pub use sampler::Sampler;
pub use types::{
    ChartUpdate, Notification, ProcessRef, Reading, Sample, SampleBatch, Series, UsageRecord,
    WatchState,
};
pub use watch_loop::WatchLoop;
