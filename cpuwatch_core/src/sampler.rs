//! Takes one normalized CPU reading per watched, running process.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::backend::{normalize_cpu, ProcessBackend};
use crate::directory::ProcessDirectory;
use crate::error::{Result, WatchError};
use crate::types::{Reading, Sample, SampleBatch};

pub struct Sampler {
    directory: Arc<ProcessDirectory>,
    backend: Arc<dyn ProcessBackend>,
}

impl Sampler {
    pub fn new(directory: Arc<ProcessDirectory>, backend: Arc<dyn ProcessBackend>) -> Self {
        Self { directory, backend }
    }

    pub fn directory(&self) -> &Arc<ProcessDirectory> {
        &self.directory
    }

    /// Samples every process whose name is in `watched`.
    ///
    /// Blocking: each process is observed for a full `interval`, one after another,
    /// so a batch of N processes takes roughly N * `interval` of wall time.
    /// Only a failure to read the process table is returned as an error; a process
    /// that cannot be measured is kept in the batch as [`Reading::Unavailable`].
    pub fn sample(&self, watched: &[String], interval: Duration, tick: u64) -> Result<SampleBatch> {
        let targets = self.directory.resolve(watched)?;
        let timestamp = Utc::now();
        let cores = self.backend.logical_cores();
        let mut batch = SampleBatch::new(tick, timestamp);

        for target in targets {
            let usage = match self.backend.cpu_percent(target.pid, interval) {
                Ok(raw) => Reading::Usage(normalize_cpu(raw, cores)),
                Err(WatchError::ProcessVanished { pid }) => {
                    debug!(pid, name = %target.name, "process exited before it could be sampled");
                    Reading::Unavailable
                }
                Err(e) => {
                    warn!(pid = target.pid, "cpu measurement failed: {e}");
                    Reading::Unavailable
                }
            };
            batch.insert(Sample {
                pid: target.pid,
                usage,
                timestamp,
                process_name: target.name,
            });
        }
        Ok(batch)
    }
}
