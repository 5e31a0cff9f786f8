//! In-memory process table for driving the engine without touching the OS.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::backend::ProcessBackend;
use crate::error::{Result, WatchError};
use crate::types::ProcessRef;

struct FakeProcess {
    name: String,
    raw_percent: f32,
    reads: usize,
    vanish_after: Option<usize>,
    measure_error: Option<String>,
}

#[derive(Default)]
struct FakeState {
    processes: BTreeMap<u32, FakeProcess>,
    fail_listing: bool,
    listing_calls: usize,
    measure_calls: usize,
    measure_delay: Option<Duration>,
}

pub struct FakeBackend {
    cores: usize,
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new(cores: usize) -> Self {
        Self {
            cores,
            state: Mutex::new(FakeState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a process reporting `raw_percent` (un-normalized) on every measurement.
    pub fn spawn(&self, pid: u32, name: &str, raw_percent: f32) {
        self.state().processes.insert(
            pid,
            FakeProcess {
                name: name.to_string(),
                raw_percent,
                reads: 0,
                vanish_after: None,
                measure_error: None,
            },
        );
    }

    pub fn kill(&self, pid: u32) {
        self.state().processes.remove(&pid);
    }

    /// The process exits once it has been measured `reads` times.
    pub fn vanish_after(&self, pid: u32, reads: usize) {
        if let Some(p) = self.state().processes.get_mut(&pid) {
            p.vanish_after = Some(reads);
        }
    }

    /// Every measurement of `pid` fails with a non-vanish error carrying `reason`.
    pub fn fail_readings(&self, pid: u32, reason: &str) {
        if let Some(p) = self.state().processes.get_mut(&pid) {
            p.measure_error = Some(reason.to_string());
        }
    }

    pub fn set_usage(&self, pid: u32, raw_percent: f32) {
        if let Some(p) = self.state().processes.get_mut(&pid) {
            p.raw_percent = raw_percent;
        }
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state().fail_listing = fail;
    }

    /// Makes every measurement block for `min(window, delay)`.
    pub fn set_measure_delay(&self, delay: Duration) {
        self.state().measure_delay = Some(delay);
    }

    pub fn listing_calls(&self) -> usize {
        self.state().listing_calls
    }

    pub fn measure_calls(&self) -> usize {
        self.state().measure_calls
    }
}

impl ProcessBackend for FakeBackend {
    fn processes(&self) -> Result<Vec<ProcessRef>> {
        let mut state = self.state();
        state.listing_calls += 1;
        if state.fail_listing {
            return Err(WatchError::Directory("listing disabled".into()));
        }
        Ok(state
            .processes
            .iter()
            .map(|(pid, p)| ProcessRef {
                pid: *pid,
                name: p.name.clone(),
            })
            .collect())
    }

    fn cpu_percent(&self, pid: u32, window: Duration) -> Result<f32> {
        let delay = {
            let mut state = self.state();
            state.measure_calls += 1;
            state.measure_delay.map(|d| d.min(window))
        };
        if let Some(d) = delay {
            std::thread::sleep(d);
        }

        let mut state = self.state();
        let Some(p) = state.processes.get_mut(&pid) else {
            return Err(WatchError::ProcessVanished { pid });
        };
        if p.vanish_after.is_some_and(|n| p.reads >= n) {
            state.processes.remove(&pid);
            return Err(WatchError::ProcessVanished { pid });
        }
        p.reads += 1;
        if let Some(reason) = &p.measure_error {
            return Err(WatchError::Measure {
                pid,
                reason: reason.clone(),
            });
        }
        Ok(p.raw_percent)
    }

    fn logical_cores(&self) -> usize {
        self.cores
    }
}
