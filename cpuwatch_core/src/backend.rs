//! OS access for the engine: process listing and interval-wide CPU measurements via sysinfo.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sysinfo::{CpuRefreshKind, Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tracing::warn;

use crate::error::{Result, WatchError};
use crate::types::ProcessRef;

/// Everything the engine needs from the operating system.
///
/// `cpu_percent` is a blocking call: it observes the process for the whole `window`
/// and returns the raw OS percentage, which may exceed 100 on multi-core machines.
pub trait ProcessBackend: Send + Sync {
    fn processes(&self) -> Result<Vec<ProcessRef>>;
    fn cpu_percent(&self, pid: u32, window: Duration) -> Result<f32>;
    fn logical_cores(&self) -> usize;
}

pub struct SysinfoBackend {
    // Listing and measuring use separate handles so a filter query never waits on a measurement window.
    listing: Mutex<System>,
    meter: Mutex<System>,
    cores: usize,
}

impl SysinfoBackend {
    pub fn new() -> Self {
        let sys =
            System::new_with_specifics(RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()));
        let cores = sys.cpus().len().max(1);
        Self {
            listing: Mutex::new(System::new()),
            meter: Mutex::new(sys),
            cores,
        }
    }
}

impl Default for SysinfoBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(m: &Mutex<System>) -> MutexGuard<'_, System> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProcessBackend for SysinfoBackend {
    fn processes(&self) -> Result<Vec<ProcessRef>> {
        let mut sys = lock(&self.listing);
        let refresh = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sys.refresh_processes_specifics(
                ProcessesToUpdate::All,
                true,
                ProcessRefreshKind::nothing().without_tasks(),
            );
        }));
        if let Err(e) = refresh {
            warn!("sysinfo process refresh panicked: {e:?}");
            return Err(WatchError::Directory("process refresh panicked".into()));
        }
        // sysinfo reports no error of its own; an empty table means /proc (or equivalent) was unreadable
        if sys.processes().is_empty() {
            return Err(WatchError::Directory("no processes reported".into()));
        }
        Ok(sys
            .processes()
            .values()
            .filter(|p| p.thread_kind().is_none())
            .map(|p| ProcessRef {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().into_owned(),
            })
            .collect())
    }

    fn cpu_percent(&self, pid: u32, window: Duration) -> Result<f32> {
        let target = Pid::from_u32(pid);
        let only = [target];
        let kind = ProcessRefreshKind::nothing().with_cpu().without_tasks();
        let mut sys = lock(&self.meter);
        let refresh = |sys: &mut System| {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                sys.refresh_processes_specifics(ProcessesToUpdate::Some(&only), true, kind);
            }))
            .map_err(|e| {
                warn!(pid, "sysinfo cpu refresh panicked: {e:?}");
                WatchError::Measure {
                    pid,
                    reason: "process refresh panicked".into(),
                }
            })
        };

        // Baseline, then a second refresh one window later; sysinfo reports the delta.
        refresh(&mut *sys)?;
        if sys.process(target).is_none() {
            return Err(WatchError::ProcessVanished { pid });
        }
        std::thread::sleep(window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        refresh(&mut *sys)?;

        match sys.process(target) {
            Some(p) => Ok(p.cpu_usage()),
            None => Err(WatchError::ProcessVanished { pid }),
        }
    }

    fn logical_cores(&self) -> usize {
        self.cores
    }
}

/// Scales a raw OS percentage to a single-machine 0..100 scale.
pub fn normalize_cpu(raw: f32, cores: usize) -> f32 {
    let cores = cores.max(1) as f32;
    (raw / cores).clamp(0.0, 100.0)
}
