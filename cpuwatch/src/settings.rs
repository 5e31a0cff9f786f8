//! Persistent front-end settings: a JSON file under the XDG config dir,
//! $XDG_CONFIG_HOME/cpuwatch/settings.json (fallback ~/.config/cpuwatch/settings.json).

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use cpuwatch_core::config::DEFAULT_RECORD_QUEUE;
use cpuwatch_core::WatchConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cli::{parse_interval, ParsedArgs};

pub const INTERVAL_ENV: &str = "CPUWATCH_INTERVAL";
pub const DB_ENV: &str = "CPUWATCH_DB";
const DEFAULT_DB_NAME: &str = "CpuMetrics";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub interval_secs: u64,
    pub default_processes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    pub rewrite_database: bool,
    pub record_queue_capacity: usize,
    pub rescan_each_tick: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            default_processes: Vec::new(),
            database: None,
            rewrite_database: false,
            record_queue_capacity: DEFAULT_RECORD_QUEUE,
            rescan_each_tick: false,
        }
    }
}

pub fn config_dir() -> PathBuf {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg).join("cpuwatch")
    } else {
        dirs_next::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cpuwatch")
    }
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Where the database lives when neither settings, env nor flags name one.
pub fn default_database_path() -> PathBuf {
    dirs_next::data_dir()
        .map(|d| d.join("cpuwatch"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DB_NAME)
}

/// Loads settings from `path`. A missing file is created with defaults; an
/// unreadable or malformed one yields defaults and a warning.
pub fn load_settings_from(path: &Path) -> Settings {
    match fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            warn!(path = %path.display(), "invalid settings file, using defaults: {e}");
            Settings::default()
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let settings = Settings::default();
            if let Err(e) = save_settings_to(path, &settings) {
                warn!(path = %path.display(), "could not write default settings: {e}");
            }
            settings
        }
        Err(e) => {
            warn!(path = %path.display(), "could not read settings, using defaults: {e}");
            Settings::default()
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(settings).map_err(io::Error::other)?;
    fs::write(path, data)
}

/// The resolved configuration for one run: settings, then env, then flags.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub processes: Vec<String>,
    pub watch: WatchConfig,
    /// `None` disables the persistence sink.
    pub database: Option<PathBuf>,
    pub rewrite_database: bool,
    pub ticks: Option<usize>,
    /// Print each chart update as a JSON line instead of text.
    pub json: bool,
}

impl Settings {
    /// Applies `CPUWATCH_INTERVAL` and `CPUWATCH_DB` if set. Invalid values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(v) = env::var(INTERVAL_ENV) {
            match parse_interval(&v) {
                Ok(secs) => self.interval_secs = secs,
                Err(e) => warn!("ignoring {INTERVAL_ENV}: {e}"),
            }
        }
        if let Some(db) = env::var_os(DB_ENV).filter(|v| !v.is_empty()) {
            self.database = Some(PathBuf::from(db));
        }
    }

    pub fn resolve(&self, args: &ParsedArgs) -> RunOptions {
        let interval_secs = args.interval_secs.unwrap_or(self.interval_secs);
        if interval_secs == 0 {
            warn!("interval_secs must be at least 1, using 1");
        }
        let interval = Duration::from_secs(interval_secs.max(1));
        let processes = if args.processes.is_empty() {
            self.default_processes.clone()
        } else {
            args.processes.clone()
        };
        let database = if args.no_db {
            None
        } else {
            Some(
                args.db
                    .clone()
                    .or_else(|| self.database.clone())
                    .unwrap_or_else(default_database_path),
            )
        };
        RunOptions {
            processes,
            watch: WatchConfig {
                interval,
                record_queue_capacity: self.record_queue_capacity.max(1),
                publish_timeout: None,
                rescan_each_tick: args.rescan || self.rescan_each_tick,
            },
            database,
            rewrite_database: args.rewrite_db || self.rewrite_database,
            ticks: args.ticks,
            json: args.json,
        }
    }
}
