//! SQLite persistence of usage records and session events.

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{Duration as ChronoDuration, Utc};
use cpuwatch_core::{Notification, NotificationSubscription, RecordSubscription, UsageRecord};
use rusqlite::{params, Connection};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS CpuWorkload (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    Timestamp INTEGER NOT NULL,
    PID INTEGER NOT NULL,
    ProcessName TEXT NOT NULL,
    Workload REAL
);
CREATE INDEX IF NOT EXISTS idx_workload_ts ON CpuWorkload(Timestamp);
CREATE TABLE IF NOT EXISTS SystemEvents (
    ID INTEGER PRIMARY KEY AUTOINCREMENT,
    Timestamp TEXT NOT NULL,
    Event TEXT NOT NULL
);
";

/// Event timestamps sort lexically in this format.
const EVENT_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadRow {
    pub id: i64,
    pub timestamp: i64,
    pub pid: u32,
    pub process_name: String,
    pub workload: Option<f64>,
}

impl Database {
    /// Opens (creating parents as needed) the database at `path`. With `rewrite`
    /// an existing file is removed first.
    pub fn open(path: &Path, rewrite: bool) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }
        if rewrite && path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("removing old database {}", path.display()))?;
            info!(path = %path.display(), "old database removed");
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(SCHEMA)
    }

    /// One row per record; an unavailable reading is stored as NULL.
    pub fn insert_workload(&self, record: &UsageRecord) -> rusqlite::Result<i64> {
        self.conn.execute(
            "INSERT INTO CpuWorkload (Timestamp, PID, ProcessName, Workload) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.timestamp.timestamp(),
                record.pid,
                record.process_name,
                record.usage_percent.map(f64::from)
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_event(&self, event: &str) -> rusqlite::Result<i64> {
        let now = Utc::now().format(EVENT_TS_FORMAT).to_string();
        self.conn.execute(
            "INSERT INTO SystemEvents (Timestamp, Event) VALUES (?1, ?2)",
            params![now, event],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn workload_count(&self) -> rusqlite::Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM CpuWorkload", [], |row| row.get::<_, i64>(0))
            .map(|n| n.max(0) as u64)
    }

    pub fn events(&self) -> rusqlite::Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT Event FROM SystemEvents ORDER BY ID")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }

    /// Newest rows first.
    pub fn recent_workload(&self, limit: u32) -> rusqlite::Result<Vec<WorkloadRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT ID, Timestamp, PID, ProcessName, Workload
             FROM CpuWorkload ORDER BY ID DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], |row| {
            Ok(WorkloadRow {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                pid: row.get(2)?,
                process_name: row.get(3)?,
                workload: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    /// Deletes workload rows and events older than `days`; returns rows removed.
    pub fn cleanup_older_than(&self, days: u32) -> rusqlite::Result<usize> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(days));
        let workload = self.conn.execute(
            "DELETE FROM CpuWorkload WHERE Timestamp < ?1",
            params![cutoff.timestamp()],
        )?;
        let events = self.conn.execute(
            "DELETE FROM SystemEvents WHERE Timestamp < ?1",
            params![cutoff.format(EVENT_TS_FORMAT).to_string()],
        )?;
        Ok(workload + events)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    pub rows: u64,
    pub events: u64,
    pub failures: u64,
}

/// Runs the sink on a blocking thread until the session's Stopped notification
/// (or the engine going away), then drains whatever records are still queued.
pub fn spawn_sink(
    db: Database,
    records: RecordSubscription,
    notifications: NotificationSubscription,
) -> JoinHandle<SinkReport> {
    let handle = Handle::current();
    tokio::task::spawn_blocking(move || handle.block_on(run_sink(db, records, notifications)))
}

async fn run_sink(
    db: Database,
    mut records: RecordSubscription,
    mut notifications: NotificationSubscription,
) -> SinkReport {
    let mut report = SinkReport::default();
    loop {
        tokio::select! {
            biased;
            Some(record) = records.recv() => write_record(&db, &record, &mut report),
            note = notifications.recv() => {
                let Some(note) = note else { break };
                write_event(&db, &note, &mut report);
                if matches!(note, Notification::Stopped { .. }) {
                    break;
                }
            }
        }
    }
    while let Some(record) = records.try_recv() {
        write_record(&db, &record, &mut report);
    }
    debug!(?report, "persistence sink finished");
    report
}

fn write_record(db: &Database, record: &UsageRecord, report: &mut SinkReport) {
    match db.insert_workload(record) {
        Ok(_) => report.rows += 1,
        Err(e) => {
            report.failures += 1;
            warn!(pid = record.pid, tick = record.tick, "failed to store workload: {e}");
        }
    }
}

fn write_event(db: &Database, note: &Notification, report: &mut SinkReport) {
    match db.insert_event(&note.to_string()) {
        Ok(_) => report.events += 1,
        Err(e) => {
            report.failures += 1;
            warn!("failed to store event: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pid: u32, usage: Option<f32>) -> UsageRecord {
        UsageRecord {
            tick: 0,
            timestamp: Utc::now(),
            pid,
            process_name: "alpha".into(),
            usage_percent: usage,
        }
    }

    #[test]
    fn unavailable_reading_is_null() {
        let db = Database::open_in_memory().unwrap();
        db.init_schema().unwrap();
        db.insert_workload(&record(1, Some(12.5))).unwrap();
        db.insert_workload(&record(2, None)).unwrap();

        let rows = db.recent_workload(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pid, 2);
        assert_eq!(rows[0].workload, None);
        assert_eq!(rows[1].workload, Some(12.5));
    }

    #[test]
    fn cleanup_keeps_recent_rows() {
        let db = Database::open_in_memory().unwrap();
        db.init_schema().unwrap();
        let mut old = record(1, Some(1.0));
        old.timestamp = Utc::now() - ChronoDuration::days(10);
        db.insert_workload(&old).unwrap();
        db.insert_workload(&record(2, Some(2.0))).unwrap();
        db.insert_event("monitoring started").unwrap();

        assert_eq!(db.cleanup_older_than(7).unwrap(), 1);
        assert_eq!(db.workload_count().unwrap(), 1);
        assert_eq!(db.events().unwrap().len(), 1);
    }

    #[test]
    fn schema_init_is_repeatable() {
        let db = Database::open_in_memory().unwrap();
        db.init_schema().unwrap();
        db.init_schema().unwrap();
        assert_eq!(db.workload_count().unwrap(), 0);
    }
}
