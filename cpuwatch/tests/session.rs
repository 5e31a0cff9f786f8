//! Whole sessions against the in-memory process table: chart, sink and control.
use std::sync::Arc;
use std::time::Duration;

use cpuwatch::app::{run_session, Command};
use cpuwatch::settings::RunOptions;
use cpuwatch::store::Database;
use cpuwatch_core::testing::FakeBackend;
use cpuwatch_core::{ProcessBackend, WatchConfig, WatchLoop};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn options(db: Option<std::path::PathBuf>, ticks: Option<usize>) -> RunOptions {
    RunOptions {
        processes: vec!["alpha".into(), "beta".into()],
        watch: WatchConfig::with_interval(Duration::from_millis(20)),
        database: db,
        rewrite_database: false,
        ticks,
        json: false,
    }
}

fn engine(backend: &Arc<FakeBackend>, opts: &RunOptions) -> WatchLoop {
    WatchLoop::new(Arc::clone(backend) as Arc<dyn ProcessBackend>, opts.watch.clone()).unwrap()
}

fn backend() -> Arc<FakeBackend> {
    let backend = Arc::new(FakeBackend::new(4));
    backend.spawn(100, "alpha", 40.0);
    backend.spawn(200, "beta", 8.0);
    backend.spawn(300, "gamma", 90.0);
    backend
}

#[tokio::test]
async fn every_record_of_the_session_is_persisted() {
    let td = tempfile::tempdir().unwrap();
    let db_path = td.path().join("cpu.db");
    let backend = backend();
    let opts = options(Some(db_path.clone()), Some(3));
    let (_tx, rx) = mpsc::channel(1);

    let report = timeout(
        Duration::from_secs(10),
        run_session(engine(&backend, &opts), &opts, rx, std::future::pending()),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(report.chart.ticks >= 3);
    let sink = report.sink.expect("sink ran");
    assert_eq!(sink.failures, 0);
    assert_eq!(sink.rows, 2 * report.chart.ticks as u64);
    assert_eq!(sink.events, 2);

    let db = Database::open(&db_path, false).unwrap();
    assert_eq!(db.workload_count().unwrap(), sink.rows);
    let rows = db.recent_workload(2).unwrap();
    let mut by_pid: Vec<(u32, Option<f64>)> = rows.iter().map(|r| (r.pid, r.workload)).collect();
    by_pid.sort_by_key(|r| r.0);
    assert_eq!(by_pid, vec![(100, Some(10.0)), (200, Some(2.0))]);
    let events = db.events().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].contains("alpha, beta"));
    assert!(events[1].starts_with("monitoring stopped"));
}

#[tokio::test]
async fn stop_command_ends_the_session() {
    let backend = backend();
    let opts = options(None, None);
    let (tx, rx) = mpsc::channel(4);

    let session = tokio::spawn(async move {
        let opts = opts;
        let engine = engine(&backend, &opts);
        run_session(engine, &opts, rx, std::future::pending()).await
    });
    tx.send(Command::Status).await.unwrap();
    tx.send(Command::Pause).await.unwrap();
    tx.send(Command::Resume).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(Command::Stop).await.unwrap();

    let report = timeout(Duration::from_secs(5), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(report.sink.is_none());
    assert!(report.chart.ticks >= 1);
}

#[tokio::test]
async fn shutdown_signal_ends_the_session() {
    let backend = backend();
    let opts = options(None, None);
    let (_tx, rx) = mpsc::channel(1);
    let shutdown = tokio::time::sleep(Duration::from_millis(80));

    let report = timeout(
        Duration::from_secs(5),
        run_session(engine(&backend, &opts), &opts, rx, shutdown),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.chart.series.len(), 2);
}

#[tokio::test]
async fn closed_input_does_not_stop_the_session() {
    let backend = backend();
    let opts = options(None, Some(3));
    let (tx, rx) = mpsc::channel(1);
    drop(tx);

    let report = timeout(
        Duration::from_secs(5),
        run_session(engine(&backend, &opts), &opts, rx, std::future::pending()),
    )
    .await
    .unwrap()
    .unwrap();
    assert!(report.chart.ticks >= 3);
}

#[tokio::test]
async fn rewrite_starts_from_an_empty_database() {
    let td = tempfile::tempdir().unwrap();
    let db_path = td.path().join("cpu.db");
    let backend = backend();

    let first = options(Some(db_path.clone()), Some(2));
    let (_tx, rx) = mpsc::channel(1);
    run_session(engine(&backend, &first), &first, rx, std::future::pending())
        .await
        .unwrap();

    let mut second = options(Some(db_path.clone()), Some(1));
    second.rewrite_database = true;
    let (_tx2, rx2) = mpsc::channel(1);
    let report = run_session(engine(&backend, &second), &second, rx2, std::future::pending())
        .await
        .unwrap();

    let db = Database::open(&db_path, false).unwrap();
    assert_eq!(db.workload_count().unwrap(), report.sink.unwrap().rows);
    assert_eq!(db.events().unwrap().len(), 2);
}
