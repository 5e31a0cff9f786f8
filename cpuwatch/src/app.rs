//! One monitoring session on the terminal: engine, chart printer, persistence
//! sink and interactive control wired together.

use std::future::Future;
use std::io::{self, BufRead};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use cpuwatch_core::{ChartUpdate, ProcessDirectory, SysinfoBackend, WatchLoop};
use tokio::sync::mpsc;
use tracing::{info, warn};

const HISTORY_WIDTH: usize = 40;

use crate::chart::{chart_line, history_lines, summary_lines};
use crate::settings::RunOptions;
use crate::store::{spawn_sink, Database, SinkReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Stop,
    Status,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pause" | "p" => Ok(Command::Pause),
            "resume" | "r" => Ok(Command::Resume),
            "stop" | "quit" | "q" | "exit" => Ok(Command::Stop),
            "status" | "s" => Ok(Command::Status),
            other => Err(format!("unknown command: {other} (pause, resume, status, stop)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub chart: Arc<ChartUpdate>,
    pub sink: Option<SinkReport>,
}

/// Prints `pid name` for every process whose name starts with `prefix`.
pub fn list_matching(prefix: &str) -> anyhow::Result<()> {
    let directory = ProcessDirectory::new(Arc::new(SysinfoBackend::new()));
    directory.refresh().context("reading the process table")?;
    for p in directory.lookup_by_prefix(prefix) {
        println!("{:>7} {}", p.pid, p.name);
    }
    Ok(())
}

/// Prints each distinct process name once, sorted.
pub fn list_names() -> anyhow::Result<()> {
    let directory = ProcessDirectory::new(Arc::new(SysinfoBackend::new()));
    directory.refresh().context("reading the process table")?;
    for name in directory.names() {
        println!("{name}");
    }
    Ok(())
}

/// Runs a session against the host process table, controlled from stdin and Ctrl-C.
pub async fn run(opts: RunOptions) -> anyhow::Result<()> {
    let engine = WatchLoop::with_system(opts.watch.clone()).context("invalid watch configuration")?;
    let commands = spawn_stdin_reader();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    let report = run_session(engine, &opts, commands, shutdown).await?;
    if !opts.json {
        for line in history_lines(&report.chart, HISTORY_WIDTH) {
            println!("{line}");
        }
        for line in summary_lines(&report.chart) {
            println!("{line}");
        }
    }
    if let Some(sink) = report.sink {
        info!(rows = sink.rows, events = sink.events, failures = sink.failures, "records persisted");
    }
    Ok(())
}

/// Drives `engine` until a stop command, `shutdown`, or `opts.ticks` chart updates.
/// Returns once the session has stopped and the sink has flushed.
pub async fn run_session<F>(
    mut engine: WatchLoop,
    opts: &RunOptions,
    mut commands: mpsc::Receiver<Command>,
    shutdown: F,
) -> anyhow::Result<SessionReport>
where
    F: Future<Output = ()>,
{
    let sink = match &opts.database {
        Some(path) => {
            let db = Database::open(path, opts.rewrite_database)?;
            db.init_schema().context("creating database tables")?;
            info!(path = %path.display(), "persisting records");
            Some(spawn_sink(db, engine.subscribe_records(), engine.subscribe_notifications()))
        }
        None => None,
    };
    let mut chart = engine.subscribe_chart();

    engine.start(opts.processes.iter().cloned())?;
    let session = engine.session();

    tokio::pin!(shutdown);
    let mut commands_open = true;
    loop {
        tokio::select! {
            update = chart.next() => {
                let Some(update) = update else { break };
                if update.session != session {
                    continue;
                }
                if opts.json {
                    match serde_json::to_string(update.as_ref()) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!("cannot encode chart update: {e}"),
                    }
                } else {
                    println!("{}", chart_line(&update));
                }
                if opts.ticks.is_some_and(|n| update.ticks >= n) {
                    break;
                }
            }
            cmd = commands.recv(), if commands_open => match cmd {
                Some(Command::Pause) => {
                    if let Err(e) = engine.pause() {
                        warn!("cannot pause: {e}");
                    }
                }
                Some(Command::Resume) => {
                    if let Err(e) = engine.resume() {
                        warn!("cannot resume: {e}");
                    }
                }
                Some(Command::Status) => {
                    let snapshot = engine.chart();
                    eprintln!(
                        "{} (session {}, {} ticks every {}s): {}",
                        engine.state(),
                        session,
                        snapshot.ticks,
                        engine.config().interval.as_secs_f64(),
                        engine.watched().join(", ")
                    );
                    for line in history_lines(&snapshot, HISTORY_WIDTH) {
                        eprintln!("  {line}");
                    }
                }
                Some(Command::Stop) => break,
                // no more input; keep running until another stop condition
                None => commands_open = false,
            },
            _ = &mut shutdown => {
                info!("interrupted");
                break;
            }
        }
    }

    engine.stop().await?;
    let sink = match sink {
        Some(handle) => Some(handle.await.context("persistence sink failed")?),
        None => None,
    };
    Ok(SessionReport {
        chart: engine.chart(),
        sink,
    })
}

/// Reads control commands from stdin on a plain thread so a blocked read never
/// holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<Command> {
    let (tx, rx) = mpsc::channel(8);
    let spawned = std::thread::Builder::new()
        .name("cpuwatch-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(cmd) => {
                        if tx.blocking_send(cmd).is_err() {
                            break;
                        }
                    }
                    Err(msg) => eprintln!("{msg}"),
                }
            }
        });
    if let Err(e) = spawned {
        warn!("interactive control unavailable: {e}");
    }
    rx
}
