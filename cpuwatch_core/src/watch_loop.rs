//! The watch loop: a control handle plus a background worker that samples on a
//! fixed cadence and publishes each batch.
//!
//! ```text
//! Idle --start--> Running --pause--> Paused
//!                    ^  <--resume--    |
//!                    |                 |
//!                  stop               stop
//!                    v                 v
//!                  Stopped <-----------+   (start again = new session)
//! ```

use std::sync::Arc;

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::backend::{ProcessBackend, SysinfoBackend};
use crate::config::WatchConfig;
use crate::directory::ProcessDirectory;
use crate::error::{Result, WatchError};
use crate::history::HistoryStore;
use crate::publisher::{ChartSubscription, NotificationSubscription, Publisher, RecordSubscription};
use crate::sampler::Sampler;
use crate::types::{ChartUpdate, Notification, ProcessRef, SampleBatch, WatchState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Run,
    Pause,
    Stop,
}

/// Control surface for one engine instance. Dropping the handle stops a live session.
pub struct WatchLoop {
    config: WatchConfig,
    sampler: Arc<Sampler>,
    publisher: Arc<Publisher>,
    state: Arc<watch::Sender<WatchState>>,
    watched: Vec<String>,
    session: u64,
    control: Option<watch::Sender<Control>>,
    worker: Option<JoinHandle<()>>,
}

impl WatchLoop {
    pub fn new(backend: Arc<dyn ProcessBackend>, config: WatchConfig) -> Result<Self> {
        config.validate()?;
        let directory = Arc::new(ProcessDirectory::new(Arc::clone(&backend)));
        let (state, _) = watch::channel(WatchState::Idle);
        Ok(Self {
            sampler: Arc::new(Sampler::new(directory, backend)),
            publisher: Arc::new(Publisher::new(config.record_queue_capacity)),
            state: Arc::new(state),
            watched: Vec::new(),
            session: 0,
            control: None,
            worker: None,
            config,
        })
    }

    /// Engine backed by the host's process table.
    pub fn with_system(config: WatchConfig) -> Result<Self> {
        Self::new(Arc::new(SysinfoBackend::new()), config)
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn watched(&self) -> &[String] {
        &self.watched
    }

    pub fn directory(&self) -> &Arc<ProcessDirectory> {
        self.sampler.directory()
    }

    /// Process picker support: prefix match against the cached process table.
    pub fn filter_processes(&self, prefix: &str) -> Vec<ProcessRef> {
        self.directory().lookup_by_prefix(prefix)
    }

    pub fn subscribe_chart(&self) -> ChartSubscription {
        self.publisher.subscribe_chart()
    }

    pub fn subscribe_records(&self) -> RecordSubscription {
        self.publisher.subscribe_records()
    }

    pub fn subscribe_notifications(&self) -> NotificationSubscription {
        self.publisher.subscribe_notifications()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WatchState> {
        self.state.subscribe()
    }

    /// Most recent chart projection of the current (or last) session.
    pub fn chart(&self) -> Arc<ChartUpdate> {
        self.publisher.latest_chart()
    }

    /// Begins a new session watching `names`. The first tick fires immediately.
    /// Allowed from `Idle` and `Stopped`; history from any earlier session is discarded.
    pub fn start<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = self.state();
        if matches!(state, WatchState::Running | WatchState::Paused) {
            return Err(WatchError::InvalidTransition { op: "start", state });
        }
        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;

        let mut watched: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !watched.contains(&name) {
                watched.push(name);
            }
        }
        if watched.is_empty() {
            info!("starting with an empty watched set; batches will be empty");
        }

        self.session += 1;
        self.watched = watched;
        // the previous worker, if any, has already exited
        self.worker.take();

        let (control_tx, control_rx) = watch::channel(Control::Run);
        self.control = Some(control_tx);
        self.state.send_replace(WatchState::Running);
        self.publisher.reset_chart(self.session);
        self.publisher.notify(Notification::Started {
            session: self.session,
            watched: self.watched.clone(),
        });
        info!(session = self.session, watched = ?self.watched, "monitoring started");

        let worker = Worker {
            session: self.session,
            watched: self.watched.clone(),
            config: self.config.clone(),
            sampler: Arc::clone(&self.sampler),
            publisher: Arc::clone(&self.publisher),
            state: Arc::clone(&self.state),
            control: control_rx,
        };
        self.worker = Some(runtime.spawn(worker.run()));
        Ok(())
    }

    /// Suspends sampling before the next tick. A tick already underway completes.
    pub fn pause(&mut self) -> Result<()> {
        match self.state() {
            WatchState::Paused => Ok(()),
            WatchState::Running => {
                self.send(Control::Pause)?;
                self.state.send_replace(WatchState::Paused);
                self.publisher.notify(Notification::Paused {
                    session: self.session,
                });
                info!(session = self.session, "monitoring paused");
                Ok(())
            }
            state => Err(WatchError::InvalidTransition { op: "pause", state }),
        }
    }

    /// Continues on the same cadence; ticks missed while paused are not replayed.
    pub fn resume(&mut self) -> Result<()> {
        match self.state() {
            WatchState::Running => Ok(()),
            WatchState::Paused => {
                self.send(Control::Run)?;
                self.state.send_replace(WatchState::Running);
                self.publisher.notify(Notification::Resumed {
                    session: self.session,
                });
                info!(session = self.session, "monitoring resumed");
                Ok(())
            }
            state => Err(WatchError::InvalidTransition { op: "resume", state }),
        }
    }

    /// Ends the session and waits for the worker to exit. Once this returns no
    /// further tick is sampled or published. A no-op when nothing is running.
    pub async fn stop(&mut self) -> Result<()> {
        if !matches!(self.state(), WatchState::Running | WatchState::Paused) {
            return Ok(());
        }
        if let Some(control) = self.control.take() {
            // a send error means the worker is already on its way out
            let _ = control.send(Control::Stop);
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                warn!(session = self.session, "watch worker ended abnormally: {e}");
                self.state.send_replace(WatchState::Stopped);
                self.publisher.notify(Notification::Stopped {
                    session: self.session,
                    ticks: self.chart().ticks,
                });
            }
        }
        Ok(())
    }

    /// Resolves once no session is live (immediately in `Idle` or `Stopped`).
    pub async fn wait_stopped(&self) {
        let mut state = self.state.subscribe();
        // the sender is owned by self, so the channel outlives this wait
        let _ = state
            .wait_for(|s| matches!(s, WatchState::Idle | WatchState::Stopped))
            .await;
    }

    fn send(&self, control: Control) -> Result<()> {
        let tx = self.control.as_ref().ok_or(WatchError::WorkerGone)?;
        tx.send(control).map_err(|_| WatchError::WorkerGone)
    }
}

/// Everything the background task owns for one session.
struct Worker {
    session: u64,
    watched: Vec<String>,
    config: WatchConfig,
    sampler: Arc<Sampler>,
    publisher: Arc<Publisher>,
    state: Arc<watch::Sender<WatchState>>,
    control: watch::Receiver<Control>,
}

impl Worker {
    async fn run(mut self) {
        let mut history = HistoryStore::new();
        let mut next_tick = Instant::now();

        while self.wait_for_slot(next_tick).await {
            let started = Instant::now();
            let tick = history.len() as u64;
            let batch = self.sample(tick).await;

            if self.stop_requested() {
                debug!(session = self.session, tick, "stop requested mid-tick, discarding batch");
                break;
            }

            let records: Vec<_> = batch.records().collect();
            debug!(session = self.session, tick, pids = batch.len(), "tick sampled");
            history.append(batch);
            self.publisher.publish_chart(history.chart(self.session));
            let dropped = self
                .publisher
                .publish_records(records, self.config.publish_timeout())
                .await;
            if dropped > 0 {
                debug!(session = self.session, tick, dropped, "records dropped for slow subscribers");
            }

            next_tick = started + self.config.interval;
        }

        let ticks = history.len();
        self.state.send_replace(WatchState::Stopped);
        self.publisher.notify(Notification::Stopped {
            session: self.session,
            ticks,
        });
        info!(session = self.session, ticks, "monitoring stopped");
    }

    /// Waits until `next_tick` while running; parks entirely while paused.
    /// Returns false once the session should end.
    async fn wait_for_slot(&mut self, next_tick: Instant) -> bool {
        loop {
            let control = *self.control.borrow_and_update();
            match control {
                Control::Stop => return false,
                Control::Pause => {
                    if self.control.changed().await.is_err() {
                        return false;
                    }
                }
                Control::Run => {
                    tokio::select! {
                        _ = sleep_until(next_tick) => return true,
                        changed = self.control.changed() => {
                            if changed.is_err() {
                                return false;
                            }
                        }
                    }
                }
            }
        }
    }

    fn stop_requested(&self) -> bool {
        // a dropped handle counts as stop
        self.control.has_changed().is_err() || *self.control.borrow() == Control::Stop
    }

    /// Runs the blocking sampler off the async workers.
    async fn sample(&self, tick: u64) -> SampleBatch {
        let sampler = Arc::clone(&self.sampler);
        let watched = self.watched.clone();
        let interval = self.config.interval;
        let rescan = self.config.rescan_each_tick;

        let job = tokio::task::spawn_blocking(move || {
            if rescan {
                // failure is logged by the directory; the previous table stays usable
                let _ = sampler.directory().refresh();
            }
            sampler.sample(&watched, interval, tick)
        });
        match job.await {
            Ok(Ok(batch)) => batch,
            Ok(Err(e)) => {
                warn!(session = self.session, tick, "could not resolve watched processes: {e}");
                SampleBatch::new(tick, Utc::now())
            }
            Err(e) => {
                warn!(session = self.session, tick, "sampling job failed: {e}");
                SampleBatch::new(tick, Utc::now())
            }
        }
    }
}
