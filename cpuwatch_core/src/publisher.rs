//! Fan-out of loop output to independent subscribers.
//!
//! Three channels, each with its own delivery rule:
//! - chart: latest-value channel; a slow reader skips to the newest projection,
//!   which already contains every earlier point.
//! - records: one bounded queue per subscriber. All records of a tick are queued
//!   before the next tick starts; a full queue is waited on for at most the
//!   publish timeout, then that subscriber loses the record.
//! - notifications: broadcast of session lifecycle events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::types::{ChartUpdate, Notification, UsageRecord};

const NOTIFICATION_BACKLOG: usize = 32;

pub struct Publisher {
    chart: watch::Sender<Arc<ChartUpdate>>,
    records: Mutex<Vec<mpsc::Sender<UsageRecord>>>,
    record_capacity: usize,
    notifications: broadcast::Sender<Notification>,
}

impl Publisher {
    pub fn new(record_capacity: usize) -> Self {
        let (chart, _) = watch::channel(Arc::new(ChartUpdate::default()));
        let (notifications, _) = broadcast::channel(NOTIFICATION_BACKLOG);
        Self {
            chart,
            records: Mutex::new(Vec::new()),
            record_capacity: record_capacity.max(1),
            notifications,
        }
    }

    fn record_senders(&self) -> MutexGuard<'_, Vec<mpsc::Sender<UsageRecord>>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe_chart(&self) -> ChartSubscription {
        ChartSubscription {
            rx: self.chart.subscribe(),
        }
    }

    pub fn subscribe_records(&self) -> RecordSubscription {
        let (tx, rx) = mpsc::channel(self.record_capacity);
        self.record_senders().push(tx);
        RecordSubscription { rx }
    }

    pub fn subscribe_notifications(&self) -> NotificationSubscription {
        NotificationSubscription {
            rx: self.notifications.subscribe(),
        }
    }

    pub fn latest_chart(&self) -> Arc<ChartUpdate> {
        Arc::clone(&self.chart.borrow())
    }

    /// Replaces the chart value without waking readers (new session, nothing sampled yet).
    pub(crate) fn reset_chart(&self, session: u64) {
        self.chart.send_if_modified(|current| {
            *current = Arc::new(ChartUpdate {
                session,
                ..ChartUpdate::default()
            });
            false
        });
    }

    pub(crate) fn publish_chart(&self, update: ChartUpdate) {
        self.chart.send_replace(Arc::new(update));
    }

    /// Queues `records` to every record subscriber concurrently; returns how many
    /// deliveries were dropped because a subscriber stayed full past `timeout`.
    pub(crate) async fn publish_records(&self, records: Vec<UsageRecord>, timeout: Duration) -> usize {
        if records.is_empty() {
            return 0;
        }
        let subscribers = self.record_senders().clone();
        if subscribers.is_empty() {
            return 0;
        }

        let deliveries = subscribers
            .iter()
            .map(|tx| deliver(tx, &records, timeout));
        let dropped: usize = join_all(deliveries).await.into_iter().sum();

        let mut senders = self.record_senders();
        let before = senders.len();
        senders.retain(|tx| !tx.is_closed());
        if senders.len() != before {
            debug!(removed = before - senders.len(), "pruned closed record subscribers");
        }
        dropped
    }

    pub(crate) fn notify(&self, notification: Notification) {
        // no receivers is fine
        let _ = self.notifications.send(notification);
    }
}

async fn deliver(tx: &mpsc::Sender<UsageRecord>, records: &[UsageRecord], timeout: Duration) -> usize {
    for (i, record) in records.iter().enumerate() {
        match tx.send_timeout(record.clone(), timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                // the rest of this tick would wait again; skip it for this subscriber only
                let dropped = records.len() - i;
                warn!(tick = record.tick, dropped, "record subscriber is not keeping up, dropping records");
                return dropped;
            }
            Err(SendTimeoutError::Closed(_)) => return 0,
        }
    }
    0
}

/// Receives the full chart projection after every tick.
pub struct ChartSubscription {
    rx: watch::Receiver<Arc<ChartUpdate>>,
}

impl ChartSubscription {
    /// Waits for the next projection. Returns `None` once the publisher is gone.
    pub async fn next(&mut self) -> Option<Arc<ChartUpdate>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }

    pub fn latest(&self) -> Arc<ChartUpdate> {
        Arc::clone(&self.rx.borrow())
    }

    pub fn has_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}

/// Receives one [`UsageRecord`] per pid per tick, in tick order.
pub struct RecordSubscription {
    rx: mpsc::Receiver<UsageRecord>,
}

impl RecordSubscription {
    pub async fn recv(&mut self) -> Option<UsageRecord> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<UsageRecord> {
        self.rx.try_recv().ok()
    }
}

pub struct NotificationSubscription {
    rx: broadcast::Receiver<Notification>,
}

impl NotificationSubscription {
    /// Next lifecycle event; `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.recv().await {
                Ok(n) => return Some(n),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "notification subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Notification> {
        loop {
            match self.rx.try_recv() {
                Ok(n) => return Some(n),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, "notification subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}
