//! Append-only history of sample batches for the current session.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{ChartUpdate, SampleBatch, Series};

#[derive(Debug, Clone)]
struct Column {
    pid: u32,
    name: String,
}

/// Batches in tick order. Batches are never reordered or edited once appended;
/// readers get shared `Arc`s, never a mutable handle.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    batches: Vec<Arc<SampleBatch>>,
    // every pid seen this session, in order of first appearance
    columns: Vec<Column>,
    column_of: HashMap<u32, usize>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, batch: SampleBatch) {
        for sample in batch.samples() {
            match self.column_of.get(&sample.pid) {
                // pids get reused by the OS; keep the latest name
                Some(&i) => {
                    if self.columns[i].name != sample.process_name {
                        self.columns[i].name = sample.process_name.clone();
                    }
                }
                None => {
                    self.column_of.insert(sample.pid, self.columns.len());
                    self.columns.push(Column {
                        pid: sample.pid,
                        name: sample.process_name.clone(),
                    });
                }
            }
        }
        self.batches.push(Arc::new(batch));
    }

    /// Dense `(tick_index, usage)` series for `pid`: one item per appended batch,
    /// `None` where the pid was absent or unavailable. Clone the iterator to replay it.
    pub fn series_for(
        &self,
        pid: u32,
    ) -> impl Iterator<Item = (usize, Option<f32>)> + Clone + '_ {
        self.batches
            .iter()
            .enumerate()
            .map(move |(i, batch)| (i, batch.get(pid).and_then(|s| s.usage.value())))
    }

    pub fn latest_batch(&self) -> Option<&SampleBatch> {
        self.batches.last().map(|b| &**b)
    }

    pub fn pids(&self) -> impl Iterator<Item = u32> + '_ {
        self.columns.iter().map(|c| c.pid)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
        self.columns.clear();
        self.column_of.clear();
    }

    /// Projection handed to chart subscribers.
    pub fn chart(&self, session: u64) -> ChartUpdate {
        let series = self
            .columns
            .iter()
            .map(|c| Series {
                pid: c.pid,
                name: c.name.clone(),
                points: self.series_for(c.pid).map(|(_, v)| v).collect(),
            })
            .collect();
        ChartUpdate {
            session,
            ticks: self.batches.len(),
            series,
        }
    }
}
