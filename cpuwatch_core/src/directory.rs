//! Cached pid -> name table.
//!
//! The cache is filled lazily on first use and only replaced by an explicit
//! [`ProcessDirectory::refresh`]; lookups never rescan the OS on their own.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::backend::ProcessBackend;
use crate::error::Result;
use crate::types::ProcessRef;

pub struct ProcessDirectory {
    backend: Arc<dyn ProcessBackend>,
    cache: RwLock<BTreeMap<u32, String>>,
}

impl ProcessDirectory {
    pub fn new(backend: Arc<dyn ProcessBackend>) -> Self {
        Self {
            backend,
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    /// Re-reads the OS process table. On failure the previous table is kept.
    pub fn refresh(&self) -> Result<()> {
        match self.backend.processes() {
            Ok(list) => {
                let fresh: BTreeMap<u32, String> =
                    list.into_iter().map(|p| (p.pid, p.name)).collect();
                debug!(count = fresh.len(), "process directory refreshed");
                *self.cache.write().unwrap_or_else(PoisonError::into_inner) = fresh;
                Ok(())
            }
            Err(e) => {
                warn!("process directory refresh failed, keeping previous table: {e}");
                Err(e)
            }
        }
    }

    /// Case-sensitive prefix match on process names, ordered by pid.
    /// An empty prefix returns every cached process.
    pub fn lookup_by_prefix(&self, prefix: &str) -> Vec<ProcessRef> {
        if let Err(e) = self.ensure_populated() {
            debug!("prefix lookup on empty directory: {e}");
        }
        self.collect(|name| name.starts_with(prefix))
    }

    /// Exact-name matches for the watched set, ordered by pid. Every pid carrying
    /// one of the names is returned, so several instances of a program all match.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<ProcessRef>> {
        self.ensure_populated()?;
        let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
        Ok(self.collect(|name| wanted.contains(name)))
    }

    /// Distinct process names, sorted, for pickers.
    pub fn names(&self) -> Vec<String> {
        if let Err(e) = self.ensure_populated() {
            debug!("name listing on empty directory: {e}");
        }
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = cache.values().cloned().collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_populated(&self) -> Result<()> {
        if self.is_empty() {
            self.refresh()?;
        }
        Ok(())
    }

    fn collect(&self, keep: impl Fn(&str) -> bool) -> Vec<ProcessRef> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .iter()
            .filter(|(_, name)| keep(name))
            .map(|(pid, name)| ProcessRef {
                pid: *pid,
                name: name.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;

    fn directory(backend: &Arc<FakeBackend>) -> ProcessDirectory {
        ProcessDirectory::new(Arc::clone(backend) as Arc<dyn ProcessBackend>)
    }

    #[test]
    fn prefix_lookup_is_case_sensitive_and_ordered() {
        let backend = Arc::new(FakeBackend::new(4));
        backend.spawn(30, "explorer", 0.0);
        backend.spawn(10, "Explorer", 0.0);
        backend.spawn(20, "expand", 0.0);
        let dir = directory(&backend);

        let hits = dir.lookup_by_prefix("exp");
        let pids: Vec<u32> = hits.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![20, 30]);
        assert_eq!(dir.lookup_by_prefix("").len(), 3);
        assert!(dir.lookup_by_prefix("zzz").is_empty());
    }

    #[test]
    fn cache_is_not_refreshed_implicitly() {
        let backend = Arc::new(FakeBackend::new(1));
        backend.spawn(1, "alpha", 0.0);
        let dir = directory(&backend);
        assert_eq!(dir.lookup_by_prefix("").len(), 1);
        assert_eq!(backend.listing_calls(), 1);

        backend.spawn(2, "alpha", 0.0);
        assert_eq!(dir.lookup_by_prefix("alpha").len(), 1);
        assert_eq!(backend.listing_calls(), 1);

        dir.refresh().unwrap();
        assert_eq!(dir.lookup_by_prefix("alpha").len(), 2);
    }

    #[test]
    fn failed_refresh_keeps_previous_table() {
        let backend = Arc::new(FakeBackend::new(1));
        backend.spawn(1, "alpha", 0.0);
        let dir = directory(&backend);
        dir.refresh().unwrap();

        backend.fail_listing(true);
        assert!(dir.refresh().is_err());
        assert_eq!(dir.lookup_by_prefix("alpha").len(), 1);
    }

    #[test]
    fn resolve_returns_every_instance() {
        let backend = Arc::new(FakeBackend::new(1));
        backend.spawn(10, "alpha", 0.0);
        backend.spawn(11, "alpha", 0.0);
        backend.spawn(12, "beta", 0.0);
        let dir = directory(&backend);

        let hits = dir.resolve(&["alpha".to_string()]).unwrap();
        assert_eq!(hits.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![10, 11]);
        assert_eq!(dir.names(), vec!["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn resolve_on_unreadable_table_is_an_error() {
        let backend = Arc::new(FakeBackend::new(1));
        backend.fail_listing(true);
        let dir = directory(&backend);
        assert!(dir.resolve(&["alpha".to_string()]).is_err());
        assert!(dir.lookup_by_prefix("").is_empty());
    }
}
