//! Status Resolver: fetches build status records and memoizes finished ones.
//!
//! A numbered build that has stopped running never changes, so its record is
//! cached for the life of the process. Alias lookups (`lastBuild`, ...) move
//! as new builds land and always go to the tracker; a finished record they
//! return is still cached under its own number.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use buildwatch_client::{check_job_name, BuildRecord, BuildRef, BuildTracker, Result};
use tracing::debug;

use crate::metrics::METRICS;

type CacheKey = (String, u64);

/// Caching front for [`BuildTracker::build_status`].
///
/// Safe to share between concurrent walks through an `Arc`. The cache lock
/// is never held across a tracker call, so two walks that miss on the same
/// build may both fetch it; the second insert is a no-op in effect.
pub struct StatusResolver {
    tracker: Arc<dyn BuildTracker>,
    cache: Mutex<HashMap<CacheKey, Arc<BuildRecord>>>,
}

impl StatusResolver {
    pub fn new(tracker: Arc<dyn BuildTracker>) -> Self {
        Self {
            tracker,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Status record of `job` at `build`.
    ///
    /// Folder-style job names fail with `NotSupported` before any request.
    pub async fn get(&self, job: &str, build: &BuildRef) -> Result<Arc<BuildRecord>> {
        check_job_name(job)?;

        if let BuildRef::Number(n) = build {
            if let Some(hit) = self.cached(job, *n) {
                debug!("Using from cache: {}#{}", job, n);
                METRICS.inc_cache_hits();
                return Ok(hit);
            }
        }

        METRICS.inc_status_fetches();
        let record = Arc::new(self.tracker.build_status(job, build).await?);

        let number = match build {
            BuildRef::Number(n) => Some(*n),
            alias if alias.is_alias() => record.number(),
            _ => None,
        };
        if let Some(n) = number.filter(|_| record.result.is_final()) {
            self.lock()
                .entry((job.to_string(), n))
                .or_insert_with(|| Arc::clone(&record));
        }
        Ok(record)
    }

    fn cached(&self, job: &str, number: u64) -> Option<Arc<BuildRecord>> {
        self.lock().get(&(job.to_string(), number)).cloned()
    }

    /// Number of cached records.
    pub fn cached_len(&self) -> usize {
        self.lock().len()
    }

    // Entries are immutable once inserted, so a poisoned map is still sound.
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<BuildRecord>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
