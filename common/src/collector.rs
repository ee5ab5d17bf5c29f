//! Ties the file store, result cache and collection pipeline together.
//!
//! At most one pipeline runs per student at a time. A request that arrives
//! while another run for the same student is in flight waits for it, then
//! answers from the cache if that run succeeded.

use super::*;
use crate::cache::{CachedRecords, ResultCache};
use crate::file_store::{FileStore, StoreError};
use crate::pipeline::{Pipeline, PipelineError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("collection for {stuno} reported success but produced no analysis file")]
    DataUnavailable { stuno: String },
}

pub struct Collector {
    store: FileStore,
    cache: Box<dyn ResultCache>,
    pipeline: Pipeline,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Collector {
    pub fn new(store: FileStore, cache: Box<dyn ResultCache>, pipeline: Pipeline) -> Self {
        Self {
            store,
            cache,
            pipeline,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &dyn ResultCache {
        self.cache.as_ref()
    }

    /// Course records for a student, from the cache or else from disk.
    /// A successful disk read fills the cache.
    pub async fn analysis(&self, stuno: &str) -> Result<Option<CachedRecords>, StoreError> {
        if let Some(records) = self.cache.get(stuno) {
            return Ok(Some(records));
        }
        let Some(records) = self.store.load_analysis(stuno).await? else {
            return Ok(None);
        };
        let records = Arc::new(records);
        self.cache.put(stuno, Arc::clone(&records));
        Ok(Some(records))
    }

    /// Semester ranks for a student. These are read fresh every time.
    pub async fn ranks(&self, stuno: &str) -> Result<Option<Vec<SemesterRank>>, StoreError> {
        self.store.load_ranks(stuno).await
    }

    /// Run the collection pipeline for a student unless results are already cached.
    pub async fn collect(&self, stuno: &str) -> Result<CollectOutcome, CollectError> {
        if let Some(records) = self.cache.get(stuno) {
            return Ok(CollectOutcome {
                cached: true,
                count: records.len(),
            });
        }

        let marker = MarkerGuard::new(self, stuno);
        let _lock = marker.lock().await;
        self.collect_exclusive(stuno).await
    }

    async fn collect_exclusive(&self, stuno: &str) -> Result<CollectOutcome, CollectError> {
        // another request may have finished a run while we waited
        if let Some(records) = self.cache.get(stuno) {
            return Ok(CollectOutcome {
                cached: true,
                count: records.len(),
            });
        }

        self.pipeline.run(stuno).await?;

        self.cache.invalidate(stuno);
        let Some(records) = self.store.load_analysis(stuno).await? else {
            log::error!("Pipeline succeeded for {stuno} but no analysis file was written");
            return Err(CollectError::DataUnavailable {
                stuno: stuno.to_string(),
            });
        };

        let count = records.len();
        self.cache.put(stuno, Arc::new(records));
        log::info!("Collected {count} course records for {stuno}");
        Ok(CollectOutcome {
            cached: false,
            count,
        })
    }

    /// Forget the marker once nobody else holds or waits on it.
    fn release_marker(&self, stuno: &str) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .get(stuno)
            .is_some_and(|marker| Arc::strong_count(marker) == 1)
        {
            in_flight.remove(stuno);
        }
    }

    #[cfg(all(test, unix))]
    fn markers_in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A student's in-flight marker, dropped from the map when the last holder goes away,
/// including when a `collect` future is cancelled part way through.
struct MarkerGuard<'a> {
    collector: &'a Collector,
    stuno: &'a str,
    marker: Option<Arc<tokio::sync::Mutex<()>>>,
}

impl<'a> MarkerGuard<'a> {
    fn new(collector: &'a Collector, stuno: &'a str) -> Self {
        let mut in_flight = collector
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let marker = Arc::clone(in_flight.entry(stuno.to_string()).or_default());
        Self {
            collector,
            stuno,
            marker: Some(marker),
        }
    }

    async fn lock(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.marker {
            Some(marker) => Some(marker.lock().await),
            None => None,
        }
    }
}

impl Drop for MarkerGuard<'_> {
    fn drop(&mut self) {
        drop(self.marker.take());
        self.collector.release_marker(self.stuno);
    }
}
