use crate::corpus::{LookupTable, SkippedRecord};
use crate::embeddings::Embedder;
use crate::index::IndexReport;
use crate::pipeline::run_ingestion;
use crate::traits::VectorIndex;
use crate::{IngestError, IngestionOptions, RecruitDocument, SourcePaths, StoreError};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Result of one ingestion run: the store the indexed subset lives in, every built document and
/// the lookup table. Built once, never mutated; a reindex produces a new one.
pub struct CorpusIndex<S: ?Sized> {
    /// Absent when nothing was indexed.
    pub store: Option<Arc<S>>,
    /// Every document of the run, error documents included.
    pub documents: Vec<RecruitDocument>,
    pub lookup: LookupTable,
    pub skipped: Vec<SkippedRecord>,
    pub report: IndexReport,
    pub built_at: DateTime<Utc>,
}

impl<S: ?Sized> CorpusIndex<S> {
    /// An index with no store, no documents and an empty lookup table.
    pub fn empty() -> Self {
        Self {
            store: None,
            documents: Vec::new(),
            lookup: LookupTable::new(),
            skipped: Vec::new(),
            report: IndexReport::default(),
            built_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.report.is_empty() && self.lookup.is_empty()
    }

    pub fn vector_store(&self) -> Option<Arc<S>> {
        if self.store.is_none() {
            warn!("vector store requested but no ingestion run has completed");
        }
        self.store.clone()
    }

    pub fn lookup(&self) -> &LookupTable {
        if self.lookup.is_empty() {
            warn!("lookup table requested but it is empty");
        }
        &self.lookup
    }
}

/// Shared handle to the currently published [`CorpusIndex`].
///
/// Readers take a snapshot and keep using it for the whole request; a reindex swaps the whole
/// index in one step so store and lookup table are never observed out of step.
pub struct IndexHandle<S: ?Sized> {
    current: RwLock<Arc<CorpusIndex<S>>>,
}

impl<S: ?Sized> Default for IndexHandle<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized> IndexHandle<S> {
    /// A handle whose index is empty until the first successful run is published.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CorpusIndex::empty())),
        }
    }

    pub async fn snapshot(&self) -> Arc<CorpusIndex<S>> {
        self.current.read().await.clone()
    }

    /// Replaces the published index, returning the one it replaced.
    pub async fn publish(&self, index: CorpusIndex<S>) -> Arc<CorpusIndex<S>> {
        self.swap(Arc::new(index)).await
    }

    async fn swap(&self, next: Arc<CorpusIndex<S>>) -> Arc<CorpusIndex<S>> {
        let mut current = self.current.write().await;
        info!(
            indexed = next.report.indexed.len(),
            lookup = next.lookup.len(),
            built_at = %next.built_at.to_rfc3339(),
            "publishing corpus index"
        );
        std::mem::replace(&mut *current, next)
    }

    pub async fn vector_store(&self) -> Option<Arc<S>> {
        self.snapshot().await.vector_store()
    }

    pub async fn lookup(&self) -> LookupTable {
        self.snapshot().await.lookup().clone()
    }
}

impl<S: VectorIndex + ?Sized> IndexHandle<S> {
    /// Runs a full ingestion into a store opened by `open_store` and publishes the result.
    ///
    /// Every run writes into its own store instance, so snapshots taken before the swap keep
    /// reading the store they were published with. The store of the currently published index is
    /// refused. On failure the previously published index stays in place.
    pub async fn reindex<E, F, Fut>(
        &self,
        paths: &SourcePaths,
        open_store: F,
        embedder: &E,
        options: &IngestionOptions,
    ) -> Result<Arc<CorpusIndex<S>>, IngestError>
    where
        E: Embedder + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<S>, StoreError>>,
    {
        let store = open_store().await?;
        let published = self.snapshot().await;
        if let Some(live) = &published.store {
            if Arc::ptr_eq(live, &store) {
                warn!("reindex was handed the published store, refusing to write into it");
                return Err(IngestError::InvalidArgument(
                    "reindex needs a store instance that is not already published".to_string(),
                ));
            }
        }

        let index = match run_ingestion(paths, store, embedder, options).await {
            Ok(index) => index,
            Err(error) => {
                warn!(%error, "reindex failed, keeping the published index");
                return Err(error);
            }
        };
        let next = Arc::new(index);
        self.swap(Arc::clone(&next)).await;
        Ok(next)
    }
}
