use crate::corpus::lookup_key;
use crate::embeddings::Embedder;
use crate::records::NOT_AVAILABLE;
use crate::state::CorpusIndex;
use crate::traits::VectorIndex;
use crate::{DocumentKind, RecruitDocument, SearchQuery, SearchResult, StoreError};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1_000;

/// One line of a job or applicant listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub id: String,
    /// Job title or applicant name.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Read side over one published [`CorpusIndex`].
pub struct Retriever<S: ?Sized, E> {
    index: Arc<CorpusIndex<S>>,
    embedder: E,
}

impl<S, E> Retriever<S, E>
where
    S: VectorIndex + ?Sized,
    E: Embedder,
{
    pub fn new(index: Arc<CorpusIndex<S>>, embedder: E) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &CorpusIndex<S> {
        &self.index
    }

    /// Similarity search over the indexed subset, optionally restricted to one kind.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResult, StoreError> {
        if query.text.trim().is_empty() {
            return Err(StoreError::Request("query is empty".to_string()));
        }
        if query.top_k == 0 {
            return Err(StoreError::Request("top_k must be at least 1".to_string()));
        }
        let store = self.index.vector_store().ok_or_else(|| {
            StoreError::NotReady("no ingestion run has published a vector store".to_string())
        })?;

        let filter = query.effective_filter();
        let vector = self.embedder.embed(&query.text)?;
        let hits = store.search(&vector, query.top_k, &filter).await?;
        debug!(query = %query.text, hits = hits.len(), "search finished");

        Ok(SearchResult {
            query: query.text.clone(),
            hits,
        })
    }

    pub fn job_details(&self, job_id: &str) -> Option<&RecruitDocument> {
        self.details(DocumentKind::Job, job_id)
    }

    pub fn applicant_details(&self, applicant_id: &str) -> Option<&RecruitDocument> {
        self.details(DocumentKind::Applicant, applicant_id)
    }

    fn details(&self, kind: DocumentKind, id: &str) -> Option<&RecruitDocument> {
        let found = self
            .index
            .lookup()
            .get(&lookup_key(kind, id.trim()))
            .filter(|document| document.is_valid());
        info!(%kind, id, found = found.is_some(), "details lookup");
        found
    }

    pub fn list_jobs(&self, skip: usize, limit: usize) -> Page<RecordSummary> {
        self.list(DocumentKind::Job, "codigo_vaga", "titulo_vaga", skip, limit)
    }

    pub fn list_applicants(&self, skip: usize, limit: usize) -> Page<RecordSummary> {
        self.list(DocumentKind::Applicant, "codigo_profissional", "nome", skip, limit)
    }

    fn list(
        &self,
        kind: DocumentKind,
        id_field: &str,
        label_field: &str,
        skip: usize,
        limit: usize,
    ) -> Page<RecordSummary> {
        let mut summaries = self
            .index
            .lookup
            .values()
            .filter(|document| document.kind() == kind && document.is_valid())
            .filter_map(|document| {
                Some(RecordSummary {
                    id: document.metadata_text(id_field)?.to_string(),
                    label: document
                        .metadata_text(label_field)
                        .unwrap_or(NOT_AVAILABLE)
                        .to_string(),
                })
            })
            .collect::<Vec<_>>();
        summaries.sort_by(|left, right| compare_ids(&left.id, &right.id));

        let total = summaries.len();
        let items = summaries
            .into_iter()
            .skip(skip)
            .take(limit.clamp(1, MAX_PAGE_LIMIT))
            .collect::<Vec<_>>();
        info!(%kind, listed = items.len(), total, "listing records");
        Page { items, total }
    }
}

/// Numeric ids sort numerically, everything else lexically after them.
fn compare_ids(left: &str, right: &str) -> std::cmp::Ordering {
    match (left.parse::<u64>(), right.parse::<u64>()) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => left.cmp(right),
    }
}
