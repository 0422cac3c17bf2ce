use crate::{IndexedDocument, MetadataFilter, SearchHit, StoreError};
use async_trait::async_trait;

/// A persistent, upsert-by-id vector collection.
///
/// Writes are staged by [`upsert_batch`](VectorIndex::upsert_batch) and become durable with
/// [`persist`](VectorIndex::persist). Backends that cannot stage writes document it on
/// [`discard_pending`](VectorIndex::discard_pending).
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Backend name used in logs and search hits.
    fn name(&self) -> &str;

    /// Stages one batch. Reusing an external id replaces the stored point.
    async fn upsert_batch(
        &self,
        documents: &[IndexedDocument],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError>;

    /// Drops everything staged since the last persist.
    async fn discard_pending(&self) -> Result<(), StoreError>;

    async fn persist(&self) -> Result<(), StoreError>;

    /// Number of points resident in the collection.
    async fn count(&self) -> Result<usize, StoreError>;

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, StoreError>;

    async fn get(&self, external_id: &str) -> Result<Option<SearchHit>, StoreError>;
}

pub(crate) fn check_batch_shape(
    documents: &[IndexedDocument],
    embeddings: &[Vec<f32>],
    dimensions: usize,
) -> Result<(), StoreError> {
    if documents.len() != embeddings.len() {
        return Err(StoreError::Request(format!(
            "embedding count {} doesn't match document count {}",
            embeddings.len(),
            documents.len()
        )));
    }

    if let Some(vector) = embeddings.iter().find(|vector| vector.len() != dimensions) {
        return Err(StoreError::Request(format!(
            "embedding dimension {} != {}",
            vector.len(),
            dimensions
        )));
    }

    Ok(())
}
