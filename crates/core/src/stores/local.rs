//! File-backed vector collection.
//!
//! Layout: `<root>/<collection>/collection.json`. Upserts are staged in memory and only become
//! visible to readers, and durable, once [`VectorIndex::persist`] has rewritten the collection
//! file. The file is replaced through a temporary sibling and a rename.

use crate::traits::{check_batch_shape, VectorIndex};
use crate::{IndexedDocument, Metadata, MetadataFilter, SearchHit, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

const COLLECTION_FILE: &str = "collection.json";
const BACKEND: &str = "local";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    content: String,
    content_sha256: String,
    metadata: Metadata,
    vector: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    collection: String,
    dimensions: usize,
    updated_at: DateTime<Utc>,
    points: BTreeMap<String, StoredPoint>,
}

pub struct LocalVectorStore {
    directory: PathBuf,
    collection: String,
    dimensions: usize,
    committed: RwLock<BTreeMap<String, StoredPoint>>,
    pending: Mutex<BTreeMap<String, StoredPoint>>,
}

impl LocalVectorStore {
    /// Opens the collection under `root`, loading previously persisted points if any.
    pub async fn open(
        root: impl AsRef<Path>,
        collection: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, StoreError> {
        let collection = collection.into();
        let directory = root.as_ref().join(&collection);
        let path = directory.join(COLLECTION_FILE);

        let committed = if tokio::fs::try_exists(&path).await? {
            let bytes = tokio::fs::read(&path).await?;
            let file: CollectionFile = serde_json::from_slice(&bytes)?;
            if file.dimensions != dimensions {
                return Err(StoreError::Request(format!(
                    "collection {} holds {}-dimensional vectors, embedder produces {}",
                    collection, file.dimensions, dimensions
                )));
            }
            info!(collection = %collection, points = file.points.len(), "collection loaded");
            file.points
        } else {
            debug!(collection = %collection, "starting empty collection");
            BTreeMap::new()
        };

        Ok(Self {
            directory,
            collection,
            dimensions,
            committed: RwLock::new(committed),
            pending: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn collection_file(&self) -> PathBuf {
        self.directory.join(COLLECTION_FILE)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// SHA-256 of the stored content for `external_id`, if committed.
    pub async fn content_hash(&self, external_id: &str) -> Option<String> {
        self.committed
            .read()
            .await
            .get(external_id)
            .map(|point| point.content_sha256.clone())
    }

    async fn write_file(&self, points: &BTreeMap<String, StoredPoint>) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let file = CollectionFile {
            collection: self.collection.clone(),
            dimensions: self.dimensions,
            updated_at: Utc::now(),
            points: points.clone(),
        };
        let bytes = serde_json::to_vec(&file)?;

        let target = self.collection_file();
        let staging = self.directory.join(format!("{COLLECTION_FILE}.tmp"));
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(())
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm: f32 = left.iter().map(|a| a * a).sum::<f32>().sqrt();
    let right_norm: f32 = right.iter().map(|b| b * b).sum::<f32>().sqrt();
    if left_norm < f32::EPSILON || right_norm < f32::EPSILON {
        0.0
    } else {
        (dot / (left_norm * right_norm)) as f64
    }
}

fn to_hit(external_id: &str, point: &StoredPoint, score: f64) -> SearchHit {
    SearchHit {
        external_id: external_id.to_string(),
        score,
        source: BACKEND.to_string(),
        content: point.content.clone(),
        metadata: point.metadata.clone(),
    }
}

#[async_trait]
impl VectorIndex for LocalVectorStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn upsert_batch(
        &self,
        documents: &[IndexedDocument],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        check_batch_shape(documents, embeddings, self.dimensions)?;

        let mut pending = self.pending.lock().await;
        for (indexed, vector) in documents.iter().zip(embeddings) {
            pending.insert(
                indexed.external_id.clone(),
                StoredPoint {
                    content: indexed.document.content().to_string(),
                    content_sha256: indexed.document.content_sha256(),
                    metadata: indexed.document.metadata().clone(),
                    vector: vector.clone(),
                },
            );
        }
        Ok(())
    }

    async fn discard_pending(&self) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().await;
        debug!(discarded = pending.len(), "discarding staged points");
        pending.clear();
        Ok(())
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().await;
        let mut committed = self.committed.write().await;

        let mut merged = committed.clone();
        merged.extend(pending.iter().map(|(id, point)| (id.clone(), point.clone())));
        self.write_file(&merged).await?;

        info!(
            collection = %self.collection,
            upserted = pending.len(),
            resident = merged.len(),
            "collection persisted"
        );
        *committed = merged;
        pending.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.committed.read().await.len())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, StoreError> {
        if query_vector.len() != self.dimensions {
            return Err(StoreError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.dimensions
            )));
        }

        let committed = self.committed.read().await;
        let mut hits = committed
            .iter()
            .filter(|(_, point)| filter.matches(&point.metadata))
            .map(|(id, point)| to_hit(id, point, cosine_similarity(query_vector, &point.vector)))
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.external_id.cmp(&right.external_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn get(&self, external_id: &str) -> Result<Option<SearchHit>, StoreError> {
        Ok(self
            .committed
            .read()
            .await
            .get(external_id)
            .map(|point| to_hit(external_id, point, 1.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocumentKind, MetadataValue, RecruitDocument};
    use tempfile::tempdir;

    fn job(id: &str, title: &str) -> IndexedDocument {
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), "job".into());
        metadata.insert("codigo_vaga".into(), id.into());
        metadata.insert("has_valid_metadata".into(), true.into());
        let document = RecruitDocument::new(DocumentKind::Job, format!("VAGA: {title}"), metadata)
            .expect("valid job document");
        IndexedDocument {
            external_id: format!("job_{id}"),
            document,
        }
    }

    #[tokio::test]
    async fn staged_points_are_invisible_until_persist() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path(), "jobs", 2).await?;

        store.upsert_batch(&[job("1", "Dev")], &[vec![1.0, 0.0]]).await?;
        assert_eq!(store.count().await?, 0);
        assert_eq!(store.pending_count().await, 1);

        store.persist().await?;
        assert_eq!(store.count().await?, 1);
        assert!(store.collection_file().exists());
        Ok(())
    }

    #[tokio::test]
    async fn discard_drops_staged_points() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path(), "jobs", 2).await?;

        store.upsert_batch(&[job("1", "Dev")], &[vec![1.0, 0.0]]).await?;
        store.discard_pending().await?;
        store.persist().await?;
        assert_eq!(store.count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn reopen_restores_points_and_upserts_by_id() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let store = LocalVectorStore::open(dir.path(), "jobs", 2).await?;
            store.upsert_batch(&[job("1", "Dev")], &[vec![1.0, 0.0]]).await?;
            store.persist().await?;
        }

        let store = LocalVectorStore::open(dir.path(), "jobs", 2).await?;
        assert_eq!(store.count().await?, 1);
        store.upsert_batch(&[job("1", "Lead")], &[vec![1.0, 0.0]]).await?;
        store.persist().await?;

        assert_eq!(store.count().await?, 1);
        let hit = store.get("job_1").await?.expect("stored point");
        assert_eq!(hit.content, "VAGA: Lead");
        Ok(())
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_and_filters() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path(), "jobs", 2).await?;
        store
            .upsert_batch(
                &[job("1", "Dev"), job("2", "QA")],
                &[vec![1.0, 0.0], vec![0.0, 1.0]],
            )
            .await?;
        store.persist().await?;

        let hits = store.search(&[0.9, 0.1], 2, &MetadataFilter::default()).await?;
        assert_eq!(hits[0].external_id, "job_1");

        let filter = MetadataFilter::default().and("codigo_vaga", MetadataValue::Text("2".into()));
        let hits = store.search(&[0.9, 0.1], 5, &filter).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].external_id, "job_2");
        Ok(())
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path(), "jobs", 3).await?;
        let result = store.upsert_batch(&[job("1", "Dev")], &[vec![1.0]]).await;
        assert!(result.is_err());

        store.persist().await?;
        assert!(LocalVectorStore::open(dir.path(), "jobs", 4).await.is_err());
        Ok(())
    }
}
