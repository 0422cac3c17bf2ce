use crate::traits::{check_batch_shape, VectorIndex};
use crate::{IndexedDocument, Metadata, MetadataFilter, MetadataValue, SearchHit, StoreError};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

const BACKEND: &str = "qdrant";
const EXTERNAL_ID_FIELD: &str = "external_id";
const CONTENT_FIELD: &str = "content";
/// Points sent per request when pending upserts are flushed.
const FLUSH_CHUNK: usize = 256;

/// Qdrant collection accessed over its HTTP API.
///
/// Upserted points stay in memory until [`VectorIndex::persist`] sends them, so a run that fails
/// halfway leaves the collection as it was.
pub struct QdrantStore {
    endpoint: Url,
    collection: String,
    client: Client,
    vector_size: usize,
    pending: Mutex<Vec<Value>>,
}

impl QdrantStore {
    pub fn new(
        endpoint: &str,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            collection: collection.into(),
            client: Client::new(),
            vector_size,
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Points buffered by `upsert_batch` and not yet sent.
    pub async fn pending_points(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn send_points(&self, points: &[Value]) -> Result<(), StoreError> {
        let mut url = self.url("/points")?;
        url.set_query(Some("wait=true"));
        let response = self
            .client
            .put(url)
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }
        Ok(())
    }

    /// Deterministic Qdrant point id for an external id.
    pub fn point_id(external_id: &str) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, external_id.as_bytes())
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        Ok(self
            .endpoint
            .join(&format!("collections/{}{}", self.collection, path))?)
    }

    /// Creates the collection with cosine distance when it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), StoreError> {
        let response = self.client.get(self.url("")?).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response).await);
        }

        let response = self
            .client
            .put(self.url("")?)
            .json(&json!({
                "vectors": {"size": self.vector_size, "distance": "Cosine"}
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }
        Ok(())
    }
}

/// Turns a failed response into an error carrying the response body.
async fn backend_error(response: Response) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let details = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|parsed| {
            parsed
                .pointer("/status/error")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or(body);

    StoreError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("{status}: {details}"),
    }
}

fn filter_json(filter: &MetadataFilter) -> Option<Value> {
    if filter.equals.is_empty() {
        return None;
    }

    let must = filter
        .equals
        .iter()
        .map(|(key, value)| match value {
            MetadataValue::Null => json!({"is_null": {"key": key}}),
            MetadataValue::Float(number) => {
                json!({"key": key, "range": {"gte": number, "lte": number}})
            }
            other => json!({"key": key, "match": {"value": other}}),
        })
        .collect::<Vec<_>>();

    Some(json!({ "must": must }))
}

fn payload_json(indexed: &IndexedDocument) -> Value {
    let mut payload = indexed
        .document
        .metadata()
        .iter()
        .map(|(key, value)| (key.clone(), json!(value)))
        .collect::<Map<String, Value>>();
    payload.insert(EXTERNAL_ID_FIELD.into(), json!(indexed.external_id));
    payload.insert(CONTENT_FIELD.into(), json!(indexed.document.content()));
    Value::Object(payload)
}

fn hit_from_point(point: &Value, score: f64) -> Option<SearchHit> {
    let payload = point.pointer("/payload")?.as_object()?;
    let external_id = payload.get(EXTERNAL_ID_FIELD)?.as_str()?.to_string();
    let content = payload
        .get(CONTENT_FIELD)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let metadata = payload
        .iter()
        .filter(|(key, _)| key.as_str() != EXTERNAL_ID_FIELD && key.as_str() != CONTENT_FIELD)
        .filter_map(|(key, value)| {
            serde_json::from_value::<MetadataValue>(value.clone())
                .ok()
                .map(|parsed| (key.clone(), parsed))
        })
        .collect::<Metadata>();

    Some(SearchHit {
        external_id,
        score,
        source: BACKEND.to_string(),
        content,
        metadata,
    })
}

#[async_trait]
impl VectorIndex for QdrantStore {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn upsert_batch(
        &self,
        documents: &[IndexedDocument],
        embeddings: &[Vec<f32>],
    ) -> Result<(), StoreError> {
        check_batch_shape(documents, embeddings, self.vector_size)?;
        if documents.is_empty() {
            return Ok(());
        }

        let points = documents
            .iter()
            .zip(embeddings)
            .map(|(indexed, embedding)| {
                json!({
                    "id": Self::point_id(&indexed.external_id),
                    "vector": embedding,
                    "payload": payload_json(indexed),
                })
            })
            .collect::<Vec<_>>();

        let mut pending = self.pending.lock().await;
        pending.extend(points);
        debug!(collection = %self.collection, pending = pending.len(), "points staged");
        Ok(())
    }

    async fn discard_pending(&self) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().await;
        info!(
            collection = %self.collection,
            discarded = pending.len(),
            "discarding staged points"
        );
        pending.clear();
        Ok(())
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let points = std::mem::take(&mut *self.pending.lock().await);
        if points.is_empty() {
            return Ok(());
        }

        for chunk in points.chunks(FLUSH_CHUNK) {
            self.send_points(chunk).await?;
        }
        info!(collection = %self.collection, points = points.len(), "points flushed");
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let response = self
            .client
            .post(self.url("/points/count")?)
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let parsed: Value = response.json().await?;
        parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .map(|count| count as usize)
            .ok_or_else(|| StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: "count response without result.count".to_string(),
            })
    }

    async fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<SearchHit>, StoreError> {
        if query_vector.len() != self.vector_size {
            return Err(StoreError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.vector_size
            )));
        }

        let mut body = json!({
            "vector": query_vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let (Some(filter), Some(object)) = (filter_json(filter), body.as_object_mut()) {
            object.insert("filter".into(), filter);
        }

        let response = self
            .client
            .post(self.url("/points/search")?)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .iter()
            .filter_map(|hit| {
                let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
                hit_from_point(hit, score)
            })
            .collect())
    }

    async fn get(&self, external_id: &str) -> Result<Option<SearchHit>, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("/points/{}", Self::point_id(external_id)))?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(backend_error(response).await);
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result")
            .and_then(|point| hit_from_point(point, 1.0)))
    }
}
