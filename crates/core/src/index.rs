use crate::embeddings::Embedder;
use crate::traits::VectorIndex;
use crate::{
    DocumentKind, IndexedDocument, IngestError, IngestionOptions, MetadataValue, RecruitDocument,
    StoreError,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    /// Valid documents with their external ids, in ingestion order.
    pub indexed: Vec<IndexedDocument>,
    pub batches: usize,
    /// Points resident in the collection after persisting.
    pub resident_count: usize,
    /// SHA-256 over the sorted `(external id, content hash)` pairs of the indexed set.
    pub corpus_checksum: String,
}

impl IndexReport {
    pub fn is_empty(&self) -> bool {
        self.indexed.is_empty()
    }
}

fn key_part(document: &RecruitDocument, field: &str) -> Option<String> {
    document.metadata().get(field).and_then(MetadataValue::key_text)
}

/// Deterministic external id of a document.
///
/// `position` only appears in the fallback ids used when a natural key is missing.
pub fn external_id(document: &RecruitDocument, position: usize) -> String {
    let natural = match document.kind() {
        DocumentKind::Job => key_part(document, "codigo_vaga").map(|id| format!("job_{id}")),
        DocumentKind::Applicant => {
            key_part(document, "codigo_profissional").map(|id| format!("applicant_{id}"))
        }
        DocumentKind::Prospect => {
            let job = key_part(document, "vaga_id_associada");
            let candidate = key_part(document, "codigo_candidato_associado");
            let index = key_part(document, "prospect_identifier_index");
            match (job, candidate, index) {
                (Some(job), Some(candidate), Some(index)) => {
                    Some(format!("prospect_{job}_{candidate}_{index}"))
                }
                _ => None,
            }
        }
        DocumentKind::Error => None,
    };

    natural.unwrap_or_else(|| {
        let fallback = format!("{}_unkeyed_{position}", document.kind());
        warn!(
            kind = %document.kind(),
            position,
            fallback = %fallback,
            "document has no natural key, using positional id"
        );
        fallback
    })
}

/// Pairs every valid document with its external id. Invalid documents are left out.
pub fn assign_external_ids(documents: &[RecruitDocument]) -> Vec<IndexedDocument> {
    documents
        .iter()
        .filter(|document| document.is_valid())
        .enumerate()
        .map(|(position, document)| IndexedDocument {
            external_id: external_id(document, position),
            document: document.clone(),
        })
        .collect()
}

/// Fails with every colliding id and its count, sorted by id.
pub fn detect_duplicate_ids(indexed: &[IndexedDocument]) -> Result<(), IngestError> {
    let mut counts = HashMap::<&str, usize>::new();
    for item in indexed {
        *counts.entry(item.external_id.as_str()).or_default() += 1;
    }

    let mut duplicates = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, count)| (id.to_string(), count))
        .collect::<Vec<_>>();

    if duplicates.is_empty() {
        return Ok(());
    }

    duplicates.sort();
    let error = IngestError::DuplicateIds { duplicates };
    error!(%error, "external id collision, aborting ingestion");
    Err(error)
}

pub fn corpus_checksum(indexed: &[IndexedDocument]) -> String {
    let mut entries = indexed
        .iter()
        .map(|item| (item.external_id.as_str(), item.document.content_sha256()))
        .collect::<Vec<_>>();
    entries.sort();

    let mut hasher = Sha256::new();
    for (id, content_hash) in entries {
        hasher.update(id.as_bytes());
        hasher.update(b"\t");
        hasher.update(content_hash.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Indexes the valid subset of `documents` into `store`.
///
/// Ids are computed and checked for collisions before anything is written. Batches are staged
/// in order; the first failing batch discards everything staged and aborts the run. The
/// collection is persisted only after every batch was accepted.
pub async fn index_documents<V, E>(
    store: &V,
    embedder: &E,
    documents: &[RecruitDocument],
    options: &IngestionOptions,
) -> Result<IndexReport, IngestError>
where
    V: VectorIndex + ?Sized,
    E: Embedder + ?Sized,
{
    options.validate()?;

    let indexed = assign_external_ids(documents);
    if indexed.is_empty() {
        warn!(
            documents = documents.len(),
            "no valid documents to index, corpus is empty"
        );
        return Ok(IndexReport {
            resident_count: store.count().await?,
            corpus_checksum: corpus_checksum(&indexed),
            ..IndexReport::default()
        });
    }

    detect_duplicate_ids(&indexed)?;

    let batches = indexed.len().div_ceil(options.batch_size);
    info!(
        documents = indexed.len(),
        batches,
        batch_size = options.batch_size,
        store = store.name(),
        "indexing documents"
    );

    for (position, batch) in indexed.chunks(options.batch_size).enumerate() {
        let number = position + 1;
        info!(batch = number, batches, size = batch.len(), "indexing batch");

        let staged: Result<(), StoreError> = async {
            let texts = batch
                .iter()
                .map(|item| item.document.content())
                .collect::<Vec<_>>();
            let embeddings = embedder.embed_batch(&texts)?;
            store.upsert_batch(batch, &embeddings).await
        }
        .await;

        if let Err(cause) = staged {
            error!(batch = number, batches, error = %cause, "batch failed, aborting ingestion");
            if let Err(discard_error) = store.discard_pending().await {
                warn!(error = %discard_error, "unable to discard staged batches");
            }
            return Err(IngestError::BatchFailed {
                batch: number,
                batches,
                details: cause.to_string(),
            });
        }
    }

    if let Err(cause) = store.persist().await {
        error!(error = %cause, "persisting the collection failed");
        if let Err(discard_error) = store.discard_pending().await {
            warn!(error = %discard_error, "unable to discard staged batches");
        }
        return Err(cause.into());
    }

    let resident_count = store.count().await?;
    info!(resident = resident_count, "all batches persisted");

    Ok(IndexReport {
        corpus_checksum: corpus_checksum(&indexed),
        indexed,
        batches,
        resident_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::stores::LocalVectorStore;
    use crate::textualize::{textualize_applicant, Textualized};
    use crate::{sanitize_metadata, Metadata, MetadataFilter, SearchHit};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn document(outcome: Textualized) -> RecruitDocument {
        match outcome {
            Textualized::Valid {
                kind,
                content,
                metadata,
            } => RecruitDocument::new(kind, content, sanitize_metadata(&Value::Object(metadata)))
                .expect("valid document"),
            Textualized::Invalid { content, metadata } => RecruitDocument::error(content, metadata),
        }
    }

    fn job(id: &str) -> RecruitDocument {
        let mut metadata = Metadata::new();
        metadata.insert("type".into(), "job".into());
        metadata.insert("codigo_vaga".into(), id.into());
        metadata.insert("has_valid_metadata".into(), true.into());
        RecruitDocument::new(DocumentKind::Job, format!("VAGA {id}"), metadata)
            .expect("valid job")
    }

    /// Records what was staged and fails on a chosen batch.
    #[derive(Default)]
    struct FlakyStore {
        fail_on_batch: Option<usize>,
        calls: AtomicUsize,
        staged: Mutex<Vec<String>>,
        committed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VectorIndex for FlakyStore {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn upsert_batch(
            &self,
            documents: &[IndexedDocument],
            _embeddings: &[Vec<f32>],
        ) -> Result<(), StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(call) == self.fail_on_batch {
                return Err(StoreError::BackendResponse {
                    backend: "flaky".into(),
                    details: "413: payload too large".into(),
                });
            }
            let mut staged = self.staged.lock().expect("lock");
            staged.extend(documents.iter().map(|item| item.external_id.clone()));
            Ok(())
        }

        async fn discard_pending(&self) -> Result<(), StoreError> {
            self.staged.lock().expect("lock").clear();
            Ok(())
        }

        async fn persist(&self) -> Result<(), StoreError> {
            let staged = std::mem::take(&mut *self.staged.lock().expect("lock"));
            self.committed.lock().expect("lock").extend(staged);
            Ok(())
        }

        async fn count(&self) -> Result<usize, StoreError> {
            Ok(self.committed.lock().expect("lock").len())
        }

        async fn search(
            &self,
            _query_vector: &[f32],
            _top_k: usize,
            _filter: &MetadataFilter,
        ) -> Result<Vec<SearchHit>, StoreError> {
            Ok(Vec::new())
        }

        async fn get(&self, _external_id: &str) -> Result<Option<SearchHit>, StoreError> {
            Ok(None)
        }
    }

    #[test]
    fn external_ids_follow_kind_and_natural_key() {
        let prospect = document(crate::textualize::textualize_prospect(
            "prospects",
            "100",
            "Dev",
            4,
            &json!({"codigo": "55"}),
        ));
        assert_eq!(external_id(&job("9"), 0), "job_9");
        assert_eq!(external_id(&prospect, 0), "prospect_100_55_4");
    }

    #[test]
    fn error_documents_get_positional_fallback() {
        let broken = document(textualize_applicant("applicants", "1", &json!("x")));
        assert_eq!(external_id(&broken, 3), "error_document_unkeyed_3");
        assert!(assign_external_ids(&[broken]).is_empty());
    }

    #[test]
    fn shared_applicant_code_is_reported_with_count() {
        let raw = json!({
            "infos_basicas": {"nome": "Ana"},
            "informacoes_profissionais": {}, "formacao_e_idiomas": {}
        });
        let first = document(textualize_applicant("applicants", "123", &raw));
        let second = document(textualize_applicant("applicants", "123", &raw));

        let indexed = assign_external_ids(&[first, second, job("1")]);
        let error = detect_duplicate_ids(&indexed).expect_err("collision");
        assert_eq!(error.duplicate_ids(), &[("applicant_123".to_string(), 2)]);
    }

    #[tokio::test]
    async fn collision_aborts_before_any_write() -> Result<(), Box<dyn std::error::Error>> {
        let store = FlakyStore::default();
        let documents = vec![job("1"), job("2"), job("1")];

        let result = index_documents(
            &store,
            &HashingEmbedder::default(),
            &documents,
            &IngestionOptions::default(),
        )
        .await;

        assert!(matches!(result, Err(IngestError::DuplicateIds { .. })));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn batch_failure_leaves_nothing_committed() -> Result<(), Box<dyn std::error::Error>> {
        let store = FlakyStore {
            fail_on_batch: Some(2),
            ..FlakyStore::default()
        };
        let documents = (0..5).map(|id| job(&id.to_string())).collect::<Vec<_>>();
        let options = IngestionOptions {
            batch_size: 2,
            ..IngestionOptions::default()
        };

        let error = index_documents(&store, &HashingEmbedder::default(), &documents, &options)
            .await
            .expect_err("second batch fails");

        match error {
            IngestError::BatchFailed {
                batch,
                batches,
                details,
            } => {
                assert_eq!((batch, batches), (2, 3));
                assert!(details.contains("payload too large"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(store.count().await?, 0);
        assert!(store.staged.lock().expect("lock").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn documents_are_written_in_fixed_size_batches() -> Result<(), Box<dyn std::error::Error>>
    {
        let store = FlakyStore::default();
        let documents = (0..5).map(|id| job(&id.to_string())).collect::<Vec<_>>();
        let options = IngestionOptions {
            batch_size: 2,
            ..IngestionOptions::default()
        };

        let report =
            index_documents(&store, &HashingEmbedder::default(), &documents, &options).await?;
        assert_eq!(report.batches, 3);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.resident_count, 5);
        Ok(())
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let store = FlakyStore::default();
        let options = IngestionOptions {
            batch_size: 0,
            ..IngestionOptions::default()
        };
        let result =
            index_documents(&store, &HashingEmbedder::default(), &[job("1")], &options).await;
        assert!(matches!(result, Err(IngestError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn invalid_documents_are_not_indexed() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = HashingEmbedder::default();
        let store = LocalVectorStore::open(dir.path(), "recruit", embedder.dimensions).await?;
        let broken = document(crate::textualize::textualize_job(
            "jobs",
            "2",
            &json!({"perfil_vaga": "texto"}),
        ));

        let report =
            index_documents(&store, &embedder, &[job("1"), broken], &IngestionOptions::default())
                .await?;
        assert_eq!(report.indexed.len(), 1);
        assert_eq!(store.count().await?, 1);
        assert!(store.get("job_1").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn empty_corpus_is_not_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let store = FlakyStore::default();
        let report = index_documents(
            &store,
            &HashingEmbedder::default(),
            &[],
            &IngestionOptions::default(),
        )
        .await?;
        assert!(report.is_empty());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn checksum_ignores_order() {
        let forward = assign_external_ids(&[job("1"), job("2")]);
        let backward = assign_external_ids(&[job("2"), job("1")]);
        assert_eq!(corpus_checksum(&forward), corpus_checksum(&backward));
    }
}
