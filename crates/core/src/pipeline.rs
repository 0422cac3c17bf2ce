use crate::corpus::build_corpus;
use crate::embeddings::Embedder;
use crate::index::index_documents;
use crate::sources::RawSources;
use crate::state::CorpusIndex;
use crate::traits::VectorIndex;
use crate::{IngestError, IngestionOptions, SourcePaths};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Loads the three sources and runs a full ingestion into `store`.
pub async fn run_ingestion<S, E>(
    paths: &SourcePaths,
    store: Arc<S>,
    embedder: &E,
    options: &IngestionOptions,
) -> Result<CorpusIndex<S>, IngestError>
where
    S: VectorIndex + ?Sized,
    E: Embedder + ?Sized,
{
    options.validate()?;
    info!(
        jobs = %paths.jobs.display(),
        applicants = %paths.applicants.display(),
        prospects = %paths.prospects.display(),
        "loading sources"
    );
    let sources = RawSources::load(paths);
    ingest_sources(&sources, store, embedder, options).await
}

/// Ingests already loaded sources.
///
/// All-empty sources and a corpus without a single valid document both end in an empty index
/// without a store. Collisions and store failures abort the run.
pub async fn ingest_sources<S, E>(
    sources: &RawSources,
    store: Arc<S>,
    embedder: &E,
    options: &IngestionOptions,
) -> Result<CorpusIndex<S>, IngestError>
where
    S: VectorIndex + ?Sized,
    E: Embedder + ?Sized,
{
    options.validate()?;

    if sources.is_empty() {
        warn!("all sources are empty, nothing to ingest");
        return Ok(CorpusIndex::empty());
    }

    let corpus = build_corpus(sources);
    let report = index_documents(store.as_ref(), embedder, &corpus.documents, options).await?;

    if report.is_empty() {
        warn!(
            documents = corpus.documents.len(),
            "no valid documents were indexed, publishing without a store"
        );
    } else {
        info!(
            indexed = report.indexed.len(),
            errors = corpus.error_documents().count(),
            skipped = corpus.skipped.len(),
            resident = report.resident_count,
            checksum = %report.corpus_checksum,
            "ingestion finished"
        );
    }

    Ok(CorpusIndex {
        store: (!report.is_empty()).then_some(store),
        documents: corpus.documents,
        lookup: corpus.lookup,
        skipped: corpus.skipped,
        report,
        built_at: Utc::now(),
    })
}
