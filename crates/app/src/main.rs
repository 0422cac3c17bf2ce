use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use recruit_index_core::{
    build_corpus, CorpusIndex, DocumentKind, Embedder, HashingEmbedder, IndexHandle,
    IngestionOptions, LocalVectorStore, Metadata, Page, QdrantStore, RawSources, RecordSummary,
    RecruitDocument, Retriever, SearchQuery, SourcePaths, StoreError, VectorIndex, DEFAULT_BATCH_SIZE,
    DEFAULT_COLLECTION, DEFAULT_PAGE_LIMIT,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "recruit-index", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Jobs source (JSON object keyed by job id)
    #[arg(long, env = "DATA_PATH_VAGAS", default_value = "data/vagas.json")]
    jobs_path: PathBuf,

    /// Applicants source (JSON object keyed by applicant id)
    #[arg(long, env = "DATA_PATH_APPLICANTS", default_value = "data/applicants.json")]
    applicants_path: PathBuf,

    /// Prospects source (JSON object keyed by job id)
    #[arg(long, env = "DATA_PATH_PROSPECTS", default_value = "data/prospects.json")]
    prospects_path: PathBuf,

    /// Directory holding local vector collections
    #[arg(long, env = "VECTOR_STORE_PATH", default_value = "vector_store_db")]
    store_path: PathBuf,

    /// Vector collection name
    #[arg(long, env = "VECTOR_COLLECTION_NAME", default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// Documents per store write
    #[arg(long, env = "INGEST_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Vector store backend
    #[arg(long, env = "VECTOR_BACKEND", value_enum, default_value_t = Backend::Local)]
    backend: Backend,

    /// Qdrant base URL, used with --backend qdrant
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Local,
    Qdrant,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Job,
    Applicant,
    Prospect,
}

impl From<KindArg> for DocumentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Job => DocumentKind::Job,
            KindArg::Applicant => DocumentKind::Applicant,
            KindArg::Prospect => DocumentKind::Prospect,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Build the corpus from the three sources and index it.
    Ingest,
    /// Similarity search over the indexed collection.
    Search {
        #[arg(long)]
        query: String,
        /// Restrict hits to one document kind.
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
    /// Show one job from the lookup table.
    Job {
        #[arg(long)]
        id: String,
    },
    /// Show one applicant from the lookup table.
    Applicant {
        #[arg(long)]
        id: String,
    },
    /// List valid jobs.
    Jobs {
        #[arg(long, default_value = "0")]
        skip: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: usize,
    },
    /// List valid applicants.
    Applicants {
        #[arg(long, default_value = "0")]
        skip: usize,
        #[arg(long, default_value_t = DEFAULT_PAGE_LIMIT)]
        limit: usize,
    },
}

impl Cli {
    fn source_paths(&self) -> SourcePaths {
        SourcePaths {
            jobs: self.jobs_path.clone(),
            applicants: self.applicants_path.clone(),
            prospects: self.prospects_path.clone(),
        }
    }

    fn options(&self) -> IngestionOptions {
        IngestionOptions {
            batch_size: self.batch_size,
            collection: self.collection.clone(),
        }
    }

    /// Opens a new instance of the configured backend. Each ingestion run gets its own.
    async fn open_store(&self, dimensions: usize) -> Result<Arc<dyn VectorIndex>, StoreError> {
        let store: Arc<dyn VectorIndex> = match self.backend {
            Backend::Local => Arc::new(
                LocalVectorStore::open(&self.store_path, &self.collection, dimensions).await?,
            ),
            Backend::Qdrant => {
                let store = QdrantStore::new(&self.qdrant_url, &self.collection, dimensions)?;
                store.ensure_collection().await?;
                Arc::new(store)
            }
        };
        Ok(store)
    }

    fn store_label(&self) -> String {
        match self.backend {
            Backend::Local => format!("collection under {}", self.store_path.display()),
            Backend::Qdrant => format!("qdrant collection {}", self.collection),
        }
    }

    /// Rebuilds the corpus from the sources without touching any store.
    fn lookup_retriever(&self) -> Retriever<dyn VectorIndex, HashingEmbedder> {
        let corpus = build_corpus(&RawSources::load(&self.source_paths()));
        let index = CorpusIndex {
            documents: corpus.documents,
            lookup: corpus.lookup,
            skipped: corpus.skipped,
            ..CorpusIndex::empty()
        };
        Retriever::new(Arc::new(index), HashingEmbedder::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        backend = ?cli.backend,
        collection = %cli.collection,
        "recruit-index boot"
    );

    let embedder = HashingEmbedder::default();

    match &cli.command {
        Command::Ingest => {
            let handle = IndexHandle::new();
            let index = match handle
                .reindex(
                    &cli.source_paths(),
                    || cli.open_store(embedder.dimensions()),
                    &embedder,
                    &cli.options(),
                )
                .await
            {
                Ok(index) => index,
                Err(cause) => {
                    error!(error = %cause, "ingestion failed, retrieval stays unavailable");
                    return Err(cause.into());
                }
            };

            for skipped in &index.skipped {
                warn!(
                    source = %skipped.source,
                    record = %skipped.record_id,
                    reason = %skipped.reason,
                    "skipped record"
                );
            }

            let errors = index
                .documents
                .iter()
                .filter(|document| !document.is_valid())
                .count();
            println!(
                "{} documents indexed ({} error documents, {} skipped) at {}",
                index.report.indexed.len(),
                errors,
                index.skipped.len(),
                index.built_at.to_rfc3339()
            );
            println!(
                "collection={} resident={} batches={} checksum={}",
                cli.collection,
                index.report.resident_count,
                index.report.batches,
                index.report.corpus_checksum
            );
        }
        Command::Search { query, kind, top_k } => {
            let store = cli
                .open_store(embedder.dimensions())
                .await
                .with_context(|| format!("opening {}", cli.store_label()))?;
            if store.count().await? == 0 {
                warn!(collection = %cli.collection, "collection is empty, run ingest first");
            }
            let index = CorpusIndex {
                store: Some(store),
                ..CorpusIndex::empty()
            };
            let retriever = Retriever::new(Arc::new(index), embedder);

            let mut search_query = SearchQuery::new(query.clone(), *top_k);
            if let Some(kind) = kind {
                search_query = search_query.with_kind((*kind).into());
            }

            let result = retriever.search(&search_query).await?;
            println!("query: {}", result.query);
            for hit in result.hits {
                println!("[{}] score={:.4} id={}", hit.source, hit.score, hit.external_id);
                println!("{}", indent(&hit.content));
            }
        }
        Command::Job { id } => {
            let retriever = cli.lookup_retriever();
            let Some(job) = retriever.job_details(id) else {
                bail!("job {id} not found or invalid");
            };
            print_document(job);
        }
        Command::Applicant { id } => {
            let retriever = cli.lookup_retriever();
            let Some(applicant) = retriever.applicant_details(id) else {
                bail!("applicant {id} not found or invalid");
            };
            print_document(applicant);
        }
        Command::Jobs { skip, limit } => {
            print_page("jobs", &cli.lookup_retriever().list_jobs(*skip, *limit));
        }
        Command::Applicants { skip, limit } => {
            print_page(
                "applicants",
                &cli.lookup_retriever().list_applicants(*skip, *limit),
            );
        }
    }

    Ok(())
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_document(document: &RecruitDocument) {
    println!("{}", document.content());
    print_metadata(document.metadata());
}

fn print_metadata(metadata: &Metadata) {
    for (key, value) in metadata {
        match value.key_text() {
            Some(text) => println!("  {key}={text}"),
            None => println!("  {key}="),
        }
    }
}

fn print_page(label: &str, page: &Page<RecordSummary>) {
    println!("{label}: {} of {}", page.items.len(), page.total);
    for item in &page.items {
        println!("  {} {}", item.id, item.label);
    }
}
