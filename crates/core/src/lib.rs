pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod records;
pub mod retrieval;
pub mod sanitize;
pub mod sources;
pub mod state;
pub mod stores;
pub mod textualize;
pub mod traits;

pub use corpus::{build_corpus, lookup_key, CorpusReport, LookupTable, SkippedRecord};
pub use embeddings::{Embedder, HashingEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, RecordError, StoreError};
pub use index::{
    assign_external_ids, corpus_checksum, detect_duplicate_ids, external_id, index_documents,
    IndexReport,
};
pub use models::{
    DocumentKind, IndexedDocument, IngestionOptions, Metadata, MetadataFilter, MetadataValue,
    RecruitDocument, SearchHit, SearchQuery, SearchResult, SourcePaths, DEFAULT_BATCH_SIZE,
    DEFAULT_COLLECTION,
};
pub use pipeline::{ingest_sources, run_ingestion};
pub use retrieval::{Page, RecordSummary, Retriever, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use sanitize::sanitize_metadata;
pub use sources::{load_source, RawSources, RecordSource};
pub use state::{CorpusIndex, IndexHandle};
pub use stores::{LocalVectorStore, QdrantStore};
pub use textualize::{textualize_applicant, textualize_job, textualize_prospect, Textualized};
pub use traits::VectorIndex;
