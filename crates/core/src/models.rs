use crate::IngestError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub const VALIDITY_KEY: &str = "has_valid_metadata";
pub const TYPE_KEY: &str = "type";
pub const ERROR_DOCUMENT_TYPE: &str = "error_document";
pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const DEFAULT_COLLECTION: &str = "intellimatch_collection";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Job,
    Applicant,
    Prospect,
    #[serde(rename = "error_document")]
    Error,
}

impl DocumentKind {
    /// Value stored under the `type` metadata key.
    pub fn type_tag(self) -> &'static str {
        match self {
            DocumentKind::Job => "job",
            DocumentKind::Applicant => "applicant",
            DocumentKind::Prospect => "prospect",
            DocumentKind::Error => ERROR_DOCUMENT_TYPE,
        }
    }

    pub fn from_type_tag(tag: &str) -> Option<Self> {
        match tag {
            "job" => Some(DocumentKind::Job),
            "applicant" => Some(DocumentKind::Applicant),
            "prospect" => Some(DocumentKind::Prospect),
            ERROR_DOCUMENT_TYPE => Some(DocumentKind::Error),
            _ => None,
        }
    }

    /// Only jobs and applicants are addressable through the lookup table.
    pub fn is_addressable(self) -> bool {
        matches!(self, DocumentKind::Job | DocumentKind::Applicant)
    }

    /// Metadata keys that make up the kind's natural key.
    pub fn natural_key_fields(self) -> &'static [&'static str] {
        match self {
            DocumentKind::Job => &["codigo_vaga"],
            DocumentKind::Applicant => &["codigo_profissional"],
            DocumentKind::Prospect => &[
                "vaga_id_associada",
                "codigo_candidato_associado",
                "prospect_identifier_index",
            ],
            DocumentKind::Error => &["original_id"],
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_tag())
    }
}

/// A storage-safe metadata value. Nested structures are unrepresentable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Text used when the value becomes part of an identifier.
    pub fn key_text(&self) -> Option<String> {
        match self {
            MetadataValue::Null => None,
            MetadataValue::Bool(flag) => Some(flag.to_string()),
            MetadataValue::Integer(number) => Some(number.to_string()),
            MetadataValue::Float(number) => Some(number.to_string()),
            MetadataValue::Text(text) if text.is_empty() => None,
            MetadataValue::Text(text) => Some(text.clone()),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Integer(value)
    }
}

pub type Metadata = BTreeMap<String, MetadataValue>;

/// One normalized recruitment document. Immutable once built.
///
/// Only [`RecruitDocument::new`] and [`RecruitDocument::error`] build one, so there is no
/// `Deserialize` path around the guard:
///
/// ```compile_fail
/// let _: recruit_index_core::RecruitDocument = serde_json::from_str("{}").unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecruitDocument {
    kind: DocumentKind,
    content: String,
    metadata: Metadata,
}

impl RecruitDocument {
    /// Builds a job, applicant or prospect document from sanitized metadata.
    ///
    /// The metadata must carry the validity flag, the matching `type` tag and every natural key
    /// field of the kind.
    pub fn new(
        kind: DocumentKind,
        content: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Self, IngestError> {
        let describe = |reason: String| IngestError::InvalidDocument {
            key: describe_key(kind, &metadata),
            reason,
        };

        if kind == DocumentKind::Error {
            return Err(describe("error documents are built with RecruitDocument::error".into()));
        }
        if metadata.get(VALIDITY_KEY).and_then(MetadataValue::as_bool) != Some(true) {
            return Err(describe(format!("{VALIDITY_KEY} is not true")));
        }
        let tag = metadata.get(TYPE_KEY).and_then(MetadataValue::as_str);
        if tag != Some(kind.type_tag()) {
            return Err(describe(format!("type tag {tag:?} does not match {kind}")));
        }
        if let Some(missing) = kind
            .natural_key_fields()
            .iter()
            .find(|field| metadata.get(**field).and_then(MetadataValue::key_text).is_none())
        {
            return Err(describe(format!("natural key field '{missing}' is missing")));
        }

        Ok(Self {
            kind,
            content: content.into(),
            metadata,
        })
    }

    /// Stand-in for a record that failed to textualize.
    pub fn error(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            kind: DocumentKind::Error,
            content: content.into(),
            metadata,
        }
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_text(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetadataValue::as_str)
    }

    pub fn content_sha256(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn is_valid(&self) -> bool {
        self.kind != DocumentKind::Error
            && self.metadata.get(VALIDITY_KEY).and_then(MetadataValue::as_bool) == Some(true)
    }
}

fn describe_key(kind: DocumentKind, metadata: &Metadata) -> String {
    let parts = kind
        .natural_key_fields()
        .iter()
        .filter_map(|field| metadata.get(*field).and_then(MetadataValue::key_text))
        .collect::<Vec<_>>();
    if parts.is_empty() {
        format!("{kind}_<unknown>")
    } else {
        format!("{kind}_{}", parts.join("_"))
    }
}

/// A valid document paired with its deterministic external id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedDocument {
    pub external_id: String,
    pub document: RecruitDocument,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePaths {
    pub jobs: PathBuf,
    pub applicants: PathBuf,
    pub prospects: PathBuf,
}

impl Default for SourcePaths {
    fn default() -> Self {
        Self {
            jobs: PathBuf::from("data/vagas.json"),
            applicants: PathBuf::from("data/applicants.json"),
            prospects: PathBuf::from("data/prospects.json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub batch_size: usize,
    pub collection: String,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl IngestionOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.batch_size == 0 {
            return Err(IngestError::InvalidArgument(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.collection.trim().is_empty() {
            return Err(IngestError::InvalidArgument(
                "collection name is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Equality filter over metadata fields, e.g. `type == "job"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub equals: Vec<(String, MetadataValue)>,
}

impl MetadataFilter {
    pub fn kind(kind: DocumentKind) -> Self {
        Self::default().and(TYPE_KEY, kind.type_tag())
    }

    pub fn and(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.equals.push((key.into(), value.into()));
        self
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub top_k: usize,
    pub kind: Option<DocumentKind>,
    pub filter: MetadataFilter,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            kind: None,
            filter: MetadataFilter::default(),
        }
    }

    pub fn with_kind(mut self, kind: DocumentKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Kind restriction merged into the explicit metadata filter.
    pub fn effective_filter(&self) -> MetadataFilter {
        match self.kind {
            Some(kind) => self.filter.clone().and(TYPE_KEY, kind.type_tag()),
            None => self.filter.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub external_id: String,
    pub score: f64,
    pub source: String,
    pub content: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub hits: Vec<SearchHit>,
}
