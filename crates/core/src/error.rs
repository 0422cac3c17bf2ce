use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("duplicate external ids: {}", format_duplicates(.duplicates))]
    DuplicateIds { duplicates: Vec<(String, usize)> },

    #[error("batch {batch}/{batches} failed: {details}")]
    BatchFailed {
        batch: usize,
        batches: usize,
        details: String,
    },

    #[error("invalid document {key}: {reason}")]
    InvalidDocument { key: String, reason: String },

    #[error("vector store error: {0}")]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Ids reported by a collision failure, empty for every other variant.
    pub fn duplicate_ids(&self) -> &[(String, usize)] {
        match self {
            IngestError::DuplicateIds { duplicates } => duplicates,
            _ => &[],
        }
    }
}

fn format_duplicates(duplicates: &[(String, usize)]) -> String {
    duplicates
        .iter()
        .map(|(id, count)| format!("{id} (x{count})"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store request failed: {0}")]
    Request(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("store not available yet: {0}")]
    NotReady(String),
}

/// Structural problem found while decoding one raw record. Never leaves the textualizers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordError {
    #[error("record is not an object (found {found})")]
    NotAnObject { found: &'static str },

    #[error("section '{section}' is missing")]
    MissingSection { section: &'static str },

    #[error("section '{section}' is not an object (found {found})")]
    InvalidSection {
        section: &'static str,
        found: &'static str,
    },
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::IngestError;

    #[test]
    fn duplicate_report_names_every_id_and_count() {
        let error = IngestError::DuplicateIds {
            duplicates: vec![("applicant_123".to_string(), 2), ("job_7".to_string(), 3)],
        };

        let message = error.to_string();
        assert!(message.contains("applicant_123 (x2)"));
        assert!(message.contains("job_7 (x3)"));
        assert_eq!(error.duplicate_ids().len(), 2);
    }
}
