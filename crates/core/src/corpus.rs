use crate::models::{DocumentKind, RecruitDocument};
use crate::records::text_of;
use crate::sanitize::{json_type_name, sanitize_metadata};
use crate::sources::RawSources;
use crate::textualize::{textualize_applicant, textualize_job, textualize_prospect, Textualized};
use crate::IngestError;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, info, warn};

pub const UNKNOWN_JOB_TITLE: &str = "Título Desconhecido";

/// Direct access to valid jobs and applicants, keyed by `"<kind>_<id>"`.
pub type LookupTable = HashMap<String, RecruitDocument>;

pub fn lookup_key(kind: DocumentKind, id: &str) -> String {
    format!("{}_{id}", kind.type_tag())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub source: String,
    pub record_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CorpusReport {
    /// Every built document in ingestion order, error documents included.
    pub documents: Vec<RecruitDocument>,
    pub lookup: LookupTable,
    pub skipped: Vec<SkippedRecord>,
    /// Number of prospect entries seen; also the next unused ingestion index.
    pub prospect_entries: u64,
}

impl CorpusReport {
    pub fn valid_documents(&self) -> impl Iterator<Item = &RecruitDocument> {
        self.documents.iter().filter(|document| document.is_valid())
    }

    pub fn error_documents(&self) -> impl Iterator<Item = &RecruitDocument> {
        self.documents
            .iter()
            .filter(|document| document.kind() == DocumentKind::Error)
    }

    fn accept(&mut self, source: &str, record_id: &str, outcome: Textualized) {
        match into_document(outcome) {
            Ok(document) => {
                if document.is_valid() && document.kind().is_addressable() {
                    self.lookup
                        .insert(lookup_key(document.kind(), record_id), document.clone());
                }
                self.documents.push(document);
            }
            Err(reason) => self.skip(source, record_id, reason.to_string()),
        }
    }

    fn skip(&mut self, source: &str, record_id: &str, reason: String) {
        error!(source, record_id, reason = %reason, "record skipped");
        self.skipped.push(SkippedRecord {
            source: source.to_string(),
            record_id: record_id.to_string(),
            reason,
        });
    }
}

/// Sanitizes valid metadata and builds the document. Error shapes are already primitive.
fn into_document(outcome: Textualized) -> Result<RecruitDocument, IngestError> {
    match outcome {
        Textualized::Valid {
            kind,
            content,
            metadata,
        } => RecruitDocument::new(kind, content, sanitize_metadata(&Value::Object(metadata))),
        Textualized::Invalid { content, metadata } => Ok(RecruitDocument::error(content, metadata)),
    }
}

/// Builds the document corpus from jobs, then applicants, then prospects.
///
/// Record-level failures become error documents; documents that fail the construction guard
/// are dropped and listed in [`CorpusReport::skipped`]. Nothing here aborts the run.
pub fn build_corpus(sources: &RawSources) -> CorpusReport {
    let mut report = CorpusReport::default();

    info!(records = sources.jobs.len(), "processing jobs");
    for (job_id, raw) in &sources.jobs.records {
        let outcome = textualize_job(&sources.jobs.label, job_id, raw);
        report.accept(&sources.jobs.label, job_id, outcome);
    }

    info!(records = sources.applicants.len(), "processing applicants");
    for (applicant_id, raw) in &sources.applicants.records {
        let outcome = textualize_applicant(&sources.applicants.label, applicant_id, raw);
        report.accept(&sources.applicants.label, applicant_id, outcome);
    }

    info!(jobs = sources.prospects.len(), "processing prospects");
    let label = &sources.prospects.label;
    for (job_id, container) in &sources.prospects.records {
        let Some(container) = container.as_object() else {
            warn!(
                job_id = %job_id,
                found = json_type_name(container),
                "prospect container is not an object, skipping job"
            );
            report.skipped.push(SkippedRecord {
                source: label.clone(),
                record_id: job_id.clone(),
                reason: "prospect container is not an object".to_string(),
            });
            continue;
        };

        let title = container
            .get("titulo")
            .filter(|value| !value.is_null())
            .map(text_of)
            .unwrap_or_else(|| UNKNOWN_JOB_TITLE.to_string());

        let entries = match container.get("prospects") {
            None => continue,
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                warn!(
                    job_id = %job_id,
                    found = json_type_name(other),
                    "prospect list is not a list, skipping job"
                );
                report.skipped.push(SkippedRecord {
                    source: label.clone(),
                    record_id: job_id.clone(),
                    reason: "prospect list is not a list".to_string(),
                });
                continue;
            }
        };

        for entry in entries {
            let index = report.prospect_entries;
            report.prospect_entries += 1;
            let outcome = textualize_prospect(label, job_id, &title, index, entry);
            report.accept(label, &format!("{job_id}#{index}"), outcome);
        }
    }

    info!(
        documents = report.documents.len(),
        lookup = report.lookup.len(),
        skipped = report.skipped.len(),
        "corpus built"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetadataValue;
    use serde_json::json;

    fn prospect_indexes(report: &CorpusReport) -> Vec<i64> {
        report
            .documents
            .iter()
            .filter(|document| document.kind() == DocumentKind::Prospect)
            .filter_map(|document| match document.metadata().get("prospect_identifier_index") {
                Some(MetadataValue::Integer(index)) => Some(*index),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn prospect_index_is_global_across_jobs() {
        let sources = RawSources::from_values(
            json!({}),
            json!({}),
            json!({
                "1": {"titulo": "Dev", "prospects": [
                    {"codigo": "a"}, {"codigo": "b"}, {"codigo": "c"}
                ]},
                "2": {"titulo": "QA", "prospects": [{"codigo": "d"}, {"codigo": "e"}]}
            }),
        );

        let report = build_corpus(&sources);
        assert_eq!(prospect_indexes(&report), vec![0, 1, 2, 3, 4]);
        assert_eq!(report.prospect_entries, 5);
    }

    #[test]
    fn lookup_holds_only_valid_jobs_and_applicants() {
        let sources = RawSources::from_values(
            json!({
                "10": {"informacoes_basicas": {"titulo_vaga": "Engenheiro"}, "perfil_vaga": {}},
                "11": {"perfil_vaga": "broken"}
            }),
            json!({"20": {"infos_basicas": {"nome": "Ana"}, "informacoes_profissionais": {}, "formacao_e_idiomas": {}}}),
            json!({"10": {"titulo": "Engenheiro", "prospects": [{"codigo": "20"}]}}),
        );

        let report = build_corpus(&sources);
        let mut keys = report.lookup.keys().cloned().collect::<Vec<_>>();
        keys.sort();

        assert_eq!(keys, vec!["applicant_20", "job_10"]);
        assert_eq!(report.documents.len(), 4);
        assert_eq!(report.error_documents().count(), 1);
        assert_eq!(report.valid_documents().count(), 3);
    }

    #[test]
    fn malformed_prospect_containers_are_skipped_not_fatal() {
        let sources = RawSources::from_values(
            json!({}),
            json!({}),
            json!({
                "1": "not a container",
                "2": {"titulo": "QA", "prospects": {"codigo": "x"}},
                "3": {"prospects": [{"codigo": "y"}]}
            }),
        );

        let report = build_corpus(&sources);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.documents.len(), 1);
        assert!(report.documents[0].content().contains(UNKNOWN_JOB_TITLE));
        assert_eq!(prospect_indexes(&report), vec![0]);
    }

    #[test]
    fn null_prospect_list_is_skipped_and_recorded() {
        let sources = RawSources::from_values(
            json!({}),
            json!({}),
            json!({
                "1": {"titulo": "x", "prospects": null},
                "2": {"titulo": "y"}
            }),
        );

        let report = build_corpus(&sources);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].record_id, "1");
        assert_eq!(report.skipped[0].reason, "prospect list is not a list");
        assert!(report.documents.is_empty());
    }

    #[test]
    fn sanitized_metadata_is_flat() {
        let sources = RawSources::from_values(
            json!({"1": {
                "informacoes_basicas": {},
                "perfil_vaga": {"areas_atuacao": ["TI", {"x": 1}]}
            }}),
            json!({}),
            json!({}),
        );

        let report = build_corpus(&sources);
        let document = &report.documents[0];
        assert_eq!(
            document.metadata().get("areas_atuacao"),
            Some(&MetadataValue::Text("TI".into()))
        );
    }

    #[test]
    fn documents_failing_the_guard_are_dropped() {
        let outcome = Textualized::Valid {
            kind: DocumentKind::Job,
            content: "VAGA: x".into(),
            metadata: json!({"type": "job", "has_valid_metadata": true})
                .as_object()
                .cloned()
                .unwrap_or_default(),
        };

        let mut report = CorpusReport::default();
        report.accept("jobs", "1", outcome);
        assert!(report.documents.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].reason.contains("codigo_vaga"));
    }
}
