use crate::error::RecordError;
use crate::models::{
    DocumentKind, Metadata, MetadataValue, ERROR_DOCUMENT_TYPE, TYPE_KEY, VALIDITY_KEY,
};
use crate::records::{
    is_absent_level, normalized_level, prospect_candidate_id, ApplicantRecord, JobRecord,
    ProspectEntry,
};
use serde_json::{json, Map, Value};
use tracing::error;

pub const RESUME_MAX_CHARS: usize = 3_500;
pub const RESUME_TRUNCATION_MARKER: &str = "...";
const ERROR_SUMMARY_CHARS: usize = 200;
const ERROR_DETAILS_CHARS: usize = 450;

/// Outcome of turning one raw record into document parts.
#[derive(Debug, Clone, PartialEq)]
pub enum Textualized {
    /// Content plus raw metadata that still has to go through sanitization.
    Valid {
        kind: DocumentKind,
        content: String,
        metadata: Map<String, Value>,
    },
    /// Diagnostic content plus the fixed, already primitive error shape.
    Invalid { content: String, metadata: Metadata },
}

impl Textualized {
    pub fn is_valid(&self) -> bool {
        matches!(self, Textualized::Valid { .. })
    }

    pub fn content(&self) -> &str {
        match self {
            Textualized::Valid { content, .. } | Textualized::Invalid { content, .. } => content,
        }
    }
}

pub fn textualize_job(source: &str, job_id: &str, raw: &Value) -> Textualized {
    let job = match JobRecord::decode(raw) {
        Ok(job) => job,
        Err(error) => {
            return error_pair(source, "vaga", job_id, &error, |summary| {
                format!("Erro ao processar vaga ID {job_id}: {summary}")
            })
        }
    };

    let areas = job.areas.render();
    let content = assemble([
        Some(format!("VAGA: {}", job.title)),
        Some(format!("ID da Vaga: {job_id}")),
        Some(format!("Cliente: {}", job.client)),
        Some(format!("Tipo de Contratação: {}", job.contract_type)),
        Some(format!("É vaga SAP? {}", job.sap)),
        Some(format!("Nível Profissional Requerido: {}", job.professional_level)),
        Some(format!("Nível Acadêmico: {}", job.academic_level)),
        Some(format!("Nível de Inglês: {}", job.english_level)),
        (!is_absent_level(&job.spanish_level))
            .then(|| format!("Nível de Espanhol: {}", job.spanish_level)),
        Some(format!("Áreas de Atuação: {areas}")),
        Some(format!("Local de Trabalho: {}", job.workplace)),
        Some(format!("Principais Atividades:\n{}", job.main_activities)),
        Some(format!(
            "Competências Técnicas e Comportamentais Requeridas:\n{}",
            job.competencies
        )),
        (!job.observations.is_empty())
            .then(|| format!("Observações Adicionais: {}", job.observations)),
    ]);

    let metadata = object(json!({
        "source": source,
        "type": DocumentKind::Job.type_tag(),
        "codigo_vaga": job_id,
        "titulo_vaga": job.title,
        "cliente": job.client,
        "vaga_sap": job.sap,
        "tipo_contratacao": job.contract_type,
        "nivel_profissional": job.professional_level,
        "nivel_academico": job.academic_level,
        "nivel_ingles": job.english_level,
        "nivel_espanhol": normalized_level(&job.spanish_level),
        "areas_atuacao": job.areas.raw(),
        "local_trabalho": job.workplace,
        "principais_atividades": job.main_activities,
        "competencias_tecnicas": job.competencies,
        "has_valid_metadata": true,
    }));

    Textualized::Valid {
        kind: DocumentKind::Job,
        content,
        metadata,
    }
}

pub fn textualize_applicant(source: &str, applicant_id: &str, raw: &Value) -> Textualized {
    let applicant = match ApplicantRecord::decode(raw) {
        Ok(applicant) => applicant,
        Err(error) => {
            return error_pair(source, "candidato", applicant_id, &error, |summary| {
                format!("Erro ao processar candidato ID {applicant_id}. Detalhe: {summary}")
            })
        }
    };

    let knowledge = applicant.technical_knowledge.render();
    let content = assemble([
        Some(format!("CANDIDATO: {}", applicant.name)),
        Some(format!("ID do Candidato: {applicant_id}")),
        (!applicant.objective.is_empty())
            .then(|| format!("Objetivo Profissional: {}", applicant.objective)),
        Some(format!("Área de Atuação: {}", applicant.area.render())),
        Some(format!("Nível Profissional: {}", applicant.professional_level)),
        Some(format!("Nível Acadêmico: {}", applicant.academic_level)),
        Some(format!("Nível de Inglês: {}", applicant.english_level)),
        (!is_absent_level(&applicant.spanish_level))
            .then(|| format!("Nível de Espanhol: {}", applicant.spanish_level)),
        (!applicant.technical_knowledge.is_blank())
            .then(|| format!("Conhecimentos Técnicos: {knowledge}")),
        Some(format!(
            "\n--- Resumo do CV ---\n{}\n--- Fim do Resumo do CV ---",
            truncate_resume(&applicant.resume)
        )),
    ]);

    let metadata = object(json!({
        "source": source,
        "type": DocumentKind::Applicant.type_tag(),
        "codigo_profissional": applicant_id,
        "nome": applicant.name,
        "email": applicant.email,
        "area_atuacao": applicant.area.raw(),
        "conhecimentos_tecnicos": applicant.technical_knowledge.raw(),
        "nivel_profissional_candidato": applicant.professional_level,
        "nivel_academico": applicant.academic_level,
        "nivel_ingles": applicant.english_level,
        "nivel_espanhol": normalized_level(&applicant.spanish_level),
        "has_valid_metadata": true,
    }));

    Textualized::Valid {
        kind: DocumentKind::Applicant,
        content,
        metadata,
    }
}

/// Textualizes one prospect entry. `index` is the run-wide ingestion index of the entry and,
/// together with the job and candidate ids, is what makes the entry addressable.
pub fn textualize_prospect(
    source: &str,
    job_id: &str,
    job_title: &str,
    index: u64,
    raw: &Value,
) -> Textualized {
    let candidate_id = prospect_candidate_id(raw, index);
    let entry = match ProspectEntry::decode(raw) {
        Ok(entry) => entry,
        Err(error) => {
            let identity = format!("vaga_{job_id}_cand_{candidate_id}_idx_{index}");
            return error_pair(source, "prospect", &identity, &error, |summary| {
                format!("Erro ao processar prospect ({identity}). Detalhe: {summary}")
            });
        }
    };

    let content = assemble([
        Some(format!("PROSPECT para Vaga ID {job_id} (Título: {job_title}):")),
        Some(format!(
            "Candidato: {} (ID Candidato: {candidate_id})",
            entry.candidate_name
        )),
        Some(format!("Situação na Vaga: {}", entry.situation)),
        (!entry.comment.is_empty())
            .then(|| format!("Comentário do Recrutador: {}", entry.comment)),
    ]);

    let metadata = object(json!({
        "source": source,
        "type": DocumentKind::Prospect.type_tag(),
        "vaga_id_associada": job_id,
        "codigo_candidato_associado": candidate_id,
        "prospect_identifier_index": index,
        "nome_candidato": entry.candidate_name,
        "situacao_candidato": entry.situation,
        "vaga_titulo_prospect": job_title,
        "has_valid_metadata": true,
    }));

    Textualized::Valid {
        kind: DocumentKind::Prospect,
        content,
        metadata,
    }
}

/// Builds the fixed error-record shape for a record that failed to decode.
pub fn error_metadata(source: &str, original_id: &str, details: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("source".into(), source.into());
    metadata.insert(TYPE_KEY.into(), ERROR_DOCUMENT_TYPE.into());
    metadata.insert("original_id".into(), original_id.into());
    metadata.insert(
        "error_details".into(),
        MetadataValue::Text(take_chars(details, ERROR_DETAILS_CHARS)),
    );
    metadata.insert(VALIDITY_KEY.into(), false.into());
    metadata
}

/// `headline` renders the diagnostic content around the shortened error message.
fn error_pair(
    source: &str,
    label: &str,
    record_id: &str,
    cause: &RecordError,
    headline: impl FnOnce(&str) -> String,
) -> Textualized {
    let message = cause.to_string();
    error!(source, record_id, kind = label, error = %message, "record failed to textualize");

    Textualized::Invalid {
        content: headline(&take_chars(&message, ERROR_SUMMARY_CHARS)),
        metadata: error_metadata(source, record_id, &message),
    }
}

fn truncate_resume(resume: &str) -> String {
    if resume.chars().count() <= RESUME_MAX_CHARS {
        return resume.to_string();
    }
    let mut cut = take_chars(resume, RESUME_MAX_CHARS);
    cut.push_str(RESUME_TRUNCATION_MARKER);
    cut
}

fn take_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn assemble<const N: usize>(parts: [Option<String>; N]) -> String {
    parts
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
