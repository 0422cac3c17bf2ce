//! Typed decoding of the three raw record shapes.
//!
//! Sources have used two spellings for a few concepts over time; every such lookup goes
//! through [`first_present`]. Null values count as absent.

use crate::error::RecordError;
use crate::sanitize::json_type_name;
use serde_json::{Map, Value};

pub const NOT_AVAILABLE: &str = "N/A";
pub const MISSING_RESUME: &str = "CV não disponível.";

/// First candidate key whose value is present and not null.
pub fn first_present<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !value.is_null())
}

/// Renders a scalar as display text; lists and objects render as compact JSON.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
struct Section<'a>(&'a Map<String, Value>);

impl<'a> Section<'a> {
    /// Every section must be present and an object; an empty object is fine.
    fn of(record: &'a Map<String, Value>, name: &'static str) -> Result<Self, RecordError> {
        match record.get(name) {
            None => Err(RecordError::MissingSection { section: name }),
            Some(Value::Object(object)) => Ok(Section(object)),
            Some(other) => Err(RecordError::InvalidSection {
                section: name,
                found: json_type_name(other),
            }),
        }
    }

    fn value(&self, keys: &[&str]) -> Option<&'a Value> {
        first_present(self.0, keys)
    }

    fn text(&self, keys: &[&str], default: &str) -> String {
        self.value(keys)
            .map(text_of)
            .unwrap_or_else(|| default.to_string())
    }

    fn list_or_text(&self, key: &str, default: &str) -> ListOrText {
        ListOrText {
            raw: self
                .value(&[key])
                .cloned()
                .unwrap_or_else(|| Value::String(default.to_string())),
        }
    }
}

fn as_record(raw: &Value) -> Result<&Map<String, Value>, RecordError> {
    raw.as_object().ok_or(RecordError::NotAnObject {
        found: json_type_name(raw),
    })
}

/// A field that sources fill either with a single string or with a list of values.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOrText {
    raw: Value,
}

impl ListOrText {
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Lists are joined with `", "`; anything that is neither a list nor a string is `N/A`.
    pub fn render(&self) -> String {
        match &self.raw {
            Value::String(text) => text.clone(),
            Value::Array(items) => items.iter().map(text_of).collect::<Vec<_>>().join(", "),
            _ => NOT_AVAILABLE.to_string(),
        }
    }

    /// True for empty strings, empty lists and text that only says `N/A`.
    pub fn is_blank(&self) -> bool {
        let empty_raw = match &self.raw {
            Value::String(text) => text.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Null => true,
            _ => false,
        };
        let rendered = self.render();
        let rendered = rendered.trim();
        empty_raw || rendered.is_empty() || rendered.eq_ignore_ascii_case(NOT_AVAILABLE)
    }
}

/// Language levels that read as "no requirement".
pub fn is_absent_level(level: &str) -> bool {
    matches!(
        level.trim().to_lowercase().as_str(),
        "n/a" | "nenhum" | "" | "none"
    )
}

/// Metadata form of a language level: blank spellings collapse to `N/A`.
pub fn normalized_level(level: &str) -> String {
    match level.trim().to_lowercase().as_str() {
        "" | "none" | "n/a" => NOT_AVAILABLE.to_string(),
        _ => level.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub title: String,
    pub client: String,
    pub sap: String,
    pub contract_type: String,
    pub professional_level: String,
    pub academic_level: String,
    pub english_level: String,
    pub spanish_level: String,
    pub areas: ListOrText,
    pub workplace: String,
    pub main_activities: String,
    pub competencies: String,
    pub observations: String,
}

impl JobRecord {
    pub fn decode(raw: &Value) -> Result<Self, RecordError> {
        let record = as_record(raw)?;
        let basics = Section::of(record, "informacoes_basicas")?;
        let profile = Section::of(record, "perfil_vaga")?;

        Ok(Self {
            title: basics.text(&["titulo_vaga"], NOT_AVAILABLE),
            client: basics.text(&["cliente"], NOT_AVAILABLE),
            sap: basics.text(&["vaga_sap"], NOT_AVAILABLE),
            contract_type: basics.text(&["tipo_contratacao"], NOT_AVAILABLE),
            professional_level: profile.text(
                &["nivel profissional", "nivel_profissional"],
                NOT_AVAILABLE,
            ),
            academic_level: profile.text(&["nivel_academico"], NOT_AVAILABLE),
            english_level: profile.text(&["nivel_ingles"], NOT_AVAILABLE),
            spanish_level: profile.text(&["nivel_espanhol"], NOT_AVAILABLE),
            areas: profile.list_or_text("areas_atuacao", NOT_AVAILABLE),
            workplace: profile.text(&["local_trabalho"], NOT_AVAILABLE),
            main_activities: profile.text(&["principais_atividades"], NOT_AVAILABLE),
            competencies: profile.text(
                &["competencia_tecnicas_e_comportamentais"],
                NOT_AVAILABLE,
            ),
            observations: profile.text(&["demais_observacoes"], ""),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApplicantRecord {
    pub name: String,
    pub email: String,
    pub objective: String,
    pub area: ListOrText,
    pub technical_knowledge: ListOrText,
    pub professional_level: String,
    pub academic_level: String,
    pub english_level: String,
    pub spanish_level: String,
    pub resume: String,
}

impl ApplicantRecord {
    pub fn decode(raw: &Value) -> Result<Self, RecordError> {
        let record = as_record(raw)?;
        let basics = Section::of(record, "infos_basicas")?;
        let professional = Section::of(record, "informacoes_profissionais")?;
        let education = Section::of(record, "formacao_e_idiomas")?;

        Ok(Self {
            name: basics.text(&["nome"], NOT_AVAILABLE),
            email: basics.text(&["email"], NOT_AVAILABLE),
            objective: basics.text(&["objetivo_profissional"], ""),
            area: professional.list_or_text("area_atuacao", NOT_AVAILABLE),
            technical_knowledge: professional.list_or_text("conhecimentos_tecnicos", ""),
            professional_level: professional.text(&["nivel_profissional"], NOT_AVAILABLE),
            academic_level: education.text(&["nivel_academico"], NOT_AVAILABLE),
            english_level: education.text(&["nivel_ingles"], NOT_AVAILABLE),
            spanish_level: education.text(&["nivel_espanhol"], NOT_AVAILABLE),
            resume: first_present(record, &["cv_pt"])
                .map(text_of)
                .unwrap_or_else(|| MISSING_RESUME.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProspectEntry {
    pub candidate_id: Option<String>,
    pub candidate_name: String,
    pub situation: String,
    pub comment: String,
}

impl ProspectEntry {
    pub fn decode(raw: &Value) -> Result<Self, RecordError> {
        let entry = as_record(raw)?;

        Ok(Self {
            candidate_id: first_present(entry, &["codigo"])
                .map(text_of)
                .filter(|id| !id.is_empty()),
            candidate_name: first_present(entry, &["nome"])
                .map(text_of)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            situation: first_present(entry, &["situacao_candidado", "situacao_candidato"])
                .map(text_of)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            comment: first_present(entry, &["comentario"])
                .map(text_of)
                .unwrap_or_default(),
        })
    }
}

/// Candidate id of a raw prospect entry, readable even when the entry fails to decode.
pub fn prospect_candidate_id(raw: &Value, index: u64) -> String {
    raw.as_object()
        .and_then(|entry| first_present(entry, &["codigo"]))
        .map(text_of)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("unknown_{index}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_present_prefers_earlier_spelling_and_skips_null() {
        let object = json!({"a": null, "b": "second", "c": "third"});
        let object = object.as_object().expect("object");
        assert_eq!(first_present(object, &["a", "b", "c"]), Some(&json!("second")));
        assert_eq!(first_present(object, &["missing"]), None);
    }

    #[test]
    fn job_reads_both_professional_level_spellings() -> Result<(), RecordError> {
        let spaced = JobRecord::decode(&json!({
            "informacoes_basicas": {},
            "perfil_vaga": {"nivel profissional": "Sênior"}
        }))?;
        let snake = JobRecord::decode(&json!({
            "informacoes_basicas": {},
            "perfil_vaga": {"nivel_profissional": "Pleno"}
        }))?;
        assert_eq!(spaced.professional_level, "Sênior");
        assert_eq!(snake.professional_level, "Pleno");
        Ok(())
    }

    #[test]
    fn empty_sections_default_to_not_available() -> Result<(), RecordError> {
        let job = JobRecord::decode(&json!({"informacoes_basicas": {}, "perfil_vaga": {}}))?;
        assert_eq!(job.title, NOT_AVAILABLE);
        assert_eq!(job.observations, "");
        assert_eq!(job.areas.raw(), &json!("N/A"));
        Ok(())
    }

    #[test]
    fn wrongly_typed_section_is_rejected() {
        let error = JobRecord::decode(&json!({"informacoes_basicas": {}, "perfil_vaga": "texto"}))
            .expect_err("invalid");
        assert_eq!(
            error,
            RecordError::InvalidSection {
                section: "perfil_vaga",
                found: "string"
            }
        );
    }

    #[test]
    fn null_section_is_rejected() {
        let error = JobRecord::decode(&json!({"informacoes_basicas": {}, "perfil_vaga": null}))
            .expect_err("null section");
        assert_eq!(
            error,
            RecordError::InvalidSection {
                section: "perfil_vaga",
                found: "null"
            }
        );
    }

    #[test]
    fn absent_section_is_rejected() {
        let error = ApplicantRecord::decode(&json!({
            "infos_basicas": {"nome": "Ana"},
            "formacao_e_idiomas": {}
        }))
        .expect_err("missing section");
        assert_eq!(
            error,
            RecordError::MissingSection {
                section: "informacoes_profissionais"
            }
        );
    }

    #[test]
    fn non_object_record_is_rejected() {
        assert!(ApplicantRecord::decode(&json!([1, 2])).is_err());
        assert!(ProspectEntry::decode(&json!("x")).is_err());
    }

    #[test]
    fn list_or_text_renders_lists_and_detects_blanks() {
        let list = ListOrText { raw: json!(["Java", "SAP"]) };
        assert_eq!(list.render(), "Java, SAP");
        assert!(!list.is_blank());

        assert!(ListOrText { raw: json!([]) }.is_blank());
        assert!(ListOrText { raw: json!("n/a") }.is_blank());
        assert_eq!(ListOrText { raw: json!(3) }.render(), NOT_AVAILABLE);
    }

    #[test]
    fn prospect_situation_reads_historical_spelling() -> Result<(), RecordError> {
        let old = ProspectEntry::decode(&json!({"situacao_candidado": "Contratado"}))?;
        let new = ProspectEntry::decode(&json!({"situacao_candidato": "Encaminhado"}))?;
        assert_eq!(old.situation, "Contratado");
        assert_eq!(new.situation, "Encaminhado");
        Ok(())
    }

    #[test]
    fn language_levels_normalize() {
        assert!(is_absent_level(" Nenhum "));
        assert!(!is_absent_level("Básico"));
        assert_eq!(normalized_level("None"), NOT_AVAILABLE);
        assert_eq!(normalized_level("Fluente"), "Fluente");
    }

    #[test]
    fn prospect_candidate_id_falls_back_to_index() {
        assert_eq!(prospect_candidate_id(&json!({"codigo": 42}), 0), "42");
        assert_eq!(prospect_candidate_id(&json!("broken"), 9), "unknown_9");
    }
}
