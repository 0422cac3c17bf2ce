use crate::models::SourcePaths;
use crate::sanitize::json_type_name;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::{error, info};

/// Records of one raw source, keyed by record id in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSource {
    pub label: String,
    pub records: Map<String, Value>,
}

impl RecordSource {
    pub fn empty(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            records: Map::new(),
        }
    }

    /// Wraps a parsed JSON document. Anything but a top-level object degrades to empty.
    pub fn from_value(label: impl Into<String>, value: Value) -> Self {
        let label = label.into();
        match value {
            Value::Object(records) => Self { label, records },
            other => {
                error!(
                    source = %label,
                    found = json_type_name(&other),
                    "source root is not an object, treating it as empty"
                );
                Self::empty(label)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reads one source file. Missing, unreadable or malformed files yield an empty source.
pub fn load_source(path: &Path) -> RecordSource {
    let label = path.to_string_lossy().to_string();

    if !path.exists() {
        error!(source = %label, "source file not found");
        return RecordSource::empty(label);
    }

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(read_error) => {
            error!(source = %label, error = %read_error, "unable to read source file");
            return RecordSource::empty(label);
        }
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => {
            let source = RecordSource::from_value(label, value);
            info!(source = %source.label, records = source.len(), "source loaded");
            source
        }
        Err(parse_error) => {
            error!(source = %label, error = %parse_error, "source file is not valid json");
            RecordSource::empty(label)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSources {
    pub jobs: RecordSource,
    pub applicants: RecordSource,
    pub prospects: RecordSource,
}

impl RawSources {
    pub fn load(paths: &SourcePaths) -> Self {
        Self {
            jobs: load_source(&paths.jobs),
            applicants: load_source(&paths.applicants),
            prospects: load_source(&paths.prospects),
        }
    }

    /// Builds sources from in-memory JSON documents, labelled by their role.
    pub fn from_values(jobs: Value, applicants: Value, prospects: Value) -> Self {
        Self {
            jobs: RecordSource::from_value("jobs", jobs),
            applicants: RecordSource::from_value("applicants", applicants),
            prospects: RecordSource::from_value("prospects", prospects),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.applicants.is_empty() && self.prospects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_file_degrades_to_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let source = load_source(&dir.path().join("absent.json"));
        assert!(source.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_json_degrades_to_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("vagas.json");
        fs::write(&path, b"{ not json")?;
        assert!(load_source(&path).is_empty());
        Ok(())
    }

    #[test]
    fn non_object_root_degrades_to_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("vagas.json");
        fs::write(&path, b"[1, 2, 3]")?;
        assert!(load_source(&path).is_empty());
        Ok(())
    }

    #[test]
    fn records_keep_file_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("vagas.json");
        fs::write(&path, br#"{"9": {}, "1": {}, "5": {}}"#)?;

        let source = load_source(&path);
        let ids = source.records.keys().cloned().collect::<Vec<_>>();
        assert_eq!(ids, vec!["9", "1", "5"]);
        Ok(())
    }

    #[test]
    fn all_empty_sources_are_reported() {
        let sources = RawSources::from_values(json!({}), json!(null), json!("x"));
        assert!(sources.is_empty());
        let sources = RawSources::from_values(json!({"1": {}}), json!({}), json!({}));
        assert!(!sources.is_empty());
    }
}
