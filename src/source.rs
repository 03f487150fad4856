//! Participant data sources
//!
//! A data source lists the participants that completed the session and
//! returns one participant's tables. Any failure to produce the tables is a
//! [`PipelineError::SourceFetchFailure`] for that participant.

use crate::error::PipelineError;
use crate::schema::{DocumentAdapter, ParticipantDocument};
use crate::types::ParticipantTables;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// File extension of participant documents
const DOCUMENT_EXTENSION: &str = "json";

/// Trait for participant data sources
pub trait DataSource {
    /// Identifiers of participants whose session is marked completed, sorted
    fn participant_ids(&self) -> Result<Vec<String>, PipelineError>;

    /// Load the four tables of one participant
    fn fetch(&self, participant_id: &str) -> Result<ParticipantTables, PipelineError>;
}

/// Directory of `<participant id>.json` documents
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, participant_id: &str) -> PathBuf {
        self.dir.join(format!("{participant_id}.{DOCUMENT_EXTENSION}"))
    }

    fn load_document(&self, participant_id: &str) -> Result<ParticipantDocument, PipelineError> {
        if !is_valid_participant_id(participant_id) {
            return Err(PipelineError::fetch(participant_id, "invalid participant id"));
        }

        let path = self.document_path(participant_id);
        let json = fs::read_to_string(&path)
            .map_err(|e| PipelineError::fetch(participant_id, format!("{}: {e}", path.display())))?;

        ParticipantDocument::from_json(participant_id, &json)
            .map_err(|e| PipelineError::fetch(participant_id, e))
    }
}

impl DataSource for JsonDirSource {
    fn participant_ids(&self) -> Result<Vec<String>, PipelineError> {
        let mut ids = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            let Some(participant_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match self.load_document(participant_id) {
                Ok(document) if document.info.completed => ids.push(participant_id.to_string()),
                Ok(_) => log::debug!("{participant_id}: session not completed"),
                Err(e) => log::warn!("skipping unreadable document {}: {e}", path.display()),
            }
        }

        ids.sort();
        Ok(ids)
    }

    fn fetch(&self, participant_id: &str) -> Result<ParticipantTables, PipelineError> {
        let document = self.load_document(participant_id)?;
        DocumentAdapter::to_tables(&document).map_err(|e| PipelineError::fetch(participant_id, e))
    }
}

/// Participant tables held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    participants: BTreeMap<String, ParticipantTables>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant's tables
    pub fn insert(&mut self, participant_id: impl Into<String>, tables: ParticipantTables) {
        self.participants.insert(participant_id.into(), tables);
    }

    pub fn with_participant(
        mut self,
        participant_id: impl Into<String>,
        tables: ParticipantTables,
    ) -> Self {
        self.insert(participant_id, tables);
        self
    }
}

impl DataSource for InMemorySource {
    fn participant_ids(&self) -> Result<Vec<String>, PipelineError> {
        Ok(self
            .participants
            .iter()
            .filter(|(_, tables)| tables.subject.iter().any(|s| s.completed))
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn fetch(&self, participant_id: &str) -> Result<ParticipantTables, PipelineError> {
        self.participants
            .get(participant_id)
            .cloned()
            .ok_or_else(|| PipelineError::fetch(participant_id, "unknown participant"))
    }
}

/// Participant ids become file names; keep them to a single path component
fn is_valid_participant_id(participant_id: &str) -> bool {
    !participant_id.is_empty()
        && participant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Subject;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn document(completed: bool) -> String {
        format!(
            r#"{{
                "info": {{ "completed": {completed} }},
                "r0": {{
                    "trialNumber": 0, "startId": 1, "targetId": 4, "stepSize": 20,
                    "trueTime": 2000,
                    "stateChange": ["GO", "MOVING", "STOP"],
                    "stateChangeTime": [0.0, 300.0, 2300.0]
                }}
            }}"#
        )
    }

    fn write_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bravo.json"), document(true)).unwrap();
        fs::write(dir.path().join("alpha.json"), document(true)).unwrap();
        fs::write(dir.path().join("charlie.json"), document(false)).unwrap();
        fs::write(dir.path().join("broken.json"), "{ nope").unwrap();
        fs::write(dir.path().join("readme.txt"), "ignored").unwrap();
        dir
    }

    #[test]
    fn test_lists_completed_participants_sorted() {
        let dir = write_dir();
        let source = JsonDirSource::new(dir.path());

        assert_eq!(source.participant_ids().unwrap(), vec!["alpha", "bravo"]);
    }

    #[test]
    fn test_fetch_tables() {
        let dir = write_dir();
        let source = JsonDirSource::new(dir.path());

        let tables = source.fetch("alpha").unwrap();
        assert_eq!(tables.trial.len(), 1);
        assert_eq!(tables.state.len(), 3);
        assert_eq!(tables.subject[0].participant_id, "alpha");
    }

    #[test]
    fn test_fetch_failures() {
        let dir = write_dir();
        let source = JsonDirSource::new(dir.path());

        for id in ["missing", "broken", "../alpha", ""] {
            match source.fetch(id) {
                Err(PipelineError::SourceFetchFailure { participant, .. }) => {
                    assert_eq!(participant, id)
                }
                other => panic!("expected fetch failure for {id:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_directory() {
        let source = JsonDirSource::new("/definitely/not/here");
        assert!(source.participant_ids().is_err());
    }

    #[test]
    fn test_in_memory_source() {
        let tables = |completed| ParticipantTables {
            subject: vec![Subject {
                participant_id: "x".to_string(),
                completed,
                fields: BTreeMap::new(),
            }],
            ..ParticipantTables::default()
        };
        let source = InMemorySource::new()
            .with_participant("done", tables(true))
            .with_participant("quit", tables(false));

        assert_eq!(source.participant_ids().unwrap(), vec!["done"]);
        assert!(source.fetch("quit").is_ok());
        assert!(matches!(
            source.fetch("nobody"),
            Err(PipelineError::SourceFetchFailure { .. })
        ));
    }
}
