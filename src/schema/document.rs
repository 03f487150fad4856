//! Participant document definition
//!
//! The experiment stores one JSON document per participant:
//!
//! ```text
//! {
//!   "info": { "completed": true, ... },
//!   "<record key>": {
//!     "trialNumber": 0, "blockNumber": 0, "startId": 10, "targetId": 30,
//!     "attempt": 0, "stepSize": 20, "isTrain": false, "trueTime": 5000,
//!     "stateChange": ["GO", "MOVING", "STOP"],
//!     "stateChangeTime": [1000.0, 1200.0, 1400.0],
//!     "t": [...], "<frame column>": [...]
//!   },
//!   ...
//! }
//! ```
//!
//! Database exports wrap the document as `{ "<participant id>": { ... } }`;
//! both forms are accepted.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Key of the subject metadata object
pub const INFO_KEY: &str = "info";

/// Key identifying an object as a trial record
pub const TRIAL_NUMBER_KEY: &str = "trialNumber";

/// Key of the per-frame clock; arrays of the same length are frame columns
pub const FRAME_CLOCK_KEY: &str = "t";

/// Subject metadata stored under `info`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectInfo {
    #[serde(default)]
    pub completed: bool,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// One trial record as written by the task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRecord {
    pub trial_number: u32,
    #[serde(default)]
    pub block_number: u32,
    pub start_id: i64,
    pub target_id: i64,
    #[serde(default)]
    pub attempt: u32,
    pub step_size: u32,
    #[serde(default)]
    pub is_train: bool,
    /// Target duration (ms)
    pub true_time: f64,
    #[serde(default)]
    pub produced_time: Option<f64>,
    #[serde(default)]
    pub state_change: Vec<String>,
    /// Absolute timestamps (ms), parallel to `state_change`
    #[serde(default)]
    pub state_change_time: Vec<f64>,
    /// Frame columns and any other recorded fields
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

/// A parsed participant document
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantDocument {
    pub participant_id: String,
    pub info: SubjectInfo,
    /// Trial records in document key order
    pub trials: Vec<TrialRecord>,
}

impl ParticipantDocument {
    /// Parse a participant document from JSON text
    pub fn from_json(participant_id: &str, json: &str) -> Result<Self, PipelineError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(participant_id, value)
    }

    /// Parse a participant document from an already decoded JSON value
    pub fn from_value(participant_id: &str, value: Value) -> Result<Self, PipelineError> {
        let root = unwrap_participant(participant_id, value)?;

        let mut info = None;
        let mut trials = Vec::new();

        for (key, value) in root {
            if key == INFO_KEY {
                info = Some(serde_json::from_value::<SubjectInfo>(value).map_err(|e| {
                    PipelineError::ParseError(format!("invalid {INFO_KEY} object: {e}"))
                })?);
                continue;
            }

            let is_trial = value
                .as_object()
                .is_some_and(|obj| obj.contains_key(TRIAL_NUMBER_KEY));
            if !is_trial {
                log::debug!("{participant_id}: skipping non-trial key {key}");
                continue;
            }

            let record = serde_json::from_value::<TrialRecord>(value).map_err(|e| {
                PipelineError::ParseError(format!("invalid trial record {key}: {e}"))
            })?;
            trials.push(record);
        }

        let info = info.unwrap_or_else(|| {
            log::warn!("{participant_id}: document has no {INFO_KEY} object");
            SubjectInfo::default()
        });

        Ok(Self {
            participant_id: participant_id.to_string(),
            info,
            trials,
        })
    }
}

/// Accept both the bare document and `{ "<participant id>": document }`
fn unwrap_participant(
    participant_id: &str,
    value: Value,
) -> Result<Map<String, Value>, PipelineError> {
    let Value::Object(mut root) = value else {
        return Err(PipelineError::ParseError(
            "participant document must be a JSON object".to_string(),
        ));
    };

    if root.len() == 1 && root.get(participant_id).is_some_and(Value::is_object) {
        if let Some(Value::Object(inner)) = root.remove(participant_id) {
            return Ok(inner);
        }
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_document() -> &'static str {
        r#"{
            "info": { "completed": true, "browser": "firefox", "version": 3 },
            "-Nx01": {
                "trialNumber": 0, "blockNumber": 0, "startId": 10, "targetId": 30,
                "attempt": 0, "stepSize": 20, "isTrain": false, "trueTime": 5000,
                "stateChange": ["GO", "MOVING", "STOP"],
                "stateChangeTime": [1000.0, 1200.0, 1400.0],
                "t": [0.0, 16.7], "posn": [10, 11], "score": 0.8
            },
            "-Nx02": {
                "trialNumber": 1, "startId": 30, "targetId": 10,
                "stepSize": 15, "isTrain": true, "trueTime": 3000.5
            },
            "notes": "pilot"
        }"#
    }

    #[test]
    fn test_parse_document() {
        let doc = ParticipantDocument::from_json("p1", sample_document()).unwrap();

        assert_eq!(doc.participant_id, "p1");
        assert!(doc.info.completed);
        assert_eq!(doc.info.fields.get("browser"), Some(&Value::from("firefox")));
        assert_eq!(doc.trials.len(), 2);

        let first = &doc.trials[0];
        assert_eq!(first.trial_number, 0);
        assert_eq!(first.true_time, 5000.0);
        assert_eq!(first.state_change, vec!["GO", "MOVING", "STOP"]);
        assert!(first.rest.contains_key("t"));
        assert!(first.rest.contains_key("score"));

        let second = &doc.trials[1];
        assert_eq!(second.block_number, 0);
        assert!(second.is_train);
        assert!(second.state_change.is_empty());
    }

    #[test]
    fn test_wrapped_document() {
        let wrapped = format!(r#"{{ "p1": {} }}"#, sample_document());
        let doc = ParticipantDocument::from_json("p1", &wrapped).unwrap();
        assert!(doc.info.completed);
        assert_eq!(doc.trials.len(), 2);
    }

    #[test]
    fn test_missing_info_defaults_to_incomplete() {
        let doc = ParticipantDocument::from_json("p2", r#"{ "a": { "x": 1 } }"#).unwrap();
        assert!(!doc.info.completed);
        assert!(doc.trials.is_empty());
    }

    #[test]
    fn test_invalid_trial_record() {
        let json = r#"{ "info": {}, "k": { "trialNumber": 0, "startId": "left" } }"#;
        let result = ParticipantDocument::from_json("p3", json);
        assert!(matches!(result, Err(PipelineError::ParseError(_))));
    }

    #[test]
    fn test_not_an_object() {
        assert!(ParticipantDocument::from_json("p4", "[1, 2]").is_err());
        assert!(ParticipantDocument::from_json("p4", "not json").is_err());
    }
}
