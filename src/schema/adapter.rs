//! Adapter from participant documents to the four analysis tables

use crate::error::PipelineError;
use crate::schema::document::{ParticipantDocument, TrialRecord, FRAME_CLOCK_KEY};
use crate::types::{Frame, ParticipantTables, StateChange, StateEvent, Subject, Trial};
use serde_json::Value;
use std::collections::BTreeMap;

/// Adapter for flattening a participant document into tables
pub struct DocumentAdapter;

impl DocumentAdapter {
    /// Parse JSON text and flatten it in one step
    pub fn parse_tables(participant_id: &str, json: &str) -> Result<ParticipantTables, PipelineError> {
        let document = ParticipantDocument::from_json(participant_id, json)?;
        Self::to_tables(&document)
    }

    /// Flatten a parsed document into trial, subject, frame and state tables
    pub fn to_tables(document: &ParticipantDocument) -> Result<ParticipantTables, PipelineError> {
        let mut tables = ParticipantTables {
            subject: vec![Subject {
                participant_id: document.participant_id.clone(),
                completed: document.info.completed,
                fields: document.info.fields.clone(),
            }],
            ..ParticipantTables::default()
        };

        for record in &document.trials {
            tables.state.extend(state_events(record)?);

            let (frames, extra) = split_frames(record);
            tables.frame.extend(frames);

            tables.trial.push(Trial {
                trial_number: record.trial_number,
                block_number: record.block_number,
                start_id: record.start_id,
                target_id: record.target_id,
                attempt: record.attempt,
                step_size: record.step_size,
                is_train: record.is_train,
                subject: document.participant_id.clone(),
                true_time_ms: record.true_time,
                produced_time_ms: record.produced_time,
                extra,
            });
        }

        log::debug!(
            "{}: {} trials, {} frames, {} state events",
            document.participant_id,
            tables.trial.len(),
            tables.frame.len(),
            tables.state.len()
        );

        Ok(tables)
    }
}

/// Zip the parallel state label and timestamp arrays
fn state_events(record: &TrialRecord) -> Result<Vec<StateEvent>, PipelineError> {
    if record.state_change.len() != record.state_change_time.len() {
        return Err(PipelineError::ParseError(format!(
            "trial {}: {} state labels but {} timestamps",
            record.trial_number,
            record.state_change.len(),
            record.state_change_time.len()
        )));
    }

    Ok(record
        .state_change
        .iter()
        .zip(&record.state_change_time)
        .map(|(label, &time)| StateEvent {
            trial_number: record.trial_number,
            state_change: StateChange::parse(label),
            state_change_time_ms: time,
        })
        .collect())
}

/// Split the remaining fields into frame rows and extra trial columns
///
/// Arrays as long as the frame clock are frame columns; everything else stays
/// with the trial.
fn split_frames(record: &TrialRecord) -> (Vec<Frame>, BTreeMap<String, Value>) {
    let frame_count = record
        .rest
        .get(FRAME_CLOCK_KEY)
        .and_then(Value::as_array)
        .map(Vec::len);

    let mut columns: BTreeMap<&str, &Vec<Value>> = BTreeMap::new();
    let mut extra = BTreeMap::new();

    for (key, value) in &record.rest {
        match (value, frame_count) {
            (Value::Array(items), Some(count)) if items.len() == count => {
                columns.insert(key.as_str(), items);
            }
            _ => {
                extra.insert(key.clone(), value.clone());
            }
        }
    }

    let frames = (0..frame_count.unwrap_or(0))
        .map(|index| Frame {
            trial_number: record.trial_number,
            frame_index: index as u32,
            values: columns
                .iter()
                .map(|(name, items)| (name.to_string(), items[index].clone()))
                .collect(),
        })
        .collect();

    (frames, extra)
}
