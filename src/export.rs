//! Spreadsheet export of the raw participant tables
//!
//! The workbook has one sheet per table, named `trial`, `subject`, `frame`
//! and `state`. Blobs are memoized per participant and rebuilt only when the
//! content of the tables changes.

use crate::error::PipelineError;
use crate::types::ParticipantTables;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Sheet names, in workbook order
pub const SHEET_NAMES: [&str; 4] = ["trial", "subject", "frame", "state"];

/// Excel's per-cell text limit, in characters
pub const MAX_CELL_CHARS: usize = 32_767;

/// Column headers and cell values of one sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLayout {
    pub name: &'static str,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Lay out the four tables as sheets
pub fn sheet_layouts(tables: &ParticipantTables) -> Vec<SheetLayout> {
    vec![
        trial_sheet(tables),
        subject_sheet(tables),
        frame_sheet(tables),
        state_sheet(tables),
    ]
}

/// Build the xlsx workbook for a participant's tables
pub fn export_workbook(tables: &ParticipantTables) -> Result<Vec<u8>, PipelineError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    for layout in sheet_layouts(tables) {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(layout.name)?;

        for (col, header) in layout.headers.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, header, &header_format)?;
        }
        for (row, values) in layout.rows.iter().enumerate() {
            for (col, value) in values.iter().enumerate() {
                write_cell(worksheet, row as u32 + 1, col as u16, value)?;
            }
        }
    }

    Ok(workbook.save_to_buffer()?)
}

/// Content fingerprint of the four tables
pub fn fingerprint(tables: &ParticipantTables) -> Result<String, PipelineError> {
    let bytes = serde_json::to_vec(tables)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

struct CachedExport {
    fingerprint: String,
    blob: Arc<Vec<u8>>,
}

/// Export blobs memoized by participant and table content
#[derive(Default)]
pub struct ExportCache {
    entries: HashMap<String, CachedExport>,
}

impl ExportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached workbook, rebuilding it if the tables changed
    pub fn get_or_build(
        &mut self,
        participant_id: &str,
        tables: &ParticipantTables,
    ) -> Result<Arc<Vec<u8>>, PipelineError> {
        let fingerprint = fingerprint(tables)?;

        if let Some(cached) = self.entries.get(participant_id) {
            if cached.fingerprint == fingerprint {
                log::debug!("{participant_id}: export cache hit");
                return Ok(Arc::clone(&cached.blob));
            }
        }

        log::debug!("{participant_id}: building export workbook");
        let blob = Arc::new(export_workbook(tables)?);
        self.entries.insert(
            participant_id.to_string(),
            CachedExport {
                fingerprint,
                blob: Arc::clone(&blob),
            },
        );
        Ok(blob)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &Value,
) -> Result<(), PipelineError> {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            worksheet.write_boolean(row, col, *b)?;
        }
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                worksheet.write_number(row, col, f)?;
            }
        }
        Value::String(s) => {
            worksheet.write_string(row, col, fit_cell_text(s, row, col))?;
        }
        Value::Array(_) | Value::Object(_) => {
            let text = value.to_string();
            worksheet.write_string(row, col, fit_cell_text(&text, row, col))?;
        }
    }
    Ok(())
}

/// Truncate text to the cell limit on a character boundary
fn fit_cell_text(text: &str, row: u32, col: u16) -> &str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((end, _)) => {
            log::warn!(
                "cell ({row}, {col}) truncated to {MAX_CELL_CHARS} of {} characters",
                text.chars().count()
            );
            &text[..end]
        }
        None => text,
    }
}

fn trial_sheet(tables: &ParticipantTables) -> SheetLayout {
    let extra_keys: BTreeSet<&String> = tables.trial.iter().flat_map(|t| t.extra.keys()).collect();

    let mut headers: Vec<String> = [
        "trialNumber",
        "blockNumber",
        "startId",
        "targetId",
        "attempt",
        "stepSize",
        "isTrain",
        "subject",
        "trueTime",
        "producedTime",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();
    headers.extend(extra_keys.iter().map(|k| k.to_string()));

    let rows = tables
        .trial
        .iter()
        .map(|t| {
            let mut row = vec![
                Value::from(t.trial_number),
                Value::from(t.block_number),
                Value::from(t.start_id),
                Value::from(t.target_id),
                Value::from(t.attempt),
                Value::from(t.step_size),
                Value::from(t.is_train),
                Value::from(t.subject.as_str()),
                Value::from(t.true_time_ms),
                t.produced_time_ms.map(Value::from).unwrap_or(Value::Null),
            ];
            row.extend(
                extra_keys
                    .iter()
                    .map(|k| t.extra.get(*k).cloned().unwrap_or(Value::Null)),
            );
            row
        })
        .collect();

    SheetLayout {
        name: SHEET_NAMES[0],
        headers,
        rows,
    }
}

fn subject_sheet(tables: &ParticipantTables) -> SheetLayout {
    let keys: BTreeSet<&String> = tables.subject.iter().flat_map(|s| s.fields.keys()).collect();

    let mut headers = vec!["participantId".to_string(), "completed".to_string()];
    headers.extend(keys.iter().map(|k| k.to_string()));

    let rows = tables
        .subject
        .iter()
        .map(|s| {
            let mut row = vec![
                Value::from(s.participant_id.as_str()),
                Value::from(s.completed),
            ];
            row.extend(
                keys.iter()
                    .map(|k| s.fields.get(*k).cloned().unwrap_or(Value::Null)),
            );
            row
        })
        .collect();

    SheetLayout {
        name: SHEET_NAMES[1],
        headers,
        rows,
    }
}

fn frame_sheet(tables: &ParticipantTables) -> SheetLayout {
    let keys: BTreeSet<&String> = tables.frame.iter().flat_map(|f| f.values.keys()).collect();

    let mut headers = vec!["trialNumber".to_string(), "frameIndex".to_string()];
    headers.extend(keys.iter().map(|k| k.to_string()));

    let rows = tables
        .frame
        .iter()
        .map(|f| {
            let mut row = vec![Value::from(f.trial_number), Value::from(f.frame_index)];
            row.extend(
                keys.iter()
                    .map(|k| f.values.get(*k).cloned().unwrap_or(Value::Null)),
            );
            row
        })
        .collect();

    SheetLayout {
        name: SHEET_NAMES[2],
        headers,
        rows,
    }
}

fn state_sheet(tables: &ParticipantTables) -> SheetLayout {
    let headers = ["trialNumber", "stateChange", "stateChangeTime"]
        .iter()
        .map(|h| h.to_string())
        .collect();

    let rows = tables
        .state
        .iter()
        .map(|e| {
            vec![
                Value::from(e.trial_number),
                Value::from(e.state_change.as_str()),
                Value::from(e.state_change_time_ms),
            ]
        })
        .collect();

    SheetLayout {
        name: SHEET_NAMES[3],
        headers,
        rows,
    }
}
