//! Core types for the mentalnav-metrics pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw participant tables, derived durations, normalized trial
//! metrics, aggregates and the chart-ready report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// State labels recorded by the task's state machine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StateChange {
    Go,
    Moving,
    Stop,
    /// Any other state the task passes through (setup, feedback, ...)
    #[serde(untagged)]
    Other(String),
}

impl StateChange {
    /// Parse a raw label, ignoring case for the three timing states
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "GO" => StateChange::Go,
            "MOVING" => StateChange::Moving,
            "STOP" => StateChange::Stop,
            _ => StateChange::Other(label.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StateChange::Go => "GO",
            StateChange::Moving => "MOVING",
            StateChange::Stop => "STOP",
            StateChange::Other(label) => label.as_str(),
        }
    }
}

/// One attempt at the task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub trial_number: u32,
    pub block_number: u32,
    /// Landmark the participant starts from
    pub start_id: i64,
    /// Landmark the participant has to reach
    pub target_id: i64,
    pub attempt: u32,
    /// Categorical speed level (observed: 15, 20)
    pub step_size: u32,
    /// Visual (training) trial when true, mental trial otherwise
    pub is_train: bool,
    pub subject: String,
    /// Target duration in milliseconds
    pub true_time_ms: f64,
    /// Placeholder recorded by the task; the pipeline derives its own value
    pub produced_time_ms: Option<f64>,
    /// Remaining scalar columns, preserved for export
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Trial {
    pub fn category(&self) -> Category {
        Category::from_is_train(self.is_train)
    }
}

/// Participant-level metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub participant_id: String,
    pub completed: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// One rendered frame of a trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub trial_number: u32,
    pub frame_index: u32,
    pub values: BTreeMap<String, serde_json::Value>,
}

/// A timestamped state transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    pub trial_number: u32,
    pub state_change: StateChange,
    /// Absolute timestamp in milliseconds
    pub state_change_time_ms: f64,
}

/// The four tables loaded for one participant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticipantTables {
    pub trial: Vec<Trial>,
    pub subject: Vec<Subject>,
    pub frame: Vec<Frame>,
    pub state: Vec<StateEvent>,
}

/// Durations reduced from a trial's state log (milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrialDurations {
    pub trial_number: u32,
    /// First MOVING minus first GO
    pub reaction_ms: f64,
    /// First STOP minus first MOVING
    pub movement_ms: f64,
}

/// Movement direction along the landmark line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Direction {
    Negative,
    Positive,
}

impl Direction {
    /// Sign of the interlimb distance; `None` when start and target coincide
    pub fn from_distance(distance: i64) -> Option<Self> {
        match distance.signum() {
            1 => Some(Direction::Positive),
            -1 => Some(Direction::Negative),
            _ => None,
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Positive => 1.0,
            Direction::Negative => -1.0,
        }
    }
}

impl From<Direction> for i8 {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Positive => 1,
            Direction::Negative => -1,
        }
    }
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Direction::Positive),
            -1 => Ok(Direction::Negative),
            other => Err(format!("invalid direction: {other}")),
        }
    }
}

/// Trial category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Participant navigates without visual feedback
    Mental,
    /// Training trials with the landmarks visible
    Visual,
}

impl Category {
    pub fn from_is_train(is_train: bool) -> Self {
        if is_train {
            Category::Visual
        } else {
            Category::Mental
        }
    }
}

/// Category selection offered by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryFilter {
    #[default]
    All,
    Mental,
    Visual,
}

impl CategoryFilter {
    pub fn matches(self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Mental => category == Category::Mental,
            CategoryFilter::Visual => category == Category::Visual,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CategoryFilter::All => "all",
            CategoryFilter::Mental => "mental",
            CategoryFilter::Visual => "visual",
        }
    }
}

impl std::str::FromStr for CategoryFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(CategoryFilter::All),
            "mental" => Ok(CategoryFilter::Mental),
            "visual" => Ok(CategoryFilter::Visual),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// Named speed condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SpeedBand {
    /// Step size 20
    #[serde(rename = "1x")]
    Normal,
    /// Step size 15
    #[serde(rename = "0.75x")]
    Slow,
}

impl SpeedBand {
    pub fn from_step_size(step_size: u32) -> Option<Self> {
        match step_size {
            20 => Some(SpeedBand::Normal),
            15 => Some(SpeedBand::Slow),
            _ => None,
        }
    }

    /// Display label, identical to the serialized form
    pub fn label(self) -> &'static str {
        match self {
            SpeedBand::Normal => "1x",
            SpeedBand::Slow => "0.75x",
        }
    }
}

/// Reason a trial was excluded from (part of) the analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialExclusion {
    /// GO, MOVING or STOP never recorded for the trial
    MissingJoinKey,
    /// Start and target landmarks are the same
    UndefinedDirection,
    /// Step size outside the known speed bands
    UnrecognizedCategory,
}

/// Per-run counts of absorbed anomalies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionCounts {
    /// Trial rows with no complete GO/MOVING/STOP durations
    pub missing_join_key: usize,
    /// Trial rows with zero interlimb distance
    pub undefined_direction: usize,
    /// Kept trials whose step size has no speed band
    pub unrecognized_step_size: usize,
    /// Trial rows repeating an already-seen trial number
    pub duplicate_trial: usize,
    /// Reduced durations with no matching trial row
    pub orphan_durations: usize,
}

impl ExclusionCounts {
    pub fn record(&mut self, exclusion: TrialExclusion) {
        match exclusion {
            TrialExclusion::MissingJoinKey => self.missing_join_key += 1,
            TrialExclusion::UndefinedDirection => self.undefined_direction += 1,
            TrialExclusion::UnrecognizedCategory => self.unrecognized_step_size += 1,
        }
    }

    /// Trial rows that did not make it into the normalized output
    pub fn dropped_rows(&self) -> usize {
        self.missing_join_key + self.undefined_direction + self.duplicate_trial
    }
}

/// Normalized, analysis-ready metrics for one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialMetrics {
    pub trial_number: u32,
    pub block_number: u32,
    pub category: Category,
    pub step_size: u32,
    pub speed_band: Option<SpeedBand>,
    /// target_id - start_id
    pub interlimb_distance: i64,
    pub direction: Direction,
    pub true_time_s: f64,
    pub produced_time_s: f64,
    pub reaction_time_s: f64,
    pub true_time_dir: f64,
    pub produced_time_dir: f64,
}

/// Output of the normalizer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTrials {
    pub records: Vec<TrialMetrics>,
    pub exclusions: ExclusionCounts,
}

/// Mean and spread for one (speed band, signed true time) group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBar {
    pub speed_band: SpeedBand,
    pub direction: Direction,
    pub true_time_dir: f64,
    pub trials: usize,
    /// Mean produced time with the direction sign re-applied
    pub produced_mean_dir: f64,
    pub produced_std: Option<f64>,
    /// Trials below the reaction-time ceiling
    pub reaction_trials: usize,
    pub reaction_mean: Option<f64>,
    pub reaction_std: Option<f64>,
}

/// Participant-level summary statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub trials: usize,
    pub mean_true_time_s: Option<f64>,
    pub mean_produced_time_s: Option<f64>,
    pub mean_reaction_time_s: Option<f64>,
    /// Mean of |produced - true|
    pub mean_abs_error_s: Option<f64>,
    /// Pearson correlation between true and produced time
    pub true_produced_correlation: Option<f64>,
}

/// Display coordinates for one trial, offset to avoid overplotting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JitteredPoint {
    pub trial_number: u32,
    pub category: Category,
    pub speed_band: Option<SpeedBand>,
    pub true_time_dir: f64,
    pub produced_time_dir: f64,
    pub reaction_time_s: f64,
}

/// Report producer metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Report provenance information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportProvenance {
    pub participant_id: String,
    pub computed_at_utc: String,
    pub jitter_amplitude_s: f64,
    pub jitter_seed: Option<u64>,
}

/// Chart-ready payload for one participant and category selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub provenance: ReportProvenance,
    pub category: CategoryFilter,
    pub exclusions: ExclusionCounts,
    pub points: Vec<JitteredPoint>,
    pub error_bars: Vec<ErrorBar>,
    pub summary: SummaryStats,
}
