//! Pipeline orchestration
//!
//! This module provides the public API for mentalnav-metrics.
//! It orchestrates the full pipeline from participant tables to a chart-ready
//! report: reduction → normalization → filtering → aggregation → jitter.

use crate::aggregate::{error_bars, filter_category, summarize};
use crate::config::DashboardConfig;
use crate::encoder::MetricsEncoder;
use crate::error::PipelineError;
use crate::export::ExportCache;
use crate::jitter::Jitterer;
use crate::normalizer::TrialNormalizer;
use crate::reducer::{EventDurationReducer, ReducedDurations};
use crate::source::DataSource;
use crate::types::{
    CategoryFilter, ErrorBar, JitteredPoint, NormalizedTrials, ParticipantTables, SummaryStats,
    TrialMetrics,
};
use std::sync::Arc;

/// Per-request analysis options
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    pub category: CategoryFilter,
    pub reaction_ceiling_s: f64,
    pub jitter_amplitude_s: f64,
    /// Fixed jitter seed; a fresh random seed is used when unset
    pub jitter_seed: Option<u64>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self::from(&DashboardConfig::default())
    }
}

impl From<&DashboardConfig> for AnalysisOptions {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            category: config.category,
            reaction_ceiling_s: config.reaction_ceiling_s,
            jitter_amplitude_s: config.jitter.amplitude_s,
            jitter_seed: config.jitter.seed,
        }
    }
}

/// Everything derived for one participant and category selection
#[derive(Debug, Clone)]
pub struct ParticipantAnalysis {
    pub participant_id: String,
    pub options: AnalysisOptions,
    /// Reducer output, available for export
    pub durations: ReducedDurations,
    /// All normalized trials with exclusion counts
    pub normalized: NormalizedTrials,
    /// Normalized trials matching the category selection
    pub selected: Vec<TrialMetrics>,
    pub error_bars: Vec<ErrorBar>,
    pub summary: SummaryStats,
    /// Display coordinates for `selected`
    pub points: Vec<JitteredPoint>,
}

/// Analyze one participant's tables (stateless, one-shot).
///
/// # Example
/// ```ignore
/// let analysis = analyze_participant("p1", &tables, &AnalysisOptions::default());
/// ```
pub fn analyze_participant(
    participant_id: &str,
    tables: &ParticipantTables,
    options: &AnalysisOptions,
) -> ParticipantAnalysis {
    // Stage 1: Reduce the state log to per-trial durations
    let durations = EventDurationReducer::reduce(&tables.state);

    // Stage 2: Join with trial rows and normalize
    let normalized = TrialNormalizer::normalize(&tables.trial, &durations);

    // Stage 3: Category selection
    let selected = filter_category(&normalized.records, options.category);

    // Stage 4: Aggregates on unjittered values
    let error_bars = error_bars(&selected, options.reaction_ceiling_s);
    let summary = summarize(&selected);

    // Stage 5: Presentation jitter
    let mut jitterer = match options.jitter_seed {
        Some(seed) => Jitterer::with_seed(options.jitter_amplitude_s, seed),
        None => Jitterer::from_entropy(options.jitter_amplitude_s),
    };
    let points = jitterer.jitter(&selected);
    let mut options = options.clone();
    options.jitter_amplitude_s = jitterer.amplitude();

    log::info!(
        "{participant_id}: {} of {} trials normalized, {} selected ({}), {} dropped",
        normalized.records.len(),
        tables.trial.len(),
        selected.len(),
        options.category.as_str(),
        normalized.exclusions.dropped_rows()
    );

    ParticipantAnalysis {
        participant_id: participant_id.to_string(),
        options,
        durations,
        normalized,
        selected,
        error_bars,
        summary,
        points,
    }
}

/// Stateful processor bound to a data source, with a memoized export.
pub struct MetricsProcessor {
    source: Box<dyn DataSource>,
    export_cache: ExportCache,
    encoder: MetricsEncoder,
}

impl MetricsProcessor {
    pub fn new(source: Box<dyn DataSource>) -> Self {
        Self {
            source,
            export_cache: ExportCache::new(),
            encoder: MetricsEncoder::new(),
        }
    }

    /// Use a specific encoder (fixed instance id in tests)
    pub fn with_encoder(source: Box<dyn DataSource>, encoder: MetricsEncoder) -> Self {
        Self {
            source,
            export_cache: ExportCache::new(),
            encoder,
        }
    }

    /// Participants that completed the session
    pub fn participants(&self) -> Result<Vec<String>, PipelineError> {
        self.source.participant_ids()
    }

    /// Fetch and analyze one participant
    pub fn analyze(
        &self,
        participant_id: &str,
        options: &AnalysisOptions,
    ) -> Result<ParticipantAnalysis, PipelineError> {
        let tables = self.source.fetch(participant_id)?;
        Ok(analyze_participant(participant_id, &tables, options))
    }

    /// Fetch, analyze and encode one participant as report JSON
    pub fn report_json(
        &self,
        participant_id: &str,
        options: &AnalysisOptions,
        pretty: bool,
    ) -> Result<String, PipelineError> {
        let analysis = self.analyze(participant_id, options)?;
        self.encoder.encode_to_json(&analysis, pretty)
    }

    /// Derived-duration tables of one participant
    pub fn durations(&self, participant_id: &str) -> Result<ReducedDurations, PipelineError> {
        let tables = self.source.fetch(participant_id)?;
        Ok(EventDurationReducer::reduce(&tables.state))
    }

    /// Spreadsheet export of one participant's raw tables
    pub fn export(&mut self, participant_id: &str) -> Result<Arc<Vec<u8>>, PipelineError> {
        let tables = self.source.fetch(participant_id)?;
        self.export_cache.get_or_build(participant_id, &tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter::MAX_JITTER_AMPLITUDE_S;
    use crate::schema::DocumentAdapter;
    use crate::source::InMemorySource;
    use crate::types::{Category, Direction, SpeedBand};
    use pretty_assertions::assert_eq;

    fn sample_participant_json() -> &'static str {
        r#"{
            "info": { "completed": true },
            "k01": {
                "trialNumber": 1, "blockNumber": 0, "startId": 10, "targetId": 30,
                "attempt": 0, "stepSize": 20, "isTrain": false, "trueTime": 5000,
                "stateChange": ["GO", "MOVING", "STOP"],
                "stateChangeTime": [1000.0, 1200.0, 1400.0]
            },
            "k02": {
                "trialNumber": 2, "blockNumber": 0, "startId": 30, "targetId": 10,
                "attempt": 0, "stepSize": 15, "isTrain": true, "trueTime": 3000,
                "stateChange": ["GO", "MOVING", "STOP", "STOP"],
                "stateChangeTime": [5000.0, 5400.0, 8500.0, 8600.0]
            },
            "k03": {
                "trialNumber": 3, "blockNumber": 1, "startId": 12, "targetId": 12,
                "attempt": 0, "stepSize": 20, "isTrain": false, "trueTime": 2000,
                "stateChange": ["GO", "MOVING", "STOP"],
                "stateChangeTime": [9000.0, 9100.0, 9900.0]
            },
            "k04": {
                "trialNumber": 4, "blockNumber": 1, "startId": 5, "targetId": 9,
                "attempt": 0, "stepSize": 20, "isTrain": false, "trueTime": 2000,
                "stateChange": ["MOVING", "STOP"],
                "stateChangeTime": [12000.0, 13000.0]
            },
            "k05": {
                "trialNumber": 5, "blockNumber": 1, "startId": 9, "targetId": 5,
                "attempt": 0, "stepSize": 20, "isTrain": false, "trueTime": 2000,
                "stateChange": ["GO", "MOVING", "STOP"],
                "stateChangeTime": [14000.0, 14500.0, 16500.0]
            }
        }"#
    }

    fn tables() -> ParticipantTables {
        DocumentAdapter::parse_tables("p1", sample_participant_json()).unwrap()
    }

    fn options(category: CategoryFilter) -> AnalysisOptions {
        AnalysisOptions {
            category,
            jitter_seed: Some(11),
            ..AnalysisOptions::default()
        }
    }

    #[test]
    fn test_analyze_participant() {
        let analysis = analyze_participant("p1", &tables(), &options(CategoryFilter::All));

        // Trial 3 has zero distance, trial 4 never saw GO
        let numbers: Vec<u32> = analysis.selected.iter().map(|r| r.trial_number).collect();
        assert_eq!(numbers, vec![1, 2, 5]);
        assert_eq!(analysis.normalized.exclusions.missing_join_key, 1);
        assert_eq!(analysis.normalized.exclusions.undefined_direction, 1);
        assert_eq!(analysis.normalized.exclusions.dropped_rows(), 2);

        let first = &analysis.selected[0];
        assert_eq!(first.true_time_dir, 5.0);
        assert_eq!(first.produced_time_dir, 0.2);
        assert_eq!(first.reaction_time_s, 0.2);

        // First STOP wins for trial 2
        let second = &analysis.selected[1];
        assert_eq!(second.direction, Direction::Negative);
        assert_eq!(second.category, Category::Visual);
        assert_eq!(second.speed_band, Some(SpeedBand::Slow));
        assert_eq!(second.produced_time_dir, -3.1);
        assert_eq!(second.true_time_dir, -3.0);

        assert_eq!(analysis.points.len(), 3);
        assert_eq!(analysis.summary.trials, 3);
    }

    #[test]
    fn test_category_partition_end_to_end() {
        let data = tables();
        let all = analyze_participant("p1", &data, &options(CategoryFilter::All));
        let mental = analyze_participant("p1", &data, &options(CategoryFilter::Mental));
        let visual = analyze_participant("p1", &data, &options(CategoryFilter::Visual));

        assert_eq!(all.selected.len(), mental.selected.len() + visual.selected.len());
        assert_eq!(visual.selected.len(), 1);
        assert_eq!(visual.selected[0].trial_number, 2);
    }

    #[test]
    fn test_seeded_analysis_is_deterministic() {
        let data = tables();
        let a = analyze_participant("p1", &data, &options(CategoryFilter::All));
        let b = analyze_participant("p1", &data, &options(CategoryFilter::All));

        assert_eq!(a.points, b.points);
        assert_eq!(a.error_bars, b.error_bars);
        assert_eq!(a.summary, b.summary);
    }

    #[test]
    fn test_oversized_jitter_is_clamped() {
        let options = AnalysisOptions {
            jitter_amplitude_s: 1e308,
            ..options(CategoryFilter::All)
        };

        let analysis = analyze_participant("p1", &tables(), &options);

        assert_eq!(analysis.options.jitter_amplitude_s, MAX_JITTER_AMPLITUDE_S);
        for (point, record) in analysis.points.iter().zip(&analysis.selected) {
            assert!((point.produced_time_dir - record.produced_time_dir).abs() <= 1.0);
        }
    }

    #[test]
    fn test_processor_flow() {
        let source = InMemorySource::new().with_participant("p1", tables());
        let mut processor = MetricsProcessor::with_encoder(
            Box::new(source),
            MetricsEncoder::with_instance_id("test".to_string()),
        );

        assert_eq!(processor.participants().unwrap(), vec!["p1"]);

        let durations = processor.durations("p1").unwrap();
        assert_eq!(durations.len(), 4);
        assert_eq!(durations.get(2).unwrap().movement_ms, 3100.0);

        let json = processor
            .report_json("p1", &options(CategoryFilter::Mental), false)
            .unwrap();
        let payload: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(payload["producer"]["instance_id"], "test");
        assert_eq!(payload["category"], "mental");
        assert_eq!(payload["points"].as_array().unwrap().len(), 2);

        let first = processor.export("p1").unwrap();
        let second = processor.export("p1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_processor_fetch_failure() {
        let processor = MetricsProcessor::new(Box::new(InMemorySource::new()));

        let result = processor.analyze("ghost", &AnalysisOptions::default());
        assert!(matches!(
            result,
            Err(PipelineError::SourceFetchFailure { ref participant, .. }) if participant == "ghost"
        ));
    }
}
