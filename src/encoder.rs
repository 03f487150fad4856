//! Report encoding
//!
//! This module encodes a participant analysis into the chart-ready JSON
//! report consumed by the dashboard front end.

use crate::error::PipelineError;
use crate::pipeline::ParticipantAnalysis;
use crate::types::{MetricsReport, ReportProducer, ReportProvenance};
use crate::{PRODUCER_NAME, VERSION};
use chrono::Utc;
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Encoder for producing metrics reports
pub struct MetricsEncoder {
    instance_id: String,
}

impl Default for MetricsEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Encode an analysis into a report
    pub fn encode(&self, analysis: &ParticipantAnalysis) -> MetricsReport {
        let producer = ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = ReportProvenance {
            participant_id: analysis.participant_id.clone(),
            computed_at_utc: Utc::now().to_rfc3339(),
            jitter_amplitude_s: analysis.options.jitter_amplitude_s,
            jitter_seed: analysis.options.jitter_seed,
        };

        MetricsReport {
            report_version: REPORT_VERSION.to_string(),
            producer,
            provenance,
            category: analysis.options.category,
            exclusions: analysis.normalized.exclusions,
            points: analysis.points.clone(),
            error_bars: analysis.error_bars.clone(),
            summary: analysis.summary.clone(),
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(
        &self,
        analysis: &ParticipantAnalysis,
        pretty: bool,
    ) -> Result<String, PipelineError> {
        let report = self.encode(analysis);
        let json = if pretty {
            serde_json::to_string_pretty(&report)?
        } else {
            serde_json::to_string(&report)?
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{analyze_participant, AnalysisOptions};
    use crate::types::{CategoryFilter, ParticipantTables, StateChange, StateEvent, Trial};
    use std::collections::BTreeMap;

    fn analysis() -> ParticipantAnalysis {
        let trial = Trial {
            trial_number: 0,
            block_number: 0,
            start_id: 4,
            target_id: 1,
            attempt: 0,
            step_size: 20,
            is_train: false,
            subject: "p7".to_string(),
            true_time_ms: 1500.0,
            produced_time_ms: None,
            extra: BTreeMap::new(),
        };
        let state = [
            (StateChange::Go, 0.0),
            (StateChange::Moving, 250.0),
            (StateChange::Stop, 1850.0),
        ]
        .into_iter()
        .map(|(state_change, t)| StateEvent {
            trial_number: 0,
            state_change,
            state_change_time_ms: t,
        })
        .collect();
        let tables = ParticipantTables {
            trial: vec![trial],
            state,
            ..ParticipantTables::default()
        };
        let options = AnalysisOptions {
            category: CategoryFilter::Mental,
            jitter_amplitude_s: 0.0,
            jitter_seed: Some(3),
            ..AnalysisOptions::default()
        };
        analyze_participant("p7", &tables, &options)
    }

    #[test]
    fn test_encode_report() {
        let encoder = MetricsEncoder::with_instance_id("fixed".to_string());
        let report = encoder.encode(&analysis());

        assert_eq!(report.report_version, REPORT_VERSION);
        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.producer.instance_id, "fixed");
        assert_eq!(report.provenance.participant_id, "p7");
        assert_eq!(report.provenance.jitter_seed, Some(3));
        assert!(chrono::DateTime::parse_from_rfc3339(&report.provenance.computed_at_utc).is_ok());

        // Zero amplitude leaves the point on its true coordinates
        assert_eq!(report.points.len(), 1);
        assert_eq!(report.points[0].true_time_dir, -1.5);
        assert_eq!(report.points[0].produced_time_dir, -1.6);
        assert_eq!(report.error_bars.len(), 1);
        assert_eq!(report.error_bars[0].produced_std, None);
    }

    #[test]
    fn test_encode_to_json() {
        let encoder = MetricsEncoder::new();
        let json = encoder.encode_to_json(&analysis(), true).unwrap();

        assert!(json.contains("\"report_version\""));
        assert!(json.contains("\"error_bars\""));
        assert!(json.contains('\n'));

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["category"], "mental");
        assert_eq!(parsed["exclusions"]["missing_join_key"], 0);
        assert_eq!(parsed["producer"]["instance_id"], encoder.instance_id());
    }

    #[test]
    fn test_unique_instance_ids() {
        assert_ne!(
            MetricsEncoder::new().instance_id(),
            MetricsEncoder::new().instance_id()
        );
    }
}
