//! Trial metric normalization
//!
//! Joins trial rows with reduced durations on the trial number and converts
//! them into signed seconds on a common axis.

use crate::reducer::ReducedDurations;
use crate::types::{
    Direction, ExclusionCounts, NormalizedTrials, SpeedBand, Trial, TrialExclusion, TrialMetrics,
};
use std::collections::HashSet;

/// Milliseconds per second
const MS_PER_SECOND: f64 = 1000.0;

/// Normalizer for trial metrics
pub struct TrialNormalizer;

impl TrialNormalizer {
    /// Normalize trial rows against reduced durations
    pub fn normalize(trials: &[Trial], durations: &ReducedDurations) -> NormalizedTrials {
        let mut exclusions = ExclusionCounts::default();
        let mut records = Vec::with_capacity(trials.len());
        let mut seen = HashSet::with_capacity(trials.len());

        for trial in trials {
            if !seen.insert(trial.trial_number) {
                log::warn!("duplicate trial number {}, keeping first row", trial.trial_number);
                exclusions.duplicate_trial += 1;
                continue;
            }

            let Some(duration) = durations.get(trial.trial_number) else {
                log::debug!("trial {} has no complete state sequence", trial.trial_number);
                exclusions.record(TrialExclusion::MissingJoinKey);
                continue;
            };

            let Some((interlimb_distance, direction)) = trial
                .target_id
                .checked_sub(trial.start_id)
                .and_then(|d| Direction::from_distance(d).map(|dir| (d, dir)))
            else {
                log::debug!(
                    "trial {} has no interlimb direction (start {}, target {})",
                    trial.trial_number,
                    trial.start_id,
                    trial.target_id
                );
                exclusions.record(TrialExclusion::UndefinedDirection);
                continue;
            };

            let speed_band = SpeedBand::from_step_size(trial.step_size);
            if speed_band.is_none() {
                log::warn!(
                    "trial {} has unrecognized step size {}",
                    trial.trial_number,
                    trial.step_size
                );
                exclusions.record(TrialExclusion::UnrecognizedCategory);
            }

            let true_time_s = ms_to_seconds(trial.true_time_ms);
            let produced_time_s = ms_to_seconds(duration.movement_ms);
            let reaction_time_s = ms_to_seconds(duration.reaction_ms);

            records.push(TrialMetrics {
                trial_number: trial.trial_number,
                block_number: trial.block_number,
                category: trial.category(),
                step_size: trial.step_size,
                speed_band,
                interlimb_distance,
                direction,
                true_time_s,
                produced_time_s,
                reaction_time_s,
                true_time_dir: direction.sign() * true_time_s,
                produced_time_dir: direction.sign() * produced_time_s,
            });
        }

        exclusions.orphan_durations = durations
            .durations
            .keys()
            .filter(|trial_number| !seen.contains(trial_number))
            .count();
        if exclusions.orphan_durations > 0 {
            log::warn!(
                "{} reduced duration(s) have no matching trial row",
                exclusions.orphan_durations
            );
        }

        NormalizedTrials {
            records,
            exclusions,
        }
    }
}

/// Convert milliseconds to seconds, rounded to millisecond precision
pub fn ms_to_seconds(ms: f64) -> f64 {
    round_to_millis(ms / MS_PER_SECOND)
}

/// Round a value in seconds to three decimals
pub fn round_to_millis(seconds: f64) -> f64 {
    (seconds * MS_PER_SECOND).round() / MS_PER_SECOND
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reducer::EventDurationReducer;
    use crate::types::{Category, StateChange, StateEvent};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn trial(trial_number: u32, start_id: i64, target_id: i64, step_size: u32) -> Trial {
        Trial {
            trial_number,
            block_number: 0,
            start_id,
            target_id,
            attempt: 0,
            step_size,
            is_train: false,
            subject: "p1".to_string(),
            true_time_ms: 5000.0,
            produced_time_ms: None,
            extra: BTreeMap::new(),
        }
    }

    fn events(trial_number: u32, go: f64, moving: f64, stop: f64) -> Vec<StateEvent> {
        [("GO", go), ("MOVING", moving), ("STOP", stop)]
            .into_iter()
            .map(|(label, time)| StateEvent {
                trial_number,
                state_change: StateChange::parse(label),
                state_change_time_ms: time,
            })
            .collect()
    }

    #[test]
    fn test_end_to_end_example() {
        let trials = vec![trial(1, 10, 30, 20)];
        let durations = EventDurationReducer::reduce(&events(1, 1000.0, 1200.0, 1400.0));

        let normalized = TrialNormalizer::normalize(&trials, &durations);

        assert_eq!(normalized.records.len(), 1);
        let record = &normalized.records[0];
        assert_eq!(record.interlimb_distance, 20);
        assert_eq!(record.direction, Direction::Positive);
        assert_eq!(record.true_time_s, 5.0);
        assert_eq!(record.produced_time_s, 0.2);
        assert_eq!(record.reaction_time_s, 0.2);
        assert_eq!(record.true_time_dir, 5.0);
        assert_eq!(record.produced_time_dir, 0.2);
        assert_eq!(record.speed_band, Some(SpeedBand::Normal));
        assert_eq!(record.category, Category::Mental);
        assert_eq!(normalized.exclusions, ExclusionCounts::default());
    }

    #[test]
    fn test_negative_direction() {
        let trials = vec![trial(1, 30, 10, 15)];
        let durations = EventDurationReducer::reduce(&events(1, 0.0, 250.0, 3250.0));

        let normalized = TrialNormalizer::normalize(&trials, &durations);
        let record = &normalized.records[0];

        assert_eq!(record.direction, Direction::Negative);
        assert_eq!(record.interlimb_distance, -20);
        assert_eq!(record.true_time_dir, -5.0);
        assert_eq!(record.produced_time_dir, -3.0);
        assert_eq!(record.reaction_time_s, 0.25);
        assert_eq!(record.speed_band, Some(SpeedBand::Slow));
    }

    #[test]
    fn test_zero_distance_excluded() {
        let trials = vec![trial(1, 12, 12, 20), trial(2, 12, 14, 20)];
        let mut log = events(1, 0.0, 100.0, 200.0);
        log.extend(events(2, 0.0, 100.0, 200.0));
        let durations = EventDurationReducer::reduce(&log);

        let first = TrialNormalizer::normalize(&trials, &durations);
        let second = TrialNormalizer::normalize(&trials, &durations);

        assert_eq!(first.records.len(), 1);
        assert_eq!(first.records[0].trial_number, 2);
        assert_eq!(first.exclusions.undefined_direction, 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_overflowing_distance_excluded() {
        let trials = vec![trial(1, i64::MIN, i64::MAX, 20), trial(2, 0, 5, 20)];
        let mut log = events(1, 0.0, 100.0, 200.0);
        log.extend(events(2, 0.0, 100.0, 200.0));
        let durations = EventDurationReducer::reduce(&log);

        let normalized = TrialNormalizer::normalize(&trials, &durations);

        assert_eq!(normalized.records.len(), 1);
        assert_eq!(normalized.records[0].trial_number, 2);
        assert_eq!(normalized.exclusions.undefined_direction, 1);
    }

    #[test]
    fn test_join_by_trial_number_with_gaps() {
        // Trial rows out of order; trial 2 has no GO event
        let trials = vec![trial(3, 0, 5, 20), trial(1, 0, 5, 20), trial(2, 0, 5, 20)];
        let mut log = events(1, 0.0, 100.0, 1100.0);
        log.extend(
            events(2, 0.0, 200.0, 2200.0)
                .into_iter()
                .filter(|e| e.state_change != StateChange::Go),
        );
        log.extend(events(3, 0.0, 300.0, 3300.0));
        let durations = EventDurationReducer::reduce(&log);

        let normalized = TrialNormalizer::normalize(&trials, &durations);

        let pairs: Vec<(u32, f64, f64)> = normalized
            .records
            .iter()
            .map(|r| (r.trial_number, r.reaction_time_s, r.produced_time_s))
            .collect();
        assert_eq!(pairs, vec![(3, 0.3, 3.0), (1, 0.1, 1.0)]);
        assert_eq!(normalized.exclusions.missing_join_key, 1);
        assert_eq!(normalized.exclusions.dropped_rows(), 1);
    }

    #[test]
    fn test_orphan_durations_and_duplicates() {
        let trials = vec![trial(1, 0, 5, 20), trial(1, 0, 9, 20)];
        let mut log = events(1, 0.0, 100.0, 1100.0);
        log.extend(events(9, 0.0, 100.0, 1100.0));
        let durations = EventDurationReducer::reduce(&log);

        let normalized = TrialNormalizer::normalize(&trials, &durations);

        assert_eq!(normalized.records.len(), 1);
        assert_eq!(normalized.records[0].interlimb_distance, 5);
        assert_eq!(normalized.exclusions.duplicate_trial, 1);
        assert_eq!(normalized.exclusions.orphan_durations, 1);
    }

    #[test]
    fn test_unrecognized_step_size_kept() {
        let trials = vec![trial(1, 0, 5, 25)];
        let durations = EventDurationReducer::reduce(&events(1, 0.0, 100.0, 1100.0));

        let normalized = TrialNormalizer::normalize(&trials, &durations);

        assert_eq!(normalized.records.len(), 1);
        assert_eq!(normalized.records[0].speed_band, None);
        assert_eq!(normalized.exclusions.unrecognized_step_size, 1);
        assert_eq!(normalized.exclusions.dropped_rows(), 0);
    }

    #[test]
    fn test_seconds_round_trip() {
        for ms in [0.0, 1.0, 199.6, 200.4, 1234.0, 4999.5, 87654.3] {
            let seconds = ms_to_seconds(ms);
            assert_eq!(round_to_millis(seconds), seconds);
            assert!((seconds * MS_PER_SECOND - ms).abs() <= 1.0);
        }
        assert_eq!(ms_to_seconds(1234.4), 1.234);
        assert_eq!(ms_to_seconds(1234.6), 1.235);
    }
}
