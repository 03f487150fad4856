//! Category filtering, speed-band error bars and summary statistics
//!
//! Everything here works on unjittered [`TrialMetrics`], so the results are
//! deterministic for a given input.

use crate::types::{
    CategoryFilter, Direction, ErrorBar, SpeedBand, SummaryStats, TrialMetrics,
};
use std::collections::BTreeMap;

/// Default reaction-time ceiling in seconds; slower trials are treated as stalls
pub const DEFAULT_REACTION_CEILING_S: f64 = 5.0;

/// Keep the records matching a category selection
pub fn filter_category(records: &[TrialMetrics], filter: CategoryFilter) -> Vec<TrialMetrics> {
    records
        .iter()
        .filter(|r| filter.matches(r.category))
        .cloned()
        .collect()
}

/// Group records by speed band and signed true time and compute error bars
///
/// Records without a speed band are left out. Reaction statistics only use
/// trials strictly below `reaction_ceiling_s`.
pub fn error_bars(records: &[TrialMetrics], reaction_ceiling_s: f64) -> Vec<ErrorBar> {
    let mut groups: BTreeMap<(SpeedBand, i64, Direction), Vec<&TrialMetrics>> = BTreeMap::new();
    for record in records {
        let Some(band) = record.speed_band else {
            continue;
        };
        let key_ms = (record.true_time_dir * 1000.0).round() as i64;
        groups
            .entry((band, key_ms, record.direction))
            .or_default()
            .push(record);
    }

    groups
        .into_iter()
        .map(|((speed_band, key_ms, direction), members)| {
            let produced: Vec<f64> = members.iter().map(|r| r.produced_time_s).collect();
            let reaction: Vec<f64> = members
                .iter()
                .map(|r| r.reaction_time_s)
                .filter(|&rt| rt < reaction_ceiling_s)
                .collect();

            ErrorBar {
                speed_band,
                direction,
                true_time_dir: key_ms as f64 / 1000.0,
                trials: members.len(),
                produced_mean_dir: direction.sign() * mean(&produced).unwrap_or(0.0),
                produced_std: sample_std(&produced),
                reaction_trials: reaction.len(),
                reaction_mean: mean(&reaction),
                reaction_std: sample_std(&reaction),
            }
        })
        .collect()
}

/// Participant-level summary over the given records
pub fn summarize(records: &[TrialMetrics]) -> SummaryStats {
    let true_times: Vec<f64> = records.iter().map(|r| r.true_time_s).collect();
    let produced: Vec<f64> = records.iter().map(|r| r.produced_time_s).collect();
    let reaction: Vec<f64> = records.iter().map(|r| r.reaction_time_s).collect();
    let abs_errors: Vec<f64> = records
        .iter()
        .map(|r| (r.produced_time_s - r.true_time_s).abs())
        .collect();

    SummaryStats {
        trials: records.len(),
        mean_true_time_s: mean(&true_times),
        mean_produced_time_s: mean(&produced),
        mean_reaction_time_s: mean(&reaction),
        mean_abs_error_s: mean(&abs_errors),
        true_produced_correlation: pearson(&true_times, &produced),
    }
}

pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1); undefined below two values
pub(crate) fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance =
        values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// Pearson correlation; undefined for fewer than two pairs or zero variance
fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mx = mean(xs)?;
    let my = mean(ys)?;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        var_x += (x - mx).powi(2);
        var_y += (y - my).powi(2);
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}
