//! Event-to-duration reduction
//!
//! Reduces a participant's flat state-change log to per-trial reaction and
//! movement durations. Only the first GO, MOVING and STOP of each trial count,
//! where "first" means first in log order. Every join is keyed on the trial
//! number; trials missing a state are reported, never aligned by position.

use crate::types::{StateChange, StateEvent, TrialDurations};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A trial present in the log that lacks one or more timing states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompleteTrial {
    pub trial_number: u32,
    pub missing: Vec<StateChange>,
}

/// One row of a derived-duration table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationRow {
    pub trial_number: u32,
    pub duration_ms: f64,
}

/// Reducer output, keyed by trial number
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReducedDurations {
    /// GO joined with MOVING
    pub reaction_ms: BTreeMap<u32, f64>,
    /// MOVING joined with STOP
    pub movement_ms: BTreeMap<u32, f64>,
    /// Trials with both durations
    pub durations: BTreeMap<u32, TrialDurations>,
    /// Trials seen in the log without a complete GO/MOVING/STOP sequence
    pub incomplete: Vec<IncompleteTrial>,
}

impl ReducedDurations {
    pub fn get(&self, trial_number: u32) -> Option<&TrialDurations> {
        self.durations.get(&trial_number)
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// Reaction durations as exportable rows, ordered by trial number
    pub fn reaction_table(&self) -> Vec<DurationRow> {
        to_rows(&self.reaction_ms)
    }

    /// Movement durations as exportable rows, ordered by trial number
    pub fn movement_table(&self) -> Vec<DurationRow> {
        to_rows(&self.movement_ms)
    }
}

/// Reducer from state-change events to trial durations
pub struct EventDurationReducer;

impl EventDurationReducer {
    /// Reduce a participant's state log to per-trial durations
    pub fn reduce(events: &[StateEvent]) -> ReducedDurations {
        let go = first_occurrences(events, &StateChange::Go);
        let moving = first_occurrences(events, &StateChange::Moving);
        let stop = first_occurrences(events, &StateChange::Stop);

        let reaction_ms = inner_join(&go, &moving);
        let movement_ms = inner_join(&moving, &stop);

        let durations: BTreeMap<u32, TrialDurations> = reaction_ms
            .iter()
            .filter_map(|(&trial_number, &reaction)| {
                movement_ms.get(&trial_number).map(|&movement| {
                    (
                        trial_number,
                        TrialDurations {
                            trial_number,
                            reaction_ms: reaction,
                            movement_ms: movement,
                        },
                    )
                })
            })
            .collect();

        let seen: BTreeSet<u32> = events.iter().map(|e| e.trial_number).collect();
        let incomplete: Vec<IncompleteTrial> = seen
            .into_iter()
            .filter(|trial_number| !durations.contains_key(trial_number))
            .map(|trial_number| {
                let missing = [
                    (&go, StateChange::Go),
                    (&moving, StateChange::Moving),
                    (&stop, StateChange::Stop),
                ]
                .into_iter()
                .filter(|(firsts, _)| !firsts.contains_key(&trial_number))
                .map(|(_, label)| label)
                .collect();
                IncompleteTrial {
                    trial_number,
                    missing,
                }
            })
            .collect();

        for duration in durations.values() {
            if duration.reaction_ms < 0.0 || duration.movement_ms < 0.0 {
                log::warn!(
                    "trial {} has out-of-order state timestamps (reaction {} ms, movement {} ms)",
                    duration.trial_number,
                    duration.reaction_ms,
                    duration.movement_ms
                );
            }
        }

        if !incomplete.is_empty() {
            log::debug!(
                "{} trial(s) lack a complete GO/MOVING/STOP sequence",
                incomplete.len()
            );
        }

        ReducedDurations {
            reaction_ms,
            movement_ms,
            durations,
            incomplete,
        }
    }
}

/// First timestamp per trial for one label, by log order
fn first_occurrences(events: &[StateEvent], label: &StateChange) -> BTreeMap<u32, f64> {
    let mut firsts = BTreeMap::new();
    for event in events.iter().filter(|e| &e.state_change == label) {
        firsts
            .entry(event.trial_number)
            .or_insert(event.state_change_time_ms);
    }
    firsts
}

/// Inner join on trial number, yielding `later - earlier`
fn inner_join(earlier: &BTreeMap<u32, f64>, later: &BTreeMap<u32, f64>) -> BTreeMap<u32, f64> {
    earlier
        .iter()
        .filter_map(|(trial_number, start)| {
            later
                .get(trial_number)
                .map(|end| (*trial_number, end - start))
        })
        .collect()
}

fn to_rows(table: &BTreeMap<u32, f64>) -> Vec<DurationRow> {
    table
        .iter()
        .map(|(&trial_number, &duration_ms)| DurationRow {
            trial_number,
            duration_ms,
        })
        .collect()
}
