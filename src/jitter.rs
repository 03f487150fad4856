//! Presentation jitter
//!
//! Scatter plots of signed true vs produced time overlap heavily because true
//! times are drawn from a small set. The jitterer offsets display coordinates
//! with an explicit, seedable RNG. It never touches the records it reads.

use crate::types::{JitteredPoint, TrialMetrics};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Default jitter amplitude in seconds
pub const DEFAULT_JITTER_AMPLITUDE_S: f64 = 0.05;

/// Largest accepted jitter amplitude in seconds
pub const MAX_JITTER_AMPLITUDE_S: f64 = 1.0;

/// Uniform jitter in `[-amplitude, amplitude]` for plotted coordinates
pub struct Jitterer {
    rng: ChaCha8Rng,
    amplitude: f64,
}

impl Jitterer {
    /// Create a jitterer with a fixed seed (reproducible output)
    pub fn with_seed(amplitude: f64, seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            amplitude: sanitize_amplitude(amplitude),
        }
    }

    /// Create a jitterer seeded from the operating system
    pub fn from_entropy(amplitude: f64) -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
            amplitude: sanitize_amplitude(amplitude),
        }
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    /// Produce one jittered display point per record
    pub fn jitter(&mut self, records: &[TrialMetrics]) -> Vec<JitteredPoint> {
        records
            .iter()
            .map(|record| JitteredPoint {
                trial_number: record.trial_number,
                category: record.category,
                speed_band: record.speed_band,
                true_time_dir: record.true_time_dir + self.offset(),
                produced_time_dir: record.produced_time_dir + self.offset(),
                reaction_time_s: record.reaction_time_s + self.offset(),
            })
            .collect()
    }

    fn offset(&mut self) -> f64 {
        if self.amplitude == 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-self.amplitude..=self.amplitude)
    }
}

/// Negative or non-finite amplitudes disable jitter; large ones are clamped
fn sanitize_amplitude(amplitude: f64) -> f64 {
    if !amplitude.is_finite() || amplitude <= 0.0 {
        return 0.0;
    }
    if amplitude > MAX_JITTER_AMPLITUDE_S {
        log::warn!("jitter amplitude {amplitude} s clamped to {MAX_JITTER_AMPLITUDE_S} s");
        return MAX_JITTER_AMPLITUDE_S;
    }
    amplitude
}
