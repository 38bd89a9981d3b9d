use serde::{Deserialize, Serialize};

use crate::{EventDensity, OutcomeKind};

/// Aggregated tuning knobs for every adjustable constant of the round engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    /// Outcome classification and point values.
    pub scoring: ScoringTuning,
    /// Gap distribution, overlap placement, and playback cueing.
    pub scheduler: SchedulerTuning,
}

/// Scoring-window split and point values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringTuning {
    /// Fraction of the scoring window, measured from the crossing instant,
    /// inside which a correct answer counts as perfect.
    pub perfect_band_fraction: f64,
    /// Points for a perfect outcome.
    pub perfect_points: u32,
    /// Points for a good outcome.
    pub good_points: u32,
    /// Points for a partial outcome.
    pub partial_points: u32,
    /// Points for a miss.
    pub miss_points: u32,
}

impl Default for ScoringTuning {
    fn default() -> Self {
        Self {
            perfect_band_fraction: 0.25,
            perfect_points: 100,
            good_points: 75,
            partial_points: 25,
            miss_points: 0,
        }
    }
}

impl ScoringTuning {
    /// Points awarded for the provided outcome kind.
    #[must_use]
    pub const fn points_for(&self, kind: OutcomeKind) -> u32 {
        match kind {
            OutcomeKind::Perfect => self.perfect_points,
            OutcomeKind::Good => self.good_points,
            OutcomeKind::Partial => self.partial_points,
            OutcomeKind::Miss => self.miss_points,
        }
    }

    /// Half-width of the perfect band for the provided scoring window.
    #[must_use]
    pub fn perfect_band_ms(&self, scoring_window_ms: u64) -> u64 {
        let fraction = self.perfect_band_fraction.clamp(0.0, 1.0);
        (scoring_window_ms as f64 * fraction).floor() as u64
    }
}

/// Gap distribution and playback timing used by the scheduler and round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerTuning {
    /// Minimum gap between consecutive events at low density.
    pub low_gap_ms: u64,
    /// Minimum gap between consecutive events at medium density.
    pub medium_gap_ms: u64,
    /// Minimum gap between consecutive events at high density.
    pub high_gap_ms: u64,
    /// Mean of the exponential jitter added on top of the gap, as a fraction of the gap.
    pub gap_jitter_fraction: f64,
    /// Upper bound of the jitter, as a fraction of the gap.
    pub gap_jitter_cap_fraction: f64,
    /// Round time of the first event, leaving room for tiles to scroll in.
    pub lead_in_ms: u64,
    /// Largest delay between an event and its overlapping partner.
    pub overlap_offset_max_ms: u64,
    /// How far ahead of playback the audio collaborator is cued.
    pub cue_lookahead_ms: u64,
    /// How far ahead continuous rounds admit events into the live set.
    pub continuous_horizon_ms: u64,
}

impl Default for SchedulerTuning {
    fn default() -> Self {
        Self {
            low_gap_ms: 3_500,
            medium_gap_ms: 2_200,
            high_gap_ms: 1_400,
            gap_jitter_fraction: 0.15,
            gap_jitter_cap_fraction: 0.5,
            lead_in_ms: 1_500,
            overlap_offset_max_ms: 400,
            cue_lookahead_ms: 250,
            continuous_horizon_ms: 8_000,
        }
    }
}

impl SchedulerTuning {
    /// Base gap for the provided density before pack tempo is applied.
    #[must_use]
    pub const fn base_gap_ms(&self, density: EventDensity) -> u64 {
        match density {
            EventDensity::Low => self.low_gap_ms,
            EventDensity::Medium => self.medium_gap_ms,
            EventDensity::High => self.high_gap_ms,
        }
    }
}
