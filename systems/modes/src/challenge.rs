use chipnotes_core::{
    ChannelMode, ClipSelection, EventDensity, LevelConfig, ModeKind, PackId, RoundStats,
    VocalizationFilter,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::{GameMode, ModeResult, FREE_PLAY_LEVEL};

/// Shortest challenge round.
pub const MIN_CHALLENGE_MS: u64 = 30_000;
/// Longest challenge round.
pub const MAX_CHALLENGE_MS: u64 = 120_000;
/// Challenge length when none is requested.
pub const DEFAULT_CHALLENGE_MS: u64 = 60_000;

const DAILY_SEED_LABEL: &str = "chipnotes-daily-challenge";

/// Source of a challenge's scheduling seed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeSeed {
    /// Caller-provided seed.
    Explicit(u64),
    /// Seed derived from a calendar-date string, shared by every player that day.
    Daily(String),
}

impl ChallengeSeed {
    /// Resolves the seed value.
    #[must_use]
    pub fn value(&self) -> u64 {
        match self {
            Self::Explicit(seed) => *seed,
            Self::Daily(date) => seed_from_date_string(date),
        }
    }
}

/// Derives a deterministic scheduling seed from a calendar-date string.
///
/// Surrounding whitespace is ignored.
#[must_use]
pub fn seed_from_date_string(date: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(DAILY_SEED_LABEL.as_bytes());
    hasher.update(date.trim().as_bytes());
    finalize_seed(hasher)
}

fn finalize_seed(hasher: Sha256) -> u64 {
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Fixed-length seeded round with a tracked high score.
#[derive(Clone, Debug)]
pub struct Challenge {
    pack_id: PackId,
    duration_ms: u64,
    seed: ChallengeSeed,
    high_score: u32,
}

impl Challenge {
    /// Creates a challenge, clamping the duration to the allowed range.
    #[must_use]
    pub fn new(pack_id: PackId, duration_ms: u64, seed: ChallengeSeed) -> Self {
        Self {
            pack_id,
            duration_ms: duration_ms.clamp(MIN_CHALLENGE_MS, MAX_CHALLENGE_MS),
            seed,
            high_score: 0,
        }
    }

    /// Creates the default-length daily challenge for the provided date.
    #[must_use]
    pub fn daily(pack_id: PackId, date: impl Into<String>) -> Self {
        Self::new(pack_id, DEFAULT_CHALLENGE_MS, ChallengeSeed::Daily(date.into()))
    }

    /// Restores a previously stored best score.
    #[must_use]
    pub fn with_high_score(mut self, high_score: u32) -> Self {
        self.high_score = high_score;
        self
    }

    /// Round length after clamping.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Best score so far.
    #[must_use]
    pub fn high_score(&self) -> u32 {
        self.high_score
    }

    /// Seed source of the challenge.
    #[must_use]
    pub fn seed_source(&self) -> &ChallengeSeed {
        &self.seed
    }
}

impl GameMode for Challenge {
    fn kind(&self) -> ModeKind {
        ModeKind::Challenge
    }

    fn create_level_config(&self) -> Option<LevelConfig> {
        Some(LevelConfig {
            level_id: FREE_PLAY_LEVEL,
            pack_id: self.pack_id.clone(),
            duration_ms: Some(self.duration_ms),
            species_count: 6,
            event_density: EventDensity::Medium,
            overlap_probability: 0.2,
            scoring_window_ms: 1_500,
            channel_mode: ChannelMode::Offset,
            clip_selection: ClipSelection::All,
            species_filter: None,
            vocalization_filter: VocalizationFilter::Both,
        })
    }

    fn start(&mut self) -> Option<LevelConfig> {
        self.create_level_config()
    }

    fn complete(&mut self, stats: &RoundStats) -> Option<ModeResult> {
        let mut result = ModeResult::plain(ModeKind::Challenge, stats);
        if stats.score > self.high_score {
            info!(
                previous = self.high_score,
                score = stats.score,
                "challenge_high_score"
            );
            self.high_score = stats.score;
            result.is_new_high_score = true;
        }
        Some(result)
    }

    fn seed(&self) -> Option<u64> {
        Some(self.seed.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(score: u32) -> RoundStats {
        RoundStats {
            score,
            sealed: true,
            ..RoundStats::default()
        }
    }

    #[test]
    fn date_seed_is_stable_per_day() {
        assert_eq!(
            seed_from_date_string("2024-01-15"),
            seed_from_date_string("2024-01-15")
        );
        assert_ne!(
            seed_from_date_string("2024-01-15"),
            seed_from_date_string("2024-01-16")
        );
        assert_eq!(
            seed_from_date_string(" 2024-01-15\n"),
            seed_from_date_string("2024-01-15")
        );
    }

    #[test]
    fn duration_is_clamped() {
        let pack = PackId::new("starter_birds");
        let short = Challenge::new(pack.clone(), 5_000, ChallengeSeed::Explicit(1));
        let long = Challenge::new(pack.clone(), 600_000, ChallengeSeed::Explicit(1));
        let exact = Challenge::new(pack, 45_000, ChallengeSeed::Explicit(1));

        assert_eq!(short.duration_ms(), MIN_CHALLENGE_MS);
        assert_eq!(long.duration_ms(), MAX_CHALLENGE_MS);
        assert_eq!(exact.create_level_config().and_then(|c| c.duration_ms), Some(45_000));
    }

    #[test]
    fn seed_follows_its_source() {
        let pack = PackId::new("sparrows");
        let explicit = Challenge::new(pack.clone(), 60_000, ChallengeSeed::Explicit(77));
        let daily = Challenge::daily(pack, "2024-01-15");

        assert_eq!(explicit.seed(), Some(77));
        assert_eq!(daily.seed(), Some(seed_from_date_string("2024-01-15")));
        assert_eq!(
            daily.seed_source(),
            &ChallengeSeed::Daily("2024-01-15".to_owned())
        );
    }

    #[test]
    fn high_score_reports_only_strict_improvements() {
        let mut challenge =
            Challenge::daily(PackId::new("starter_birds"), "2024-01-15").with_high_score(500);

        let lower = challenge.complete(&scored(400)).expect("result");
        let higher = challenge.complete(&scored(800)).expect("result");
        let equal = challenge.complete(&scored(800)).expect("result");

        assert!(!lower.is_new_high_score);
        assert!(higher.is_new_high_score);
        assert!(!equal.is_new_high_score);
        assert_eq!(challenge.high_score(), 800);
    }
}
