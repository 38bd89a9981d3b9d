#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Game mode state machines.
//!
//! Each mode is a small, independent state machine behind [`GameMode`]: it
//! produces the [`LevelConfig`] for the next round and consumes the sealed
//! [`RoundStats`] once that round is over. Modes never touch storage; their
//! persistent state travels as plain snapshots.

mod campaign;
mod challenge;
mod practice;
mod random;

use chipnotes_core::{LevelConfig, LevelId, ModeKind, PlayerProgress, RoundStats};
use serde::{Deserialize, Serialize};

pub use campaign::{Campaign, CampaignSnapshot, DEFAULT_UNLOCK_THRESHOLD};
pub use challenge::{
    seed_from_date_string, Challenge, ChallengeSeed, DEFAULT_CHALLENGE_MS, MAX_CHALLENGE_MS,
    MIN_CHALLENGE_MS,
};
pub use practice::Practice;
pub use random::{RandomSession, SessionStats};

/// Level identifier used by modes outside the campaign table.
pub const FREE_PLAY_LEVEL: LevelId = LevelId::new(0);

/// Summary a mode reports after consuming a finished round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModeResult {
    /// Mode that consumed the round.
    pub mode: ModeKind,
    /// Round score.
    pub score: u32,
    /// Round species accuracy, as a percentage.
    pub accuracy: f64,
    /// Campaign level unlocked by the round, if any.
    pub unlocked_level: Option<LevelId>,
    /// Whether the score beat the mode's previous best.
    pub is_new_high_score: bool,
}

impl ModeResult {
    fn plain(mode: ModeKind, stats: &RoundStats) -> Self {
        Self {
            mode,
            score: stats.score,
            accuracy: stats.accuracy,
            unlocked_level: None,
            is_new_high_score: false,
        }
    }
}

/// Capability shared by every game mode.
pub trait GameMode {
    /// Mode discriminant.
    fn kind(&self) -> ModeKind;

    /// Level configuration the next round would use, without changing state.
    fn create_level_config(&self) -> Option<LevelConfig>;

    /// Begins a round, returning its configuration, or `None` if the mode
    /// cannot start one in its current state.
    fn start(&mut self) -> Option<LevelConfig>;

    /// Consumes the stats of a finished round. Returns `None` when the mode
    /// was not in a state that could accept them.
    fn complete(&mut self, stats: &RoundStats) -> Option<ModeResult>;

    /// Seed the next round must be scheduled with, when the mode fixes one.
    fn seed(&self) -> Option<u64> {
        None
    }
}

/// Stores a mode's score in lifetime progress when it beats the stored best.
///
/// Returns whether the stored best changed.
pub fn record_high_score(progress: &mut PlayerProgress, mode: ModeKind, score: u32) -> bool {
    let best = progress.high_scores.entry(mode).or_insert(0);
    if score > *best {
        *best = score;
        return true;
    }
    false
}
