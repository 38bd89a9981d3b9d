use std::collections::BTreeSet;

use chipnotes_core::{
    ChannelMode, ClipSelection, EventDensity, LevelConfig, LevelId, ModeKind, PackId, RoundStats,
    VocalizationFilter,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{GameMode, ModeResult};

/// Accuracy percentage a round needs to unlock the following level.
pub const DEFAULT_UNLOCK_THRESHOLD: f64 = 70.0;

/// Plain campaign state for the storage collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSnapshot {
    /// Levels the player may start.
    pub unlocked_levels: Vec<LevelId>,
    /// Level the campaign resumes at.
    pub current_level: LevelId,
}

/// Level progression gated by round accuracy.
#[derive(Clone, Debug)]
pub struct Campaign {
    levels: Vec<LevelConfig>,
    unlocked: BTreeSet<LevelId>,
    current: LevelId,
    threshold: f64,
}

impl Campaign {
    /// Creates a campaign over the provided level table with its first level unlocked.
    #[must_use]
    pub fn new(mut levels: Vec<LevelConfig>) -> Self {
        levels.sort_by_key(|level| level.level_id);
        levels.dedup_by_key(|level| level.level_id);
        let first = levels
            .first()
            .map_or(LevelId::new(1), |level| level.level_id);
        Self {
            levels,
            unlocked: BTreeSet::from([first]),
            current: first,
            threshold: DEFAULT_UNLOCK_THRESHOLD,
        }
    }

    /// Overrides the unlock threshold.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Standard six-level progression for a pack.
    #[must_use]
    pub fn default_levels(pack_id: &PackId) -> Vec<LevelConfig> {
        use ChannelMode::{Offset, Single};
        use ClipSelection::{All, Canonical, Variations};
        use EventDensity::{High, Low, Medium};

        let table = [
            (30_000, 2, Low, 0.0, 2_000, Single, Canonical),
            (45_000, 3, Low, 0.0, 2_000, Offset, Canonical),
            (60_000, 4, Medium, 0.1, 1_800, Offset, Variations(2)),
            (60_000, 5, Medium, 0.2, 1_600, Offset, Variations(3)),
            (90_000, 6, High, 0.3, 1_400, Offset, All),
            (120_000, 8, High, 0.4, 1_200, Offset, All),
        ];

        table
            .into_iter()
            .zip(1..)
            .map(
                |((duration, species, density, overlap, window, channels, clips), id)| LevelConfig {
                    level_id: LevelId::new(id),
                    pack_id: pack_id.clone(),
                    duration_ms: Some(duration),
                    species_count: species,
                    event_density: density,
                    overlap_probability: overlap,
                    scoring_window_ms: window,
                    channel_mode: channels,
                    clip_selection: clips,
                    species_filter: None,
                    vocalization_filter: VocalizationFilter::Both,
                },
            )
            .collect()
    }

    /// Level table, ordered by identifier.
    #[must_use]
    pub fn levels(&self) -> &[LevelConfig] {
        &self.levels
    }

    /// Level the next round plays.
    #[must_use]
    pub fn current_level(&self) -> LevelId {
        self.current
    }

    /// Reports whether the level may be played.
    #[must_use]
    pub fn is_unlocked(&self, level: LevelId) -> bool {
        self.unlocked.contains(&level)
    }

    /// Makes an unlocked level current. Returns `false` for locked or unknown levels.
    pub fn select_level(&mut self, level: LevelId) -> bool {
        if !self.is_unlocked(level) || self.level(level).is_none() {
            return false;
        }
        self.current = level;
        true
    }

    /// Applies a finished round of `level`.
    ///
    /// Accuracy at or above the threshold unlocks the next level in the table
    /// and makes it current. Completing a locked level returns `None`.
    pub fn complete_level(&mut self, level: LevelId, stats: &RoundStats) -> Option<ModeResult> {
        if !self.is_unlocked(level) {
            debug!(level = level.get(), "locked_level_completion_ignored");
            return None;
        }

        let mut result = ModeResult::plain(ModeKind::Campaign, stats);
        let next = level.next();
        if stats.accuracy >= self.threshold && self.level(next).is_some() {
            if self.unlocked.insert(next) {
                result.unlocked_level = Some(next);
                info!(level = next.get(), accuracy = stats.accuracy, "level_unlocked");
            }
            self.current = next;
        }
        Some(result)
    }

    /// Plain snapshot of the unlock state.
    #[must_use]
    pub fn export_progress(&self) -> CampaignSnapshot {
        CampaignSnapshot {
            unlocked_levels: self.unlocked.iter().copied().collect(),
            current_level: self.current,
        }
    }

    /// Restores unlock state from a snapshot, ignoring levels absent from the table.
    pub fn import_progress(&mut self, snapshot: &CampaignSnapshot) {
        self.unlocked.extend(
            snapshot
                .unlocked_levels
                .iter()
                .copied()
                .filter(|level| self.levels.iter().any(|known| known.level_id == *level)),
        );
        let _ = self.select_level(snapshot.current_level);
    }

    fn level(&self, level: LevelId) -> Option<&LevelConfig> {
        self.levels.iter().find(|config| config.level_id == level)
    }
}

impl GameMode for Campaign {
    fn kind(&self) -> ModeKind {
        ModeKind::Campaign
    }

    fn create_level_config(&self) -> Option<LevelConfig> {
        self.level(self.current).cloned()
    }

    fn start(&mut self) -> Option<LevelConfig> {
        self.create_level_config()
    }

    fn complete(&mut self, stats: &RoundStats) -> Option<ModeResult> {
        self.complete_level(self.current, stats)
    }
}
