use chipnotes_core::{
    ChannelMode, ClipSelection, EventDensity, LevelConfig, ModeKind, PackId, RoundStats,
    VocalizationFilter,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{GameMode, ModeResult, FREE_PLAY_LEVEL};

/// Running totals of an open-ended session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Events recorded.
    pub events: u32,
    /// Events answered with the right species.
    pub correct: u32,
    /// Total points.
    pub score: u32,
    /// Current run of correct answers.
    pub streak: u32,
    /// Longest run of correct answers.
    pub max_streak: u32,
    /// Percentage of correct events.
    pub accuracy: f64,
    /// Set when the session was quit.
    pub sealed: bool,
}

/// Open-ended session that only ends when the player quits.
#[derive(Clone, Debug)]
pub struct RandomSession {
    pack_id: PackId,
    active: bool,
    stats: SessionStats,
    best_score: u32,
}

impl RandomSession {
    /// Creates an idle session over the pack.
    #[must_use]
    pub fn new(pack_id: PackId) -> Self {
        Self {
            pack_id,
            active: false,
            stats: SessionStats::default(),
            best_score: 0,
        }
    }

    /// Restores a previously stored best score.
    #[must_use]
    pub fn with_best_score(mut self, best_score: u32) -> Self {
        self.best_score = best_score;
        self
    }

    /// Reports whether a session is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Best session score so far.
    #[must_use]
    pub fn best_score(&self) -> u32 {
        self.best_score
    }

    /// Running totals of the current or last session.
    #[must_use]
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Adds one resolved event to the running totals. Ignored when idle.
    pub fn record_event(&mut self, correct: bool, points: u32) -> bool {
        if !self.active {
            return false;
        }
        let stats = &mut self.stats;
        stats.events = stats.events.saturating_add(1);
        stats.score = stats.score.saturating_add(points);
        if correct {
            stats.correct += 1;
            stats.streak += 1;
            stats.max_streak = stats.max_streak.max(stats.streak);
        } else {
            stats.streak = 0;
        }
        stats.accuracy = f64::from(stats.correct) / f64::from(stats.events) * 100.0;
        true
    }

    /// Ends the session, sealing and returning its totals. `None` when idle.
    pub fn quit(&mut self) -> Option<SessionStats> {
        if !self.active {
            return None;
        }
        self.active = false;
        self.stats.sealed = true;
        if self.stats.score > self.best_score {
            self.best_score = self.stats.score;
        }
        info!(
            events = self.stats.events,
            score = self.stats.score,
            accuracy = self.stats.accuracy,
            "random_session_ended"
        );
        Some(self.stats.clone())
    }
}

impl GameMode for RandomSession {
    fn kind(&self) -> ModeKind {
        ModeKind::Random
    }

    fn create_level_config(&self) -> Option<LevelConfig> {
        Some(LevelConfig {
            level_id: FREE_PLAY_LEVEL,
            pack_id: self.pack_id.clone(),
            duration_ms: None,
            // Every species the pack offers.
            species_count: u32::MAX,
            event_density: EventDensity::Medium,
            overlap_probability: 0.15,
            scoring_window_ms: 1_800,
            channel_mode: ChannelMode::Offset,
            clip_selection: ClipSelection::All,
            species_filter: None,
            vocalization_filter: VocalizationFilter::Both,
        })
    }

    /// Begins a fresh session. Returns `None` while one is already running.
    fn start(&mut self) -> Option<LevelConfig> {
        if self.active {
            return None;
        }
        self.active = true;
        self.stats = SessionStats::default();
        self.create_level_config()
    }

    fn complete(&mut self, stats: &RoundStats) -> Option<ModeResult> {
        let previous_best = self.best_score;
        let _ = self.quit()?;
        let mut result = ModeResult::plain(ModeKind::Random, stats);
        result.is_new_high_score = stats.score > previous_best;
        self.best_score = self.best_score.max(stats.score);
        Some(result)
    }
}
