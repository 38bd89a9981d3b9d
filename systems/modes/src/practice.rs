use chipnotes_core::{
    ChannelMode, ClipSelection, EventDensity, LevelConfig, ModeKind, PackId, RoundStats,
    SpeciesCode, VocalizationFilter,
};

use crate::{GameMode, ModeResult, FREE_PLAY_LEVEL};

const PRACTICE_ROUND_MS: u64 = 60_000;

/// Single-species drills with an optional vocalization filter.
#[derive(Clone, Debug)]
pub struct Practice {
    pack_id: PackId,
    species: Option<SpeciesCode>,
    filter: VocalizationFilter,
    duration_ms: u64,
}

impl Practice {
    /// Creates a practice mode for the pack with nothing selected.
    #[must_use]
    pub fn new(pack_id: PackId) -> Self {
        Self {
            pack_id,
            species: None,
            filter: VocalizationFilter::Both,
            duration_ms: PRACTICE_ROUND_MS,
        }
    }

    /// Chooses the species to drill, or clears the choice.
    pub fn select_species(&mut self, species: Option<SpeciesCode>) {
        self.species = species;
    }

    /// Chooses which vocalizations to hear.
    pub fn set_vocalization_filter(&mut self, filter: VocalizationFilter) {
        self.filter = filter;
    }

    /// Species currently selected.
    #[must_use]
    pub fn selected_species(&self) -> Option<&SpeciesCode> {
        self.species.as_ref()
    }

    /// Active vocalization filter.
    #[must_use]
    pub fn vocalization_filter(&self) -> VocalizationFilter {
        self.filter
    }
}

impl GameMode for Practice {
    fn kind(&self) -> ModeKind {
        ModeKind::Practice
    }

    fn create_level_config(&self) -> Option<LevelConfig> {
        let species = self.species.clone()?;
        Some(LevelConfig {
            level_id: FREE_PLAY_LEVEL,
            pack_id: self.pack_id.clone(),
            duration_ms: Some(self.duration_ms),
            species_count: 1,
            event_density: EventDensity::Low,
            overlap_probability: 0.0,
            scoring_window_ms: 2_000,
            channel_mode: ChannelMode::Offset,
            clip_selection: ClipSelection::All,
            species_filter: Some(vec![species]),
            vocalization_filter: self.filter,
        })
    }

    fn start(&mut self) -> Option<LevelConfig> {
        self.create_level_config()
    }

    fn complete(&mut self, stats: &RoundStats) -> Option<ModeResult> {
        if self.species.is_none() {
            return None;
        }
        Some(ModeResult::plain(ModeKind::Practice, stats))
    }
}
