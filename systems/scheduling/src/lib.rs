#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic event scheduling for rounds.
//!
//! Every random decision (species subset, round channel, gaps, overlaps, clip
//! choice) is drawn from one seeded ChaCha generator threaded through the
//! planner, so identical `(level, pool, seed)` inputs always reproduce the
//! identical event sequence.

use std::collections::VecDeque;

use chipnotes_core::{
    Channel, ChannelMode, ClipId, ClipMetadata, ClipSelection, EventId, LevelConfig,
    ScheduledEvent, SchedulerTuning, SpeciesCode, SpeciesEntry, SpeciesPool, SpeciesSelection,
    VocalizationType,
};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Exp};
use tracing::{debug, warn};

/// Fully scheduled timed round.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundPlan {
    /// Seed the plan was generated from.
    pub seed: u64,
    /// Species the player chooses between.
    pub species: Vec<SpeciesSelection>,
    /// Events ordered by scheduled time, identifiers ascending.
    pub events: Vec<ScheduledEvent>,
}

/// Pure system that turns a level and a species pool into scheduled events.
#[derive(Clone, Debug, Default)]
pub struct EventScheduler {
    tuning: SchedulerTuning,
}

impl EventScheduler {
    /// Creates a scheduler using the provided tuning.
    #[must_use]
    pub fn new(tuning: SchedulerTuning) -> Self {
        Self { tuning }
    }

    /// Tuning the scheduler was built with.
    #[must_use]
    pub fn tuning(&self) -> &SchedulerTuning {
        &self.tuning
    }

    /// Schedules every event of a timed round.
    ///
    /// Open-ended levels have no natural end and yield no events here; use
    /// [`EventScheduler::stream`] for them.
    #[must_use]
    pub fn schedule(
        &self,
        level: &LevelConfig,
        pool: &SpeciesPool,
        seed: Option<u64>,
    ) -> Vec<ScheduledEvent> {
        self.plan(level, pool, seed).events
    }

    /// Schedules a timed round and reports the species and seed it used.
    #[must_use]
    pub fn plan(&self, level: &LevelConfig, pool: &SpeciesPool, seed: Option<u64>) -> RoundPlan {
        let seed = resolve_seed(seed);
        let mut planner = Planner::new(&self.tuning, level, pool, seed);
        let species = planner.selections.clone();

        let Some(duration_ms) = level.duration_ms else {
            warn!(level = level.level_id.get(), "open_ended_level_needs_stream");
            return RoundPlan {
                seed,
                species,
                events: Vec::new(),
            };
        };

        let mut drafts = Vec::new();
        while planner.cursor_ms < duration_ms {
            let Some(group) = planner.next_group() else {
                break;
            };
            drafts.extend(
                group
                    .into_iter()
                    .filter(|draft| draft.scheduled_time_ms < duration_ms),
            );
        }
        drafts.sort_by_key(|draft| draft.scheduled_time_ms);

        let events: Vec<ScheduledEvent> = drafts
            .into_iter()
            .zip(0u32..)
            .map(|(draft, id)| draft.into_event(EventId::new(id)))
            .collect();

        debug!(
            level = level.level_id.get(),
            seed,
            species = species.len(),
            events = events.len(),
            "round_scheduled"
        );

        RoundPlan {
            seed,
            species,
            events,
        }
    }

    /// Creates a lazily evaluated, restartable event stream for open-ended rounds.
    #[must_use]
    pub fn stream(
        &self,
        level: &LevelConfig,
        pool: &SpeciesPool,
        seed: Option<u64>,
    ) -> EventStream {
        EventStream::new(self.tuning.clone(), level.clone(), pool.clone(), resolve_seed(seed))
    }
}

/// Unbounded event sequence for continuous sessions.
///
/// The stream yields exactly the events a timed round with the same inputs
/// would contain, without an end.
#[derive(Debug)]
pub struct EventStream {
    tuning: SchedulerTuning,
    level: LevelConfig,
    pool: SpeciesPool,
    seed: u64,
    planner: Planner,
    pending: VecDeque<Draft>,
    next_id: u32,
}

impl EventStream {
    fn new(tuning: SchedulerTuning, level: LevelConfig, pool: SpeciesPool, seed: u64) -> Self {
        let planner = Planner::new(&tuning, &level, &pool, seed);
        Self {
            tuning,
            level,
            pool,
            seed,
            planner,
            pending: VecDeque::new(),
            next_id: 0,
        }
    }

    /// Seed driving the stream.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Species the stream draws from.
    #[must_use]
    pub fn species(&self) -> &[SpeciesSelection] {
        &self.planner.selections
    }

    /// Rewinds the stream to its first event.
    pub fn restart(&mut self) {
        self.planner = Planner::new(&self.tuning, &self.level, &self.pool, self.seed);
        self.pending.clear();
        self.next_id = 0;
    }

    /// Scheduled time of the next event without consuming it.
    pub fn next_time_ms(&mut self) -> Option<u64> {
        self.fill();
        self.pending.front().map(|draft| draft.scheduled_time_ms)
    }

    fn fill(&mut self) {
        if self.pending.is_empty() {
            if let Some(group) = self.planner.next_group() {
                self.pending.extend(group);
            }
        }
    }
}

impl Iterator for EventStream {
    type Item = ScheduledEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.fill();
        let draft = self.pending.pop_front()?;
        let id = EventId::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        Some(draft.into_event(id))
    }
}

#[derive(Clone, Debug)]
struct Draft {
    species_code: SpeciesCode,
    clip: ClipId,
    channel: Channel,
    scheduled_time_ms: u64,
    duration_ms: u64,
}

impl Draft {
    fn into_event(self, id: EventId) -> ScheduledEvent {
        ScheduledEvent {
            id,
            species_code: self.species_code,
            clip: self.clip,
            channel: self.channel,
            scheduled_time_ms: self.scheduled_time_ms,
            duration_ms: self.duration_ms,
            resolved: false,
            outcome: None,
        }
    }
}

#[derive(Debug)]
struct Planner {
    rng: ChaCha8Rng,
    selections: Vec<SpeciesSelection>,
    song_probability: f64,
    bag: Vec<usize>,
    last_drawn: Option<usize>,
    channel_mode: ChannelMode,
    round_channel: Channel,
    cursor_ms: u64,
    gap_ms: u64,
    jitter: Option<Exp<f64>>,
    jitter_cap_ms: f64,
    overlap_probability: f64,
    overlap_offset_max_ms: u64,
}

impl Planner {
    fn new(tuning: &SchedulerTuning, level: &LevelConfig, pool: &SpeciesPool, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let selections = select_species(level, pool, &mut rng);
        let round_channel = random_channel(&mut rng);

        let gap_ms = pool
            .modifiers
            .applied_gap_ms(tuning.base_gap_ms(level.event_density))
            .max(1);
        let jitter_mean = gap_ms as f64 * tuning.gap_jitter_fraction;
        let jitter = if jitter_mean > 0.0 {
            Exp::new(1.0 / jitter_mean).ok()
        } else {
            None
        };

        let weights = pool.modifiers.vocalization_weights;
        let weight_sum = weights.song + weights.call;
        let song_probability = if weight_sum > 0.0 {
            weights.song / weight_sum
        } else {
            0.5
        };

        Self {
            rng,
            selections,
            song_probability,
            bag: Vec::new(),
            last_drawn: None,
            channel_mode: level.channel_mode,
            round_channel,
            cursor_ms: tuning.lead_in_ms,
            gap_ms,
            jitter,
            jitter_cap_ms: gap_ms as f64 * tuning.gap_jitter_cap_fraction.max(0.0),
            overlap_probability: pool
                .modifiers
                .applied_overlap_probability(level.overlap_probability),
            overlap_offset_max_ms: tuning.overlap_offset_max_ms,
        }
    }

    /// Produces the event at the cursor plus its overlapping partner, if one
    /// is drawn, and advances the cursor past both.
    fn next_group(&mut self) -> Option<Vec<Draft>> {
        if self.selections.is_empty() {
            return None;
        }

        let start = self.cursor_ms;
        let species = self.draw_species(None);
        let channel = match self.channel_mode {
            ChannelMode::Single => self.round_channel,
            ChannelMode::Offset => random_channel(&mut self.rng),
        };
        let mut group = vec![self.draft(species, channel, start)?];

        let gap = self.next_gap();
        let overlaps = self.rng.gen::<f64>() < self.overlap_probability;
        // Single-channel rounds keep every event on the round channel.
        if overlaps && self.channel_mode == ChannelMode::Offset {
            let max_offset = self.overlap_offset_max_ms.min(gap.saturating_sub(1));
            let offset = self.rng.gen_range(0..=max_offset);
            let partner = self.draw_species(Some(species));
            if let Some(draft) = self.draft(partner, channel.opposite(), start + offset) {
                group.push(draft);
            }
        }

        let span = group
            .iter()
            .map(|draft| draft.scheduled_time_ms + draft.duration_ms - start)
            .max()
            .unwrap_or(0);
        self.cursor_ms = start.saturating_add(gap.max(span));
        Some(group)
    }

    fn next_gap(&mut self) -> u64 {
        let jitter = match self.jitter {
            Some(distribution) => distribution.sample(&mut self.rng).min(self.jitter_cap_ms),
            None => 0.0,
        };
        self.gap_ms + jitter.round() as u64
    }

    /// Draws species without replacement, reshuffling once the bag runs dry.
    /// `avoid` keeps an overlapping partner distinct from its primary.
    fn draw_species(&mut self, avoid: Option<usize>) -> usize {
        let mut drawn = self.pop_species();
        if avoid == Some(drawn) && self.selections.len() > 1 {
            if self.bag.is_empty() {
                self.refill_bag();
            } else {
                self.bag.insert(0, drawn);
            }
            drawn = self.pop_species();
        }
        self.last_drawn = Some(drawn);
        drawn
    }

    fn pop_species(&mut self) -> usize {
        if self.bag.is_empty() {
            self.refill_bag();
        }
        self.bag.pop().unwrap_or(0)
    }

    fn refill_bag(&mut self) {
        self.bag.clear();
        self.bag.extend(0..self.selections.len());
        self.bag.shuffle(&mut self.rng);

        // The bag pops from the end; keep the last species off the top.
        let end = self.bag.len().saturating_sub(1);
        if end > 0 && self.last_drawn == self.bag.last().copied() {
            self.bag.swap(0, end);
        }
    }

    fn draft(&mut self, species: usize, channel: Channel, time_ms: u64) -> Option<Draft> {
        let selection = self.selections.get(species)?;
        let clip = pick_clip(&mut self.rng, &selection.clips, self.song_probability)?;
        Some(Draft {
            species_code: selection.code.clone(),
            clip: clip.clip_id.clone(),
            channel,
            scheduled_time_ms: time_ms,
            duration_ms: clip.duration_ms,
        })
    }
}

fn resolve_seed(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| rand::thread_rng().gen())
}

fn random_channel(rng: &mut ChaCha8Rng) -> Channel {
    if rng.gen_bool(0.5) {
        Channel::Left
    } else {
        Channel::Right
    }
}

fn select_species(
    level: &LevelConfig,
    pool: &SpeciesPool,
    rng: &mut ChaCha8Rng,
) -> Vec<SpeciesSelection> {
    let mut candidates: Vec<SpeciesSelection> = pool
        .entries
        .iter()
        .filter(|entry| {
            level
                .species_filter
                .as_ref()
                .map_or(true, |filter| filter.contains(&entry.code))
        })
        .filter_map(|entry| {
            let clips = eligible_clips(entry, level);
            if clips.is_empty() {
                return None;
            }
            Some(SpeciesSelection {
                code: entry.code.clone(),
                display_name: entry.display_name.clone(),
                clips,
            })
        })
        .collect();

    if candidates.is_empty() {
        warn!(level = level.level_id.get(), "no_schedulable_species");
        return candidates;
    }

    let requested = usize::try_from(level.species_count).unwrap_or(usize::MAX);
    if requested >= candidates.len() {
        if requested > candidates.len() {
            debug!(
                requested,
                available = candidates.len(),
                "species_count_clamped"
            );
        }
        return candidates;
    }

    candidates.shuffle(rng);
    candidates.truncate(requested);
    candidates
}

fn eligible_clips(entry: &SpeciesEntry, level: &LevelConfig) -> Vec<ClipMetadata> {
    let filtered: Vec<&ClipMetadata> = entry
        .clips
        .iter()
        .filter(|clip| level.vocalization_filter.admits(clip.vocalization_type))
        .collect();
    // A filter that would silence the species falls back to every clip.
    let base: Vec<&ClipMetadata> = if filtered.is_empty() {
        entry.clips.iter().collect()
    } else {
        filtered
    };

    match level.clip_selection {
        ClipSelection::Canonical => base
            .iter()
            .copied()
            .find(|clip| clip.canonical)
            .or_else(|| base.first().copied())
            .into_iter()
            .cloned()
            .collect(),
        ClipSelection::Variations(count) => base
            .into_iter()
            .take(usize::try_from(count).unwrap_or(usize::MAX))
            .cloned()
            .collect(),
        ClipSelection::All => base.into_iter().cloned().collect(),
    }
}

fn pick_clip<'a>(
    rng: &mut ChaCha8Rng,
    clips: &'a [ClipMetadata],
    song_probability: f64,
) -> Option<&'a ClipMetadata> {
    let has = |kind: VocalizationType| clips.iter().any(|clip| clip.vocalization_type == kind);
    let wanted = if has(VocalizationType::Song) && has(VocalizationType::Call) {
        if rng.gen::<f64>() < song_probability {
            Some(VocalizationType::Song)
        } else {
            Some(VocalizationType::Call)
        }
    } else {
        None
    };

    let candidates: Vec<&ClipMetadata> = clips
        .iter()
        .filter(|clip| wanted.map_or(true, |kind| clip.vocalization_type == kind))
        .collect();
    candidates.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipnotes_core::{
        EventDensity, LevelId, PackId, PackModifiers, VocalizationFilter, VocalizationWeights,
    };

    fn clip(species: &str, index: u32, kind: VocalizationType, canonical: bool) -> ClipMetadata {
        ClipMetadata {
            clip_id: ClipId::new(format!("{species}_{index}")),
            species_code: SpeciesCode::new(species),
            common_name: None,
            vocalization_type: kind,
            duration_ms: 1_000 + u64::from(index) * 200,
            quality_score: 4,
            source: "xc".to_owned(),
            canonical,
            rejected: false,
        }
    }

    fn pool(codes: &[&str]) -> SpeciesPool {
        SpeciesPool {
            modifiers: PackModifiers::default(),
            entries: codes
                .iter()
                .map(|code| SpeciesEntry {
                    code: SpeciesCode::new(*code),
                    display_name: (*code).to_owned(),
                    clips: vec![
                        clip(code, 1, VocalizationType::Song, true),
                        clip(code, 2, VocalizationType::Call, false),
                        clip(code, 3, VocalizationType::Song, false),
                    ],
                })
                .collect(),
        }
    }

    fn level() -> LevelConfig {
        LevelConfig {
            level_id: LevelId::new(1),
            pack_id: PackId::new("starter_birds"),
            duration_ms: Some(60_000),
            species_count: 4,
            event_density: EventDensity::Medium,
            overlap_probability: 0.0,
            scoring_window_ms: 2_000,
            channel_mode: ChannelMode::Offset,
            clip_selection: ClipSelection::All,
            species_filter: None,
            vocalization_filter: VocalizationFilter::Both,
        }
    }

    #[test]
    fn canonical_selection_keeps_signature_clip_only() {
        let mut config = level();
        config.clip_selection = ClipSelection::Canonical;
        let entry = &pool(&["NOCA"]).entries[0];
        let clips = eligible_clips(entry, &config);
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].clip_id.as_str(), "NOCA_1");
    }

    #[test]
    fn variation_selection_takes_first_clips_in_order() {
        let mut config = level();
        config.clip_selection = ClipSelection::Variations(2);
        let entry = &pool(&["NOCA"]).entries[0];
        let ids: Vec<String> = eligible_clips(entry, &config)
            .into_iter()
            .map(|clip| clip.clip_id.to_string())
            .collect();
        assert_eq!(ids, vec!["NOCA_1", "NOCA_2"]);
    }

    #[test]
    fn vocalization_filter_narrows_before_selection() {
        let mut config = level();
        config.vocalization_filter = VocalizationFilter::Call;
        let entry = &pool(&["NOCA"]).entries[0];
        let clips = eligible_clips(entry, &config);
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].vocalization_type, VocalizationType::Call);

        let songs_only = SpeciesEntry {
            code: SpeciesCode::new("BLJA"),
            display_name: "BLJA".to_owned(),
            clips: vec![clip("BLJA", 1, VocalizationType::Song, true)],
        };
        assert_eq!(eligible_clips(&songs_only, &config).len(), 1);
    }

    #[test]
    fn song_weight_steers_clip_choice() {
        let clips = pool(&["NOCA"]).entries[0].clips.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        for _ in 0..32 {
            let chosen = pick_clip(&mut rng, &clips, 1.0).expect("clip");
            assert_eq!(chosen.vocalization_type, VocalizationType::Song);
        }
        for _ in 0..32 {
            let chosen = pick_clip(&mut rng, &clips, 0.0).expect("clip");
            assert_eq!(chosen.vocalization_type, VocalizationType::Call);
        }
    }

    #[test]
    fn species_count_is_clamped_to_pool() {
        let mut config = level();
        config.species_count = 10;
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(select_species(&config, &pool(&["NOCA", "BLJA"]), &mut rng).len(), 2);

        config.species_count = 2;
        let subset = select_species(&config, &pool(&["NOCA", "BLJA", "CARW", "AMRO"]), &mut rng);
        assert_eq!(subset.len(), 2);
    }

    #[test]
    fn species_filter_restricts_pool() {
        let mut config = level();
        config.species_filter = Some(vec![SpeciesCode::new("CARW")]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let selected = select_species(&config, &pool(&["NOCA", "CARW"]), &mut rng);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].code.as_str(), "CARW");
    }

    #[test]
    fn bag_never_repeats_species_back_to_back() {
        let config = level();
        let mut planner = Planner::new(
            &SchedulerTuning::default(),
            &config,
            &pool(&["NOCA", "BLJA", "CARW"]),
            77,
        );
        let mut previous = None;
        for _ in 0..90 {
            let drawn = planner.draw_species(None);
            assert_ne!(Some(drawn), previous);
            previous = Some(drawn);
        }
    }

    #[test]
    fn tempo_multiplier_shortens_gaps() {
        let mut fast = pool(&["NOCA", "BLJA"]);
        fast.modifiers = PackModifiers {
            overlap_multiplier: 1.0,
            tempo_multiplier: 2.0,
            vocalization_weights: VocalizationWeights::default(),
        };
        let planner = Planner::new(&SchedulerTuning::default(), &level(), &fast, 1);
        assert_eq!(planner.gap_ms, 1_100);
    }

    #[test]
    fn empty_pool_schedules_nothing() {
        let scheduler = EventScheduler::default();
        assert!(scheduler.schedule(&level(), &SpeciesPool::default(), Some(5)).is_empty());
    }
}
