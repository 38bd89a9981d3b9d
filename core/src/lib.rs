#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the ChipNotes round engine.
//!
//! This crate defines the data model and the message surface that connects
//! host adapters, the authoritative round, and the pure systems. Hosts submit
//! [`Command`] values describing desired mutations, the round executes those
//! commands via its `apply` entry point, and then broadcasts [`Event`] values
//! for the audio and render collaborators to react to. Systems consume
//! immutable configuration and event slices and never own a timer.

use std::{collections::BTreeMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};

mod tuning;

pub use tuning::{EngineTuning, ScoringTuning, SchedulerTuning};

/// Species code identifying a bird, e.g. `NOCA` for the Northern Cardinal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeciesCode(String);

impl SpeciesCode {
    /// Wraps the provided code. Shape checks live in the validation system.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Borrows the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpeciesCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a validated species pack.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackId(String);

impl PackId {
    /// Wraps the provided identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a single recorded clip.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(String);

impl ClipId {
    /// Wraps the provided identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Campaign level identifier. Level numbering starts at one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelId(u32);

impl LevelId {
    /// Creates a new level identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Identifier of the level that follows this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Unique identifier assigned to a scheduled event within one round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u32);

impl EventId {
    /// Creates a new event identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Stereo channel an event plays through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Panned fully to the left ear.
    Left,
    /// Panned fully to the right ear.
    Right,
}

impl Channel {
    /// Returns the channel on the other side of the head.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
        }
    }
}

/// Kind of vocalization captured by a clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocalizationType {
    /// Learned, usually longer territorial song.
    Song,
    /// Short contact or alarm call.
    Call,
}

/// Practice filter narrowing which vocalizations may be scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocalizationFilter {
    /// Songs only.
    Song,
    /// Calls only.
    Call,
    /// Any vocalization.
    #[default]
    Both,
}

impl VocalizationFilter {
    /// Reports whether clips of the provided type pass the filter.
    #[must_use]
    pub const fn admits(self, vocalization: VocalizationType) -> bool {
        match (self, vocalization) {
            (Self::Both, _) => true,
            (Self::Song, VocalizationType::Song) => true,
            (Self::Call, VocalizationType::Call) => true,
            _ => false,
        }
    }
}

/// Metadata describing one recorded vocalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipMetadata {
    /// Unique clip identifier.
    pub clip_id: ClipId,
    /// Species heard in the clip.
    pub species_code: SpeciesCode,
    /// Human readable species name, when the data file carries one.
    #[serde(default)]
    pub common_name: Option<String>,
    /// Song or call.
    pub vocalization_type: VocalizationType,
    /// Playback length in milliseconds.
    pub duration_ms: u64,
    /// Recording quality from 1 (poor) to 5 (excellent).
    #[serde(default = "default_quality_score")]
    pub quality_score: u8,
    /// Archive the recording was sourced from.
    #[serde(default)]
    pub source: String,
    /// Marks the signature clip used by canonical-only levels.
    #[serde(default)]
    pub canonical: bool,
    /// Rejected clips are kept in the data file but never scheduled.
    #[serde(default)]
    pub rejected: bool,
}

const fn default_quality_score() -> u8 {
    3
}

/// Policy controlling which clips of a species are eligible for a level.
///
/// Serialized as the keyword `"canonical"`, the keyword `"all"`, or a
/// positive integer limiting selection to the first `n` clips.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ClipSelectionRepr", into = "ClipSelectionRepr")]
pub enum ClipSelection {
    /// Only the clip flagged as canonical.
    Canonical,
    /// The first `n` clips in stable order.
    Variations(u32),
    /// Every non-rejected clip.
    #[default]
    All,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ClipSelectionRepr {
    Count(u32),
    Keyword(String),
}

impl TryFrom<ClipSelectionRepr> for ClipSelection {
    type Error = String;

    fn try_from(value: ClipSelectionRepr) -> Result<Self, Self::Error> {
        match value {
            ClipSelectionRepr::Count(count) => Ok(Self::Variations(count)),
            ClipSelectionRepr::Keyword(keyword) => match keyword.as_str() {
                "canonical" => Ok(Self::Canonical),
                "all" => Ok(Self::All),
                other => Err(format!("unknown clip selection `{other}`")),
            },
        }
    }
}

impl From<ClipSelection> for ClipSelectionRepr {
    fn from(value: ClipSelection) -> Self {
        match value {
            ClipSelection::Canonical => Self::Keyword("canonical".to_owned()),
            ClipSelection::All => Self::Keyword("all".to_owned()),
            ClipSelection::Variations(count) => Self::Count(count),
        }
    }
}

/// Coarse spacing of events within a round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventDensity {
    /// Long gaps between events.
    #[default]
    Low,
    /// Moderate gaps.
    Medium,
    /// Short gaps.
    High,
}

/// How channels are assigned to events within a round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    /// Every event plays on one channel chosen once per round.
    #[default]
    Single,
    /// Each event independently plays left or right.
    Offset,
}

/// Declarative shape of a round. Immutable once the round starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Campaign level the configuration belongs to.
    pub level_id: LevelId,
    /// Pack whose species pool feeds the round.
    pub pack_id: PackId,
    /// Round length; `None` marks an open-ended continuous session.
    pub duration_ms: Option<u64>,
    /// Number of distinct species drawn from the pool.
    pub species_count: u32,
    /// Event spacing.
    pub event_density: EventDensity,
    /// Base probability of an overlapping event on the other channel.
    pub overlap_probability: f64,
    /// Half-width of the band around a crossing instant that accepts input.
    pub scoring_window_ms: u64,
    /// Channel assignment policy.
    pub channel_mode: ChannelMode,
    /// Clip eligibility policy.
    #[serde(default)]
    pub clip_selection: ClipSelection,
    /// Restricts the pool to the listed species when present.
    #[serde(default)]
    pub species_filter: Option<Vec<SpeciesCode>>,
    /// Restricts eligible clips by vocalization type.
    #[serde(default)]
    pub vocalization_filter: VocalizationFilter,
}

impl LevelConfig {
    /// Reports whether the round has no fixed end.
    #[must_use]
    pub const fn is_open_ended(&self) -> bool {
        self.duration_ms.is_none()
    }
}

/// Relative likelihood of songs versus calls when both are eligible.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VocalizationWeights {
    /// Weight given to songs.
    pub song: f64,
    /// Weight given to calls.
    pub call: f64,
}

impl Default for VocalizationWeights {
    fn default() -> Self {
        Self {
            song: 0.5,
            call: 0.5,
        }
    }
}

/// Unvalidated pack record as supplied by the pack data collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackDefinition {
    /// Lowercase identifier, e.g. `starter_birds`.
    pub pack_id: String,
    /// Name shown to players.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Species codes making up the pool.
    pub species: Vec<String>,
    /// Subset of `species` shown on the pack card.
    #[serde(default)]
    pub display_species: Option<Vec<String>>,
    /// Multiplier applied to every level's overlap probability.
    #[serde(default = "unit_multiplier")]
    pub overlap_multiplier: f64,
    /// Multiplier dividing every level's inter-event gap.
    #[serde(default = "unit_multiplier")]
    pub tempo_multiplier: f64,
    /// Song versus call weighting.
    #[serde(default)]
    pub vocalization_weights: VocalizationWeights,
    /// Optional seasonal marker such as `spring_migration`.
    #[serde(default)]
    pub seasonal_tag: Option<String>,
}

const fn unit_multiplier() -> f64 {
    1.0
}

/// Validated pack modifiers applied multiplicatively at schedule time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackModifiers {
    /// Multiplier applied to overlap probability.
    pub overlap_multiplier: f64,
    /// Multiplier dividing inter-event gaps.
    pub tempo_multiplier: f64,
    /// Song versus call weighting.
    pub vocalization_weights: VocalizationWeights,
}

impl Default for PackModifiers {
    fn default() -> Self {
        Self {
            overlap_multiplier: 1.0,
            tempo_multiplier: 1.0,
            vocalization_weights: VocalizationWeights::default(),
        }
    }
}

impl PackModifiers {
    /// Scales a base inter-event gap by the pack tempo.
    #[must_use]
    pub fn applied_gap_ms(&self, base_gap_ms: u64) -> u64 {
        if self.tempo_multiplier <= 0.0 {
            return base_gap_ms;
        }
        (base_gap_ms as f64 / self.tempo_multiplier).round() as u64
    }

    /// Scales a base overlap probability, clamped to `[0, 1]`.
    #[must_use]
    pub fn applied_overlap_probability(&self, base: f64) -> f64 {
        let scaled = base * self.overlap_multiplier;
        if scaled.is_nan() {
            return 0.0;
        }
        scaled.clamp(0.0, 1.0)
    }
}

/// One species of a pack together with every usable clip for it.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeciesEntry {
    /// Species code.
    pub code: SpeciesCode,
    /// Name shown to players.
    pub display_name: String,
    /// Non-rejected clips in stable data-file order.
    pub clips: Vec<ClipMetadata>,
}

/// Species pool handed to the scheduler: pack modifiers plus species clips.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpeciesPool {
    /// Pack modifiers applied at schedule time.
    pub modifiers: PackModifiers,
    /// Species entries in pack order.
    pub entries: Vec<SpeciesEntry>,
}

/// Species chosen for the active level with its eligible clips.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeciesSelection {
    /// Species code.
    pub code: SpeciesCode,
    /// Name shown to players.
    pub display_name: String,
    /// Clips eligible after vocalization and clip-selection filtering.
    pub clips: Vec<ClipMetadata>,
}

/// Scored classification of a resolved event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// Correct species and channel inside the tight timing band.
    Perfect,
    /// Correct species and channel inside the scoring window.
    Good,
    /// Correct species on the wrong channel.
    Partial,
    /// Wrong species, or no input before the window closed.
    Miss,
}

impl OutcomeKind {
    /// Reports whether the outcome extends the streak.
    #[must_use]
    pub const fn extends_streak(self) -> bool {
        matches!(self, Self::Perfect | Self::Good)
    }

    /// Reports whether the species was identified correctly.
    #[must_use]
    pub const fn species_correct(self) -> bool {
        !matches!(self, Self::Miss)
    }

    /// Reports whether the channel was identified correctly.
    #[must_use]
    pub const fn channel_correct(self) -> bool {
        matches!(self, Self::Perfect | Self::Good)
    }
}

/// Result of resolving one scheduled event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Event the outcome resolved.
    pub event_id: EventId,
    /// Classification.
    pub kind: OutcomeKind,
    /// Points awarded.
    pub points: u32,
    /// Species the player guessed; `None` when the window closed unanswered.
    pub species_guess: Option<SpeciesCode>,
    /// Milliseconds between clip start and the resolving input, if any.
    pub response_time_ms: Option<u64>,
}

/// One bird-call occurrence scheduled within a round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Identifier unique within the round.
    pub id: EventId,
    /// Species heard.
    pub species_code: SpeciesCode,
    /// Clip to play.
    pub clip: ClipId,
    /// Channel the clip plays through.
    pub channel: Channel,
    /// Playback start relative to round start.
    pub scheduled_time_ms: u64,
    /// Playback length.
    pub duration_ms: u64,
    /// Set exactly once when the event is scored.
    pub resolved: bool,
    /// Outcome recorded at resolution.
    pub outcome: Option<Outcome>,
}

impl ScheduledEvent {
    /// Round-time instant at which the tile aligns with the hit zone.
    #[must_use]
    pub const fn crossing_instant_ms(&self) -> u64 {
        self.scheduled_time_ms + self.duration_ms / 2
    }

    /// Signed distance in milliseconds from the crossing instant to `now_ms`.
    #[must_use]
    pub fn offset_from_crossing(&self, now_ms: u64) -> i64 {
        now_ms as i64 - self.crossing_instant_ms() as i64
    }
}

/// Player input: a species guess on a channel at a round-time instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputAttempt {
    /// Species the player selected.
    pub species_guess: SpeciesCode,
    /// Channel the player selected.
    pub channel: Channel,
    /// Round time of the input.
    pub timestamp_ms: u64,
}

/// One entry of the per-round confusion log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionEntry {
    /// Species that was playing.
    pub expected: SpeciesCode,
    /// Species the player guessed; `None` when unanswered.
    pub guessed: Option<SpeciesCode>,
    /// Channel the expected species played on.
    pub channel: Channel,
}

/// Cumulative counters for one round.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundStats {
    /// Total points.
    pub score: u32,
    /// Number of perfect outcomes.
    pub perfect_count: u32,
    /// Number of good outcomes.
    pub good_count: u32,
    /// Number of partial outcomes.
    pub partial_count: u32,
    /// Number of misses, forced or guessed.
    pub miss_count: u32,
    /// Outcomes with the species identified.
    pub species_correct_count: u32,
    /// Outcomes with the channel identified.
    pub channel_correct_count: u32,
    /// Events resolved so far.
    pub events_scored: u32,
    /// Events scheduled into the round so far.
    pub total_events: u32,
    /// Current streak of perfect or good outcomes.
    pub streak: u32,
    /// Longest streak reached.
    pub max_streak: u32,
    /// Percentage of scored events whose species was identified.
    pub accuracy: f64,
    /// Misses in resolution order.
    pub confusion_log: Vec<ConfusionEntry>,
    /// Response-time samples of answered events.
    pub response_times_ms: Vec<u64>,
    /// Set once the round has ended; sealed stats never change.
    pub sealed: bool,
}

/// Game modes that configure and consume rounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeKind {
    /// Level progression.
    Campaign,
    /// Single-species drills.
    Practice,
    /// Fixed-length seeded challenge.
    Challenge,
    /// Open-ended session.
    Random,
}

/// Lifetime aggregate counters for a level or a pack.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Rounds folded into the aggregate.
    pub rounds_played: u32,
    /// Events resolved across those rounds.
    pub events_scored: u64,
    /// Events with the species identified.
    pub species_correct: u64,
    /// Events with the channel identified.
    pub channel_correct: u64,
    /// Perfect outcomes.
    pub perfect_count: u64,
    /// Sum of round scores.
    pub total_score: u64,
    /// Best round score.
    pub best_score: u32,
}

/// Number of times one species was mistaken for another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCount {
    /// Species that was playing.
    pub expected: SpeciesCode,
    /// Species the player guessed instead.
    pub guessed: SpeciesCode,
    /// Occurrences.
    pub count: u32,
}

/// Lifetime player state, persisted by the storage collaborator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerProgress {
    /// Campaign levels the player may start.
    pub unlocked_levels: Vec<LevelId>,
    /// Packs the player may select.
    pub unlocked_packs: Vec<PackId>,
    /// Aggregates per campaign level.
    pub level_stats: BTreeMap<LevelId, AggregateStats>,
    /// Aggregates per pack.
    pub pack_stats: BTreeMap<PackId, AggregateStats>,
    /// Confusion pair counters.
    pub confusion_counts: Vec<ConfusionCount>,
    /// Best score per mode.
    pub high_scores: BTreeMap<ModeKind, u32>,
    /// Accumulated round time.
    pub total_play_time_ms: u64,
    /// Response-time samples kept for summary views.
    #[serde(default)]
    pub response_times_ms: Vec<u64>,
}

/// Lifecycle phase of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundPhase {
    /// Built but not started.
    Ready,
    /// Clock running.
    Running,
    /// Clock frozen, sweep suspended.
    Paused,
    /// Stats sealed.
    Ended,
}

/// Commands that express all permissible round mutations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Starts the round clock at the provided host instant.
    Start {
        /// Host timestamp at which round time zero begins.
        host_time: Duration,
    },
    /// Advances the round to the provided host instant.
    Tick {
        /// Host timestamp sampled by the update loop.
        host_time: Duration,
    },
    /// Submits a player guess observed at the provided host instant.
    Submit {
        /// Species the player selected.
        species_guess: SpeciesCode,
        /// Channel the player selected.
        channel: Channel,
        /// Host timestamp of the input.
        host_time: Duration,
    },
    /// Freezes the round clock.
    Pause {
        /// Host timestamp of the pause.
        host_time: Duration,
    },
    /// Unfreezes the round clock.
    Resume {
        /// Host timestamp of the resume.
        host_time: Duration,
    },
    /// Cancels the round, sealing whatever was accumulated.
    Quit,
}

/// Events broadcast by the round after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// A tile entered the live event set.
    EventAdmitted {
        /// Snapshot of the admitted event.
        event: ScheduledEvent,
    },
    /// The audio collaborator should start playback.
    ClipCued {
        /// Event being played.
        event_id: EventId,
        /// Clip to play.
        clip: ClipId,
        /// Channel to pan to.
        channel: Channel,
        /// Round-time playback start.
        scheduled_time_ms: u64,
        /// Playback length.
        duration_ms: u64,
    },
    /// An event transitioned to resolved.
    EventResolved {
        /// Outcome of the resolution.
        outcome: Outcome,
        /// Streak after applying the outcome.
        streak: u32,
    },
    /// The clock froze.
    ClockPaused {
        /// Round time at which the clock froze.
        at_ms: u64,
    },
    /// The clock resumed.
    ClockResumed {
        /// Round time at which the clock resumed.
        at_ms: u64,
    },
    /// The round ended and its stats were sealed.
    RoundEnded {
        /// Sealed stats.
        stats: RoundStats,
        /// Whether the round was quit before its natural end.
        cancelled: bool,
    },
}

/// Computes a tile's vertical screen position for the render collaborator.
///
/// Tiles scroll downward and reach `hit_zone_y` at their crossing instant,
/// the midpoint of the clip, not at `scheduled_time_ms`. Scoring measures
/// timing against the same instant, so a tile sitting on the hit zone is
/// exactly when a perfect answer lands. `scroll_speed` is measured in pixels
/// per millisecond.
#[must_use]
pub fn tile_position(
    event: &ScheduledEvent,
    now_ms: u64,
    hit_zone_y: f32,
    scroll_speed: f32,
) -> f32 {
    let remaining = event.crossing_instant_ms() as f64 - now_ms as f64;
    hit_zone_y - (remaining as f32) * scroll_speed
}
