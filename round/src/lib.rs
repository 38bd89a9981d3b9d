#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative round state for ChipNotes.
//!
//! A [`Round`] owns the live events, the round clock and the scoreboard.
//! Hosts drive it exclusively through [`apply`] and read it through
//! [`query`]; every mutation is reported as [`Event`]s.

mod clock;

use std::time::Duration;

use chipnotes_core::{
    Channel, Command, EngineTuning, Event, EventId, InputAttempt, LevelConfig, Outcome,
    RoundPhase, ScheduledEvent, SpeciesCode,
};
use chipnotes_system_scheduling::EventStream;
use chipnotes_system_scoring::{Scoreboard, ScoringEngine};
use tracing::{debug, info};

pub use clock::RoundClock;

/// Where a round pulls its events from.
#[derive(Debug)]
enum EventSource {
    /// Every event known up front, admitted when the round starts.
    Timed(Vec<ScheduledEvent>),
    /// Events drawn lazily as round time approaches them.
    Continuous(EventStream),
}

/// One round of play.
#[derive(Debug)]
pub struct Round {
    config: LevelConfig,
    tuning: EngineTuning,
    scoring: ScoringEngine,
    clock: RoundClock,
    phase: RoundPhase,
    source: EventSource,
    live: Vec<ScheduledEvent>,
    last_cued: Option<EventId>,
    scoreboard: Scoreboard,
}

impl Round {
    /// Creates a timed round over a precomputed schedule.
    #[must_use]
    pub fn timed(config: LevelConfig, events: Vec<ScheduledEvent>, tuning: EngineTuning) -> Self {
        Self::with_source(config, EventSource::Timed(events), tuning)
    }

    /// Creates an open-ended round fed by a lazy event stream.
    #[must_use]
    pub fn continuous(config: LevelConfig, stream: EventStream, tuning: EngineTuning) -> Self {
        Self::with_source(config, EventSource::Continuous(stream), tuning)
    }

    fn with_source(config: LevelConfig, source: EventSource, tuning: EngineTuning) -> Self {
        Self {
            scoring: ScoringEngine::new(tuning.scoring.clone()),
            config,
            tuning,
            clock: RoundClock::new(),
            phase: RoundPhase::Ready,
            source,
            live: Vec::new(),
            last_cued: None,
            scoreboard: Scoreboard::new(),
        }
    }

    /// Resolves a player guess at the provided host instant.
    ///
    /// Returns `None` when the round is not running or no event lies within
    /// the scoring window; such attempts change nothing.
    pub fn submit(
        &mut self,
        species_guess: SpeciesCode,
        channel: Channel,
        host_time: Duration,
        out_events: &mut Vec<Event>,
    ) -> Option<Outcome> {
        if self.phase != RoundPhase::Running {
            return None;
        }

        let now = self.advance_to(host_time, out_events);
        let attempt = InputAttempt {
            species_guess,
            channel,
            timestamp_ms: now,
        };
        let outcome = self
            .scoring
            .submit(&attempt, &self.live, self.config.scoring_window_ms);
        if let Some(outcome) = &outcome {
            self.resolve(outcome.clone(), out_events);
        }
        self.end_if_complete(now, out_events);
        outcome
    }

    fn start(&mut self, host_time: Duration, out_events: &mut Vec<Event>) {
        if self.phase != RoundPhase::Ready || !self.clock.start(host_time) {
            return;
        }
        self.phase = RoundPhase::Running;
        info!(
            level = self.config.level_id.get(),
            pack = %self.config.pack_id,
            open_ended = self.config.is_open_ended(),
            "round_started"
        );
        let _ = self.advance_to(host_time, out_events);
    }

    fn tick(&mut self, host_time: Duration, out_events: &mut Vec<Event>) {
        if self.phase != RoundPhase::Running {
            return;
        }
        let now = self.advance_to(host_time, out_events);
        self.end_if_complete(now, out_events);
    }

    fn pause(&mut self, host_time: Duration, out_events: &mut Vec<Event>) {
        if self.phase != RoundPhase::Running || !self.clock.pause(host_time) {
            return;
        }
        self.phase = RoundPhase::Paused;
        out_events.push(Event::ClockPaused {
            at_ms: self.clock.now_ms(),
        });
    }

    fn resume(&mut self, host_time: Duration, out_events: &mut Vec<Event>) {
        if self.phase != RoundPhase::Paused || !self.clock.resume(host_time) {
            return;
        }
        self.phase = RoundPhase::Running;
        out_events.push(Event::ClockResumed {
            at_ms: self.clock.now_ms(),
        });
    }

    /// Moves round time forward and runs the per-tick pipeline: evict,
    /// admit, cue, then sweep expired windows.
    fn advance_to(&mut self, host_time: Duration, out_events: &mut Vec<Event>) -> u64 {
        let now = self.clock.advance(host_time);
        // Resolved events stay live until their clip has been cued.
        let last_cued = self.last_cued;
        self.live.retain(|event| {
            !event.resolved || last_cued.map_or(true, |cued| event.id > cued)
        });
        self.admit(now, out_events);
        self.cue(now, out_events);
        self.sweep(now, out_events);
        now
    }

    fn admit(&mut self, now: u64, out_events: &mut Vec<Event>) {
        let admitted: Vec<ScheduledEvent> = match &mut self.source {
            EventSource::Timed(pending) => std::mem::take(pending),
            EventSource::Continuous(stream) => {
                let horizon = now.saturating_add(self.tuning.scheduler.continuous_horizon_ms);
                let mut admitted = Vec::new();
                while stream.next_time_ms().is_some_and(|time| time <= horizon) {
                    match stream.next() {
                        Some(event) => admitted.push(event),
                        None => break,
                    }
                }
                admitted
            }
        };
        if admitted.is_empty() {
            return;
        }

        self.scoreboard
            .register_events(u32::try_from(admitted.len()).unwrap_or(u32::MAX));
        for event in admitted {
            out_events.push(Event::EventAdmitted {
                event: event.clone(),
            });
            self.live.push(event);
        }
    }

    fn cue(&mut self, now: u64, out_events: &mut Vec<Event>) {
        let lookahead = self.tuning.scheduler.cue_lookahead_ms;
        for event in &self.live {
            if self.last_cued.is_some_and(|cued| event.id <= cued) {
                continue;
            }
            if event.scheduled_time_ms.saturating_sub(lookahead) > now {
                break;
            }
            out_events.push(Event::ClipCued {
                event_id: event.id,
                clip: event.clip.clone(),
                channel: event.channel,
                scheduled_time_ms: event.scheduled_time_ms,
                duration_ms: event.duration_ms,
            });
            self.last_cued = Some(event.id);
        }
    }

    fn sweep(&mut self, now: u64, out_events: &mut Vec<Event>) {
        let expired: Vec<EventId> = self
            .scoring
            .expired(&self.live, now, self.config.scoring_window_ms)
            .collect();
        for event_id in expired {
            let Some(event) = self.live.iter().find(|event| event.id == event_id) else {
                continue;
            };
            let outcome = self.scoring.forced_miss(event);
            self.resolve(outcome, out_events);
        }
    }

    /// Marks the outcome's event resolved and folds it into the scoreboard.
    fn resolve(&mut self, outcome: Outcome, out_events: &mut Vec<Event>) {
        let Some(event) = self
            .live
            .iter_mut()
            .find(|event| event.id == outcome.event_id && !event.resolved)
        else {
            return;
        };
        event.resolved = true;
        event.outcome = Some(outcome.clone());
        let streak = self.scoreboard.record(event, &outcome);
        debug!(
            event = outcome.event_id.get(),
            species = %event.species_code,
            kind = ?outcome.kind,
            points = outcome.points,
            streak,
            "event_resolved"
        );
        out_events.push(Event::EventResolved { outcome, streak });
    }

    fn end_if_complete(&mut self, now: u64, out_events: &mut Vec<Event>) {
        let Some(duration_ms) = self.config.duration_ms else {
            return;
        };
        let drained = matches!(&self.source, EventSource::Timed(pending) if pending.is_empty());
        if now >= duration_ms && drained && self.live.iter().all(|event| event.resolved) {
            self.end(false, out_events);
        }
    }

    fn end(&mut self, cancelled: bool, out_events: &mut Vec<Event>) {
        if self.phase == RoundPhase::Ended {
            return;
        }
        self.clock.stop();
        self.phase = RoundPhase::Ended;
        let discarded = self.live.iter().filter(|event| !event.resolved).count();
        self.live.retain(|event| event.resolved);
        let stats = self.scoreboard.seal().clone();
        info!(
            level = self.config.level_id.get(),
            score = stats.score,
            accuracy = stats.accuracy,
            max_streak = stats.max_streak,
            discarded,
            cancelled,
            "round_ended"
        );
        out_events.push(Event::RoundEnded { stats, cancelled });
    }
}

/// Applies the provided command to the round, mutating state deterministically.
pub fn apply(round: &mut Round, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Start { host_time } => round.start(host_time, out_events),
        Command::Tick { host_time } => round.tick(host_time, out_events),
        Command::Submit {
            species_guess,
            channel,
            host_time,
        } => {
            let _ = round.submit(species_guess, channel, host_time, out_events);
        }
        Command::Pause { host_time } => round.pause(host_time, out_events),
        Command::Resume { host_time } => round.resume(host_time, out_events),
        Command::Quit => round.end(true, out_events),
    }
}

/// Query functions that provide read-only access to the round state.
pub mod query {
    use super::Round;
    use chipnotes_core::{
        tile_position, EventId, LevelConfig, RoundPhase, RoundStats, ScheduledEvent,
    };

    /// Round time in milliseconds; frozen while paused and after the end.
    #[must_use]
    pub fn now(round: &Round) -> u64 {
        round.clock.now_ms()
    }

    /// Lifecycle phase of the round.
    #[must_use]
    pub fn phase(round: &Round) -> RoundPhase {
        round.phase
    }

    /// Level configuration the round plays.
    #[must_use]
    pub fn config(round: &Round) -> &LevelConfig {
        &round.config
    }

    /// Admitted events, including resolved ones until their clip has been cued
    /// and the next tick has evicted them.
    #[must_use]
    pub fn live_events(round: &Round) -> &[ScheduledEvent] {
        &round.live
    }

    /// Statistics accumulated so far.
    #[must_use]
    pub fn stats(round: &Round) -> &RoundStats {
        round.scoreboard.stats()
    }

    /// Screen positions of every unresolved tile at the current round time.
    #[must_use]
    pub fn tile_positions(
        round: &Round,
        hit_zone_y: f32,
        scroll_speed: f32,
    ) -> Vec<(EventId, f32)> {
        let now = now(round);
        round
            .live
            .iter()
            .filter(|event| !event.resolved)
            .map(|event| (event.id, tile_position(event, now, hit_zone_y, scroll_speed)))
            .collect()
    }

    /// Sealed statistics once the round has ended.
    #[must_use]
    pub fn sealed_stats(round: &Round) -> Option<RoundStats> {
        (round.phase == RoundPhase::Ended).then(|| round.scoreboard.stats().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipnotes_core::{
        ChannelMode, ClipId, ClipSelection, EventDensity, LevelId, OutcomeKind, PackId,
        VocalizationFilter,
    };

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn config(duration_ms: u64) -> LevelConfig {
        LevelConfig {
            level_id: LevelId::new(1),
            pack_id: PackId::new("starter_birds"),
            duration_ms: Some(duration_ms),
            species_count: 2,
            event_density: EventDensity::Low,
            overlap_probability: 0.0,
            scoring_window_ms: 2_000,
            channel_mode: ChannelMode::Single,
            clip_selection: ClipSelection::All,
            species_filter: None,
            vocalization_filter: VocalizationFilter::Both,
        }
    }

    fn event(id: u32, species: &str, channel: Channel, scheduled: u64) -> ScheduledEvent {
        ScheduledEvent {
            id: EventId::new(id),
            species_code: SpeciesCode::new(species),
            clip: ClipId::new(format!("{species}_1")),
            channel,
            scheduled_time_ms: scheduled,
            duration_ms: 1_000,
            resolved: false,
            outcome: None,
        }
    }

    fn started(events: Vec<ScheduledEvent>, duration_ms: u64) -> (Round, Vec<Event>) {
        let mut round = Round::timed(config(duration_ms), events, EngineTuning::default());
        let mut out = Vec::new();
        apply(&mut round, Command::Start { host_time: ms(10_000) }, &mut out);
        (round, out)
    }

    #[test]
    fn start_admits_every_timed_event() {
        let (round, out) = started(
            vec![
                event(0, "NOCA", Channel::Left, 4_500),
                event(1, "BLJA", Channel::Left, 9_000),
            ],
            12_000,
        );

        let admitted = out
            .iter()
            .filter(|event| matches!(event, Event::EventAdmitted { .. }))
            .count();
        assert_eq!(admitted, 2);
        assert_eq!(query::phase(&round), RoundPhase::Running);
        assert_eq!(query::stats(&round).total_events, 2);
    }

    #[test]
    fn clips_are_cued_once_ahead_of_playback() {
        let (mut round, _) = started(vec![event(0, "NOCA", Channel::Left, 4_500)], 12_000);

        let mut out = Vec::new();
        apply(&mut round, Command::Tick { host_time: ms(14_200) }, &mut out);
        assert!(out.is_empty());

        apply(&mut round, Command::Tick { host_time: ms(14_250) }, &mut out);
        apply(&mut round, Command::Tick { host_time: ms(14_400) }, &mut out);
        let cues: Vec<&Event> = out
            .iter()
            .filter(|event| matches!(event, Event::ClipCued { .. }))
            .collect();
        assert_eq!(cues.len(), 1);
    }

    #[test]
    fn submit_scores_against_round_time() {
        let (mut round, _) = started(vec![event(0, "NOCA", Channel::Left, 4_500)], 12_000);
        let mut out = Vec::new();

        let outcome = round
            .submit(SpeciesCode::new("NOCA"), Channel::Left, ms(15_000), &mut out)
            .expect("in window");

        assert_eq!(outcome.kind, OutcomeKind::Perfect);
        assert_eq!(query::stats(&round).score, 100);
        assert!(out
            .iter()
            .any(|event| matches!(event, Event::EventResolved { streak: 1, .. })));
    }

    #[test]
    fn unanswered_event_is_swept_exactly_once() {
        let (mut round, _) = started(vec![event(0, "NOCA", Channel::Left, 4_500)], 30_000);
        let mut out = Vec::new();

        apply(&mut round, Command::Tick { host_time: ms(17_000) }, &mut out);
        assert!(out.iter().all(|event| !matches!(event, Event::EventResolved { .. })));

        apply(&mut round, Command::Tick { host_time: ms(17_001) }, &mut out);
        apply(&mut round, Command::Tick { host_time: ms(18_000) }, &mut out);
        apply(&mut round, Command::Tick { host_time: ms(19_000) }, &mut out);

        let resolutions = out
            .iter()
            .filter(|event| matches!(event, Event::EventResolved { .. }))
            .count();
        assert_eq!(resolutions, 1);
        let stats = query::stats(&round);
        assert_eq!(stats.miss_count, 1);
        assert_eq!(stats.score, 0);
        assert_eq!(stats.confusion_log[0].guessed, None);
    }

    #[test]
    fn pause_freezes_clock_and_suspends_sweep() {
        let (mut round, _) = started(vec![event(0, "NOCA", Channel::Left, 4_500)], 30_000);
        let mut out = Vec::new();

        apply(&mut round, Command::Pause { host_time: ms(16_000) }, &mut out);
        apply(&mut round, Command::Tick { host_time: ms(40_000) }, &mut out);
        assert_eq!(query::now(&round), 6_000);
        assert!(round
            .submit(SpeciesCode::new("NOCA"), Channel::Left, ms(40_000), &mut out)
            .is_none());

        apply(&mut round, Command::Resume { host_time: ms(50_000) }, &mut out);
        apply(&mut round, Command::Tick { host_time: ms(50_500) }, &mut out);
        assert_eq!(query::now(&round), 6_500);
        assert_eq!(query::stats(&round).events_scored, 0);
        assert!(matches!(out[0], Event::ClockPaused { at_ms: 6_000 }));
        assert!(out.contains(&Event::ClockResumed { at_ms: 6_000 }));
    }

    #[test]
    fn timed_round_ends_after_duration_with_everything_resolved() {
        let (mut round, _) = started(vec![event(0, "NOCA", Channel::Left, 1_500)], 5_000);
        let mut out = Vec::new();

        apply(&mut round, Command::Tick { host_time: ms(14_999) }, &mut out);
        assert_eq!(query::phase(&round), RoundPhase::Running);

        apply(&mut round, Command::Tick { host_time: ms(15_000) }, &mut out);
        assert_eq!(query::phase(&round), RoundPhase::Ended);
        assert!(matches!(
            out.last(),
            Some(Event::RoundEnded {
                cancelled: false,
                ..
            })
        ));

        apply(&mut round, Command::Tick { host_time: ms(20_000) }, &mut out);
        assert_eq!(query::now(&round), 5_000);
        assert!(query::sealed_stats(&round).is_some_and(|stats| stats.sealed));
    }

    #[test]
    fn quit_seals_without_penalising_unresolved_events() {
        let (mut round, _) = started(
            vec![
                event(0, "NOCA", Channel::Left, 1_500),
                event(1, "BLJA", Channel::Left, 20_000),
            ],
            30_000,
        );
        let mut out = Vec::new();
        let _ = round.submit(SpeciesCode::new("NOCA"), Channel::Left, ms(12_000), &mut out);

        apply(&mut round, Command::Quit, &mut out);
        apply(&mut round, Command::Quit, &mut out);

        let ended: Vec<&Event> = out
            .iter()
            .filter(|event| matches!(event, Event::RoundEnded { .. }))
            .collect();
        assert_eq!(ended.len(), 1);
        let stats = query::stats(&round);
        assert!(stats.sealed);
        assert_eq!(stats.events_scored, 1);
        assert_eq!(stats.miss_count, 0);
        assert!(query::live_events(&round).iter().all(|event| event.resolved));
    }

    #[test]
    fn input_before_start_is_ignored() {
        let mut round = Round::timed(
            config(10_000),
            vec![event(0, "NOCA", Channel::Left, 0)],
            EngineTuning::default(),
        );
        let mut out = Vec::new();
        apply(
            &mut round,
            Command::Submit {
                species_guess: SpeciesCode::new("NOCA"),
                channel: Channel::Left,
                host_time: ms(0),
            },
            &mut out,
        );
        assert!(out.is_empty());
        assert_eq!(query::phase(&round), RoundPhase::Ready);
    }

    fn cued_ids(out: &[Event]) -> Vec<u32> {
        out.iter()
            .filter_map(|event| match event {
                Event::ClipCued { event_id, .. } => Some(event_id.get()),
                _ => None,
            })
            .collect()
    }

    fn resolved_ids(out: &[Event]) -> Vec<u32> {
        out.iter()
            .filter_map(|event| match event {
                Event::EventResolved { outcome, .. } => Some(outcome.event_id.get()),
                _ => None,
            })
            .collect()
    }

    fn submit(
        round: &mut Round,
        species: &str,
        channel: Channel,
        host: u64,
        out: &mut Vec<Event>,
    ) {
        apply(
            round,
            Command::Submit {
                species_guess: SpeciesCode::new(species),
                channel,
                host_time: ms(host),
            },
            out,
        );
    }

    #[test]
    fn event_resolved_before_its_cue_is_still_cued_once() {
        let (mut round, mut out) = started(
            vec![
                event(0, "NOCA", Channel::Left, 5_000),
                event(1, "BLJA", Channel::Right, 5_300),
            ],
            12_000,
        );

        apply(&mut round, Command::Tick { host_time: ms(14_800) }, &mut out);
        submit(&mut round, "NOCA", Channel::Left, 14_850, &mut out);
        submit(&mut round, "AMRO", Channel::Right, 14_900, &mut out);
        assert_eq!(resolved_ids(&out), vec![0, 1]);
        assert_eq!(cued_ids(&out), vec![0]);

        submit(&mut round, "AMRO", Channel::Right, 14_950, &mut out);
        assert_eq!(resolved_ids(&out), vec![0, 1]);

        apply(&mut round, Command::Tick { host_time: ms(15_050) }, &mut out);
        apply(&mut round, Command::Tick { host_time: ms(19_000) }, &mut out);
        apply(&mut round, Command::Tick { host_time: ms(22_000) }, &mut out);
        assert_eq!(cued_ids(&out), vec![0, 1]);
        assert_eq!(query::phase(&round), RoundPhase::Ended);
        assert!(query::live_events(&round).iter().all(|event| event.resolved));
    }

    #[test]
    fn back_to_back_submits_resolve_in_arrival_order() {
        let (mut round, _) = started(
            vec![
                event(0, "NOCA", Channel::Left, 5_000),
                event(1, "BLJA", Channel::Right, 5_200),
            ],
            12_000,
        );
        let mut out = Vec::new();
        apply(&mut round, Command::Tick { host_time: ms(15_000) }, &mut out);

        submit(&mut round, "BLJA", Channel::Right, 15_400, &mut out);
        submit(&mut round, "NOCA", Channel::Left, 15_400, &mut out);

        let resolutions: Vec<(u32, OutcomeKind, u32)> = out
            .iter()
            .filter_map(|event| match event {
                Event::EventResolved { outcome, streak } => {
                    Some((outcome.event_id.get(), outcome.kind, *streak))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            resolutions,
            vec![(1, OutcomeKind::Perfect, 1), (0, OutcomeKind::Perfect, 2)]
        );
        assert_eq!(query::stats(&round).score, 200);
    }

    #[test]
    fn repeated_guess_for_resolved_event_changes_nothing() {
        let (mut round, _) = started(vec![event(0, "NOCA", Channel::Left, 4_500)], 12_000);
        let mut out = Vec::new();

        submit(&mut round, "NOCA", Channel::Left, 15_000, &mut out);
        let before = query::stats(&round).clone();
        assert!(round
            .submit(SpeciesCode::new("NOCA"), Channel::Left, ms(15_100), &mut out)
            .is_none());

        assert_eq!(resolved_ids(&out), vec![0]);
        assert_eq!(query::stats(&round), &before);
        assert_eq!(before.events_scored, 1);
    }

    #[test]
    fn quit_while_paused_seals_without_penalty() {
        let (mut round, _) = started(
            vec![
                event(0, "NOCA", Channel::Left, 1_500),
                event(1, "BLJA", Channel::Left, 20_000),
            ],
            30_000,
        );
        let mut out = Vec::new();
        submit(&mut round, "NOCA", Channel::Left, 12_000, &mut out);
        apply(&mut round, Command::Pause { host_time: ms(13_000) }, &mut out);
        assert_eq!(query::phase(&round), RoundPhase::Paused);

        apply(&mut round, Command::Quit, &mut out);
        apply(&mut round, Command::Resume { host_time: ms(14_000) }, &mut out);
        apply(&mut round, Command::Tick { host_time: ms(60_000) }, &mut out);

        assert_eq!(query::phase(&round), RoundPhase::Ended);
        assert_eq!(query::now(&round), 3_000);
        assert!(matches!(
            out.last(),
            Some(Event::RoundEnded {
                cancelled: true,
                ..
            })
        ));
        let stats = query::sealed_stats(&round).expect("sealed after quit");
        assert_eq!(stats.events_scored, 1);
        assert_eq!(stats.miss_count, 0);
        assert_eq!(stats.score, 100);
    }

    #[test]
    fn tiles_reach_hit_zone_at_crossing() {
        let (mut round, _) = started(vec![event(0, "NOCA", Channel::Left, 4_500)], 12_000);
        let mut out = Vec::new();
        apply(&mut round, Command::Tick { host_time: ms(15_000) }, &mut out);

        let positions = query::tile_positions(&round, 600.0, 0.2);
        assert_eq!(positions, vec![(EventId::new(0), 600.0)]);
    }
}
