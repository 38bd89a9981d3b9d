#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Scoring system that matches player input against live events and keeps
//! the per-round tally.

use std::cmp::Ordering;

use chipnotes_core::{
    ConfusionEntry, EventId, InputAttempt, Outcome, OutcomeKind, RoundStats, ScheduledEvent,
    ScoringTuning,
};
use tracing::{debug, trace};

/// Pure system that classifies attempts and expirations into outcomes.
#[derive(Clone, Debug, Default)]
pub struct ScoringEngine {
    tuning: ScoringTuning,
}

impl ScoringEngine {
    /// Creates a scoring engine using the provided tuning.
    #[must_use]
    pub fn new(tuning: ScoringTuning) -> Self {
        Self { tuning }
    }

    /// Tuning the engine was built with.
    #[must_use]
    pub fn tuning(&self) -> &ScoringTuning {
        &self.tuning
    }

    /// Resolves an attempt against the live events.
    ///
    /// Only unresolved events whose crossing instant lies within
    /// `scoring_window_ms` of the attempt are candidates. Events of the
    /// guessed species take precedence; otherwise the nearest candidate is
    /// charged with a miss. Returns `None` when no event is in the window, in
    /// which case the attempt has no effect.
    #[must_use]
    pub fn submit(
        &self,
        attempt: &InputAttempt,
        events: &[ScheduledEvent],
        scoring_window_ms: u64,
    ) -> Option<Outcome> {
        let in_window = || {
            events.iter().filter(move |event| {
                !event.resolved
                    && event.offset_from_crossing(attempt.timestamp_ms).unsigned_abs()
                        <= scoring_window_ms
            })
        };

        let matched = in_window()
            .filter(|event| event.species_code == attempt.species_guess)
            .min_by(|left, right| compare_candidates(left, right, attempt));

        let (event, kind) = match matched {
            Some(event) => (event, self.classify(event, attempt, scoring_window_ms)),
            None => {
                let nearest =
                    in_window().min_by(|left, right| compare_candidates(left, right, attempt));
                let Some(event) = nearest else {
                    trace!(
                        guess = %attempt.species_guess,
                        at = attempt.timestamp_ms,
                        "attempt_ignored"
                    );
                    return None;
                };
                (event, OutcomeKind::Miss)
            }
        };

        Some(Outcome {
            event_id: event.id,
            kind,
            points: self.tuning.points_for(kind),
            species_guess: Some(attempt.species_guess.clone()),
            response_time_ms: Some(attempt.timestamp_ms.saturating_sub(event.scheduled_time_ms)),
        })
    }

    /// Classifies an attempt already known to name the event's species.
    #[must_use]
    pub fn classify(
        &self,
        event: &ScheduledEvent,
        attempt: &InputAttempt,
        scoring_window_ms: u64,
    ) -> OutcomeKind {
        if attempt.channel != event.channel {
            return OutcomeKind::Partial;
        }
        let distance = event.offset_from_crossing(attempt.timestamp_ms).unsigned_abs();
        if distance <= self.tuning.perfect_band_ms(scoring_window_ms) {
            OutcomeKind::Perfect
        } else {
            OutcomeKind::Good
        }
    }

    /// Identifiers of unresolved events whose window closed before `now_ms`.
    pub fn expired<'a>(
        &self,
        events: &'a [ScheduledEvent],
        now_ms: u64,
        scoring_window_ms: u64,
    ) -> impl Iterator<Item = EventId> + 'a {
        events
            .iter()
            .filter(move |event| {
                !event.resolved
                    && now_ms > event.crossing_instant_ms().saturating_add(scoring_window_ms)
            })
            .map(|event| event.id)
    }

    /// Outcome for an event whose window closed without an answer.
    #[must_use]
    pub fn forced_miss(&self, event: &ScheduledEvent) -> Outcome {
        Outcome {
            event_id: event.id,
            kind: OutcomeKind::Miss,
            points: self.tuning.points_for(OutcomeKind::Miss),
            species_guess: None,
            response_time_ms: None,
        }
    }
}

/// Orders candidates by distance to the attempt, then by channel agreement,
/// then by schedule, so ties resolve identically on every run.
fn compare_candidates(
    left: &ScheduledEvent,
    right: &ScheduledEvent,
    attempt: &InputAttempt,
) -> Ordering {
    let distance = |event: &ScheduledEvent| {
        event
            .offset_from_crossing(attempt.timestamp_ms)
            .unsigned_abs()
    };
    let channel_mismatch = |event: &ScheduledEvent| event.channel != attempt.channel;
    distance(left)
        .cmp(&distance(right))
        .then_with(|| channel_mismatch(left).cmp(&channel_mismatch(right)))
        .then_with(|| left.scheduled_time_ms.cmp(&right.scheduled_time_ms))
        .then_with(|| left.id.cmp(&right.id))
}

/// Incrementally maintained statistics for one round.
#[derive(Clone, Debug, Default)]
pub struct Scoreboard {
    stats: RoundStats,
}

impl Scoreboard {
    /// Creates an empty scoreboard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts events that entered the round.
    pub fn register_events(&mut self, count: u32) {
        if self.stats.sealed {
            return;
        }
        self.stats.total_events = self.stats.total_events.saturating_add(count);
    }

    /// Applies an outcome for the provided event and returns the new streak.
    ///
    /// Sealed scoreboards ignore further outcomes.
    pub fn record(&mut self, event: &ScheduledEvent, outcome: &Outcome) -> u32 {
        let stats = &mut self.stats;
        if stats.sealed || stats.events_scored >= stats.total_events {
            debug!(event = event.id.get(), "outcome_dropped");
            return stats.streak;
        }

        stats.events_scored += 1;
        stats.score = stats.score.saturating_add(outcome.points);
        match outcome.kind {
            OutcomeKind::Perfect => stats.perfect_count += 1,
            OutcomeKind::Good => stats.good_count += 1,
            OutcomeKind::Partial => stats.partial_count += 1,
            OutcomeKind::Miss => stats.miss_count += 1,
        }
        if outcome.kind.species_correct() {
            stats.species_correct_count += 1;
        }
        if outcome.kind.channel_correct() {
            stats.channel_correct_count += 1;
        }

        if outcome.kind.extends_streak() {
            stats.streak += 1;
            stats.max_streak = stats.max_streak.max(stats.streak);
        } else {
            stats.streak = 0;
        }

        if outcome.kind == OutcomeKind::Miss {
            stats.confusion_log.push(ConfusionEntry {
                expected: event.species_code.clone(),
                guessed: outcome.species_guess.clone(),
                channel: event.channel,
            });
        }
        if let Some(response) = outcome.response_time_ms {
            stats.response_times_ms.push(response);
        }

        stats.accuracy = accuracy(stats.species_correct_count, stats.events_scored);
        stats.streak
    }

    /// Seals the statistics; later outcomes are ignored.
    pub fn seal(&mut self) -> &RoundStats {
        self.stats.sealed = true;
        &self.stats
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> &RoundStats {
        &self.stats
    }

    /// Consumes the scoreboard, yielding its statistics.
    #[must_use]
    pub fn into_stats(self) -> RoundStats {
        self.stats
    }
}

/// Percentage of `correct` over `scored`, zero when nothing was scored.
#[must_use]
pub fn accuracy(correct: u32, scored: u32) -> f64 {
    if scored == 0 {
        return 0.0;
    }
    f64::from(correct) / f64::from(scored) * 100.0
}
