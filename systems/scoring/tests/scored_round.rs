use chipnotes_core::{
    Channel, ClipId, EventId, InputAttempt, OutcomeKind, ScheduledEvent, ScoringTuning,
    SpeciesCode,
};
use chipnotes_system_scoring::{Scoreboard, ScoringEngine};

const WINDOW_MS: u64 = 1_000;

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

fn attempt(species: &str, channel: Channel, at: u64) -> InputAttempt {
    InputAttempt {
        species_guess: SpeciesCode::new(species),
        channel,
        timestamp_ms: at,
    }
}

/// Plays a scripted round through the engine and scoreboard the way the
/// round loop does: submit, resolve, then sweep expired windows.
#[test]
fn scripted_round_produces_expected_totals() {
    let engine = ScoringEngine::new(ScoringTuning::default());
    let mut events = vec![
        event(0, "NOCA", Channel::Left, 1_000),
        event(1, "BLJA", Channel::Right, 4_000),
        event(2, "AMRO", Channel::Left, 7_000),
        event(3, "CARW", Channel::Right, 10_000),
        event(4, "NOCA", Channel::Right, 13_000),
    ];
    let mut board = Scoreboard::new();
    board.register_events(5);

    let script = [
        attempt("NOCA", Channel::Left, 1_500),
        attempt("BLJA", Channel::Right, 4_900),
        attempt("AMRO", Channel::Right, 7_400),
        attempt("TUTI", Channel::Right, 10_600),
    ];
    let mut streaks = Vec::new();
    for input in &script {
        let outcome = engine
            .submit(input, &events, WINDOW_MS)
            .expect("an event is in the window");
        let index = events
            .iter()
            .position(|event| event.id == outcome.event_id)
            .expect("known event");
        streaks.push(board.record(&events[index], &outcome));
        events[index].resolved = true;
        events[index].outcome = Some(outcome);
    }

    let expired: Vec<EventId> = engine.expired(&events, 15_000, WINDOW_MS).collect();
    assert_eq!(expired, vec![EventId::new(4)]);
    let forced = engine.forced_miss(&events[4]);
    streaks.push(board.record(&events[4], &forced));

    let kinds: Vec<OutcomeKind> = events
        .iter()
        .filter_map(|event| event.outcome.as_ref().map(|outcome| outcome.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            OutcomeKind::Perfect,
            OutcomeKind::Good,
            OutcomeKind::Partial,
            OutcomeKind::Miss
        ]
    );
    assert_eq!(streaks, vec![1, 2, 0, 0, 0]);

    let stats = board.seal().clone();
    let tuning = ScoringTuning::default();
    assert_eq!(
        stats.score,
        tuning.perfect_points + tuning.good_points + tuning.partial_points
    );
    assert_eq!(stats.events_scored, 5);
    assert_eq!(stats.species_correct_count, 3);
    assert_eq!(stats.max_streak, 2);
    assert!((stats.accuracy - 60.0).abs() < 1e-9);
    assert_eq!(stats.confusion_log.len(), 2);
    assert_eq!(
        stats.confusion_log[0].guessed,
        Some(SpeciesCode::new("TUTI"))
    );
    assert_eq!(stats.confusion_log[1].guessed, None);
    assert_eq!(stats.response_times_ms, vec![500, 900, 400, 600]);
}

#[test]
fn attempts_far_from_every_event_change_nothing() {
    let engine = ScoringEngine::new(ScoringTuning::default());
    let events = vec![event(0, "NOCA", Channel::Left, 10_000)];
    assert!(engine
        .submit(&attempt("NOCA", Channel::Left, 1_000), &events, WINDOW_MS)
        .is_none());
    assert_eq!(engine.expired(&events, 11_500, WINDOW_MS).count(), 0);
    assert_eq!(engine.expired(&events, 11_501, WINDOW_MS).count(), 1);
}
