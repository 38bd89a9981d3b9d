use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use chipnotes_core::{
    Command, ConfusionCount, Event, LevelConfig, LevelId, ModeKind, Outcome, PackId, RoundStats,
    SpeciesCode, SpeciesSelection,
};
use chipnotes_round::{apply, query, Round};
use chipnotes_system_modes::{
    record_high_score, Campaign, Challenge, ChallengeSeed, GameMode, ModeResult, Practice,
    RandomSession, SessionStats,
};
use chipnotes_system_scheduling::EventScheduler;
use chipnotes_system_stats::{
    pack_mastery, ranked_confusion_pairs, record_round, summarize_response_times, MasteryLevel,
    ResponseTimeSummary,
};
use chipnotes_system_validation::{require_valid_clips, require_valid_level, PackRegistry};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    autoplayer::AutoPlayer,
    data,
    storage::{ProgressStore, SavedState},
    ModeArg, SimulateArgs,
};

const FRAME_MS: u64 = 16;
const DEFAULT_PROGRESS_FILE: &str = "chipnotes-progress.json";
const TOP_CONFUSIONS: usize = 5;
/// Extra time a timed round may run past its duration before the driver gives up.
const OVERRUN_LIMIT_MS: u64 = 30_000;

/// Mode instance picked on the command line.
#[derive(Debug)]
enum ActiveMode {
    Campaign(Campaign),
    Practice(Practice),
    Challenge(Challenge),
    Random(RandomSession),
}

impl ActiveMode {
    fn as_mode(&mut self) -> &mut dyn GameMode {
        match self {
            Self::Campaign(mode) => mode,
            Self::Practice(mode) => mode,
            Self::Challenge(mode) => mode,
            Self::Random(mode) => mode,
        }
    }

    fn record_outcome(&mut self, outcome: &Outcome) {
        if let Self::Random(session) = self {
            let _ = session.record_event(outcome.kind.species_correct(), outcome.points);
        }
    }

    fn challenge_seed(&self) -> Option<&ChallengeSeed> {
        match self {
            Self::Challenge(challenge) => Some(challenge.seed_source()),
            _ => None,
        }
    }

    fn session(&self) -> Option<&SessionStats> {
        match self {
            Self::Random(session) => Some(session.stats()),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    mode: ModeKind,
    pack: &'a PackId,
    level: LevelId,
    seed: u64,
    challenge_seed: Option<&'a ChallengeSeed>,
    cancelled: bool,
    result: &'a ModeResult,
    stats: &'a RoundStats,
    session: Option<&'a SessionStats>,
    pack_mastery: MasteryLevel,
    top_confusions: Vec<ConfusionCount>,
    response_times: Option<ResponseTimeSummary>,
}

/// Outcome of driving one round to its end.
#[derive(Debug)]
struct Played {
    seed: u64,
    stats: RoundStats,
    cancelled: bool,
    play_time_ms: u64,
}

pub(crate) fn run(args: &SimulateArgs) -> Result<()> {
    let tuning = data::load_tuning(args.tuning.as_deref())?;
    let definition = data::load_pack_definition(&args.pack)?;
    let clips = data::load_clips(&args.clips)?;
    require_valid_clips(&clips).context("clip records are invalid")?;

    let mut registry = PackRegistry::new();
    let pack = registry.load(&definition)?;
    let pool = pack.species_pool(&clips);
    let pack_id = pack.id().clone();

    let store = ProgressStore::new(
        args.progress
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRESS_FILE)),
    );
    let mut saved = store.load()?;
    let mut mode = build_mode(args, &pack_id, &saved)?;

    let Some(config) = mode.as_mode().start() else {
        bail!("{:?} mode cannot start a round", args.mode);
    };
    require_valid_level(&config)?;

    let seed = mode.as_mode().seed().or(args.seed);
    let scheduler = EventScheduler::new(tuning.scheduler.clone());
    let (round, seed, species) = if config.is_open_ended() {
        let stream = scheduler.stream(&config, &pool, seed);
        let seed = stream.seed();
        let species = species_codes(stream.species());
        (Round::continuous(config.clone(), stream, tuning), seed, species)
    } else {
        let plan = scheduler.plan(&config, &pool, seed);
        let species = species_codes(&plan.species);
        (Round::timed(config.clone(), plan.events, tuning), plan.seed, species)
    };
    if species.is_empty() {
        bail!("pack `{pack_id}` has no playable species for this level");
    }

    let player = AutoPlayer::new(
        args.player_seed.unwrap_or_else(|| seed.wrapping_add(1)),
        args.accuracy,
        species,
    );
    let played = play(round, player, &config, &mut mode, args.session_ms, seed)?;

    let result = mode
        .as_mode()
        .complete(&played.stats)
        .context("mode rejected the finished round")?;
    let _ = record_round(
        &mut saved.progress,
        config.level_id,
        &config.pack_id,
        &played.stats,
        played.play_time_ms,
    );
    let _ = record_high_score(&mut saved.progress, result.mode, result.score);
    if let ActiveMode::Campaign(campaign) = &mode {
        let snapshot = campaign.export_progress();
        saved.progress.unlocked_levels = snapshot.unlocked_levels.clone();
        saved.campaign = Some(snapshot);
    }
    store.save(&saved)?;

    let report = Report {
        mode: result.mode,
        pack: &pack_id,
        level: config.level_id,
        seed: played.seed,
        challenge_seed: mode.challenge_seed(),
        cancelled: played.cancelled,
        result: &result,
        stats: &played.stats,
        session: mode.session(),
        pack_mastery: pack_mastery(&saved.progress, &pack_id),
        top_confusions: ranked_confusion_pairs(&saved.progress.confusion_counts)
            .into_iter()
            .take(TOP_CONFUSIONS)
            .collect(),
        response_times: summarize_response_times(&saved.progress.response_times_ms),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to encode report")?
    );
    Ok(())
}

fn build_mode(args: &SimulateArgs, pack_id: &PackId, saved: &SavedState) -> Result<ActiveMode> {
    let best = |kind| saved.progress.high_scores.get(&kind).copied().unwrap_or(0);
    let mode = match args.mode {
        ModeArg::Campaign => {
            let mut campaign = Campaign::new(Campaign::default_levels(pack_id))
                .with_threshold(args.unlock_threshold);
            if let Some(snapshot) = &saved.campaign {
                campaign.import_progress(snapshot);
            }
            if let Some(level) = args.level {
                if !campaign.select_level(LevelId::new(level)) {
                    bail!("campaign level {level} is locked");
                }
            }
            ActiveMode::Campaign(campaign)
        }
        ModeArg::Practice => {
            let species = args
                .species
                .as_deref()
                .context("practice mode needs --species")?;
            let mut practice = Practice::new(pack_id.clone());
            practice.select_species(Some(SpeciesCode::new(species)));
            ActiveMode::Practice(practice)
        }
        ModeArg::Challenge => {
            let seed = match (&args.date, args.seed) {
                (Some(date), _) => ChallengeSeed::Daily(date.clone()),
                (None, Some(seed)) => ChallengeSeed::Explicit(seed),
                (None, None) => bail!("challenge mode needs --date or --seed"),
            };
            ActiveMode::Challenge(
                Challenge::new(pack_id.clone(), args.duration_ms, seed)
                    .with_high_score(best(ModeKind::Challenge)),
            )
        }
        ModeArg::Random => ActiveMode::Random(
            RandomSession::new(pack_id.clone()).with_best_score(best(ModeKind::Random)),
        ),
    };
    Ok(mode)
}

fn species_codes(selection: &[SpeciesSelection]) -> Vec<SpeciesCode> {
    selection.iter().map(|species| species.code.clone()).collect()
}

/// Drives a round frame by frame with the simulated player until it ends.
fn play(
    mut round: Round,
    mut player: AutoPlayer,
    config: &LevelConfig,
    mode: &mut ActiveMode,
    session_ms: u64,
    seed: u64,
) -> Result<Played> {
    let window = config.scoring_window_ms;
    let deadline = config
        .duration_ms
        .map(|duration| duration.saturating_add(OVERRUN_LIMIT_MS));
    let mut events = Vec::new();
    let mut host_ms = 0;
    apply(
        &mut round,
        Command::Start {
            host_time: Duration::ZERO,
        },
        &mut events,
    );

    loop {
        for event in events.drain(..) {
            match event {
                Event::EventAdmitted { event } => player.observe(&event, window),
                Event::EventResolved { outcome, .. } => mode.record_outcome(&outcome),
                Event::RoundEnded { stats, cancelled } => {
                    info!(
                        score = stats.score,
                        accuracy = stats.accuracy,
                        cancelled,
                        "simulation_finished"
                    );
                    return Ok(Played {
                        seed,
                        stats,
                        cancelled,
                        play_time_ms: query::now(&round),
                    });
                }
                Event::ClipCued { .. }
                | Event::ClockPaused { .. }
                | Event::ClockResumed { .. } => {}
            }
        }

        host_ms += FRAME_MS;
        while let Some(answer) = player.next_due(host_ms) {
            apply(
                &mut round,
                Command::Submit {
                    species_guess: answer.species,
                    channel: answer.channel,
                    host_time: Duration::from_millis(answer.at_ms),
                },
                &mut events,
            );
        }

        if config.is_open_ended() && host_ms >= session_ms {
            apply(&mut round, Command::Quit, &mut events);
        } else if deadline.is_some_and(|deadline| host_ms > deadline) {
            warn!(now = query::now(&round), "round_overran_duration");
            apply(&mut round, Command::Quit, &mut events);
        } else {
            apply(
                &mut round,
                Command::Tick {
                    host_time: Duration::from_millis(host_ms),
                },
                &mut events,
            );
        }
    }
}
