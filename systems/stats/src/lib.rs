#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Read-only aggregation over lifetime progress and round confusion logs,
//! plus the fold that records a sealed round into lifetime progress.

use std::fmt;

use chipnotes_core::{
    AggregateStats, ConfusionCount, ConfusionEntry, LevelId, PackId, PlayerProgress, RoundStats,
    SpeciesCode,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Most recent response-time samples retained in lifetime progress.
pub const RESPONSE_SAMPLE_CAP: usize = 500;

/// Coarse skill bucket derived from accuracy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MasteryLevel {
    /// Below 50% or nothing played.
    Novice,
    /// At least 50%.
    Beginner,
    /// At least 70%.
    Intermediate,
    /// At least 85%.
    Advanced,
    /// At least 95%.
    Expert,
}

impl MasteryLevel {
    /// Lowest accuracy percentage that reaches this level.
    #[must_use]
    pub const fn threshold(self) -> f64 {
        match self {
            Self::Novice => 0.0,
            Self::Beginner => 50.0,
            Self::Intermediate => 70.0,
            Self::Advanced => 85.0,
            Self::Expert => 95.0,
        }
    }
}

impl fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Novice => "novice",
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
        };
        f.write_str(label)
    }
}

/// Classifies an accuracy percentage.
#[must_use]
pub fn mastery_level(accuracy: f64) -> MasteryLevel {
    [
        MasteryLevel::Expert,
        MasteryLevel::Advanced,
        MasteryLevel::Intermediate,
        MasteryLevel::Beginner,
    ]
    .into_iter()
    .find(|level| accuracy >= level.threshold())
    .unwrap_or(MasteryLevel::Novice)
}

/// Species accuracy of an aggregate, as a percentage.
#[must_use]
pub fn aggregate_accuracy(stats: &AggregateStats) -> f64 {
    if stats.events_scored == 0 {
        return 0.0;
    }
    stats.species_correct as f64 / stats.events_scored as f64 * 100.0
}

/// Species accuracy across every pack ever played.
#[must_use]
pub fn overall_accuracy(progress: &PlayerProgress) -> f64 {
    let total = progress
        .pack_stats
        .values()
        .fold(AggregateStats::default(), |mut total, stats| {
            total.events_scored += stats.events_scored;
            total.species_correct += stats.species_correct;
            total
        });
    aggregate_accuracy(&total)
}

/// Species accuracy for one pack, or `None` if it was never played.
#[must_use]
pub fn pack_accuracy(progress: &PlayerProgress, pack: &PackId) -> Option<f64> {
    progress
        .pack_stats
        .get(pack)
        .filter(|stats| stats.events_scored > 0)
        .map(aggregate_accuracy)
}

/// Mastery of one pack; unplayed packs are novice.
#[must_use]
pub fn pack_mastery(progress: &PlayerProgress, pack: &PackId) -> MasteryLevel {
    pack_accuracy(progress, pack).map_or(MasteryLevel::Novice, mastery_level)
}

/// Counts the wrong guesses of a round's confusion log, ranked.
///
/// Unanswered entries carry no guessed species and are not confusion pairs.
#[must_use]
pub fn confusion_pairs_from_log(log: &[ConfusionEntry]) -> Vec<ConfusionCount> {
    let mut counts = Vec::new();
    for entry in log {
        if let Some(guessed) = &entry.guessed {
            add_confusion(&mut counts, &entry.expected, guessed, 1);
        }
    }
    rank(&mut counts);
    counts
}

/// Merges duplicate pairs and ranks them by count, most frequent first.
/// Equal counts order alphabetically by expected then guessed species.
#[must_use]
pub fn ranked_confusion_pairs(counts: &[ConfusionCount]) -> Vec<ConfusionCount> {
    let mut merged = Vec::new();
    for pair in counts {
        add_confusion(&mut merged, &pair.expected, &pair.guessed, pair.count);
    }
    rank(&mut merged);
    merged
}

fn add_confusion(
    counts: &mut Vec<ConfusionCount>,
    expected: &SpeciesCode,
    guessed: &SpeciesCode,
    count: u32,
) {
    match counts
        .iter_mut()
        .find(|pair| &pair.expected == expected && &pair.guessed == guessed)
    {
        Some(pair) => pair.count = pair.count.saturating_add(count),
        None => counts.push(ConfusionCount {
            expected: expected.clone(),
            guessed: guessed.clone(),
            count,
        }),
    }
}

fn rank(counts: &mut [ConfusionCount]) {
    counts.sort_by(|left, right| {
        right
            .count
            .cmp(&left.count)
            .then_with(|| left.expected.cmp(&right.expected))
            .then_with(|| left.guessed.cmp(&right.guessed))
    });
}

/// Summary of response-time samples in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeSummary {
    /// Number of samples.
    pub count: usize,
    /// Arithmetic mean.
    pub mean_ms: f64,
    /// Median; the mean of the two middle samples for even counts.
    pub median_ms: f64,
    /// Population variance.
    pub variance: f64,
}

/// Summarizes response-time samples, or `None` when there are none.
#[must_use]
pub fn summarize_response_times(samples: &[u64]) -> Option<ResponseTimeSummary> {
    if samples.is_empty() {
        return None;
    }
    let count = samples.len();
    let mean = samples.iter().map(|&sample| sample as f64).sum::<f64>() / count as f64;
    let variance = samples
        .iter()
        .map(|&sample| {
            let delta = sample as f64 - mean;
            delta * delta
        })
        .sum::<f64>()
        / count as f64;

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let middle = count / 2;
    let median = if count % 2 == 0 {
        (sorted[middle - 1] as f64 + sorted[middle] as f64) / 2.0
    } else {
        sorted[middle] as f64
    };

    Some(ResponseTimeSummary {
        count,
        mean_ms: mean,
        median_ms: median,
        variance,
    })
}

/// Folds a sealed round into lifetime progress.
///
/// Returns `false`, leaving progress untouched, when the stats are not sealed.
pub fn record_round(
    progress: &mut PlayerProgress,
    level: LevelId,
    pack: &PackId,
    stats: &RoundStats,
    play_time_ms: u64,
) -> bool {
    if !stats.sealed {
        debug!(level = level.get(), pack = %pack, "unsealed_round_not_recorded");
        return false;
    }

    fold(progress.level_stats.entry(level).or_default(), stats);
    fold(progress.pack_stats.entry(pack.clone()).or_default(), stats);

    for pair in confusion_pairs_from_log(&stats.confusion_log) {
        add_confusion(
            &mut progress.confusion_counts,
            &pair.expected,
            &pair.guessed,
            pair.count,
        );
    }

    progress
        .response_times_ms
        .extend_from_slice(&stats.response_times_ms);
    let excess = progress
        .response_times_ms
        .len()
        .saturating_sub(RESPONSE_SAMPLE_CAP);
    let _ = progress.response_times_ms.drain(..excess);

    progress.total_play_time_ms = progress.total_play_time_ms.saturating_add(play_time_ms);
    debug!(
        level = level.get(),
        pack = %pack,
        score = stats.score,
        events = stats.events_scored,
        "round_recorded"
    );
    true
}

fn fold(aggregate: &mut AggregateStats, stats: &RoundStats) {
    aggregate.rounds_played = aggregate.rounds_played.saturating_add(1);
    aggregate.events_scored += u64::from(stats.events_scored);
    aggregate.species_correct += u64::from(stats.species_correct_count);
    aggregate.channel_correct += u64::from(stats.channel_correct_count);
    aggregate.perfect_count += u64::from(stats.perfect_count);
    aggregate.total_score += u64::from(stats.score);
    aggregate.best_score = aggregate.best_score.max(stats.score);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipnotes_core::Channel;

    fn entry(expected: &str, guessed: Option<&str>) -> ConfusionEntry {
        ConfusionEntry {
            expected: SpeciesCode::new(expected),
            guessed: guessed.map(SpeciesCode::new),
            channel: Channel::Left,
        }
    }

    fn sealed(species_correct: u32, scored: u32, score: u32) -> RoundStats {
        RoundStats {
            score,
            events_scored: scored,
            total_events: scored,
            species_correct_count: species_correct,
            miss_count: scored - species_correct,
            accuracy: f64::from(species_correct) / f64::from(scored) * 100.0,
            confusion_log: vec![entry("NOCA", Some("PYRR")), entry("NOCA", None)],
            response_times_ms: vec![400, 600],
            sealed: true,
            ..RoundStats::default()
        }
    }

    #[test]
    fn mastery_thresholds() {
        assert_eq!(mastery_level(0.0), MasteryLevel::Novice);
        assert_eq!(mastery_level(49.9), MasteryLevel::Novice);
        assert_eq!(mastery_level(50.0), MasteryLevel::Beginner);
        assert_eq!(mastery_level(70.0), MasteryLevel::Intermediate);
        assert_eq!(mastery_level(85.0), MasteryLevel::Advanced);
        assert_eq!(mastery_level(95.0), MasteryLevel::Expert);
        assert_eq!(mastery_level(f64::NAN), MasteryLevel::Novice);
        assert_eq!(MasteryLevel::Advanced.to_string(), "advanced");
    }

    #[test]
    fn confusion_pairs_rank_by_count_then_alphabetically() {
        let log = [
            entry("NOCA", Some("PYRR")),
            entry("BLJA", Some("STJA")),
            entry("NOCA", Some("PYRR")),
            entry("AMRO", Some("WOTH")),
            entry("CARW", None),
        ];

        let ranked = confusion_pairs_from_log(&log);
        let labels: Vec<(String, String, u32)> = ranked
            .into_iter()
            .map(|pair| (pair.expected.to_string(), pair.guessed.to_string(), pair.count))
            .collect();

        assert_eq!(
            labels,
            vec![
                ("NOCA".to_owned(), "PYRR".to_owned(), 2),
                ("AMRO".to_owned(), "WOTH".to_owned(), 1),
                ("BLJA".to_owned(), "STJA".to_owned(), 1),
            ]
        );
    }

    #[test]
    fn ranking_merges_duplicate_pairs() {
        let counts = [
            ConfusionCount {
                expected: SpeciesCode::new("BLJA"),
                guessed: SpeciesCode::new("STJA"),
                count: 1,
            },
            ConfusionCount {
                expected: SpeciesCode::new("BLJA"),
                guessed: SpeciesCode::new("STJA"),
                count: 3,
            },
        ];
        let ranked = ranked_confusion_pairs(&counts);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].count, 4);
    }

    #[test]
    fn response_time_summary() {
        assert!(summarize_response_times(&[]).is_none());

        let summary = summarize_response_times(&[400, 200, 600, 800]).expect("samples");
        assert_eq!(summary.count, 4);
        assert!((summary.mean_ms - 500.0).abs() < 1e-9);
        assert!((summary.median_ms - 500.0).abs() < 1e-9);
        assert!((summary.variance - 50_000.0).abs() < 1e-9);

        let odd = summarize_response_times(&[900, 100, 300]).expect("samples");
        assert!((odd.median_ms - 300.0).abs() < 1e-9);
    }

    #[test]
    fn recording_folds_round_into_progress() {
        let mut progress = PlayerProgress::default();
        let pack = PackId::new("starter_birds");

        assert!(record_round(&mut progress, LevelId::new(1), &pack, &sealed(8, 10, 700), 30_000));
        assert!(record_round(&mut progress, LevelId::new(2), &pack, &sealed(10, 10, 900), 30_000));

        let aggregate = &progress.pack_stats[&pack];
        assert_eq!(aggregate.rounds_played, 2);
        assert_eq!(aggregate.best_score, 900);
        assert_eq!(aggregate.total_score, 1_600);
        assert_eq!(progress.level_stats[&LevelId::new(1)].events_scored, 10);
        assert_eq!(progress.total_play_time_ms, 60_000);
        assert_eq!(progress.confusion_counts.len(), 1);
        assert_eq!(progress.confusion_counts[0].count, 2);
        assert_eq!(progress.response_times_ms.len(), 4);

        let accuracy = pack_accuracy(&progress, &pack).expect("played");
        assert!((accuracy - 90.0).abs() < 1e-9);
        assert!((overall_accuracy(&progress) - 90.0).abs() < 1e-9);
        assert_eq!(pack_mastery(&progress, &pack), MasteryLevel::Advanced);
        assert_eq!(
            pack_mastery(&progress, &PackId::new("sparrows")),
            MasteryLevel::Novice
        );
    }

    #[test]
    fn unsealed_rounds_are_not_recorded() {
        let mut progress = PlayerProgress::default();
        let mut stats = sealed(5, 10, 300);
        stats.sealed = false;

        assert!(!record_round(
            &mut progress,
            LevelId::new(1),
            &PackId::new("sparrows"),
            &stats,
            1_000
        ));
        assert_eq!(progress, PlayerProgress::default());
    }

    #[test]
    fn response_samples_are_capped() {
        let mut progress = PlayerProgress::default();
        let mut stats = sealed(1, 1, 100);
        stats.response_times_ms = (0..400).collect();
        let pack = PackId::new("woodpeckers");

        let _ = record_round(&mut progress, LevelId::new(1), &pack, &stats, 0);
        let _ = record_round(&mut progress, LevelId::new(1), &pack, &stats, 0);

        assert_eq!(progress.response_times_ms.len(), RESPONSE_SAMPLE_CAP);
        assert_eq!(progress.response_times_ms[0], 300);
    }

    #[test]
    fn mastery_serializes_lowercase() {
        let json = serde_json::to_string(&MasteryLevel::Intermediate).expect("serialize");
        assert_eq!(json, "\"intermediate\"");
    }
}
