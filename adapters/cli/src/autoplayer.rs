use std::{cmp::Reverse, collections::BinaryHeap};

use chipnotes_core::{Channel, ScheduledEvent, SpeciesCode};
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Answer the simulated player will give at a round-time instant.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct PlannedAnswer {
    /// Round time of the input.
    pub at_ms: u64,
    /// Species named.
    pub species: SpeciesCode,
    /// Channel named.
    pub channel: Channel,
}

/// Deterministic stand-in for a human player.
///
/// For every admitted event it either answers correctly (with probability
/// `accuracy`), names another species, or lets the window close. Timing
/// scatters around the crossing instant within a third of the scoring window.
#[derive(Debug)]
pub(crate) struct AutoPlayer {
    rng: ChaCha8Rng,
    accuracy: f64,
    channel_slip: f64,
    species: Vec<SpeciesCode>,
    pending: BinaryHeap<Reverse<PlannedAnswer>>,
}

impl AutoPlayer {
    /// Creates a player that knows the round's species.
    pub(crate) fn new(seed: u64, accuracy: f64, species: Vec<SpeciesCode>) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            accuracy: accuracy.clamp(0.0, 1.0),
            channel_slip: 0.1,
            species,
            pending: BinaryHeap::new(),
        }
    }

    /// Decides how to react to a newly admitted event.
    pub(crate) fn observe(&mut self, event: &ScheduledEvent, scoring_window_ms: u64) {
        let roll: f64 = self.rng.gen();
        let reach = i64::try_from(scoring_window_ms / 3).unwrap_or(i64::MAX);
        let jitter = self.rng.gen_range(-reach..=reach);
        let at_ms = event.crossing_instant_ms().saturating_add_signed(jitter);

        let species = if roll < self.accuracy {
            event.species_code.clone()
        } else if roll < self.accuracy + (1.0 - self.accuracy) / 2.0 {
            let others: Vec<&SpeciesCode> = self
                .species
                .iter()
                .filter(|code| **code != event.species_code)
                .collect();
            match others.choose(&mut self.rng) {
                Some(code) => (*code).clone(),
                None => return,
            }
        } else {
            return;
        };

        let channel = if self.rng.gen_bool(self.channel_slip) {
            event.channel.opposite()
        } else {
            event.channel
        };
        self.pending.push(Reverse(PlannedAnswer {
            at_ms,
            species,
            channel,
        }));
    }

    /// Removes and returns the next answer due at or before `now_ms`.
    pub(crate) fn next_due(&mut self, now_ms: u64) -> Option<PlannedAnswer> {
        if self.pending.peek()?.0.at_ms > now_ms {
            return None;
        }
        self.pending.pop().map(|Reverse(answer)| answer)
    }
}
