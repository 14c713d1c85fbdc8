//! Interest filters.

use std::collections::HashMap;

use crate::model::Interest;
use crate::traits::InterestFilter;

/// Rejects lines longer than `max_plies`.
#[derive(Debug, Clone, Copy)]
pub struct MaxPliesFilter {
    max_plies: usize,
}

impl MaxPliesFilter {
    pub fn new(max_plies: usize) -> Self {
        Self { max_plies }
    }
}

impl InterestFilter for MaxPliesFilter {
    fn classify(&self, moves: &[String]) -> Interest {
        if moves.len() <= self.max_plies {
            Interest::Interesting
        } else {
            Interest::NotInteresting
        }
    }
}

/// Classifies lines by how many games reached them.
///
/// Lines without a known game count are undetermined: they stay queued until
/// a count is recorded for them.
#[derive(Debug, Clone, Default)]
pub struct PopularityFilter {
    min_games: u64,
    games: HashMap<String, u64>,
}

impl PopularityFilter {
    pub fn new(min_games: u64) -> Self {
        Self {
            min_games,
            games: HashMap::new(),
        }
    }

    /// Builds a filter from a `line -> games` table, lines being space
    /// separated move tokens.
    pub fn with_counts(min_games: u64, games: HashMap<String, u64>) -> Self {
        Self { min_games, games }
    }

    /// Records how many games reached a line.
    pub fn record(&mut self, moves: &[String], games: u64) {
        self.games.insert(moves.join(" "), games);
    }
}

impl InterestFilter for PopularityFilter {
    fn classify(&self, moves: &[String]) -> Interest {
        let count = self.games.get(&moves.join(" ")).copied();
        Interest::from(count.map(|games| games >= self.min_games))
    }
}
