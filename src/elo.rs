use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data_source::RatingSink;
use crate::error::{PredictionError, Result};
use crate::logging::DATA_QUALITY_TARGET;
use crate::model::{Category, CompletedMatch, PlayerId, Round, Surface};

pub const DEFAULT_RATING: f64 = 1500.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EloConfig {
    pub k: f64,
    pub initial_rating: f64,
    /// Ratings never drop below this; keeps every rating positive.
    pub min_rating: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        Self {
            k: 32.0,
            initial_rating: DEFAULT_RATING,
            min_rating: 100.0,
        }
    }
}

/// K multipliers. A match's multiplier is `category * round`, so a Grand Slam final
/// (1.25 * 1.20) moves ratings 1.5x as much as a first round at a 250.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceTable {
    pub version: u32,
    pub grand_slam: f64,
    pub masters: f64,
    pub tour_500: f64,
    pub tour_250: f64,
    pub challenger: f64,
    pub other: f64,
    pub qualifying: f64,
    pub early_round: f64,
    pub third_round: f64,
    pub fourth_round: f64,
    pub quarter_final: f64,
    pub semi_final: f64,
    pub final_round: f64,
}

impl Default for ImportanceTable {
    fn default() -> Self {
        Self {
            version: 1,
            grand_slam: 1.25,
            masters: 1.15,
            tour_500: 1.05,
            tour_250: 1.0,
            challenger: 0.9,
            other: 0.8,
            qualifying: 0.9,
            early_round: 1.0,
            third_round: 1.04,
            fourth_round: 1.06,
            quarter_final: 1.1,
            semi_final: 1.15,
            final_round: 1.2,
        }
    }
}

impl ImportanceTable {
    pub fn multiplier(&self, category: Category, round: Round) -> f64 {
        let c = match category {
            Category::GrandSlam => self.grand_slam,
            Category::Masters => self.masters,
            Category::Tour500 => self.tour_500,
            Category::Tour250 => self.tour_250,
            Category::Challenger => self.challenger,
            Category::Other => self.other,
        };
        let r = match round {
            Round::Qualifying => self.qualifying,
            Round::First | Round::Second => self.early_round,
            Round::Third => self.third_round,
            Round::Fourth => self.fourth_round,
            Round::QuarterFinal => self.quarter_final,
            Round::SemiFinal => self.semi_final,
            Round::Final => self.final_round,
        };
        (c * r).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingOrigin {
    Surface,
    /// Surface unknown or never played on; cross-surface rating used instead.
    Global,
    /// Player never rated at all.
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRating {
    pub player_id: PlayerId,
    pub surface: Option<Surface>,
    pub rating: f64,
    pub last_match_at: Option<DateTime<Utc>>,
    pub matches: u32,
    pub origin: RatingOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub winner: PlayerId,
    pub loser: PlayerId,
    pub expected_winner: f64,
    pub k: f64,
    pub winner_delta: f64,
    pub loser_delta: f64,
    pub global_winner_delta: f64,
    pub global_loser_delta: f64,
}

impl RatingUpdate {
    pub fn deltas(&self) -> (f64, f64) {
        (self.winner_delta, self.loser_delta)
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    rating: f64,
    last_match_at: Option<DateTime<Utc>>,
    matches: u32,
}

#[derive(Debug, Default)]
struct PlayerBook {
    global: Option<Entry>,
    by_surface: HashMap<Surface, Entry>,
}

impl PlayerBook {
    fn entry_mut(&mut self, surface: Option<Surface>, initial: f64) -> &mut Entry {
        let fresh = Entry {
            rating: initial,
            last_match_at: None,
            matches: 0,
        };
        match surface {
            Some(s) => {
                // First match on a surface starts from the global rating, not from scratch.
                let seed = self.global.map(|g| g.rating).unwrap_or(initial);
                self.by_surface.entry(s).or_insert(Entry {
                    rating: seed,
                    ..fresh
                })
            }
            None => self.global.get_or_insert(fresh),
        }
    }

    fn current(&self, surface: Option<Surface>) -> Option<(Entry, RatingOrigin)> {
        if let Some(s) = surface
            && let Some(e) = self.by_surface.get(&s)
        {
            return Some((*e, RatingOrigin::Surface));
        }
        self.global.map(|g| (g, RatingOrigin::Global))
    }
}

/// Per-player, per-surface ELO ratings. Each player sits behind its own mutex; updates lock
/// both players in ascending id order so two matches sharing a player serialize while
/// unrelated matches run in parallel.
#[derive(Debug, Default)]
pub struct RatingStore {
    cfg: EloConfig,
    importance: ImportanceTable,
    players: DashMap<PlayerId, Arc<Mutex<PlayerBook>>>,
}

impl RatingStore {
    pub fn new(cfg: EloConfig, importance: ImportanceTable) -> Self {
        Self {
            cfg,
            importance,
            players: DashMap::new(),
        }
    }

    pub fn config(&self) -> EloConfig {
        self.cfg
    }

    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains_key(&player)
    }

    pub fn get_rating(&self, player: PlayerId, surface: Option<Surface>) -> f64 {
        self.rating(player, surface).rating
    }

    /// Lookup by provider surface name; names that do not parse read the global rating.
    pub fn get_rating_named(&self, player: PlayerId, surface: &str) -> f64 {
        self.get_rating(player, Surface::parse(surface))
    }

    pub fn rating(&self, player: PlayerId, surface: Option<Surface>) -> PlayerRating {
        let found = self
            .book(player)
            .and_then(|book| book.lock().current(surface));
        match found {
            Some((e, origin)) => PlayerRating {
                player_id: player,
                surface: if origin == RatingOrigin::Surface { surface } else { None },
                rating: e.rating,
                last_match_at: e.last_match_at,
                matches: e.matches,
                origin,
            },
            None => PlayerRating {
                player_id: player,
                surface: None,
                rating: self.cfg.initial_rating,
                last_match_at: None,
                matches: 0,
                origin: RatingOrigin::Default,
            },
        }
    }

    /// Probability that `a` beats `b` on `surface` according to ratings alone.
    pub fn win_probability(&self, a: PlayerId, b: PlayerId, surface: Option<Surface>) -> f64 {
        expected_score(self.get_rating(a, surface), self.get_rating(b, surface))
    }

    /// Applies a completed match. The read-modify-write of both players happens under their
    /// locks, so the returned deltas are exactly what was written.
    pub fn update(
        &self,
        winner: PlayerId,
        loser: PlayerId,
        surface: Option<Surface>,
        category: Category,
        round: Round,
        played_at: DateTime<Utc>,
    ) -> Result<RatingUpdate> {
        if winner == loser {
            return Err(PredictionError::Identity(format!(
                "player {winner} cannot play against itself"
            )));
        }
        let k = self.cfg.k * self.importance.multiplier(category, round);

        let w_book = self.book_or_insert(winner);
        let l_book = self.book_or_insert(loser);
        let (mut w, mut l) = if winner < loser {
            let w = w_book.lock();
            let l = l_book.lock();
            (w, l)
        } else {
            let l = l_book.lock();
            let w = w_book.lock();
            (w, l)
        };

        // Surface first: a new surface entry is seeded from the pre-match global rating.
        let surface_settled = surface.map(|_| self.settle(&mut w, &mut l, surface, k, played_at));
        let (global_expected, global_delta) = self.settle(&mut w, &mut l, None, k, played_at);
        let (expected_winner, winner_delta) =
            surface_settled.unwrap_or((global_expected, global_delta));

        let update = RatingUpdate {
            winner,
            loser,
            expected_winner,
            k,
            winner_delta,
            loser_delta: -winner_delta,
            global_winner_delta: global_delta,
            global_loser_delta: -global_delta,
        };
        info!(
            winner,
            loser,
            surface = ?surface,
            k,
            delta = winner_delta,
            "rating update applied"
        );
        Ok(update)
    }

    pub fn apply(&self, m: &CompletedMatch) -> Result<RatingUpdate> {
        self.update(m.winner, m.loser, m.surface, m.category, m.round, m.played_at)
    }

    /// Snapshot of every stored rating, for collaborators that persist them.
    pub fn export(&self) -> Vec<PlayerRating> {
        let mut out = Vec::new();
        for item in self.players.iter() {
            let player_id = *item.key();
            let book = item.value().lock();
            if let Some(g) = book.global {
                out.push(PlayerRating {
                    player_id,
                    surface: None,
                    rating: g.rating,
                    last_match_at: g.last_match_at,
                    matches: g.matches,
                    origin: RatingOrigin::Global,
                });
            }
            for (s, e) in &book.by_surface {
                out.push(PlayerRating {
                    player_id,
                    surface: Some(*s),
                    rating: e.rating,
                    last_match_at: e.last_match_at,
                    matches: e.matches,
                    origin: RatingOrigin::Surface,
                });
            }
        }
        out.sort_by(|a, b| a.player_id.cmp(&b.player_id).then(a.surface.cmp(&b.surface)));
        out
    }

    /// Returns (expected score of the winner, winner delta). The loser moves by the negated
    /// delta; the delta is shrunk rather than the loser clamped so the update stays zero-sum.
    fn settle(
        &self,
        w: &mut PlayerBook,
        l: &mut PlayerBook,
        surface: Option<Surface>,
        k: f64,
        played_at: DateTime<Utc>,
    ) -> (f64, f64) {
        let initial = self.cfg.initial_rating;
        let we = w.entry_mut(surface, initial);
        let rw = we.rating;
        let le = l.entry_mut(surface, initial);
        let rl = le.rating;

        let expected = expected_score(rw, rl);
        let mut delta = k * (1.0 - expected);
        let headroom = (rl - self.cfg.min_rating).max(0.0);
        if delta > headroom {
            warn!(
                target: DATA_QUALITY_TARGET,
                rating = rl,
                delta,
                "loser rating at floor, shrinking update"
            );
            delta = headroom;
        }

        le.rating = rl - delta;
        le.last_match_at = Some(played_at);
        le.matches += 1;

        let we = w.entry_mut(surface, initial);
        we.rating = rw + delta;
        we.last_match_at = Some(played_at);
        we.matches += 1;

        (expected, delta)
    }

    fn book(&self, player: PlayerId) -> Option<Arc<Mutex<PlayerBook>>> {
        self.players.get(&player).map(|b| Arc::clone(b.value()))
    }

    fn book_or_insert(&self, player: PlayerId) -> Arc<Mutex<PlayerBook>> {
        // Clone the Arc out so the shard lock is released before the player lock is taken.
        Arc::clone(self.players.entry(player).or_default().value())
    }
}

impl RatingSink for RatingStore {
    fn apply_rating_update(
        &self,
        player: PlayerId,
        surface: Option<Surface>,
        delta: f64,
    ) -> Result<()> {
        if !delta.is_finite() {
            return Err(PredictionError::InvalidRecord(format!(
                "non-finite rating delta for player {player}"
            )));
        }
        let book = self.book_or_insert(player);
        let mut book = book.lock();
        let entry = book.entry_mut(surface, self.cfg.initial_rating);
        let next = entry.rating + delta;
        if next < self.cfg.min_rating {
            warn!(
                target: DATA_QUALITY_TARGET,
                player,
                rating = next,
                "rating below floor, clamped"
            );
        }
        entry.rating = next.max(self.cfg.min_rating);
        Ok(())
    }
}

/// Rebuilds a store from completed matches, oldest first.
pub fn replay_history(
    matches: &[CompletedMatch],
    cfg: EloConfig,
    importance: ImportanceTable,
) -> RatingStore {
    let store = RatingStore::new(cfg, importance);
    let mut ordered: Vec<&CompletedMatch> = matches.iter().collect();
    ordered.sort_by(|a, b| a.played_at.cmp(&b.played_at).then(a.match_id.cmp(&b.match_id)));
    for m in ordered {
        if let Err(err) = store.apply(m) {
            warn!(target: DATA_QUALITY_TARGET, match_id = %m.match_id, %err, "skipping match");
        }
    }
    store
}

pub fn expected_score(r_a: f64, r_b: f64) -> f64 {
    1.0 / (1.0 + 10.0_f64.powf((r_b - r_a) / 400.0))
}
