use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PredictionError, Result};
use crate::form::Outcome;
use crate::logging::DATA_QUALITY_TARGET;
use crate::model::{Category, CompletedMatch, Finalize, PlayerId, Surface, clamp};

pub const RECENT_FORM_LEN: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct H2hWeights {
    pub global: f64,
    pub surface: f64,
    pub recent: f64,
    pub streak: f64,
    pub recent_games: usize,
    /// Score points per match of streak differential (score is in [-100, 100]).
    pub streak_pts_per_match: f64,
    pub probability_floor: f64,
    pub probability_ceiling: f64,
    pub sample_max_pts: f64,
    /// Matches at which the sample term reaches ~63% of its maximum.
    pub sample_scale: f64,
    pub recency_bonus_pts: f64,
    pub recency_days: i64,
    pub reliability_max_pts: f64,
    pub surface_variety_pts: f64,
    pub surface_variety_max: usize,
}

impl Default for H2hWeights {
    fn default() -> Self {
        Self {
            global: 0.30,
            surface: 0.25,
            recent: 0.25,
            streak: 0.20,
            recent_games: 5,
            streak_pts_per_match: 20.0,
            probability_floor: 0.10,
            probability_ceiling: 0.90,
            sample_max_pts: 40.0,
            sample_scale: 5.0,
            recency_bonus_pts: 20.0,
            recency_days: 365,
            reliability_max_pts: 30.0,
            surface_variety_pts: 5.0,
            surface_variety_max: 3,
        }
    }
}

/// Pairwise record. Ids are stored in ascending order, so (a, b) and (b, a) share one record;
/// use [`HeadToHead::oriented`] to read it from a given player's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadToHead {
    pub player_a_id: PlayerId,
    pub player_b_id: PlayerId,
    pub wins_a: u32,
    pub wins_b: u32,
    /// Meetings without a winner on record (abandoned, no result).
    pub unfinished: u32,
    pub by_surface: BTreeMap<Surface, (u32, u32)>,
    pub by_category: BTreeMap<Category, (u32, u32)>,
    /// From player A's side, newest first, at most ten.
    pub recent_form_a: VecDeque<Outcome>,
    /// Play dates of `recent_form_a`, same order.
    #[serde(default)]
    pub recent_played_at: VecDeque<DateTime<Utc>>,
    pub streak_a: u32,
    pub streak_b: u32,
    pub last_match_at: Option<DateTime<Utc>>,
    /// Source reliability in [0, 1].
    pub reliability: f64,
}

impl HeadToHead {
    pub fn new(a: PlayerId, b: PlayerId) -> Result<Self> {
        if a == b {
            return Err(PredictionError::InvalidRecord(format!(
                "head-to-head needs two distinct players, got {a} twice"
            )));
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        Ok(Self {
            player_a_id: lo,
            player_b_id: hi,
            wins_a: 0,
            wins_b: 0,
            unfinished: 0,
            by_surface: BTreeMap::new(),
            by_category: BTreeMap::new(),
            recent_form_a: VecDeque::with_capacity(RECENT_FORM_LEN),
            recent_played_at: VecDeque::with_capacity(RECENT_FORM_LEN),
            streak_a: 0,
            streak_b: 0,
            last_match_at: None,
            reliability: 1.0,
        })
    }

    pub fn key(a: PlayerId, b: PlayerId) -> (PlayerId, PlayerId) {
        if a < b { (a, b) } else { (b, a) }
    }

    pub fn total_matches(&self) -> u32 {
        self.wins_a + self.wins_b + self.unfinished
    }

    /// Meetings that produced a winner.
    pub fn decided_matches(&self) -> u32 {
        self.wins_a + self.wins_b
    }

    pub fn involves(&self, player: PlayerId) -> bool {
        self.player_a_id == player || self.player_b_id == player
    }

    pub fn record_match(
        &mut self,
        winner: PlayerId,
        surface: Option<Surface>,
        category: Category,
        played_at: DateTime<Utc>,
    ) -> Result<()> {
        let a_won = if winner == self.player_a_id {
            true
        } else if winner == self.player_b_id {
            false
        } else {
            return Err(PredictionError::InvalidRecord(format!(
                "player {winner} is not part of head-to-head {}-{}",
                self.player_a_id, self.player_b_id
            )));
        };

        let bump = |pair: &mut (u32, u32)| {
            if a_won {
                pair.0 += 1;
            } else {
                pair.1 += 1;
            }
        };
        if a_won {
            self.wins_a += 1;
        } else {
            self.wins_b += 1;
        }
        if let Some(s) = surface {
            bump(self.by_surface.entry(s).or_default());
        }
        bump(self.by_category.entry(category).or_default());
        self.insert_recent(if a_won { Outcome::Win } else { Outcome::Loss }, played_at);
        self.touch(played_at);
        self.refresh();
        Ok(())
    }

    pub fn record_unfinished(&mut self, played_at: DateTime<Utc>) {
        self.unfinished += 1;
        self.touch(played_at);
    }

    /// The same record seen from `player`'s side: `player_a_id == player` afterwards.
    pub fn oriented(&self, player: PlayerId) -> Result<Self> {
        if player == self.player_a_id {
            return Ok(self.clone());
        }
        if player != self.player_b_id {
            return Err(PredictionError::Identity(format!(
                "player {player} is not part of head-to-head {}-{}",
                self.player_a_id, self.player_b_id
            )));
        }
        Ok(Self {
            player_a_id: self.player_b_id,
            player_b_id: self.player_a_id,
            wins_a: self.wins_b,
            wins_b: self.wins_a,
            unfinished: self.unfinished,
            by_surface: flip_pairs(&self.by_surface),
            by_category: flip_pairs(&self.by_category),
            recent_form_a: self
                .recent_form_a
                .iter()
                .map(|o| match o {
                    Outcome::Win => Outcome::Loss,
                    Outcome::Loss => Outcome::Win,
                })
                .collect(),
            recent_played_at: self.recent_played_at.clone(),
            streak_a: self.streak_b,
            streak_b: self.streak_a,
            last_match_at: self.last_match_at,
            reliability: self.reliability,
        })
    }

    /// Keeps `recent_form_a` newest first by play date, whatever the arrival order.
    fn insert_recent(&mut self, outcome: Outcome, played_at: DateTime<Utc>) {
        if self.recent_played_at.len() != self.recent_form_a.len() {
            // Dates missing from an older serialized record.
            self.recent_played_at.clear();
            self.recent_form_a.push_front(outcome);
            return;
        }
        let at = self
            .recent_played_at
            .iter()
            .position(|t| *t <= played_at)
            .unwrap_or(self.recent_played_at.len());
        self.recent_form_a.insert(at, outcome);
        self.recent_played_at.insert(at, played_at);
    }

    fn touch(&mut self, played_at: DateTime<Utc>) {
        self.last_match_at = Some(match self.last_match_at {
            Some(prev) if prev > played_at => prev,
            _ => played_at,
        });
    }

    fn refresh(&mut self) {
        self.recent_form_a.truncate(RECENT_FORM_LEN);
        self.recent_played_at.truncate(RECENT_FORM_LEN);
        let lead = self.recent_form_a.front().copied();
        let run = self
            .recent_form_a
            .iter()
            .take_while(|o| Some(**o) == lead)
            .count() as u32;
        (self.streak_a, self.streak_b) = match lead {
            Some(Outcome::Win) => (run, 0),
            Some(Outcome::Loss) => (0, run),
            None => (0, 0),
        };
        self.reliability = clamp(self.reliability, 0.0, 1.0);
    }
}

impl Finalize for HeadToHead {
    fn finalize(mut self) -> Self {
        self.refresh();
        self
    }
}

fn flip_pairs<K: Ord + Copy>(m: &BTreeMap<K, (u32, u32)>) -> BTreeMap<K, (u32, u32)> {
    m.iter().map(|(k, (a, b))| (*k, (*b, *a))).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct H2hComponents {
    pub global: f64,
    pub surface: f64,
    pub recent: f64,
    pub streak: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct H2hAdjustment {
    pub favored: Option<PlayerId>,
    pub prob_a: f64,
    pub confidence: f64,
    /// Weighted score in [-100, 100] before the probability mapping.
    pub score: f64,
    pub components: H2hComponents,
}

/// Blends the record into a bounded probability for `a`. The record may be stored either way
/// round.
pub fn adjustment(
    record: &HeadToHead,
    a: PlayerId,
    surface: Option<Surface>,
    now: DateTime<Utc>,
    w: &H2hWeights,
) -> Result<H2hAdjustment> {
    let r = record.oriented(a)?;

    let global = ratio_score(r.wins_a, r.wins_b);
    let surface_score = surface
        .and_then(|s| r.by_surface.get(&s))
        .map(|(wa, wb)| ratio_score(*wa, *wb))
        .unwrap_or(0.0);

    let recent: Vec<Outcome> = r.recent_form_a.iter().take(w.recent_games).copied().collect();
    let recent_score = if recent.is_empty() {
        0.0
    } else {
        let center = recent.len() as f64 / 2.0;
        let won = recent.iter().filter(|o| **o == Outcome::Win).count() as f64;
        (won - center) / center * 100.0
    };

    let streak_diff = r.streak_a as f64 - r.streak_b as f64;
    let streak_score = clamp(streak_diff * w.streak_pts_per_match, -100.0, 100.0);

    let score = w.global * global + w.surface * surface_score + w.recent * recent_score
        + w.streak * streak_score;
    let prob_a = clamp(0.5 + score / 200.0, w.probability_floor, w.probability_ceiling);

    let favored = if prob_a > 0.5 {
        Some(r.player_a_id)
    } else if prob_a < 0.5 {
        Some(r.player_b_id)
    } else {
        None
    };

    Ok(H2hAdjustment {
        favored,
        prob_a,
        confidence: confidence(&r, now, w),
        score,
        components: H2hComponents {
            global,
            surface: surface_score,
            recent: recent_score,
            streak: streak_score,
        },
    })
}

/// Sample size, recency, source reliability and surface variety, capped at 100.
pub fn confidence(record: &HeadToHead, now: DateTime<Utc>, w: &H2hWeights) -> f64 {
    let n = record.total_matches() as f64;
    let sample = w.sample_max_pts * (1.0 - (-n / w.sample_scale.max(1e-9)).exp());

    let recency = match record.last_match_at {
        Some(at) if now - at <= Duration::days(w.recency_days) => w.recency_bonus_pts,
        _ => 0.0,
    };

    let reliability = clamp(record.reliability, 0.0, 1.0) * w.reliability_max_pts;

    let surfaces = record
        .by_surface
        .values()
        .filter(|(a, b)| a + b > 0)
        .count()
        .min(w.surface_variety_max);
    let variety = surfaces as f64 * w.surface_variety_pts;

    clamp(sample + recency + reliability + variety, 0.0, 100.0)
}

fn ratio_score(wins: u32, losses: u32) -> f64 {
    let total = wins + losses;
    if total == 0 {
        return 0.0;
    }
    (wins as f64 / total as f64 - 0.5) * 200.0
}

/// All pairwise records, keyed by normalized id pair.
#[derive(Debug, Clone, Default)]
pub struct HeadToHeadAggregator {
    weights: H2hWeights,
    records: HashMap<(PlayerId, PlayerId), HeadToHead>,
}

impl HeadToHeadAggregator {
    pub fn new(weights: H2hWeights) -> Self {
        Self {
            weights,
            records: HashMap::new(),
        }
    }

    /// Adds one result. Rows naming the same player on both sides are rejected instead of
    /// being counted for both.
    pub fn record(&mut self, m: &CompletedMatch) -> Result<()> {
        if m.winner == m.loser {
            warn!(
                target: DATA_QUALITY_TARGET,
                match_id = %m.match_id,
                player = m.winner,
                "rejecting head-to-head row with identical players"
            );
            return Err(PredictionError::InvalidRecord(format!(
                "match {} lists player {} on both sides",
                m.match_id, m.winner
            )));
        }
        let key = HeadToHead::key(m.winner, m.loser);
        let record = match self.records.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(HeadToHead::new(key.0, key.1)?),
        };
        record.record_match(m.winner, m.surface, m.category, m.played_at)
    }

    /// Loads many rows, skipping malformed ones. Returns how many were accepted.
    pub fn ingest(&mut self, rows: &[CompletedMatch]) -> usize {
        rows.iter().filter(|m| self.record(m).is_ok()).count()
    }

    pub fn insert(&mut self, record: HeadToHead) {
        let key = (record.player_a_id, record.player_b_id);
        self.records.insert(key, record.finalize());
    }

    pub fn get(&self, a: PlayerId, b: PlayerId) -> Option<&HeadToHead> {
        self.records.get(&HeadToHead::key(a, b))
    }

    /// `None` when the two players never finished a match against each other.
    pub fn predict_adjustment(
        &self,
        a: PlayerId,
        b: PlayerId,
        surface: Option<Surface>,
        now: DateTime<Utc>,
    ) -> Option<H2hAdjustment> {
        let record = self.get(a, b)?;
        if record.decided_matches() == 0 {
            return None;
        }
        adjustment(record, a, surface, now, &self.weights).ok()
    }
}
