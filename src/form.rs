use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Finalize, PlayerId, clamp};

pub const WINDOW_SIZES: [usize; 4] = [5, 10, 20, 52];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
}

/// How the match went, from the recorded player's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetPattern {
    StraightSets,
    DecidingSet,
    /// Deciding set past the marathon threshold (e.g. 5 sets, or 3h+).
    Marathon,
    /// The recorded player retired during the match.
    Retired,
    /// The recorded player withdrew before it started.
    Withdrew,
}

impl SetPattern {
    fn is_physical_failure(self) -> bool {
        matches!(self, SetPattern::Retired | SetPattern::Withdrew)
    }

    fn is_long(self) -> bool {
        matches!(self, SetPattern::DecidingSet | SetPattern::Marathon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Top10,
    Top50,
    Top100,
    Unranked,
}

impl QualityTier {
    pub fn of(rank: Option<u32>) -> Self {
        match rank {
            Some(r) if r <= 10 => QualityTier::Top10,
            Some(r) if r <= 50 => QualityTier::Top50,
            Some(r) if r <= 100 => QualityTier::Top100,
            _ => QualityTier::Unranked,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormEntry {
    pub opponent_rank: Option<u32>,
    pub player_rank: Option<u32>,
    pub outcome: Outcome,
    pub set_pattern: SetPattern,
    /// Rating change this match produced for the player.
    pub elo_delta: f64,
    pub played_at: DateTime<Utc>,
}

/// Point values and component weights of the form index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormWeights {
    pub recent_ratio: f64,
    pub momentum: f64,
    pub quality: f64,
    pub elo_delta: f64,
    pub physical: f64,
    pub recent_games: usize,
    pub streak_cap: i32,
    pub elo_delta_cap: f64,
    pub top10_win_pts: f64,
    pub top50_win_pts: f64,
    pub top100_win_pts: f64,
    pub upset_caused_pts: f64,
    pub loss_to_lower_pts: f64,
    pub upset_suffered_pts: f64,
    /// Rank places separating an ordinary result from an upset.
    pub upset_rank_gap: u32,
    /// Per-win average that maps to a full quality score.
    pub quality_full_pts: f64,
    pub retirement_pts: f64,
    pub endurance_win_pts: f64,
}

impl Default for FormWeights {
    fn default() -> Self {
        Self {
            recent_ratio: 0.40,
            momentum: 0.20,
            quality: 0.20,
            elo_delta: 0.15,
            physical: 0.05,
            recent_games: 5,
            streak_cap: 20,
            elo_delta_cap: 15.0,
            top10_win_pts: 10.0,
            top50_win_pts: 5.0,
            top100_win_pts: 2.0,
            upset_caused_pts: 8.0,
            loss_to_lower_pts: -3.0,
            upset_suffered_pts: -5.0,
            upset_rank_gap: 20,
            quality_full_pts: 10.0,
            retirement_pts: -5.0,
            endurance_win_pts: 2.0,
        }
    }
}

impl FormWeights {
    /// Quality points one result is worth.
    pub fn quality_points(&self, entry: &FormEntry) -> f64 {
        let (Some(opp), Some(own)) = (entry.opponent_rank, entry.player_rank) else {
            return match entry.outcome {
                Outcome::Win => self.tier_points(QualityTier::of(entry.opponent_rank)),
                Outcome::Loss => 0.0,
            };
        };
        match entry.outcome {
            Outcome::Win => {
                let mut pts = self.tier_points(QualityTier::of(Some(opp)));
                if opp + self.upset_rank_gap <= own {
                    pts += self.upset_caused_pts;
                }
                pts
            }
            Outcome::Loss if opp > own => {
                if opp >= own + self.upset_rank_gap {
                    self.upset_suffered_pts
                } else {
                    self.loss_to_lower_pts
                }
            }
            Outcome::Loss => 0.0,
        }
    }

    fn tier_points(&self, tier: QualityTier) -> f64 {
        match tier {
            QualityTier::Top10 => self.top10_win_pts,
            QualityTier::Top50 => self.top50_win_pts,
            QualityTier::Top100 => self.top100_win_pts,
            QualityTier::Unranked => 0.0,
        }
    }
}

/// FIFO window of a player's most recent results, newest first. Aggregates are derived by
/// `finalize` and are only trustworthy after it ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormWindow {
    pub player_id: PlayerId,
    pub window_size: usize,
    pub entries: VecDeque<FormEntry>,
    pub wins: u32,
    pub losses: u32,
    pub quality_wins_by_tier: BTreeMap<QualityTier, u32>,
    pub quality_points: f64,
    pub streak_current: i32,
    pub streak_longest: u32,
    pub elo_delta: f64,
    pub retirements: u32,
    pub endurance_wins: u32,
    pub last_match_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    weights: FormWeights,
}

impl FormWindow {
    pub fn new(player_id: PlayerId, window_size: usize) -> Self {
        Self::with_weights(player_id, window_size, FormWeights::default())
    }

    pub fn with_weights(player_id: PlayerId, window_size: usize, weights: FormWeights) -> Self {
        Self {
            player_id,
            window_size: window_size.max(1),
            entries: VecDeque::with_capacity(window_size),
            wins: 0,
            losses: 0,
            quality_wins_by_tier: BTreeMap::new(),
            quality_points: 0.0,
            streak_current: 0,
            streak_longest: 0,
            elo_delta: 0.0,
            retirements: 0,
            endurance_wins: 0,
            last_match_at: None,
            weights,
        }
    }

    /// Inserts a result by play date, evicting the oldest when full, and refreshes aggregates.
    /// A late-arriving result older than everything kept in a full window is dropped.
    pub fn push(&mut self, entry: FormEntry) {
        let at = self
            .entries
            .iter()
            .position(|e| e.played_at <= entry.played_at)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, entry);
        self.recompute();
    }

    pub fn games(&self) -> u32 {
        self.wins + self.losses
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Share of the window filled, in [0, 1].
    pub fn fill_ratio(&self) -> f64 {
        self.entries.len() as f64 / self.window_size as f64
    }
}

impl Finalize for FormWindow {
    fn finalize(mut self) -> Self {
        self.recompute();
        self
    }
}

impl FormWindow {
    fn recompute(&mut self) {
        self.entries.truncate(self.window_size);
        let w = &self.weights;

        let mut wins = 0u32;
        let mut losses = 0u32;
        let mut tiers = BTreeMap::new();
        let mut quality = 0.0;
        let mut elo_delta = 0.0;
        let mut retirements = 0u32;
        let mut endurance_wins = 0u32;
        let mut longest = 0u32;
        let mut run = 0u32;

        // Oldest to newest so the running streak ends on the latest match.
        for e in self.entries.iter().rev() {
            quality += w.quality_points(e);
            elo_delta += e.elo_delta;
            if e.set_pattern.is_physical_failure() {
                retirements += 1;
            }
            match e.outcome {
                Outcome::Win => {
                    wins += 1;
                    *tiers.entry(QualityTier::of(e.opponent_rank)).or_insert(0) += 1;
                    if e.set_pattern.is_long() {
                        endurance_wins += 1;
                    }
                    run += 1;
                    longest = longest.max(run);
                }
                Outcome::Loss => {
                    losses += 1;
                    run = 0;
                }
            }
        }

        let streak_current = match self.entries.front().map(|e| e.outcome) {
            Some(first) => {
                let n = self.entries.iter().take_while(|e| e.outcome == first).count() as i32;
                if first == Outcome::Win { n } else { -n }
            }
            None => 0,
        };

        self.wins = wins;
        self.losses = losses;
        self.quality_wins_by_tier = tiers;
        self.quality_points = quality;
        self.streak_current = streak_current;
        self.streak_longest = longest;
        self.elo_delta = elo_delta;
        self.retirements = retirements;
        self.endurance_wins = endurance_wins;
        self.last_match_at = self.entries.front().map(|e| e.played_at);
    }
}

/// Per-component scores, each in [0, 100], before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormComponents {
    pub recent_ratio: f64,
    pub momentum: f64,
    pub quality: f64,
    pub elo_delta: f64,
    pub physical: f64,
}

pub fn form_components(window: &FormWindow, w: &FormWeights) -> FormComponents {
    let recent: Vec<&FormEntry> = window.entries.iter().take(w.recent_games).collect();
    let recent_ratio = if recent.is_empty() {
        50.0
    } else {
        let won = recent.iter().filter(|e| e.outcome == Outcome::Win).count();
        won as f64 / recent.len() as f64 * 100.0
    };

    let cap = w.streak_cap.max(1);
    let streak = window.streak_current.clamp(-cap, cap) as f64;
    let momentum = 50.0 + streak / cap as f64 * 50.0;

    let per_win = window.quality_points / window.wins.max(1) as f64;
    let quality = clamp(per_win / w.quality_full_pts.max(1e-9) * 100.0, 0.0, 100.0);

    let delta_cap = w.elo_delta_cap.max(1e-9);
    let elo_delta = 50.0 + clamp(window.elo_delta, -delta_cap, delta_cap) / delta_cap * 50.0;

    let physical_pts = w.retirement_pts * window.retirements as f64
        + w.endurance_win_pts * window.endurance_wins as f64;
    let physical = clamp(50.0 + physical_pts * 5.0, 0.0, 100.0);

    FormComponents {
        recent_ratio,
        momentum,
        quality,
        elo_delta,
        physical,
    }
}

/// Weighted form index in [0, 100]; an empty window is neutral (50).
pub fn form_index(window: &FormWindow, w: &FormWeights) -> f64 {
    if window.is_empty() {
        return 50.0;
    }
    let c = form_components(window, w);
    let raw = w.recent_ratio * c.recent_ratio
        + w.momentum * c.momentum
        + w.quality * c.quality
        + w.elo_delta * c.elo_delta
        + w.physical * c.physical;
    clamp(raw, 0.0, 100.0)
}

/// Keeps every window size for every player and the players' current ranks.
#[derive(Debug, Clone)]
pub struct FormTracker {
    weights: FormWeights,
    index_window: usize,
    windows: HashMap<PlayerId, Vec<FormWindow>>,
    ranks: HashMap<PlayerId, u32>,
}

impl Default for FormTracker {
    fn default() -> Self {
        Self::new(FormWeights::default(), 20)
    }
}

impl FormTracker {
    pub fn new(weights: FormWeights, index_window: usize) -> Self {
        let index_window = if WINDOW_SIZES.contains(&index_window) {
            index_window
        } else {
            20
        };
        Self {
            weights,
            index_window,
            windows: HashMap::new(),
            ranks: HashMap::new(),
        }
    }

    pub fn set_rank(&mut self, player: PlayerId, rank: u32) {
        self.ranks.insert(player, rank);
    }

    /// Records a result at the current time with the player's known rank. `elo_delta` is the
    /// player's rating change from the same match, as returned by the rating store.
    pub fn record_result(
        &mut self,
        player: PlayerId,
        opponent_rank: Option<u32>,
        outcome: Outcome,
        set_pattern: SetPattern,
        elo_delta: f64,
    ) {
        let entry = FormEntry {
            opponent_rank,
            player_rank: self.ranks.get(&player).copied(),
            outcome,
            set_pattern,
            elo_delta,
            played_at: Utc::now(),
        };
        self.record(player, entry);
    }

    pub fn record(&mut self, player: PlayerId, entry: FormEntry) {
        let weights = self.weights.clone();
        let windows = self.windows.entry(player).or_insert_with(|| {
            WINDOW_SIZES
                .iter()
                .map(|n| FormWindow::with_weights(player, *n, weights.clone()))
                .collect()
        });
        for window in windows.iter_mut() {
            window.push(entry.clone());
        }
        debug!(player, outcome = ?entry.outcome, "form result recorded");
    }

    pub fn window(&self, player: PlayerId, size: usize) -> Option<&FormWindow> {
        self.windows
            .get(&player)?
            .iter()
            .find(|w| w.window_size == size)
    }

    pub fn form_index(&self, player: PlayerId) -> f64 {
        self.window(player, self.index_window)
            .map(|w| form_index(w, &self.weights))
            .unwrap_or(50.0)
    }
}
