//! Data-access seams between the engine and whatever stores the signals.
//!
//! The aggregator only ever reads through [`SignalSource`] and writes rating changes through
//! [`RatingSink`]. [`MemoryStore`] is the in-process implementation used by tests, benches and
//! hosts that keep everything in memory.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::behavior::{BehavioralProfile, BehavioralRiskEstimator, Sanction};
use crate::config::EngineConfig;
use crate::elo::{PlayerRating, RatingStore, RatingUpdate};
use crate::environment::EnvironmentContext;
use crate::error::{PredictionError, Result};
use crate::form::{FormEntry, FormTracker, FormWindow};
use crate::head_to_head::{HeadToHead, HeadToHeadAggregator};
use crate::injury::{InjuryImpactEstimator, InjuryRecord};
use crate::market::{MarketSeries, MarketSnapshot};
use crate::model::{CompletedMatch, Finalize, MatchId, PlayerId, Surface};

/// Read side. Every getter returns `None` (or an empty list) when nothing is stored.
pub trait SignalSource: Send + Sync {
    fn player_exists(&self, player: PlayerId) -> bool;
    fn get_player_rating(&self, player: PlayerId, surface: Option<Surface>) -> Option<PlayerRating>;
    fn get_form_window(&self, player: PlayerId, window_size: usize) -> Option<FormWindow>;
    fn get_head_to_head(&self, a: PlayerId, b: PlayerId) -> Option<HeadToHead>;
    fn get_active_injuries(&self, player: PlayerId) -> Vec<InjuryRecord>;
    fn get_behavioral_profile(&self, player: PlayerId) -> Option<BehavioralProfile>;
    fn get_environment_context(&self, match_id: &str) -> Option<EnvironmentContext>;
    fn get_latest_market_snapshot(&self, match_id: &str) -> Option<MarketSnapshot>;
}

/// Write side: one call per player per completed match.
pub trait RatingSink {
    fn apply_rating_update(
        &self,
        player: PlayerId,
        surface: Option<Surface>,
        delta: f64,
    ) -> Result<()>;
}

impl<T: SignalSource + ?Sized> SignalSource for Arc<T> {
    fn player_exists(&self, player: PlayerId) -> bool {
        (**self).player_exists(player)
    }
    fn get_player_rating(
        &self,
        player: PlayerId,
        surface: Option<Surface>,
    ) -> Option<PlayerRating> {
        (**self).get_player_rating(player, surface)
    }
    fn get_form_window(&self, player: PlayerId, window_size: usize) -> Option<FormWindow> {
        (**self).get_form_window(player, window_size)
    }
    fn get_head_to_head(&self, a: PlayerId, b: PlayerId) -> Option<HeadToHead> {
        (**self).get_head_to_head(a, b)
    }
    fn get_active_injuries(&self, player: PlayerId) -> Vec<InjuryRecord> {
        (**self).get_active_injuries(player)
    }
    fn get_behavioral_profile(&self, player: PlayerId) -> Option<BehavioralProfile> {
        (**self).get_behavioral_profile(player)
    }
    fn get_environment_context(&self, match_id: &str) -> Option<EnvironmentContext> {
        (**self).get_environment_context(match_id)
    }
    fn get_latest_market_snapshot(&self, match_id: &str) -> Option<MarketSnapshot> {
        (**self).get_latest_market_snapshot(match_id)
    }
}

/// Forwards both sides of a settled match to an external sink.
pub fn publish_update(
    sink: &dyn RatingSink,
    update: &RatingUpdate,
    surface: Option<Surface>,
) -> Result<()> {
    sink.apply_rating_update(update.winner, surface, update.winner_delta)?;
    sink.apply_rating_update(update.loser, surface, update.loser_delta)
}

/// Everything in memory. Ratings are safe to update from many threads; the other stores are
/// filled through `&mut self` before predictions run.
#[derive(Debug, Default)]
pub struct MemoryStore {
    players: HashSet<PlayerId>,
    ratings: RatingStore,
    form: FormTracker,
    head_to_head: HeadToHeadAggregator,
    injuries: InjuryImpactEstimator,
    behavior: BehavioralRiskEstimator,
    environment: HashMap<MatchId, EnvironmentContext>,
    markets: HashMap<MatchId, MarketSeries>,
}

impl MemoryStore {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            players: HashSet::new(),
            ratings: RatingStore::new(cfg.elo, cfg.importance.clone()),
            form: FormTracker::new(cfg.form.clone(), cfg.form_window),
            head_to_head: HeadToHeadAggregator::new(cfg.head_to_head.clone()),
            injuries: InjuryImpactEstimator::new(cfg.injury.clone()),
            behavior: BehavioralRiskEstimator::new(cfg.behavior.clone()),
            environment: HashMap::new(),
            markets: HashMap::new(),
        }
    }

    pub fn add_player(&mut self, player: PlayerId) {
        self.players.insert(player);
    }

    pub fn ratings(&self) -> &RatingStore {
        &self.ratings
    }

    pub fn form_mut(&mut self) -> &mut FormTracker {
        &mut self.form
    }

    /// Settles a completed match: ratings, then the head-to-head record.
    pub fn record_completed(&mut self, m: &CompletedMatch) -> Result<RatingUpdate> {
        let update = self.ratings.apply(m)?;
        self.players.insert(m.winner);
        self.players.insert(m.loser);
        self.head_to_head.record(m)?;
        Ok(update)
    }

    pub fn record_form(&mut self, player: PlayerId, entry: FormEntry) {
        self.players.insert(player);
        self.form.record(player, entry);
    }

    pub fn insert_head_to_head(&mut self, record: HeadToHead) {
        self.players.insert(record.player_a_id);
        self.players.insert(record.player_b_id);
        self.head_to_head.insert(record);
    }

    pub fn upsert_injury(&mut self, record: InjuryRecord) -> Result<()> {
        self.players.insert(record.player_id);
        self.injuries.upsert(record)
    }

    pub fn record_sanctions(
        &mut self,
        player: PlayerId,
        period: (DateTime<Utc>, DateTime<Utc>),
        career_years: u32,
        sanctions: Vec<Sanction>,
    ) {
        self.players.insert(player);
        self.behavior.recompute(player, period, career_years, sanctions);
    }

    pub fn set_environment(&mut self, ctx: EnvironmentContext) {
        let ctx = ctx.finalize();
        self.environment.insert(ctx.match_id.clone(), ctx);
    }

    pub fn push_market_snapshot(&mut self, snapshot: MarketSnapshot) -> Result<()> {
        if snapshot.match_id.is_empty() {
            return Err(PredictionError::InvalidRecord("market snapshot without match id".into()));
        }
        self.markets
            .entry(snapshot.match_id.clone())
            .or_insert_with(|| MarketSeries::new(snapshot.match_id.clone()))
            .push(snapshot)
    }

    pub fn market_series(&self, match_id: &str) -> Option<&MarketSeries> {
        self.markets.get(match_id)
    }
}

impl SignalSource for MemoryStore {
    fn player_exists(&self, player: PlayerId) -> bool {
        self.players.contains(&player) || self.ratings.contains(player)
    }

    fn get_player_rating(
        &self,
        player: PlayerId,
        surface: Option<Surface>,
    ) -> Option<PlayerRating> {
        self.ratings
            .contains(player)
            .then(|| self.ratings.rating(player, surface))
    }

    fn get_form_window(&self, player: PlayerId, window_size: usize) -> Option<FormWindow> {
        self.form.window(player, window_size).cloned()
    }

    fn get_head_to_head(&self, a: PlayerId, b: PlayerId) -> Option<HeadToHead> {
        self.head_to_head.get(a, b).cloned()
    }

    fn get_active_injuries(&self, player: PlayerId) -> Vec<InjuryRecord> {
        self.injuries.active(player)
    }

    fn get_behavioral_profile(&self, player: PlayerId) -> Option<BehavioralProfile> {
        self.behavior.latest(player).cloned()
    }

    fn get_environment_context(&self, match_id: &str) -> Option<EnvironmentContext> {
        self.environment.get(match_id).cloned()
    }

    fn get_latest_market_snapshot(&self, match_id: &str) -> Option<MarketSnapshot> {
        self.markets.get(match_id)?.latest().cloned()
    }
}

impl RatingSink for MemoryStore {
    fn apply_rating_update(
        &self,
        player: PlayerId,
        surface: Option<Surface>,
        delta: f64,
    ) -> Result<()> {
        self.ratings.apply_rating_update(player, surface, delta)
    }
}
