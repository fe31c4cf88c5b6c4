use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{EngineConfig, WeightTable};
use crate::data_source::SignalSource;
use crate::elo::expected_score;
use crate::environment::EnvironmentContextEstimator;
use crate::error::{PredictionError, Result};
use crate::form::form_index;
use crate::head_to_head::adjustment;
use crate::injury::{InjuryContext, Recommendation, match_risk};
use crate::logging::DATA_QUALITY_TARGET;
use crate::market::{AnomalyTag, MarketSignalAnalyzer};
use crate::model::{Factor, MatchId, MatchRequest, PlayerId, Side, clamp};

const INJURY_CONFIDENCE: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorContribution {
    /// Sub-score centred on 0, in [-1, 1]; positive favours player A.
    pub score: f64,
    /// Share of the composite after renormalization over available signals.
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionFlag {
    MissingSignal { factor: Factor },
    MarketAnomaly { tag: AnomalyTag },
    InvalidMarket,
    EloMarketDisagreement { points: f64 },
    StaleData { threshold_days: i64 },
    HostileEnvironment { side: Side },
    ParticipationRisk { side: Side, recommendation: Recommendation },
    ProbabilityClamped { raw: f64 },
}

/// One prediction. Probabilities are percentages and always sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub match_id: MatchId,
    pub player_a: PlayerId,
    pub player_b: PlayerId,
    pub probability_a: f64,
    pub probability_b: f64,
    pub confidence: u8,
    pub factor_breakdown: BTreeMap<Factor, FactorContribution>,
    pub flags: Vec<PredictionFlag>,
    pub weights_version: u32,
    pub generated_at: DateTime<Utc>,
}

impl PredictionResult {
    pub fn favored(&self) -> Option<PlayerId> {
        if self.probability_a > 50.0 {
            Some(self.player_a)
        } else if self.probability_a < 50.0 {
            Some(self.player_b)
        } else {
            None
        }
    }

    pub fn has_flag(&self, pred: impl Fn(&PredictionFlag) -> bool) -> bool {
        self.flags.iter().any(pred)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy)]
struct Signal {
    factor: Factor,
    score: f64,
    confidence: f64,
    /// Multiplies the table weight; below 1 when the signal is suspect.
    weight_factor: f64,
    observed_at: Option<DateTime<Utc>>,
}

impl Signal {
    fn new(factor: Factor, score: f64, confidence: f64) -> Self {
        Self {
            factor,
            score: clamp(score, -1.0, 1.0),
            confidence,
            weight_factor: 1.0,
            observed_at: None,
        }
    }

    fn observed(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.observed_at = at;
        self
    }
}

#[derive(Default)]
struct Gathered {
    signals: Vec<Signal>,
    flags: Vec<PredictionFlag>,
    anomalies: usize,
    elo_p: Option<f64>,
    market_p: Option<f64>,
}

impl Gathered {
    fn push(&mut self, signal: Option<Signal>, factor: Factor, match_id: &str) {
        match signal {
            Some(s) => self.signals.push(s),
            None => {
                let err = PredictionError::MissingSignal {
                    signal: factor.as_str(),
                    match_id: match_id.to_string(),
                };
                debug!(%err, "signal zero-weighted");
                self.flags.push(PredictionFlag::MissingSignal { factor });
            }
        }
    }
}

/// Combines every estimator into one probability with an explainable confidence.
#[derive(Debug)]
pub struct PredictionAggregator<S> {
    source: S,
    cfg: EngineConfig,
    market: MarketSignalAnalyzer,
    environment: EnvironmentContextEstimator,
}

impl<S: SignalSource> PredictionAggregator<S> {
    pub fn new(source: S, cfg: EngineConfig) -> Self {
        let market = MarketSignalAnalyzer::new(cfg.anomalies.clone());
        Self {
            source,
            cfg,
            market,
            environment: EnvironmentContextEstimator,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn predict(&self, req: &MatchRequest) -> Result<PredictionResult> {
        self.predict_at(req, Utc::now())
    }

    /// Batch form of [`predict`](Self::predict); requests are independent and run on the rayon
    /// pool. Results keep the input order.
    pub fn predict_many(&self, reqs: &[MatchRequest]) -> Vec<Result<PredictionResult>> {
        let now = Utc::now();
        reqs.par_iter().map(|r| self.predict_at(r, now)).collect()
    }

    pub fn predict_at(&self, req: &MatchRequest, now: DateTime<Utc>) -> Result<PredictionResult> {
        self.resolve(req)?;

        let mut g = Gathered::default();
        let elo = self.elo_signal(req, &mut g);
        g.push(Some(elo), Factor::Elo, &req.match_id);
        let h2h = self.h2h_signal(req, now);
        g.push(h2h, Factor::HeadToHead, &req.match_id);
        let form = self.form_signal(req);
        g.push(form, Factor::Form, &req.match_id);
        let injury = self.injury_signal(req, &mut g);
        g.push(Some(injury), Factor::Injury, &req.match_id);
        let market = self.market_signal(req, &mut g);
        g.push(market, Factor::Market, &req.match_id);
        let env = self.environment_signal(req, &mut g);
        g.push(env, Factor::Environment, &req.match_id);

        let mut breakdown = weigh(&g.signals, &self.cfg.weights);
        let composite: f64 = breakdown.values().map(|c| c.contribution).sum();
        let raw = logistic(composite, self.cfg.logistic_scale);
        let p = clamp(raw, self.cfg.probability_floor, self.cfg.probability_ceiling);
        if p != raw {
            let err = PredictionError::OutOfRange {
                what: "probability_a",
                value: raw,
                lo: self.cfg.probability_floor,
                hi: self.cfg.probability_ceiling,
            };
            warn!(
                target: DATA_QUALITY_TARGET,
                match_id = %req.match_id,
                %err,
                "probability clamped"
            );
            g.flags.push(PredictionFlag::ProbabilityClamped { raw });
        }

        let confidence = self.confidence(req, &mut g, &mut breakdown, now);
        let probability_a = p * 100.0;
        debug!(
            match_id = %req.match_id,
            composite,
            probability_a,
            confidence,
            "prediction generated"
        );

        Ok(PredictionResult {
            match_id: req.match_id.clone(),
            player_a: req.player_a,
            player_b: req.player_b,
            probability_a,
            probability_b: 100.0 - probability_a,
            confidence,
            factor_breakdown: breakdown,
            flags: g.flags,
            weights_version: self.cfg.weights.version,
            generated_at: now,
        })
    }

    fn resolve(&self, req: &MatchRequest) -> Result<()> {
        if req.match_id.trim().is_empty() {
            return Err(PredictionError::Identity("empty match id".into()));
        }
        if req.player_a == req.player_b {
            return Err(PredictionError::Identity(format!(
                "match {} has player {} on both sides",
                req.match_id, req.player_a
            )));
        }
        for player in [req.player_a, req.player_b] {
            if !self.source.player_exists(player) {
                return Err(PredictionError::UnknownPlayer(player));
            }
        }
        Ok(())
    }

    fn elo_signal(&self, req: &MatchRequest, g: &mut Gathered) -> Signal {
        let a = self.source.get_player_rating(req.player_a, req.surface);
        let b = self.source.get_player_rating(req.player_b, req.surface);
        let initial = self.cfg.elo.initial_rating;
        let ra = a.as_ref().map(|r| r.rating).unwrap_or(initial);
        let rb = b.as_ref().map(|r| r.rating).unwrap_or(initial);
        let p = expected_score(ra, rb);
        g.elo_p = Some(p);

        let matches_a = a.as_ref().map(|r| r.matches).unwrap_or(0);
        let matches_b = b.as_ref().map(|r| r.matches).unwrap_or(0);
        let matches = matches_a.min(matches_b);
        let confidence = 40.0 + 50.0 * (1.0 - (-(matches as f64) / 10.0).exp());
        let observed = a.and_then(|r| r.last_match_at).max(b.and_then(|r| r.last_match_at));
        debug!(ra, rb, p, "elo signal");
        Signal::new(Factor::Elo, 2.0 * p - 1.0, confidence).observed(observed)
    }

    fn h2h_signal(&self, req: &MatchRequest, now: DateTime<Utc>) -> Option<Signal> {
        let record = self.source.get_head_to_head(req.player_a, req.player_b)?;
        // Walkovers and abandonments alone say nothing about who wins.
        if record.decided_matches() == 0 {
            return None;
        }
        let adj = adjustment(&record, req.player_a, req.surface, now, &self.cfg.head_to_head).ok()?;
        debug!(prob_a = adj.prob_a, confidence = adj.confidence, "head-to-head signal");
        Some(
            Signal::new(Factor::HeadToHead, 2.0 * adj.prob_a - 1.0, adj.confidence)
                .observed(record.last_match_at),
        )
    }

    fn form_signal(&self, req: &MatchRequest) -> Option<Signal> {
        let size = self.cfg.form_window;
        let wa = self.source.get_form_window(req.player_a, size).filter(|w| !w.is_empty())?;
        let wb = self.source.get_form_window(req.player_b, size).filter(|w| !w.is_empty())?;
        let fa = form_index(&wa, &self.cfg.form);
        let fb = form_index(&wb, &self.cfg.form);
        let confidence = 30.0 + 60.0 * wa.fill_ratio().min(wb.fill_ratio());
        debug!(fa, fb, "form signal");
        Some(
            Signal::new(Factor::Form, (fa - fb) / 100.0, confidence)
                .observed(wa.last_match_at.max(wb.last_match_at)),
        )
    }

    fn injury_signal(&self, req: &MatchRequest, g: &mut Gathered) -> Signal {
        let ctx = InjuryContext {
            surface: req.surface,
            expected_duration_min: req.expected_duration_min,
        };
        let mut capability = [0.0; 2];
        for (i, side) in [Side::A, Side::B].into_iter().enumerate() {
            let injuries = self.source.get_active_injuries(req.player(side));
            let risk = match_risk(&injuries, &ctx, &self.cfg.injury);
            if risk.recommendation >= Recommendation::LimitedParticipation {
                g.flags.push(PredictionFlag::ParticipationRisk {
                    side,
                    recommendation: risk.recommendation,
                });
            }
            capability[i] = risk.capability();
        }
        debug!(cap_a = capability[0], cap_b = capability[1], "injury signal");
        Signal::new(Factor::Injury, (capability[0] - capability[1]) / 100.0, INJURY_CONFIDENCE)
    }

    fn market_signal(&self, req: &MatchRequest, g: &mut Gathered) -> Option<Signal> {
        let snapshot = self.source.get_latest_market_snapshot(&req.match_id)?;
        let signal = match self.market.analyze(&snapshot) {
            Ok(s) => s,
            Err(err) => {
                warn!(
                    target: DATA_QUALITY_TARGET,
                    match_id = %req.match_id,
                    %err,
                    "market snapshot ignored"
                );
                g.flags.push(PredictionFlag::InvalidMarket);
                return None;
            }
        };
        let fair_a = signal.probabilities.fair_a;
        g.market_p = Some(fair_a);
        g.anomalies = signal.anomalies.len();
        for tag in &signal.anomalies {
            g.flags.push(PredictionFlag::MarketAnomaly { tag: *tag });
        }
        let mut s = Signal::new(Factor::Market, 2.0 * fair_a - 1.0, signal.confidence)
            .observed(Some(snapshot.timestamp));
        if signal.is_anomalous() {
            s.weight_factor = self.cfg.anomalous_market_weight_factor;
        }
        debug!(fair_a, anomalies = g.anomalies, "market signal");
        Some(s)
    }

    fn environment_signal(&self, req: &MatchRequest, g: &mut Gathered) -> Option<Signal> {
        let ctx = self.source.get_environment_context(&req.match_id)?;
        let assessment = self.environment.assess(&ctx);
        for (side, hostile) in [(Side::A, assessment.hostile_a), (Side::B, assessment.hostile_b)] {
            if hostile {
                g.flags.push(PredictionFlag::HostileEnvironment { side });
            }
        }
        debug!(delta = assessment.net_delta(), "environment signal");
        Some(
            Signal::new(Factor::Environment, assessment.net_delta() / 10.0, assessment.confidence)
                .observed(Some(ctx.recorded_at)),
        )
    }

    fn confidence(
        &self,
        req: &MatchRequest,
        g: &mut Gathered,
        breakdown: &mut BTreeMap<Factor, FactorContribution>,
        now: DateTime<Utc>,
    ) -> u8 {
        let cfg = &self.cfg;
        let mut confidence = g
            .signals
            .iter()
            .map(|s| s.confidence)
            .fold(100.0_f64, f64::min);

        let missing = Factor::WEIGHTED.len() - g.signals.len();
        confidence -= cfg.missing_signal_penalty * missing as f64;

        let multiplier = [req.player_a, req.player_b]
            .into_iter()
            .filter_map(|p| self.source.get_behavioral_profile(p))
            .map(|p| p.risk_multiplier_with(&cfg.behavior))
            .fold(1.0_f64, f64::max);
        confidence *= (1.0 - cfg.behavior_confidence_scale * (multiplier - 1.0)).max(0.0);

        confidence -= cfg.anomaly_confidence_penalty * g.anomalies as f64;

        if let (Some(elo), Some(market)) = (g.elo_p, g.market_p) {
            let points = (elo - market).abs() * 100.0;
            let opposed = (elo - 0.5) * (market - 0.5) < 0.0;
            if opposed && points > cfg.disagreement_threshold_pts {
                confidence = confidence.min(cfg.disagreement_confidence_cap);
                breakdown.insert(
                    Factor::EloMarketDisagreement,
                    FactorContribution {
                        score: elo - market,
                        weight: 0.0,
                        contribution: 0.0,
                    },
                );
                g.flags.push(PredictionFlag::EloMarketDisagreement { points });
            }
        }

        let cutoff = now - Duration::days(cfg.freshness_days);
        let dated: Vec<DateTime<Utc>> = g.signals.iter().filter_map(|s| s.observed_at).collect();
        if !dated.is_empty() && dated.iter().all(|t| *t < cutoff) {
            let err = PredictionError::StaleData {
                threshold_days: cfg.freshness_days,
            };
            warn!(match_id = %req.match_id, %err, "confidence capped");
            confidence = confidence.min(cfg.stale_confidence_cap);
            g.flags.push(PredictionFlag::StaleData {
                threshold_days: cfg.freshness_days,
            });
        }

        clamp(confidence, 0.0, 100.0).round() as u8
    }
}

/// Renormalizes table weights over the signals present and scores each one.
fn weigh(signals: &[Signal], table: &WeightTable) -> BTreeMap<Factor, FactorContribution> {
    let raw: Vec<f64> = signals
        .iter()
        .map(|s| table.weight(s.factor) * s.weight_factor)
        .collect();
    let total: f64 = raw.iter().sum();
    let mut out = BTreeMap::new();
    for (s, w) in signals.iter().zip(raw) {
        let weight = if total > 0.0 { w / total } else { 0.0 };
        out.insert(
            s.factor,
            FactorContribution {
                score: s.score,
                weight,
                contribution: s.score * weight,
            },
        );
    }
    out
}

pub fn logistic(x: f64, scale: f64) -> f64 {
    1.0 / (1.0 + (-scale * x).exp())
}

/// `probability_a` (percent) recomputed from a breakdown's scores and weights.
pub fn probability_from_breakdown(
    breakdown: &BTreeMap<Factor, FactorContribution>,
    cfg: &EngineConfig,
) -> f64 {
    let composite: f64 = breakdown.values().map(|c| c.score * c.weight).sum();
    clamp(
        logistic(composite, cfg.logistic_scale),
        cfg.probability_floor,
        cfg.probability_ceiling,
    ) * 100.0
}

/// Same breakdown under another weight table, for comparing tables on past predictions.
/// The anomalous-market down-weight is not reapplied.
pub fn reweighted_probability(
    breakdown: &BTreeMap<Factor, FactorContribution>,
    table: &WeightTable,
    cfg: &EngineConfig,
) -> f64 {
    let present: Vec<(Factor, f64)> = breakdown
        .iter()
        .filter(|(f, _)| Factor::WEIGHTED.contains(f))
        .map(|(f, c)| (*f, c.score))
        .collect();
    let signals: Vec<Signal> = present
        .into_iter()
        .map(|(f, score)| Signal::new(f, score, 0.0))
        .collect();
    probability_from_breakdown(&weigh(&signals, table), cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{Sanction, SanctionCategory, SanctionKind};
    use crate::data_source::{MemoryStore, RatingSink};
    use crate::head_to_head::HeadToHead;
    use crate::market::MarketSnapshot;
    use crate::model::{Category, Surface};

    fn store_with(ra: f64, rb: f64) -> MemoryStore {
        let mut store = MemoryStore::default();
        store.add_player(1);
        store.add_player(2);
        store.apply_rating_update(1, None, ra - 1500.0).unwrap();
        store.apply_rating_update(2, None, rb - 1500.0).unwrap();
        store
    }

    fn market(odds_a: f64, odds_b: f64) -> MarketSnapshot {
        MarketSnapshot {
            match_id: "m".into(),
            odds_a,
            odds_b,
            odds_a_open: odds_a,
            odds_b_open: odds_b,
            volume: 10_000.0,
            pct_bets_a: 50.0,
            pct_bets_b: 50.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn unknown_and_identical_players_are_identity_errors() {
        let agg = PredictionAggregator::new(store_with(1500.0, 1500.0), EngineConfig::default());
        let err = agg.predict(&MatchRequest::new("m", 1, 9)).unwrap_err();
        assert!(matches!(err, PredictionError::UnknownPlayer(9)));
        assert!(err.is_fatal());
        assert!(matches!(
            agg.predict(&MatchRequest::new("m", 1, 1)),
            Err(PredictionError::Identity(_))
        ));
        assert!(agg.predict(&MatchRequest::new(" ", 1, 2)).is_err());
    }

    #[test]
    fn equal_players_without_signals_are_even() {
        let agg = PredictionAggregator::new(store_with(1500.0, 1500.0), EngineConfig::default());
        let r = agg.predict(&MatchRequest::new("m", 1, 2)).unwrap();
        assert!((r.probability_a - 50.0).abs() < 1e-9);
        assert_eq!(r.probability_a + r.probability_b, 100.0);
        assert_eq!(r.favored(), None);
        let missing = r
            .flags
            .iter()
            .filter(|f| matches!(f, PredictionFlag::MissingSignal { .. }))
            .count();
        assert_eq!(missing, 4);
    }

    #[test]
    fn weights_renormalize_over_present_signals() {
        let agg = PredictionAggregator::new(store_with(1700.0, 1500.0), EngineConfig::default());
        let r = agg.predict(&MatchRequest::new("m", 1, 2)).unwrap();
        let total: f64 = r.factor_breakdown.values().map(|c| c.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((r.factor_breakdown[&Factor::Elo].weight - 0.30 / 0.45).abs() < 1e-12);
        assert!(!r.factor_breakdown.contains_key(&Factor::HeadToHead));
    }

    #[test]
    fn probability_is_bounded() {
        let agg = PredictionAggregator::new(store_with(3000.0, 200.0), EngineConfig::default());
        let r = agg.predict(&MatchRequest::new("m", 1, 2).on(Surface::Hard)).unwrap();
        assert!(r.probability_a <= 90.0 + 1e-9);
        assert!(r.has_flag(|f| matches!(f, PredictionFlag::ProbabilityClamped { .. })));
    }

    #[test]
    fn elo_market_disagreement_caps_confidence() {
        let mut store = store_with(1800.0, 1500.0);
        store.push_market_snapshot(market(3.0, 1.4)).unwrap();
        let agg = PredictionAggregator::new(store, EngineConfig::default());
        let r = agg.predict(&MatchRequest::new("m", 1, 2)).unwrap();
        assert!(r.confidence <= 60);
        assert!(r.factor_breakdown.contains_key(&Factor::EloMarketDisagreement));
        assert!(r.has_flag(|f| matches!(f, PredictionFlag::EloMarketDisagreement { .. })));
    }

    #[test]
    fn gap_in_the_same_direction_is_not_disagreement() {
        let mut store = store_with(1700.0, 1500.0);
        store.push_market_snapshot(market(1.70, 2.25)).unwrap();
        let r = PredictionAggregator::new(store, EngineConfig::default())
            .predict(&MatchRequest::new("m", 1, 2))
            .unwrap();
        assert!(!r.factor_breakdown.contains_key(&Factor::EloMarketDisagreement));
        assert!(!r.has_flag(|f| matches!(f, PredictionFlag::EloMarketDisagreement { .. })));
    }

    #[test]
    fn unfinished_meetings_leave_head_to_head_missing() {
        let engine = PredictionAggregator::new(store_with(1700.0, 1500.0), EngineConfig::default());
        let baseline = engine.predict(&MatchRequest::new("m", 1, 2)).unwrap();

        let mut store = store_with(1700.0, 1500.0);
        let mut h2h = HeadToHead::new(1, 2).unwrap();
        h2h.record_unfinished(Utc::now());
        store.insert_head_to_head(h2h);
        let r = PredictionAggregator::new(store, EngineConfig::default())
            .predict(&MatchRequest::new("m", 1, 2))
            .unwrap();
        assert!(!r.factor_breakdown.contains_key(&Factor::HeadToHead));
        assert!(r.has_flag(|f| matches!(
            f,
            PredictionFlag::MissingSignal { factor: Factor::HeadToHead }
        )));
        assert!((r.probability_a - baseline.probability_a).abs() < 1e-9);
    }

    #[test]
    fn configured_pattern_weights_drive_behaviour_penalty() {
        let now = Utc::now();
        let build = |cfg: EngineConfig| {
            let mut store = store_with(1500.0, 1500.0);
            let sanctions = [5, 10]
                .into_iter()
                .map(|d| Sanction {
                    date: now - Duration::days(d),
                    severity: 3,
                    kind: SanctionKind::Warning,
                    category: SanctionCategory::Verbal,
                    tournament: Some(Category::GrandSlam),
                    under_ranking_pressure: false,
                })
                .collect();
            store.record_sanctions(1, (now - Duration::days(365), now), 4, sanctions);
            PredictionAggregator::new(store, cfg)
                .predict(&MatchRequest::new("m", 1, 2))
                .unwrap()
        };
        let mut stressed = EngineConfig::default();
        stressed.behavior.grand_slam_stress = 0.30;
        let base = build(EngineConfig::default());
        let harsh = build(stressed);
        assert!(harsh.confidence < base.confidence);
        assert_eq!(harsh.probability_a, base.probability_a);
    }

    #[test]
    fn anomalous_market_is_down_weighted() {
        let mut calm = store_with(1500.0, 1500.0);
        calm.push_market_snapshot(market(1.5, 2.6)).unwrap();
        let mut hot = store_with(1500.0, 1500.0);
        let mut snap = market(1.5, 2.6);
        snap.volume = 80_000.0;
        hot.push_market_snapshot(snap).unwrap();

        let calm = PredictionAggregator::new(calm, EngineConfig::default())
            .predict(&MatchRequest::new("m", 1, 2))
            .unwrap();
        let hot = PredictionAggregator::new(hot, EngineConfig::default())
            .predict(&MatchRequest::new("m", 1, 2))
            .unwrap();
        let market_weight = |r: &PredictionResult| r.factor_breakdown[&Factor::Market].weight;
        assert!(market_weight(&hot) < market_weight(&calm));
        assert!(hot.has_flag(|f| matches!(
            f,
            PredictionFlag::MarketAnomaly { tag: AnomalyTag::SuspectVolume }
        )));
        assert!(hot.probability_a < calm.probability_a);
    }

    #[test]
    fn breakdown_reconstructs_probability() {
        let mut store = store_with(1650.0, 1550.0);
        store.push_market_snapshot(market(1.7, 2.2)).unwrap();
        let cfg = EngineConfig::default();
        let agg = PredictionAggregator::new(store, cfg.clone());
        let r = agg.predict(&MatchRequest::new("m", 1, 2)).unwrap();
        let rebuilt = probability_from_breakdown(&r.factor_breakdown, &cfg);
        assert!((rebuilt - r.probability_a).abs() < 1e-9);
        let reweighted = reweighted_probability(&r.factor_breakdown, &cfg.weights, &cfg);
        assert!((reweighted - r.probability_a).abs() < 1e-9);
    }

    #[test]
    fn result_serializes_expected_fields() {
        let agg = PredictionAggregator::new(store_with(1600.0, 1500.0), EngineConfig::default());
        let json = agg.predict(&MatchRequest::new("m", 1, 2)).unwrap().to_json().unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        for key in [
            "probability_a",
            "probability_b",
            "confidence",
            "factor_breakdown",
            "generated_at",
        ] {
            assert!(v.get(key).is_some(), "missing {key}");
        }
        assert!(v["factor_breakdown"].get("elo").is_some());
    }
}
