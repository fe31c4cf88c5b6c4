use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PredictionError, Result};
use crate::logging::DATA_QUALITY_TARGET;
use crate::model::MatchId;

/// Bookmaker snapshot; decimal odds, volume in stake currency, bet shares in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub match_id: MatchId,
    pub odds_a: f64,
    pub odds_b: f64,
    pub odds_a_open: f64,
    pub odds_b_open: f64,
    pub volume: f64,
    pub pct_bets_a: f64,
    pub pct_bets_b: f64,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn validate(&self) -> Result<()> {
        for (what, odds) in [
            ("odds_a", self.odds_a),
            ("odds_b", self.odds_b),
            ("odds_a_open", self.odds_a_open),
            ("odds_b_open", self.odds_b_open),
        ] {
            if !odds.is_finite() || odds <= 1.0 {
                return Err(PredictionError::InvalidRecord(format!(
                    "{} {what} = {odds} must be above 1.0",
                    self.match_id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpliedProbabilities {
    /// Raw `1/odds`, before removing the margin.
    pub p_a: f64,
    pub p_b: f64,
    /// Overround: sum of implied probabilities minus one.
    pub margin: f64,
    pub fair_a: f64,
    pub fair_b: f64,
}

pub fn implied_probabilities(snapshot: &MarketSnapshot) -> Result<ImpliedProbabilities> {
    snapshot.validate()?;
    let p_a = 1.0 / snapshot.odds_a;
    let p_b = 1.0 / snapshot.odds_b;
    let book = p_a + p_b;
    Ok(ImpliedProbabilities {
        p_a,
        p_b,
        margin: book - 1.0,
        fair_a: p_a / book,
        fair_b: p_b / book,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyTag {
    ExtremeMove,
    SuspectVolume,
    LopsidedPublic,
    ThinMargin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    /// Relative change of either side's odds against the opening line.
    pub extreme_move: f64,
    pub suspect_volume: f64,
    pub lopsided_public_pct: f64,
    pub thin_margin: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            extreme_move: 0.30,
            suspect_volume: 50_000.0,
            lopsided_public_pct: 90.0,
            thin_margin: 0.02,
        }
    }
}

fn relative_move(now: f64, open: f64) -> f64 {
    ((now - open) / open).abs()
}

/// Advisory flags; an empty set means nothing unusual.
pub fn detect_anomalies(snapshot: &MarketSnapshot, th: &AnomalyThresholds) -> BTreeSet<AnomalyTag> {
    let mut tags = BTreeSet::new();
    if relative_move(snapshot.odds_a, snapshot.odds_a_open) > th.extreme_move
        || relative_move(snapshot.odds_b, snapshot.odds_b_open) > th.extreme_move
    {
        tags.insert(AnomalyTag::ExtremeMove);
    }
    if snapshot.volume > th.suspect_volume {
        tags.insert(AnomalyTag::SuspectVolume);
    }
    if snapshot.pct_bets_a > th.lopsided_public_pct
        || snapshot.pct_bets_b > th.lopsided_public_pct
    {
        tags.insert(AnomalyTag::LopsidedPublic);
    }
    if let Ok(p) = implied_probabilities(snapshot)
        && p.margin < th.thin_margin
    {
        tags.insert(AnomalyTag::ThinMargin);
    }
    tags
}

/// Time-ordered, append-only snapshots for one match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSeries {
    pub match_id: MatchId,
    snapshots: Vec<MarketSnapshot>,
}

impl MarketSeries {
    pub fn new(match_id: impl Into<MatchId>) -> Self {
        Self {
            match_id: match_id.into(),
            snapshots: Vec::new(),
        }
    }

    pub fn push(&mut self, snapshot: MarketSnapshot) -> Result<()> {
        if snapshot.match_id != self.match_id {
            return Err(PredictionError::InvalidRecord(format!(
                "snapshot for {} pushed to series {}",
                snapshot.match_id, self.match_id
            )));
        }
        snapshot.validate()?;
        if let Some(last) = self.snapshots.last()
            && snapshot.timestamp < last.timestamp
        {
            warn!(
                target: DATA_QUALITY_TARGET,
                match_id = %self.match_id,
                "out-of-order market snapshot rejected"
            );
            return Err(PredictionError::InvalidRecord(format!(
                "snapshot at {} predates {}",
                snapshot.timestamp, last.timestamp
            )));
        }
        self.snapshots.push(snapshot);
        Ok(())
    }

    pub fn latest(&self) -> Option<&MarketSnapshot> {
        self.snapshots.last()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Change of A's fair probability from the first to the latest snapshot.
    pub fn drift(&self) -> Option<f64> {
        let first = implied_probabilities(self.snapshots.first()?).ok()?;
        let last = implied_probabilities(self.latest()?).ok()?;
        Some(last.fair_a - first.fair_a)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSignal {
    pub probabilities: ImpliedProbabilities,
    pub anomalies: BTreeSet<AnomalyTag>,
    pub confidence: f64,
}

impl MarketSignal {
    pub fn is_anomalous(&self) -> bool {
        !self.anomalies.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarketSignalAnalyzer {
    pub thresholds: AnomalyThresholds,
}

impl MarketSignalAnalyzer {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn implied_probabilities(&self, snapshot: &MarketSnapshot) -> Result<ImpliedProbabilities> {
        implied_probabilities(snapshot)
    }

    pub fn detect_anomalies(&self, snapshot: &MarketSnapshot) -> BTreeSet<AnomalyTag> {
        detect_anomalies(snapshot, &self.thresholds)
    }

    /// Confidence grows with traded volume, from 40 to 80.
    pub fn analyze(&self, snapshot: &MarketSnapshot) -> Result<MarketSignal> {
        let probabilities = implied_probabilities(snapshot)?;
        Ok(MarketSignal {
            probabilities,
            anomalies: self.detect_anomalies(snapshot),
            confidence: 40.0 + 40.0 * (snapshot.volume / 20_000.0).clamp(0.0, 1.0),
        })
    }
}
