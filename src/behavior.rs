use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::logging::DATA_QUALITY_TARGET;
use crate::model::{Category, Finalize, PlayerId, clamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanctionKind {
    Warning,
    PointPenalty,
    GamePenalty,
    Fine,
    Default,
    Suspension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanctionCategory {
    Verbal,
    RacketAbuse,
    TimeViolation,
    Coaching,
    Unsportsmanlike,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sanction {
    pub date: DateTime<Utc>,
    /// 1 to 10.
    pub severity: u8,
    pub kind: SanctionKind,
    pub category: SanctionCategory,
    pub tournament: Option<Category>,
    /// The player was defending points or fighting for a ranking cut-off.
    pub under_ranking_pressure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorPattern {
    GrandSlamStress,
    RankingPressure,
    VeteranCalm,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedPattern {
    pub pattern: BehaviorPattern,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorWeights {
    pub fair_play_per_severity: f64,
    /// Fraction of the fair-play penalty forgiven when recent sanctions are milder.
    pub trend_relief: f64,
    pub count_cap: u32,
    pub severity_divisor: f64,
    pub recidivism_pts: f64,
    pub recent_window_days: i64,
    pub recent_share: f64,
    pub recent_pts: f64,
    pub grand_slam_stress: f64,
    pub ranking_pressure: f64,
    pub veteran_calm: f64,
    pub pattern_threshold: f64,
    pub min_sanctions_for_pattern: usize,
    pub veteran_years: u32,
}

impl Default for BehaviorWeights {
    fn default() -> Self {
        Self {
            fair_play_per_severity: 0.15,
            trend_relief: 0.20,
            count_cap: 5,
            severity_divisor: 2.0,
            recidivism_pts: 2.0,
            recent_window_days: 30,
            recent_share: 0.60,
            recent_pts: 2.0,
            grand_slam_stress: 0.05,
            ranking_pressure: 0.03,
            veteran_calm: -0.02,
            pattern_threshold: 0.5,
            min_sanctions_for_pattern: 2,
            veteran_years: 10,
        }
    }
}

impl BehaviorWeights {
    pub fn pattern_adjustment(&self, pattern: BehaviorPattern) -> f64 {
        match pattern {
            BehaviorPattern::GrandSlamStress => self.grand_slam_stress,
            BehaviorPattern::RankingPressure => self.ranking_pressure,
            BehaviorPattern::VeteranCalm => self.veteran_calm,
        }
    }
}

/// Disciplinary summary over one rolling period. Derived fields are set by `finalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralProfile {
    pub player_id: PlayerId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub career_years: u32,
    pub sanctions: Vec<Sanction>,
    pub sanction_count: u32,
    pub severity_avg: f64,
    pub fair_play_score: f64,
    pub risk_factor: f64,
    pub recidivism: u32,
    pub trend_improving: bool,
    pub detected_pattern: Option<DetectedPattern>,
    #[serde(skip)]
    weights: BehaviorWeights,
}

impl BehavioralProfile {
    pub fn new(
        player_id: PlayerId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        career_years: u32,
        sanctions: Vec<Sanction>,
    ) -> Self {
        Self::with_weights(
            player_id,
            period_start,
            period_end,
            career_years,
            sanctions,
            BehaviorWeights::default(),
        )
    }

    pub fn with_weights(
        player_id: PlayerId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        career_years: u32,
        sanctions: Vec<Sanction>,
        weights: BehaviorWeights,
    ) -> Self {
        Self {
            player_id,
            period_start,
            period_end,
            career_years,
            sanctions,
            sanction_count: 0,
            severity_avg: 0.0,
            fair_play_score: 10.0,
            risk_factor: 1.0,
            recidivism: 0,
            trend_improving: false,
            detected_pattern: None,
            weights,
        }
        .finalize()
    }

    /// Variance multiplier applied to prediction uncertainty, never below 1.0.
    pub fn risk_multiplier(&self) -> f64 {
        self.risk_multiplier_with(&self.weights)
    }

    /// Same multiplier under caller-supplied pattern weights. The profile's own weights are not
    /// serialized, so readers holding a deserialized profile should pass theirs.
    pub fn risk_multiplier_with(&self, w: &BehaviorWeights) -> f64 {
        let pattern = self
            .detected_pattern
            .map(|p| w.pattern_adjustment(p.pattern))
            .unwrap_or(0.0);
        (1.0 + self.risk_factor / 100.0 + pattern).max(1.0)
    }

    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.period_start <= at && at <= self.period_end
    }
}

impl Finalize for BehavioralProfile {
    fn finalize(mut self) -> Self {
        let w = self.weights.clone();
        let before = self.sanctions.len();
        let (start, end) = (self.period_start, self.period_end);
        self.sanctions.retain(|s| start <= s.date && s.date <= end);
        if self.sanctions.len() != before {
            warn!(
                target: DATA_QUALITY_TARGET,
                player = self.player_id,
                dropped = before - self.sanctions.len(),
                "sanctions outside the profile period ignored"
            );
        }
        for s in &mut self.sanctions {
            s.severity = s.severity.clamp(1, 10);
        }
        self.sanctions.sort_by_key(|s| s.date);

        let n = self.sanctions.len();
        self.sanction_count = n as u32;
        let total: f64 = self.sanctions.iter().map(|s| s.severity as f64).sum();
        self.severity_avg = if n == 0 { 0.0 } else { total / n as f64 };

        self.trend_improving = trend_improving(&self.sanctions);
        let mut penalty = total * w.fair_play_per_severity;
        if self.trend_improving {
            penalty *= 1.0 - w.trend_relief;
        }
        self.fair_play_score = clamp(10.0 - penalty, 0.0, 10.0);

        let mut seen = HashSet::new();
        self.recidivism = self.sanctions.iter().filter(|s| !seen.insert(s.category)).count() as u32;

        let since = end - Duration::days(w.recent_window_days);
        let recent = self.sanctions.iter().filter(|s| s.date >= since).count();
        let recent_bump = if n > 0 && recent as f64 / n as f64 >= w.recent_share {
            w.recent_pts
        } else {
            0.0
        };
        let raw = (n as u32).min(w.count_cap) as f64
            + self.severity_avg / w.severity_divisor
            + self.recidivism as f64 * w.recidivism_pts
            + recent_bump;
        self.risk_factor = clamp(raw, 1.0, 10.0);

        self.detected_pattern = detect_pattern(&self.sanctions, self.career_years, &w);
        self
    }
}

/// True when the most recent half of the sanctions is milder on average than the earlier half.
fn trend_improving(sorted: &[Sanction]) -> bool {
    if sorted.len() < 2 {
        return false;
    }
    let mid = sorted.len() / 2;
    let avg = |xs: &[Sanction]| xs.iter().map(|s| s.severity as f64).sum::<f64>() / xs.len() as f64;
    let (older, recent) = sorted.split_at(sorted.len() - mid);
    avg(recent) < avg(older)
}

fn share(sanctions: &[Sanction], pred: impl Fn(&Sanction) -> bool) -> f64 {
    sanctions.iter().filter(|s| pred(s)).count() as f64 / sanctions.len() as f64
}

pub fn pattern_confidences(
    sanctions: &[Sanction],
    career_years: u32,
    w: &BehaviorWeights,
) -> Vec<DetectedPattern> {
    let n = sanctions.len();
    let mut out = Vec::new();
    if n >= w.min_sanctions_for_pattern {
        out.push(DetectedPattern {
            pattern: BehaviorPattern::GrandSlamStress,
            confidence: share(sanctions, |s| s.tournament == Some(Category::GrandSlam)),
        });
        out.push(DetectedPattern {
            pattern: BehaviorPattern::RankingPressure,
            confidence: share(sanctions, |s| s.under_ranking_pressure),
        });
    }
    if career_years >= w.veteran_years && n <= 1 {
        let seniority = (career_years as f64 / (w.veteran_years as f64 * 1.5)).min(1.0);
        out.push(DetectedPattern {
            pattern: BehaviorPattern::VeteranCalm,
            confidence: seniority * if n == 0 { 1.0 } else { 0.8 },
        });
    }
    out
}

/// The single most confident pattern above the threshold.
pub fn detect_pattern(
    sanctions: &[Sanction],
    career_years: u32,
    w: &BehaviorWeights,
) -> Option<DetectedPattern> {
    pattern_confidences(sanctions, career_years, w)
        .into_iter()
        .filter(|p| p.confidence >= w.pattern_threshold)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// Append-only history of behavioural profiles per player.
#[derive(Debug, Clone, Default)]
pub struct BehavioralRiskEstimator {
    weights: BehaviorWeights,
    history: HashMap<PlayerId, Vec<BehavioralProfile>>,
}

impl BehavioralRiskEstimator {
    pub fn new(weights: BehaviorWeights) -> Self {
        Self {
            weights,
            history: HashMap::new(),
        }
    }

    /// Builds a profile for the period from raw sanctions and appends it to the history.
    pub fn recompute(
        &mut self,
        player: PlayerId,
        period: (DateTime<Utc>, DateTime<Utc>),
        career_years: u32,
        sanctions: Vec<Sanction>,
    ) -> &BehavioralProfile {
        let profile = BehavioralProfile::with_weights(
            player,
            period.0,
            period.1,
            career_years,
            sanctions,
            self.weights.clone(),
        );
        let list = self.history.entry(player).or_default();
        list.push(profile);
        &list[list.len() - 1]
    }

    pub fn latest(&self, player: PlayerId) -> Option<&BehavioralProfile> {
        self.history.get(&player).and_then(|h| h.last())
    }

    /// Most recent profile whose period contains `at`, or the latest one when `at` is `None`.
    pub fn profile_at(
        &self,
        player: PlayerId,
        at: Option<DateTime<Utc>>,
    ) -> Option<&BehavioralProfile> {
        match at {
            None => self.latest(player),
            Some(at) => self.history.get(&player)?.iter().rev().find(|p| p.covers(at)),
        }
    }

    pub fn risk_multiplier(&self, player: PlayerId, at: Option<DateTime<Utc>>) -> f64 {
        self.profile_at(player, at).map(|p| p.risk_multiplier()).unwrap_or(1.0)
    }

    pub fn fair_play_score(&self, player: PlayerId) -> f64 {
        self.latest(player).map(|p| p.fair_play_score).unwrap_or(10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn end() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 30, 0, 0, 0).unwrap()
    }

    fn sanction(days_before_end: i64, severity: u8) -> Sanction {
        Sanction {
            date: end() - Duration::days(days_before_end),
            severity,
            kind: SanctionKind::Warning,
            category: SanctionCategory::Verbal,
            tournament: None,
            under_ranking_pressure: false,
        }
    }

    fn profile(sanctions: Vec<Sanction>, career_years: u32) -> BehavioralProfile {
        BehavioralProfile::new(7, end() - Duration::days(365), end(), career_years, sanctions)
    }

    #[test]
    fn clean_record_has_full_fair_play_and_unit_multiplier() {
        let p = profile(vec![], 3);
        assert_eq!(p.fair_play_score, 10.0);
        assert_eq!(p.risk_factor, 1.0);
        assert!((p.risk_multiplier() - 1.01).abs() < 1e-12);
    }

    #[test]
    fn fair_play_penalises_severity_and_floors_at_zero() {
        let p = profile(vec![sanction(200, 4), sanction(100, 4)], 3);
        assert!((p.fair_play_score - (10.0 - 8.0 * 0.15)).abs() < 1e-12);
        let heavy = profile((0..10).map(|i| sanction(300 - i * 20, 10)).collect(), 3);
        assert_eq!(heavy.fair_play_score, 0.0);
    }

    #[test]
    fn milder_recent_sanctions_earn_relief() {
        let sanctions = vec![sanction(300, 8), sanction(250, 8), sanction(100, 2), sanction(90, 2)];
        let p = profile(sanctions, 3);
        assert!(p.trend_improving);
        let expected = 10.0 - 20.0 * 0.15 * 0.8;
        assert!((p.fair_play_score - expected).abs() < 1e-9);
    }

    #[test]
    fn recent_cluster_and_recidivism_raise_risk() {
        let spread = profile(vec![sanction(300, 4), sanction(200, 4)], 3);
        let clustered = profile(vec![sanction(10, 4), sanction(5, 4)], 3);
        assert!((clustered.risk_factor - spread.risk_factor - 2.0).abs() < 1e-12);
        assert_eq!(spread.recidivism, 1);
        assert!(clustered.risk_multiplier() > spread.risk_multiplier());
    }

    #[test]
    fn strongest_pattern_wins() {
        let mut a = sanction(100, 3);
        a.tournament = Some(Category::GrandSlam);
        let mut b = a.clone();
        b.date = end() - Duration::days(50);
        b.under_ranking_pressure = true;
        let p = profile(vec![a, b], 3);
        let pattern = p.detected_pattern.unwrap();
        assert_eq!(pattern.pattern, BehaviorPattern::GrandSlamStress);
        assert_eq!(pattern.confidence, 1.0);

        let veteran = profile(vec![], 16);
        assert_eq!(veteran.detected_pattern.unwrap().pattern, BehaviorPattern::VeteranCalm);
        assert_eq!(veteran.risk_multiplier(), 1.0);
    }

    #[test]
    fn estimator_keeps_history_and_defaults_unknown_players() {
        let mut est = BehavioralRiskEstimator::default();
        est.recompute(7, (end() - Duration::days(365), end()), 3, vec![sanction(10, 6)]);
        est.recompute(7, (end(), end() + Duration::days(365)), 3, vec![]);
        assert_eq!(est.fair_play_score(7), 10.0);
        assert!(est.risk_multiplier(7, Some(end() - Duration::days(100))) > 1.01);
        assert_eq!(est.risk_multiplier(99, None), 1.0);
    }
}
