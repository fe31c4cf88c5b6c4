use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::logging::DATA_QUALITY_TARGET;
use crate::model::{Finalize, MatchId, Side, clamp};

pub const MAX_DELTA: f64 = 5.0;

const HOT_C: f64 = 30.0;
const HUMID_PCT: f64 = 70.0;
const WINDY_KMH: f64 = 20.0;
const HIGH_ALTITUDE_M: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_kmh: f64,
}

/// Stadium readings; noise and tension on a 0-10 scale, fill in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CrowdMetrics {
    pub noise: f64,
    pub tension: f64,
    pub fill_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentContext {
    pub match_id: MatchId,
    pub support_pct_a: f64,
    pub support_pct_b: f64,
    pub ambiance_index: f64,
    pub crowd: CrowdMetrics,
    pub weather: Option<Weather>,
    pub altitude_m: f64,
    pub recorded_at: DateTime<Utc>,
}

impl EnvironmentContext {
    pub fn neutral(match_id: impl Into<MatchId>, recorded_at: DateTime<Utc>) -> Self {
        Self {
            match_id: match_id.into(),
            support_pct_a: 50.0,
            support_pct_b: 50.0,
            ambiance_index: 50.0,
            crowd: CrowdMetrics::default(),
            weather: None,
            altitude_m: 0.0,
            recorded_at,
        }
    }

    pub fn support(&self, side: Side) -> f64 {
        match side {
            Side::A => self.support_pct_a,
            Side::B => self.support_pct_b,
        }
    }
}

impl Finalize for EnvironmentContext {
    fn finalize(mut self) -> Self {
        let raw = (self.support_pct_a, self.support_pct_b, self.ambiance_index);
        self.support_pct_a = clamp(self.support_pct_a, 0.0, 100.0);
        self.support_pct_b = clamp(self.support_pct_b, 0.0, 100.0);
        let total = self.support_pct_a + self.support_pct_b;
        if total > 100.0 {
            self.support_pct_a = self.support_pct_a * 100.0 / total;
            self.support_pct_b = self.support_pct_b * 100.0 / total;
        }
        self.ambiance_index = clamp(self.ambiance_index, 0.0, 100.0);
        self.crowd.noise = clamp(self.crowd.noise, 0.0, 10.0);
        self.crowd.tension = clamp(self.crowd.tension, 0.0, 10.0);
        self.crowd.fill_pct = clamp(self.crowd.fill_pct, 0.0, 100.0);
        if raw != (self.support_pct_a, self.support_pct_b, self.ambiance_index) {
            warn!(
                target: DATA_QUALITY_TARGET,
                match_id = %self.match_id,
                "environment readings out of range, normalized"
            );
        }
        self
    }
}

/// Crowd-driven adjustment for one side, in [-5, +5].
pub fn performance_delta(ctx: &EnvironmentContext, side: Side) -> f64 {
    let raw = (ctx.support(side) - 50.0) / 10.0 * (ctx.ambiance_index / 100.0);
    clamp(raw, -MAX_DELTA, MAX_DELTA)
}

pub fn hostile_environment(ctx: &EnvironmentContext, side: Side) -> bool {
    ctx.support(side) < 20.0
        && ctx.crowd.noise >= 7.0
        && ctx.crowd.tension >= 6.0
        && ctx.crowd.fill_pct >= 70.0
}

/// How much heat, humidity, wind and altitude disturb play, in [0, 1].
pub fn condition_severity(ctx: &EnvironmentContext) -> f64 {
    let over = |v: f64, from: f64, span: f64| clamp((v - from) / span, 0.0, 1.0);
    let weather = ctx
        .weather
        .map(|w| {
            0.35 * over(w.temperature_c, HOT_C, 10.0)
                + 0.20 * over(w.humidity_pct, HUMID_PCT, 30.0)
                + 0.25 * over(w.wind_kmh, WINDY_KMH, 30.0)
        })
        .unwrap_or(0.0);
    clamp(weather + 0.20 * over(ctx.altitude_m, HIGH_ALTITUDE_M, 1500.0), 0.0, 1.0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentAssessment {
    pub delta_a: f64,
    pub delta_b: f64,
    pub hostile_a: bool,
    pub hostile_b: bool,
    pub condition_severity: f64,
    pub confidence: f64,
}

impl EnvironmentAssessment {
    /// Net advantage of A over B, in [-10, 10].
    pub fn net_delta(&self) -> f64 {
        self.delta_a - self.delta_b
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentContextEstimator;

impl EnvironmentContextEstimator {
    pub fn performance_delta(&self, side: Side, ctx: &EnvironmentContext) -> f64 {
        performance_delta(ctx, side)
    }

    pub fn assess(&self, ctx: &EnvironmentContext) -> EnvironmentAssessment {
        let severity = condition_severity(ctx);
        EnvironmentAssessment {
            delta_a: performance_delta(ctx, Side::A),
            delta_b: performance_delta(ctx, Side::B),
            hostile_a: hostile_environment(ctx, Side::A),
            hostile_b: hostile_environment(ctx, Side::B),
            condition_severity: severity,
            confidence: 80.0 - 40.0 * severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(support_a: f64, ambiance: f64) -> EnvironmentContext {
        EnvironmentContext {
            support_pct_a: support_a,
            support_pct_b: 100.0 - support_a,
            ambiance_index: ambiance,
            ..EnvironmentContext::neutral("m1", Utc::now())
        }
    }

    #[test]
    fn neutral_crowd_is_zero() {
        let c = ctx(50.0, 100.0);
        assert_eq!(performance_delta(&c, Side::A), 0.0);
        assert_eq!(EnvironmentContextEstimator.assess(&c).net_delta(), 0.0);
    }

    #[test]
    fn delta_scales_with_ambiance_and_is_bounded() {
        assert!((performance_delta(&ctx(80.0, 50.0), Side::A) - 1.5).abs() < 1e-12);
        assert!((performance_delta(&ctx(80.0, 50.0), Side::B) + 1.5).abs() < 1e-12);
        let mut loud = ctx(100.0, 100.0);
        loud.support_pct_a = 400.0;
        assert_eq!(performance_delta(&loud, Side::A), MAX_DELTA);
    }

    #[test]
    fn hostile_needs_every_condition() {
        let mut c = ctx(90.0, 90.0);
        c.crowd = CrowdMetrics {
            noise: 8.0,
            tension: 7.0,
            fill_pct: 95.0,
        };
        assert!(hostile_environment(&c, Side::B));
        assert!(!hostile_environment(&c, Side::A));
        c.crowd.fill_pct = 60.0;
        assert!(!hostile_environment(&c, Side::B));
    }

    #[test]
    fn harsh_conditions_lower_confidence() {
        let mut c = ctx(50.0, 50.0);
        assert_eq!(condition_severity(&c), 0.0);
        c.weather = Some(Weather {
            temperature_c: 40.0,
            humidity_pct: 100.0,
            wind_kmh: 50.0,
        });
        c.altitude_m = 2500.0;
        assert!((condition_severity(&c) - 1.0).abs() < 1e-12);
        assert!((EnvironmentContextEstimator.assess(&c).confidence - 40.0).abs() < 1e-9);
    }

    #[test]
    fn finalize_normalizes_overfull_support() {
        let mut c = ctx(70.0, 120.0);
        c.support_pct_b = 80.0;
        let c = c.finalize();
        assert!((c.support_pct_a + c.support_pct_b - 100.0).abs() < 1e-9);
        assert_eq!(c.ambiance_index, 100.0);
    }
}
