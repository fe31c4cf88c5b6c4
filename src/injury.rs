use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PredictionError, Result};
use crate::logging::DATA_QUALITY_TARGET;
use crate::model::{Finalize, PlayerId, Surface, clamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyZone {
    Shoulder,
    Elbow,
    Wrist,
    Back,
    Abdomen,
    Hip,
    Thigh,
    Knee,
    Calf,
    Ankle,
    Foot,
    Head,
    Other,
}

impl BodyZone {
    pub fn is_mobility_sensitive(self) -> bool {
        matches!(
            self,
            BodyZone::Hip
                | BodyZone::Thigh
                | BodyZone::Knee
                | BodyZone::Calf
                | BodyZone::Ankle
                | BodyZone::Foot
        )
    }

    /// Relative sensitivity of each stroke/capacity to an injury in this zone, in [0, 1].
    fn profile(self) -> ImpactVector {
        let v = |service, mobility, endurance, forehand, backhand, mental| ImpactVector {
            service,
            mobility,
            endurance,
            forehand,
            backhand,
            mental,
        };
        match self {
            BodyZone::Shoulder => v(1.0, 0.1, 0.2, 0.6, 0.5, 0.2),
            BodyZone::Elbow => v(0.7, 0.0, 0.1, 0.8, 0.6, 0.2),
            BodyZone::Wrist => v(0.5, 0.0, 0.1, 0.9, 0.9, 0.2),
            BodyZone::Back => v(0.9, 0.5, 0.5, 0.5, 0.5, 0.3),
            BodyZone::Abdomen => v(0.9, 0.3, 0.4, 0.4, 0.4, 0.2),
            BodyZone::Hip => v(0.3, 0.9, 0.5, 0.3, 0.3, 0.2),
            BodyZone::Thigh => v(0.2, 0.9, 0.6, 0.2, 0.2, 0.2),
            BodyZone::Knee => v(0.3, 1.0, 0.5, 0.2, 0.2, 0.3),
            BodyZone::Calf => v(0.2, 0.9, 0.6, 0.1, 0.1, 0.2),
            BodyZone::Ankle => v(0.2, 1.0, 0.4, 0.1, 0.1, 0.2),
            BodyZone::Foot => v(0.2, 0.9, 0.4, 0.1, 0.1, 0.2),
            BodyZone::Head => v(0.3, 0.3, 0.3, 0.3, 0.3, 1.0),
            BodyZone::Other => v(0.4, 0.4, 0.4, 0.4, 0.4, 0.4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjuryPhase {
    Acute,
    Chronic,
    Recovering,
    Healed,
}

/// Degradation per capacity, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImpactVector {
    pub service: f64,
    pub mobility: f64,
    pub endurance: f64,
    pub forehand: f64,
    pub backhand: f64,
    pub mental: f64,
}

impl ImpactVector {
    /// Default vector for an unmeasured injury: zone profile scaled by severity.
    pub fn from_zone(zone: BodyZone, severity: u8) -> Self {
        zone.profile().scaled(severity as f64 * 10.0)
    }

    pub fn scaled(self, k: f64) -> Self {
        self.map(|v| v * k)
    }

    pub fn is_zero(&self) -> bool {
        self.components().iter().all(|v| *v == 0.0)
    }

    pub fn components(&self) -> [f64; 6] {
        [
            self.service,
            self.mobility,
            self.endurance,
            self.forehand,
            self.backhand,
            self.mental,
        ]
    }

    pub fn max(self, other: Self) -> Self {
        Self {
            service: self.service.max(other.service),
            mobility: self.mobility.max(other.mobility),
            endurance: self.endurance.max(other.endurance),
            forehand: self.forehand.max(other.forehand),
            backhand: self.backhand.max(other.backhand),
            mental: self.mental.max(other.mental),
        }
    }

    fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            service: f(self.service),
            mobility: f(self.mobility),
            endurance: f(self.endurance),
            forehand: f(self.forehand),
            backhand: f(self.backhand),
            mental: f(self.mental),
        }
    }

    fn clamped(self) -> Self {
        self.map(|v| clamp(v, 0.0, 100.0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjuryRecord {
    pub injury_id: u64,
    pub player_id: PlayerId,
    pub zone: BodyZone,
    /// 1 (niggle) to 10 (season-ending).
    pub severity: u8,
    pub impact_vector: ImpactVector,
    /// Reported pain, 0 to 10.
    pub pain_level: f64,
    /// Times this injury came back.
    pub recurrence_count: u32,
    pub phase: InjuryPhase,
    pub onset_date: DateTime<Utc>,
    pub expected_duration_days: u32,
    /// Set on confirmed full recovery; the record is kept but no longer active.
    pub recovered_at: Option<DateTime<Utc>>,
}

impl InjuryRecord {
    pub fn is_active(&self) -> bool {
        self.phase != InjuryPhase::Healed && self.recovered_at.is_none()
    }

    /// Medical re-evaluation: new phase and pain, then derived fields are refreshed.
    pub fn reevaluate(mut self, phase: InjuryPhase, pain_level: f64, at: DateTime<Utc>) -> Self {
        self.phase = phase;
        self.pain_level = pain_level;
        if phase == InjuryPhase::Healed {
            self.recovered_at = Some(at);
        }
        self.finalize()
    }

    /// Phase implied by elapsed time: acute for the first days, then recovering, and chronic
    /// once the injury outlasts twice its expected duration. Healed records are left alone.
    pub fn advance_phase(mut self, now: DateTime<Utc>, w: &InjuryWeights) -> Self {
        if !self.is_active() {
            return self.finalize();
        }
        let elapsed = (now - self.onset_date).num_days().max(0);
        self.phase = if elapsed < w.acute_window_days as i64 {
            InjuryPhase::Acute
        } else if elapsed <= 2 * self.expected_duration_days as i64 {
            if self.phase == InjuryPhase::Chronic {
                InjuryPhase::Chronic
            } else {
                InjuryPhase::Recovering
            }
        } else {
            InjuryPhase::Chronic
        };
        self.finalize()
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.severity) {
            return Err(PredictionError::InvalidRecord(format!(
                "injury {} severity {} outside [1, 10]",
                self.injury_id, self.severity
            )));
        }
        Ok(())
    }
}

impl Finalize for InjuryRecord {
    fn finalize(mut self) -> Self {
        if !(1..=10).contains(&self.severity) {
            warn!(
                target: DATA_QUALITY_TARGET,
                injury = self.injury_id,
                severity = self.severity,
                "severity out of range, clamped"
            );
            self.severity = self.severity.clamp(1, 10);
        }
        if self.impact_vector.is_zero() {
            self.impact_vector = ImpactVector::from_zone(self.zone, self.severity);
        }
        self.impact_vector = self.impact_vector.clamped();
        self.pain_level = clamp(self.pain_level, 0.0, 10.0);
        if self.recovered_at.is_some() {
            self.phase = InjuryPhase::Healed;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjuryWeights {
    pub service: f64,
    pub mobility: f64,
    pub endurance: f64,
    pub forehand: f64,
    pub backhand: f64,
    pub mental: f64,
    /// Clay multiplier, only for mobility-sensitive zones.
    pub clay_mobility_mult: f64,
    pub grass_mult: f64,
    pub hard_mult: f64,
    pub carpet_mult: f64,
    pub duration_baseline_min: f64,
    /// Added to the duration multiplier per minute past the baseline.
    pub duration_slope_per_min: f64,
    pub duration_max_mult: f64,
    pub severity_pts: f64,
    pub impact_factor: f64,
    pub pain_pts: f64,
    pub recidivism_factor: f64,
    pub recidivism_per_recurrence: f64,
    pub acute_pts: f64,
    pub base_heal_rate: f64,
    pub acute_heal_mult: f64,
    pub recovering_heal_mult: f64,
    pub severe_heal_mult: f64,
    pub severe_threshold: u8,
    pub acute_window_days: u32,
}

impl Default for InjuryWeights {
    fn default() -> Self {
        Self {
            service: 0.25,
            mobility: 0.20,
            endurance: 0.15,
            forehand: 0.15,
            backhand: 0.15,
            mental: 0.10,
            clay_mobility_mult: 1.2,
            grass_mult: 0.9,
            hard_mult: 1.0,
            carpet_mult: 1.0,
            duration_baseline_min: 120.0,
            duration_slope_per_min: 1.0 / 240.0,
            duration_max_mult: 1.5,
            severity_pts: 5.0,
            impact_factor: 0.5,
            pain_pts: 3.0,
            recidivism_factor: 0.3,
            recidivism_per_recurrence: 25.0,
            acute_pts: 20.0,
            base_heal_rate: 0.10,
            acute_heal_mult: 0.5,
            recovering_heal_mult: 1.5,
            severe_heal_mult: 0.5,
            severe_threshold: 7,
            acute_window_days: 10,
        }
    }
}

impl InjuryWeights {
    pub fn weighted_impact(&self, v: &ImpactVector) -> f64 {
        self.service * v.service
            + self.mobility * v.mobility
            + self.endurance * v.endurance
            + self.forehand * v.forehand
            + self.backhand * v.backhand
            + self.mental * v.mental
    }

    pub fn surface_multiplier(&self, surface: Option<Surface>, zone: BodyZone) -> f64 {
        match surface {
            Some(Surface::Clay) if zone.is_mobility_sensitive() => self.clay_mobility_mult,
            Some(Surface::Clay) | Some(Surface::Hard) | None => self.hard_mult,
            Some(Surface::Grass) => self.grass_mult,
            Some(Surface::Carpet) => self.carpet_mult,
        }
    }

    pub fn duration_multiplier(&self, expected_duration_min: u32) -> f64 {
        let over = (expected_duration_min as f64 - self.duration_baseline_min).max(0.0);
        (1.0 + over * self.duration_slope_per_min).min(self.duration_max_mult)
    }

    /// Fraction of the injury healed per day.
    pub fn heal_rate(&self, record: &InjuryRecord) -> f64 {
        let phase = match record.phase {
            InjuryPhase::Acute => self.acute_heal_mult,
            InjuryPhase::Recovering => self.recovering_heal_mult,
            InjuryPhase::Chronic | InjuryPhase::Healed => 1.0,
        };
        let severe = if record.severity >= self.severe_threshold {
            self.severe_heal_mult
        } else {
            1.0
        };
        self.base_heal_rate * phase * severe
    }
}

/// Participation advice, ordered from harmless to forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Normal,
    Monitored,
    LimitedParticipation,
    StronglyDiscouraged,
    Forbidden,
}

impl Recommendation {
    pub fn from_risk(risk: f64) -> Self {
        if risk >= 80.0 {
            Recommendation::Forbidden
        } else if risk >= 60.0 {
            Recommendation::StronglyDiscouraged
        } else if risk >= 40.0 {
            Recommendation::LimitedParticipation
        } else if risk >= 20.0 {
            Recommendation::Monitored
        } else {
            Recommendation::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InjuryContext {
    pub surface: Option<Surface>,
    pub expected_duration_min: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjuryRisk {
    pub risk_score: f64,
    pub recommendation: Recommendation,
    /// Component-wise worst impact across active injuries, after surface and duration.
    pub adapted_impacts: ImpactVector,
    pub impact_global: f64,
    pub active_injuries: usize,
    pub worst_injury: Option<u64>,
}

impl InjuryRisk {
    pub fn none() -> Self {
        Self {
            risk_score: 0.0,
            recommendation: Recommendation::Normal,
            adapted_impacts: ImpactVector::default(),
            impact_global: 0.0,
            active_injuries: 0,
            worst_injury: None,
        }
    }

    /// Remaining playing capability in [0, 100].
    pub fn capability(&self) -> f64 {
        100.0 - clamp(self.impact_global, 0.0, 100.0)
    }
}

pub fn adapted_impacts(
    record: &InjuryRecord,
    ctx: &InjuryContext,
    w: &InjuryWeights,
) -> ImpactVector {
    let surface = w.surface_multiplier(ctx.surface, record.zone);
    let duration = w.duration_multiplier(ctx.expected_duration_min);
    let mut v = record.impact_vector.scaled(surface);
    v.endurance *= duration;
    v.clamped()
}

pub fn risk_score(record: &InjuryRecord, ctx: &InjuryContext, w: &InjuryWeights) -> f64 {
    let impact_global = w.weighted_impact(&adapted_impacts(record, ctx, w));
    let recidivism = (record.recurrence_count as f64 * w.recidivism_per_recurrence).min(100.0);
    let acute = if record.phase == InjuryPhase::Acute {
        w.acute_pts
    } else {
        0.0
    };
    let raw = w.severity_pts * record.severity as f64
        + w.impact_factor * impact_global
        + w.pain_pts * record.pain_level
        + w.recidivism_factor * recidivism
        + acute;
    raw.min(100.0)
}

/// Risk of the worst active injury; impacts combine component-wise by maximum.
pub fn match_risk(injuries: &[InjuryRecord], ctx: &InjuryContext, w: &InjuryWeights) -> InjuryRisk {
    let mut out = InjuryRisk::none();
    let mut worst = f64::MIN;
    for record in injuries.iter().filter(|r| r.is_active()) {
        out.active_injuries += 1;
        out.adapted_impacts = out.adapted_impacts.max(adapted_impacts(record, ctx, w));
        let risk = risk_score(record, ctx, w);
        if risk > worst {
            worst = risk;
            out.worst_injury = Some(record.injury_id);
        }
    }
    if out.active_injuries == 0 {
        return out;
    }
    out.risk_score = clamp(worst, 0.0, 100.0);
    out.recommendation = Recommendation::from_risk(out.risk_score);
    out.impact_global = clamp(w.weighted_impact(&out.adapted_impacts), 0.0, 100.0);
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryProjection {
    pub days_ahead: u32,
    pub pain_level: f64,
    pub impact_vector: ImpactVector,
    pub impact_global: f64,
    pub fully_recovered: bool,
}

/// Linear healing forecast `days_ahead` days out, floored at zero.
pub fn project_recovery(
    record: &InjuryRecord,
    days_ahead: u32,
    w: &InjuryWeights,
) -> RecoveryProjection {
    let remaining = if record.is_active() {
        (1.0 - w.heal_rate(record) * days_ahead as f64).max(0.0)
    } else {
        0.0
    };
    let impact_vector = record.impact_vector.scaled(remaining);
    RecoveryProjection {
        days_ahead,
        pain_level: record.pain_level * remaining,
        impact_vector,
        impact_global: w.weighted_impact(&impact_vector),
        fully_recovered: remaining == 0.0,
    }
}

/// Days until the linear forecast reaches zero.
pub fn days_to_recovery(record: &InjuryRecord, w: &InjuryWeights) -> u32 {
    if !record.is_active() {
        return 0;
    }
    let rate = w.heal_rate(record);
    if rate <= 0.0 {
        return u32::MAX;
    }
    (1.0 / rate).ceil() as u32
}

/// Injury records per player, active and healed.
#[derive(Debug, Clone, Default)]
pub struct InjuryImpactEstimator {
    weights: InjuryWeights,
    records: HashMap<PlayerId, Vec<InjuryRecord>>,
}

impl InjuryImpactEstimator {
    pub fn new(weights: InjuryWeights) -> Self {
        Self {
            weights,
            records: HashMap::new(),
        }
    }

    /// Inserts or replaces a record by id. Healed records stay on file but stop counting.
    pub fn upsert(&mut self, record: InjuryRecord) -> Result<()> {
        record.validate()?;
        let record = record.finalize();
        let list = self.records.entry(record.player_id).or_default();
        match list.iter_mut().find(|r| r.injury_id == record.injury_id) {
            Some(existing) => *existing = record,
            None => list.push(record),
        }
        Ok(())
    }

    pub fn active(&self, player: PlayerId) -> Vec<InjuryRecord> {
        self.records
            .get(&player)
            .map(|list| list.iter().filter(|r| r.is_active()).cloned().collect())
            .unwrap_or_default()
    }

    pub fn match_risk(&self, player: PlayerId, ctx: &InjuryContext) -> InjuryRisk {
        let risk = match_risk(&self.active(player), ctx, &self.weights);
        debug!(player, risk = risk.risk_score, "injury risk computed");
        risk
    }
}
