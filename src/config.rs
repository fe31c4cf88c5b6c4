use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::behavior::BehaviorWeights;
use crate::elo::{EloConfig, ImportanceTable};
use crate::error::{PredictionError, Result};
use crate::form::FormWeights;
use crate::head_to_head::H2hWeights;
use crate::injury::InjuryWeights;
use crate::market::AnomalyThresholds;
use crate::model::Factor;

pub const WEIGHTS_PATH_ENV: &str = "ENGINE_WEIGHTS_PATH";

pub static DEFAULT_WEIGHTS: Lazy<WeightTable> = Lazy::new(WeightTable::default);

/// Aggregator weights, versioned so backtests can compare tables side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    pub version: u32,
    pub name: String,
    pub elo: f64,
    pub head_to_head: f64,
    pub form: f64,
    pub injury: f64,
    pub market: f64,
    pub environment: f64,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            version: 1,
            name: "baseline".to_string(),
            elo: 0.30,
            head_to_head: 0.20,
            form: 0.20,
            injury: 0.15,
            market: 0.10,
            environment: 0.05,
        }
    }
}

impl WeightTable {
    pub fn weight(&self, factor: Factor) -> f64 {
        match factor {
            Factor::Elo => self.elo,
            Factor::HeadToHead => self.head_to_head,
            Factor::Form => self.form,
            Factor::Injury => self.injury,
            Factor::Market => self.market,
            Factor::Environment => self.environment,
            Factor::EloMarketDisagreement => 0.0,
        }
    }

    pub fn total(&self) -> f64 {
        Factor::WEIGHTED.iter().map(|f| self.weight(*f)).sum()
    }

    pub fn validate(&self) -> Result<()> {
        for factor in Factor::WEIGHTED {
            let w = self.weight(factor);
            if !w.is_finite() || w < 0.0 {
                return Err(PredictionError::Config(format!(
                    "weight table {} v{}: {} weight {w} must be finite and non-negative",
                    self.name,
                    self.version,
                    factor.as_str()
                )));
            }
        }
        if self.total() <= 0.0 {
            return Err(PredictionError::Config(format!(
                "weight table {} v{} has no positive weight",
                self.name, self.version
            )));
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let table = serde_json::from_str::<WeightTable>(&raw)?;
        table.validate()?;
        info!(name = %table.name, version = table.version, "loaded weight table");
        Ok(table)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Everything tunable about the engine. Defaults reproduce the documented baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub weights: WeightTable,
    pub elo: EloConfig,
    pub importance: ImportanceTable,
    pub form: FormWeights,
    pub head_to_head: H2hWeights,
    pub injury: InjuryWeights,
    pub behavior: BehaviorWeights,
    pub anomalies: AnomalyThresholds,
    /// Slope of the logistic transform applied to the composite score in [-1, 1].
    pub logistic_scale: f64,
    pub probability_floor: f64,
    pub probability_ceiling: f64,
    /// Probability points between ELO and market before the disagreement cap applies.
    pub disagreement_threshold_pts: f64,
    pub disagreement_confidence_cap: f64,
    /// Market weight multiplier while any anomaly is present.
    pub anomalous_market_weight_factor: f64,
    pub anomaly_confidence_penalty: f64,
    pub missing_signal_penalty: f64,
    /// Confidence loses `scale * (multiplier - 1)` as a fraction for the riskier player.
    pub behavior_confidence_scale: f64,
    pub freshness_days: i64,
    pub stale_confidence_cap: f64,
    /// FormWindow size the form index is computed on.
    pub form_window: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: WeightTable::default(),
            elo: EloConfig::default(),
            importance: ImportanceTable::default(),
            form: FormWeights::default(),
            head_to_head: H2hWeights::default(),
            injury: InjuryWeights::default(),
            behavior: BehaviorWeights::default(),
            anomalies: AnomalyThresholds::default(),
            logistic_scale: 4.0,
            probability_floor: 0.10,
            probability_ceiling: 0.90,
            disagreement_threshold_pts: 15.0,
            disagreement_confidence_cap: 60.0,
            anomalous_market_weight_factor: 0.5,
            anomaly_confidence_penalty: 10.0,
            missing_signal_penalty: 5.0,
            behavior_confidence_scale: 2.0,
            freshness_days: 45,
            stale_confidence_cap: 25.0,
            form_window: 20,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by environment variables (a `.env` file is honoured). A weight table
    /// file named by `ENGINE_WEIGHTS_PATH` replaces the built-in table.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        let mut cfg = Self::default();

        cfg.logistic_scale = env_f64("ENGINE_LOGISTIC_SCALE", cfg.logistic_scale).clamp(0.5, 10.0);
        cfg.probability_floor = env_f64("ENGINE_PROBABILITY_FLOOR", cfg.probability_floor);
        cfg.probability_ceiling = env_f64("ENGINE_PROBABILITY_CEILING", cfg.probability_ceiling);
        cfg.disagreement_threshold_pts =
            env_f64("ENGINE_DISAGREEMENT_PTS", cfg.disagreement_threshold_pts);
        cfg.freshness_days = env::var("ENGINE_FRESHNESS_DAYS")
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(cfg.freshness_days)
            .max(1);
        cfg.form_window = env::var("ENGINE_FORM_WINDOW")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(cfg.form_window);

        if let Some(path) = weights_path_override() {
            cfg.weights = WeightTable::load(&path)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if !(0.0..0.5).contains(&self.probability_floor)
            || !(0.5..=1.0).contains(&self.probability_ceiling)
        {
            return Err(PredictionError::Config(format!(
                "probability bounds [{}, {}] must straddle 0.5",
                self.probability_floor, self.probability_ceiling
            )));
        }
        if !crate::form::WINDOW_SIZES.contains(&self.form_window) {
            return Err(PredictionError::Config(format!(
                "form window {} is not one of {:?}",
                self.form_window,
                crate::form::WINDOW_SIZES
            )));
        }
        Ok(())
    }
}

fn weights_path_override() -> Option<PathBuf> {
    env::var(WEIGHTS_PATH_ENV)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

fn env_f64(key: &str, default: f64) -> f64 {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                warn!(key, raw = %raw, "ignoring unparseable numeric override");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        assert!((DEFAULT_WEIGHTS.total() - 1.0).abs() < 1e-12);
        assert!(DEFAULT_WEIGHTS.validate().is_ok());
    }

    #[test]
    fn negative_weight_is_rejected() {
        let table = WeightTable {
            market: -0.1,
            ..WeightTable::default()
        };
        assert!(matches!(table.validate(), Err(PredictionError::Config(_))));
    }

    #[test]
    fn disagreement_entry_is_never_weighted() {
        assert_eq!(DEFAULT_WEIGHTS.weight(Factor::EloMarketDisagreement), 0.0);
    }

    #[test]
    fn bounds_must_straddle_half() {
        let cfg = EngineConfig {
            probability_floor: 0.6,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(EngineConfig::default().validate().is_ok());
    }
}
