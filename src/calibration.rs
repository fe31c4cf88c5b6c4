use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, WeightTable};
use crate::model::{Factor, PlayerId};
use crate::win_prob::{
    FactorContribution, PredictionResult, probability_from_breakdown, reweighted_probability,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

impl Metrics {
    fn empty() -> Self {
        Self {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub bucket_start: f64,
    pub bucket_end: f64,
    pub count: usize,
    pub avg_pred: f64,
    pub actual_rate: f64,
}

/// `predictions` are probabilities in [0, 1] that A wins; `outcomes` are true when A won.
pub fn evaluate_probs(predictions: &[f64], outcomes: &[bool]) -> Metrics {
    let weights = vec![1.0; predictions.len()];
    evaluate_probs_weighted(predictions, outcomes, &weights)
}

pub fn evaluate_probs_weighted(predictions: &[f64], outcomes: &[bool], weights: &[f64]) -> Metrics {
    if predictions.is_empty()
        || predictions.len() != outcomes.len()
        || predictions.len() != weights.len()
    {
        return Metrics::empty();
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0.0_f64;
    let mut weight_sum = 0.0_f64;

    for ((p, won), w_raw) in predictions.iter().zip(outcomes).zip(weights) {
        let w = w_raw.max(1e-9);
        let p = p.clamp(0.0, 1.0);
        let y = if *won { 1.0 } else { 0.0 };
        weight_sum += w;
        brier_sum += w * (p - y).powi(2);

        let actual_prob = if *won { p } else { 1.0 - p }.clamp(1e-12, 1.0);
        log_loss_sum += -w * actual_prob.ln();

        if (p >= 0.5) == *won {
            correct += w;
        }
    }

    let n = weight_sum.max(1e-9);
    Metrics {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct / n,
    }
}

pub fn calibration_bins(
    predictions: &[f64],
    outcomes: &[bool],
    bins: usize,
) -> Vec<CalibrationBin> {
    let bins = bins.max(2);
    let mut counts = vec![0usize; bins];
    let mut pred_sum = vec![0.0_f64; bins];
    let mut actual_sum = vec![0.0_f64; bins];

    for (p, won) in predictions.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let idx = ((p * bins as f64).floor() as usize).min(bins - 1);
        counts[idx] += 1;
        pred_sum[idx] += p;
        if *won {
            actual_sum[idx] += 1.0;
        }
    }

    (0..bins)
        .map(|i| {
            let count = counts[i];
            let (avg_pred, actual_rate) = if count > 0 {
                (pred_sum[i] / count as f64, actual_sum[i] / count as f64)
            } else {
                (0.0, 0.0)
            };
            CalibrationBin {
                bucket_start: i as f64 / bins as f64,
                bucket_end: (i + 1) as f64 / bins as f64,
                count,
                avg_pred,
                actual_rate,
            }
        })
        .collect()
}

/// Stretches (scale > 1) or shrinks a probability in logit space.
pub fn apply_logit_calibration(p: f64, logit_scale: f64) -> f64 {
    let s = logit_scale.clamp(0.50, 1.80);
    let p = p.clamp(1e-9, 1.0 - 1e-9);
    let logit = (p / (1.0 - p)).ln() * s;
    1.0 / (1.0 + (-logit).exp())
}

pub fn fit_logit_calibration(predictions: &[f64], outcomes: &[bool]) -> (f64, Metrics) {
    let mut best_scale = 1.0;
    let mut best_metrics = evaluate_probs(predictions, outcomes);
    if best_metrics.samples == 0 {
        return (best_scale, best_metrics);
    }

    for step in 25..=90 {
        let scale = step as f64 / 50.0; // 0.50..1.80
        let calibrated: Vec<f64> = predictions
            .iter()
            .map(|p| apply_logit_calibration(*p, scale))
            .collect();
        let metrics = evaluate_probs(&calibrated, outcomes);
        if metrics.log_loss < best_metrics.log_loss {
            best_metrics = metrics;
            best_scale = scale;
        }
    }

    (best_scale, best_metrics)
}

/// Pairs predictions with actual winners; results whose winner is neither player are skipped.
pub fn outcomes_for(results: &[PredictionResult], winners: &[PlayerId]) -> (Vec<f64>, Vec<bool>) {
    let mut preds = Vec::with_capacity(results.len());
    let mut outcomes = Vec::with_capacity(results.len());
    for (r, w) in results.iter().zip(winners) {
        if *w != r.player_a && *w != r.player_b {
            continue;
        }
        preds.push(r.probability_a / 100.0);
        outcomes.push(*w == r.player_a);
    }
    (preds, outcomes)
}

pub fn evaluate_results(results: &[PredictionResult], winners: &[PlayerId]) -> Metrics {
    let (preds, outcomes) = outcomes_for(results, winners);
    evaluate_probs(&preds, &outcomes)
}

/// Scores each candidate weight table on the same past breakdowns.
pub fn compare_weight_tables(
    breakdowns: &[BTreeMap<Factor, FactorContribution>],
    outcomes: &[bool],
    tables: &[WeightTable],
    cfg: &EngineConfig,
) -> Vec<(String, Metrics)> {
    tables
        .iter()
        .map(|table| {
            let preds: Vec<f64> = breakdowns
                .iter()
                .map(|b| reweighted_probability(b, table, cfg) / 100.0)
                .collect();
            (format!("{}@v{}", table.name, table.version), evaluate_probs(&preds, outcomes))
        })
        .collect()
}

/// Grid search of the aggregator's logistic scale (1.0 to 8.0) by log loss.
pub fn fit_logistic_scale(
    breakdowns: &[BTreeMap<Factor, FactorContribution>],
    outcomes: &[bool],
    cfg: &EngineConfig,
) -> (f64, Metrics) {
    let mut trial = cfg.clone();
    let mut best_scale = cfg.logistic_scale;
    let mut best_metrics = Metrics::empty();
    let mut best_loss = f64::INFINITY;

    for step in 10..=80 {
        trial.logistic_scale = step as f64 / 10.0;
        let preds: Vec<f64> = breakdowns
            .iter()
            .map(|b| probability_from_breakdown(b, &trial) / 100.0)
            .collect();
        let metrics = evaluate_probs(&preds, outcomes);
        if metrics.samples > 0 && metrics.log_loss < best_loss {
            best_loss = metrics.log_loss;
            best_metrics = metrics;
            best_scale = trial.logistic_scale;
        }
    }

    (best_scale, best_metrics)
}
