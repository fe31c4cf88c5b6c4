use std::path::PathBuf;

use anyhow::Context;

use tennis_signal_engine::calibration::{self, compare_weight_tables, fit_logistic_scale};
use tennis_signal_engine::fake_feed::{SeasonSpec, synthetic_season};
use tennis_signal_engine::{EngineConfig, PredictionAggregator, WeightTable, logging};

fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cfg = EngineConfig::from_env().context("loading engine config")?;

    // Optional candidate table to compare against the configured one.
    let candidate = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => Some(
            WeightTable::load(&path)
                .with_context(|| format!("reading weight table {}", path.display()))?,
        ),
        None => None,
    };

    let spec = SeasonSpec {
        upcoming_matches: 1_000,
        ..SeasonSpec::default()
    };
    let season = synthetic_season(spec, &cfg);
    let engine = PredictionAggregator::new(season.store, cfg.clone());

    let mut results = Vec::new();
    let mut winners = Vec::new();
    for (res, winner) in engine.predict_many(&season.upcoming).into_iter().zip(&season.winners) {
        match res {
            Ok(r) => {
                results.push(r);
                winners.push(*winner);
            }
            Err(err) => eprintln!("skipped: {err}"),
        }
    }

    let (preds, outcomes) = calibration::outcomes_for(&results, &winners);
    let m = calibration::evaluate_probs(&preds, &outcomes);
    println!("Samples:  {}", m.samples);
    println!("Brier:    {:.4}", m.brier);
    println!("LogLoss:  {:.4}", m.log_loss);
    println!("Accuracy: {:.1}%", m.accuracy * 100.0);

    for bin in calibration::calibration_bins(&preds, &outcomes, 10).iter().filter(|b| b.count > 0) {
        println!(
            "  [{:.1}, {:.1}) n={:<4} pred={:.3} actual={:.3}",
            bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
        );
    }

    let breakdowns: Vec<_> = results.iter().map(|r| r.factor_breakdown.clone()).collect();
    let (scale, fitted) = fit_logistic_scale(&breakdowns, &outcomes, &cfg);
    println!("Best logistic scale: {scale:.1} (log loss {:.4})", fitted.log_loss);

    let mut tables = vec![cfg.weights.clone()];
    tables.extend(candidate);
    for (name, metrics) in compare_weight_tables(&breakdowns, &outcomes, &tables, &cfg) {
        println!("{name}: brier={:.4} logloss={:.4}", metrics.brier, metrics.log_loss);
    }

    Ok(())
}
