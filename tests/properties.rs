use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tennis_signal_engine::elo::{EloConfig, ImportanceTable, RatingStore, replay_history};
use tennis_signal_engine::fake_feed::{SeasonSpec, synthetic_season};
use tennis_signal_engine::form::{
    FormEntry, FormWeights, FormWindow, Outcome, SetPattern, WINDOW_SIZES, form_index,
};
use tennis_signal_engine::head_to_head::{H2hWeights, HeadToHead, confidence};
use tennis_signal_engine::injury::{
    BodyZone, ImpactVector, InjuryContext, InjuryPhase, InjuryRecord, InjuryWeights, risk_score,
};
use tennis_signal_engine::market::MarketSnapshot;
use tennis_signal_engine::win_prob::probability_from_breakdown;
use tennis_signal_engine::{
    Category, EngineConfig, MatchRequest, MemoryStore, PredictionAggregator, RatingSink, Surface,
};

#[test]
fn every_rating_update_is_zero_sum() {
    let season = synthetic_season(
        SeasonSpec {
            seed: 3,
            players: 20,
            history_matches: 500,
            upcoming_matches: 0,
        },
        &EngineConfig::default(),
    );
    let store = RatingStore::new(EloConfig::default(), ImportanceTable::default());
    for m in &season.history {
        let u = store.apply(m).unwrap();
        let (dw, dl) = u.deltas();
        assert_eq!(dw + dl, 0.0);
        assert_eq!(u.global_winner_delta + u.global_loser_delta, 0.0);
        assert!(dw >= 0.0);
    }
    let total: f64 = (0..20).map(|p| store.rating(p, None).rating).sum();
    assert!((total - 20.0 * 1500.0).abs() < 1e-6);
}

#[test]
fn replay_is_order_independent_of_input_order() {
    let season = synthetic_season(
        SeasonSpec {
            seed: 5,
            players: 10,
            history_matches: 200,
            upcoming_matches: 0,
        },
        &EngineConfig::default(),
    );
    let mut shuffled = season.history.clone();
    shuffled.reverse();
    let a = replay_history(&season.history, EloConfig::default(), ImportanceTable::default());
    let b = replay_history(&shuffled, EloConfig::default(), ImportanceTable::default());
    for p in 0..10 {
        assert_eq!(a.get_rating(p, None), b.get_rating(p, None));
    }
}

#[test]
fn probability_is_monotone_in_rating_gap() {
    let mut last = 0.0;
    for step in 0..30 {
        let ra = 1000.0 + 50.0 * step as f64;
        let mut store = MemoryStore::default();
        store.add_player(1);
        store.add_player(2);
        store.apply_rating_update(1, None, ra - 1500.0).unwrap();
        store
            .push_market_snapshot(MarketSnapshot {
                match_id: "m".into(),
                odds_a: 1.9,
                odds_b: 1.9,
                odds_a_open: 1.9,
                odds_b_open: 1.9,
                volume: 1_000.0,
                pct_bets_a: 50.0,
                pct_bets_b: 50.0,
                timestamp: Utc::now(),
            })
            .unwrap();
        let engine = PredictionAggregator::new(store, EngineConfig::default());
        let p = engine.predict(&MatchRequest::new("m", 1, 2)).unwrap().probability_a;
        assert!(p >= last, "p={p} dropped below {last} at rating {ra}");
        assert!((10.0..=90.0).contains(&p));
        last = p;
    }
}

#[test]
fn form_index_stays_in_bounds() {
    let mut rng = StdRng::seed_from_u64(17);
    let weights = FormWeights::default();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for size in WINDOW_SIZES {
        for _ in 0..50 {
            let mut w = FormWindow::new(1, size);
            for i in 0..rng.gen_range(0..80) {
                w.push(FormEntry {
                    opponent_rank: rng.gen_bool(0.9).then(|| rng.gen_range(1..500)),
                    player_rank: rng.gen_bool(0.9).then(|| rng.gen_range(1..500)),
                    outcome: if rng.gen_bool(0.5) { Outcome::Win } else { Outcome::Loss },
                    set_pattern: match rng.gen_range(0..5) {
                        0 => SetPattern::Retired,
                        1 => SetPattern::Withdrew,
                        2 => SetPattern::Marathon,
                        3 => SetPattern::DecidingSet,
                        _ => SetPattern::StraightSets,
                    },
                    elo_delta: rng.gen_range(-60.0..60.0),
                    played_at: start + Duration::days(i),
                });
                assert!(w.entries.len() <= size);
                assert!(w.games() as usize <= size);
            }
            let fi = form_index(&w, &weights);
            assert!((0.0..=100.0).contains(&fi), "form index {fi}");
        }
    }
}

#[test]
fn head_to_head_totals_add_up() {
    let mut rng = StdRng::seed_from_u64(23);
    for _ in 0..100 {
        let mut h = HeadToHead::new(4, 9).unwrap();
        for _ in 0..rng.gen_range(0..40) {
            let winner = if rng.gen_bool(0.5) { 4 } else { 9 };
            h.record_match(winner, Some(Surface::Grass), Category::Tour250, Utc::now()).unwrap();
        }
        assert_eq!(h.unfinished, 0);
        assert_eq!(h.wins_a + h.wins_b, h.total_matches());
        assert!(h.recent_form_a.len() <= 10);
    }
}

#[test]
fn head_to_head_confidence_falls_with_sample_size() {
    let w = H2hWeights::default();
    let when = Utc::now() - Duration::days(30);
    let mut previous = f64::INFINITY;
    for n in (1..=12).rev() {
        let mut h = HeadToHead::new(1, 2).unwrap();
        for i in 0..n {
            h.record_match(if i % 3 == 0 { 2 } else { 1 }, None, Category::Masters, when).unwrap();
        }
        let c = confidence(&h, Utc::now(), &w);
        assert!(c < previous, "n={n}: {c} !< {previous}");
        previous = c;
    }
}

#[test]
fn injury_risk_never_drops_with_severity() {
    let w = InjuryWeights::default();
    let ctx = InjuryContext {
        surface: Some(Surface::Clay),
        expected_duration_min: 150,
    };
    for zone in [BodyZone::Knee, BodyZone::Wrist, BodyZone::Back] {
        for phase in [InjuryPhase::Acute, InjuryPhase::Chronic, InjuryPhase::Recovering] {
            let mut last = -1.0;
            for severity in 1..=10 {
                let record = InjuryRecord {
                    injury_id: 1,
                    player_id: 1,
                    zone,
                    severity,
                    impact_vector: ImpactVector::from_zone(zone, 5),
                    pain_level: 3.0,
                    recurrence_count: 1,
                    phase,
                    onset_date: Utc::now(),
                    expected_duration_days: 20,
                    recovered_at: None,
                };
                let risk = risk_score(&record, &ctx, &w);
                assert!(risk >= last);
                last = risk;
            }
        }
    }
}

#[test]
fn breakdown_round_trips_on_synthetic_season() {
    let cfg = EngineConfig::default();
    let season = synthetic_season(
        SeasonSpec {
            seed: 9,
            players: 24,
            history_matches: 600,
            upcoming_matches: 60,
        },
        &cfg,
    );
    let engine = PredictionAggregator::new(season.store, cfg.clone());
    for result in engine.predict_many(&season.upcoming) {
        let r = result.unwrap();
        assert!((r.probability_a + r.probability_b - 100.0).abs() < 1e-9);
        assert!((10.0..=90.0).contains(&r.probability_a));
        assert!(r.confidence <= 100);
        let rebuilt = probability_from_breakdown(&r.factor_breakdown, &cfg);
        assert!((rebuilt - r.probability_a).abs() < 1e-9);
    }
}
