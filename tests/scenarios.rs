use chrono::{Duration, Utc};

use tennis_signal_engine::behavior::{Sanction, SanctionCategory, SanctionKind};
use tennis_signal_engine::environment::{CrowdMetrics, EnvironmentContext};
use tennis_signal_engine::head_to_head::HeadToHead;
use tennis_signal_engine::injury::{
    BodyZone, ImpactVector, InjuryContext, InjuryPhase, InjuryRecord, InjuryWeights, Recommendation,
    match_risk,
};
use tennis_signal_engine::market::{AnomalyTag, MarketSnapshot};
use tennis_signal_engine::{
    Category, CompletedMatch, EngineConfig, Factor, MatchRequest, MemoryStore, PredictionAggregator,
    PredictionFlag, RatingSink, Round, Side, SignalSource, Surface,
};

const A: u32 = 1;
const B: u32 = 2;

fn rated(ra: f64, rb: f64) -> MemoryStore {
    let mut store = MemoryStore::default();
    store.add_player(A);
    store.add_player(B);
    store.apply_rating_update(A, None, ra - 1500.0).unwrap();
    store.apply_rating_update(B, None, rb - 1500.0).unwrap();
    store
}

fn snapshot(odds_a: f64, odds_b: f64, open_a: f64, open_b: f64, volume: f64) -> MarketSnapshot {
    MarketSnapshot {
        match_id: "final".into(),
        odds_a,
        odds_b,
        odds_a_open: open_a,
        odds_b_open: open_b,
        volume,
        pct_bets_a: 50.0,
        pct_bets_b: 50.0,
        timestamp: Utc::now(),
    }
}

fn request() -> MatchRequest {
    MatchRequest::new("final", A, B)
        .on(Surface::Hard)
        .at(Category::Masters, Round::Final)
}

fn missing(result: &tennis_signal_engine::PredictionResult, factor: Factor) -> bool {
    result.has_flag(|f| *f == PredictionFlag::MissingSignal { factor })
}

#[test]
fn stronger_rating_wins_within_bounds_and_missing_h2h_costs_confidence() {
    let mut store = rated(1800.0, 1600.0);
    store.push_market_snapshot(snapshot(1.95, 1.95, 1.95, 1.95, 5_000.0)).unwrap();
    let engine = PredictionAggregator::new(store, EngineConfig::default());

    let r = engine.predict(&request()).unwrap();
    assert!(r.probability_a > 50.0);
    assert!(r.probability_a <= 90.0);
    assert!(missing(&r, Factor::HeadToHead));
    // ELO with no match history sits at 40; every missing signal takes 5 more.
    assert!(r.confidence < 40);
    assert_eq!(r.favored(), Some(A));
}

#[test]
fn head_to_head_dominance_alone_tilts_even_ratings() {
    let mut store = rated(1500.0, 1500.0);
    let mut h2h = HeadToHead::new(A, B).unwrap();
    let start = Utc::now() - Duration::days(600);
    let sequence = [A, A, B, A, A, A, B, A, A, A];
    for (i, winner) in sequence.iter().enumerate() {
        h2h.record_match(*winner, None, Category::Tour500, start + Duration::days(50 * i as i64))
            .unwrap();
    }
    assert_eq!((h2h.wins_a, h2h.wins_b), (8, 2));
    store.insert_head_to_head(h2h);

    let engine = PredictionAggregator::new(store, EngineConfig::default());
    let r = engine.predict(&request()).unwrap();
    assert!(r.probability_a > 50.0);
    assert_eq!(r.factor_breakdown[&Factor::Elo].contribution, 0.0);
    assert!(r.factor_breakdown[&Factor::HeadToHead].contribution > 0.0);
}

#[test]
fn severe_acute_injury_is_flagged() {
    let injury = InjuryRecord {
        injury_id: 99,
        player_id: A,
        zone: BodyZone::Ankle,
        severity: 9,
        impact_vector: ImpactVector {
            mobility: 90.0,
            ..Default::default()
        },
        pain_level: 4.0,
        recurrence_count: 0,
        phase: InjuryPhase::Acute,
        onset_date: Utc::now() - Duration::days(2),
        expected_duration_days: 30,
        recovered_at: None,
    };
    let ctx = InjuryContext {
        surface: Some(Surface::Hard),
        expected_duration_min: 100,
    };
    let risk = match_risk(std::slice::from_ref(&injury), &ctx, &InjuryWeights::default());
    assert!(risk.risk_score >= 60.0);
    assert!(matches!(
        risk.recommendation,
        Recommendation::Forbidden | Recommendation::StronglyDiscouraged
    ));

    let mut store = rated(1500.0, 1500.0);
    store.upsert_injury(injury).unwrap();
    let engine = PredictionAggregator::new(store, EngineConfig::default());
    let r = engine.predict(&request()).unwrap();
    assert!(r.probability_a < 50.0);
    assert!(r.has_flag(|f| matches!(f, PredictionFlag::ParticipationRisk { side: Side::A, .. })));
}

#[test]
fn steam_move_on_heavy_volume_is_detected() {
    let mut store = rated(1500.0, 1500.0);
    let mut opening = snapshot(1.80, 2.00, 1.80, 2.00, 8_000.0);
    opening.timestamp = Utc::now() - Duration::hours(20);
    store.push_market_snapshot(opening).unwrap();
    store.push_market_snapshot(snapshot(1.20, 4.50, 1.80, 2.00, 60_000.0)).unwrap();

    let latest = store.get_latest_market_snapshot("final").unwrap();
    let engine = PredictionAggregator::new(store, EngineConfig::default());
    let tags = tennis_signal_engine::market::detect_anomalies(&latest, &engine.config().anomalies);
    assert!(tags.contains(&AnomalyTag::ExtremeMove));
    assert!(tags.contains(&AnomalyTag::SuspectVolume));

    let r = engine.predict(&request()).unwrap();
    assert!(r.has_flag(|f| *f == PredictionFlag::MarketAnomaly { tag: AnomalyTag::ExtremeMove }));
    assert!(r.factor_breakdown[&Factor::Market].weight < 0.10 / 0.55);
}

#[test]
fn old_data_caps_confidence() {
    let mut store = MemoryStore::default();
    let long_ago = Utc::now() - Duration::days(800);
    for i in 0..6 {
        let (winner, loser) = if i % 2 == 0 { (A, B) } else { (B, A) };
        store
            .record_completed(&CompletedMatch {
                match_id: format!("old{i}"),
                winner,
                loser,
                surface: Some(Surface::Clay),
                category: Category::Tour250,
                round: Round::First,
                played_at: long_ago + Duration::days(i),
            })
            .unwrap();
    }
    let engine = PredictionAggregator::new(store, EngineConfig::default());
    let r = engine.predict(&request()).unwrap();
    assert!(r.confidence <= 25);
    assert!(r.has_flag(|f| matches!(f, PredictionFlag::StaleData { .. })));
}

#[test]
fn hostile_crowd_is_surfaced_and_helps_the_favourite() {
    let mut store = rated(1500.0, 1500.0);
    store.set_environment(EnvironmentContext {
        support_pct_a: 90.0,
        support_pct_b: 10.0,
        ambiance_index: 90.0,
        crowd: CrowdMetrics {
            noise: 9.0,
            tension: 8.0,
            fill_pct: 98.0,
        },
        ..EnvironmentContext::neutral("final", Utc::now())
    });
    let engine = PredictionAggregator::new(store, EngineConfig::default());
    let r = engine.predict(&request()).unwrap();
    assert!(r.probability_a > 50.0);
    assert!(r.has_flag(|f| *f == PredictionFlag::HostileEnvironment { side: Side::B }));
}

#[test]
fn disciplinary_risk_lowers_confidence_not_probability() {
    let build = |sanctions: Vec<Sanction>| {
        let mut store = rated(1600.0, 1500.0);
        let now = Utc::now();
        store.record_sanctions(B, (now - Duration::days(365), now), 4, sanctions);
        PredictionAggregator::new(store, EngineConfig::default())
            .predict(&request())
            .unwrap()
    };
    let clean = build(vec![]);
    let messy = build(
        (0..5)
            .map(|i| Sanction {
                date: Utc::now() - Duration::days(3 + i),
                severity: 7,
                kind: SanctionKind::PointPenalty,
                category: SanctionCategory::RacketAbuse,
                tournament: Some(Category::GrandSlam),
                under_ranking_pressure: false,
            })
            .collect(),
    );
    assert_eq!(clean.probability_a, messy.probability_a);
    assert!(messy.confidence < clean.confidence);
}
