//! Deterministic synthetic seasons for benches, backtests and tests.
//!
//! Every player gets a hidden skill; results are drawn from the ELO curve of the hidden skills,
//! so a well-behaved engine should recover the ordering.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::behavior::{Sanction, SanctionCategory, SanctionKind};
use crate::config::EngineConfig;
use crate::data_source::MemoryStore;
use crate::elo::expected_score;
use crate::environment::{CrowdMetrics, EnvironmentContext, Weather};
use crate::form::{FormEntry, Outcome, SetPattern};
use crate::injury::{BodyZone, ImpactVector, InjuryPhase, InjuryRecord};
use crate::market::MarketSnapshot;
use crate::model::{Category, CompletedMatch, MatchRequest, PlayerId, Round, Surface};

const CATEGORIES: [Category; 5] = [
    Category::GrandSlam,
    Category::Masters,
    Category::Tour500,
    Category::Tour250,
    Category::Challenger,
];
const ROUNDS: [Round; 6] = [
    Round::First,
    Round::Second,
    Round::Third,
    Round::QuarterFinal,
    Round::SemiFinal,
    Round::Final,
];
const ZONES: [BodyZone; 5] = [
    BodyZone::Knee,
    BodyZone::Ankle,
    BodyZone::Shoulder,
    BodyZone::Back,
    BodyZone::Wrist,
];

#[derive(Debug, Clone, Copy)]
pub struct SeasonSpec {
    pub seed: u64,
    pub players: u32,
    pub history_matches: usize,
    pub upcoming_matches: usize,
}

impl Default for SeasonSpec {
    fn default() -> Self {
        Self {
            seed: 7,
            players: 64,
            history_matches: 2_000,
            upcoming_matches: 200,
        }
    }
}

pub struct FakeSeason {
    pub store: MemoryStore,
    pub history: Vec<CompletedMatch>,
    pub upcoming: Vec<MatchRequest>,
    /// Winner of each upcoming match, drawn from the hidden skills.
    pub winners: Vec<PlayerId>,
    pub skills: Vec<f64>,
    pub season_end: DateTime<Utc>,
}

pub fn season_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn rank_of(skills: &[f64], player: PlayerId) -> u32 {
    let own = skills[player as usize];
    1 + skills.iter().filter(|s| **s > own).count() as u32
}

fn pair(rng: &mut StdRng, players: u32) -> (PlayerId, PlayerId) {
    let a = rng.gen_range(0..players);
    let mut b = rng.gen_range(0..players - 1);
    if b >= a {
        b += 1;
    }
    (a, b)
}

fn pick<T: Copy>(rng: &mut StdRng, items: &[T]) -> T {
    items[rng.gen_range(0..items.len())]
}

pub fn synthetic_season(spec: SeasonSpec, cfg: &EngineConfig) -> FakeSeason {
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let players = spec.players.max(2);
    let skills: Vec<f64> = (0..players).map(|_| rng.gen_range(1250.0..1950.0)).collect();
    let mut store = MemoryStore::new(cfg);
    let start = season_start();
    let mut history = Vec::with_capacity(spec.history_matches);

    for i in 0..spec.history_matches {
        let (a, b) = pair(&mut rng, players);
        let p_a = expected_score(skills[a as usize], skills[b as usize]);
        let (winner, loser) = if rng.gen_bool(p_a) { (a, b) } else { (b, a) };
        let played_at = start + Duration::hours(4 * i as i64);
        let m = CompletedMatch {
            match_id: format!("h{i}"),
            winner,
            loser,
            surface: Some(pick(&mut rng, &Surface::ALL)),
            category: pick(&mut rng, &CATEGORIES),
            round: pick(&mut rng, &ROUNDS),
            played_at,
        };
        let Ok(update) = store.record_completed(&m) else {
            continue;
        };

        let pattern = match rng.gen_range(0..20) {
            0 => SetPattern::Retired,
            1..=6 => SetPattern::DecidingSet,
            7 => SetPattern::Marathon,
            _ => SetPattern::StraightSets,
        };
        for (player, opponent, outcome, delta) in [
            (winner, loser, Outcome::Win, update.winner_delta),
            (loser, winner, Outcome::Loss, update.loser_delta),
        ] {
            store.record_form(
                player,
                FormEntry {
                    opponent_rank: Some(rank_of(&skills, opponent)),
                    player_rank: Some(rank_of(&skills, player)),
                    outcome,
                    set_pattern: pattern,
                    elo_delta: delta,
                    played_at,
                },
            );
        }
        history.push(m);
    }
    let season_end = start + Duration::hours(4 * spec.history_matches as i64);

    for player in 0..players {
        if rng.gen_bool(0.15) {
            let record = InjuryRecord {
                injury_id: player as u64,
                player_id: player,
                zone: pick(&mut rng, &ZONES),
                severity: rng.gen_range(1..=9),
                impact_vector: ImpactVector::default(),
                pain_level: rng.gen_range(0.0..8.0),
                recurrence_count: rng.gen_range(0..3),
                phase: if rng.gen_bool(0.3) {
                    InjuryPhase::Acute
                } else {
                    InjuryPhase::Recovering
                },
                onset_date: season_end - Duration::days(rng.gen_range(1..40)),
                expected_duration_days: rng.gen_range(7..60),
                recovered_at: None,
            };
            // Generated severities are in range, so this cannot be rejected.
            let _ = store.upsert_injury(record);
        }
        let sanctions: Vec<Sanction> = (0..rng.gen_range(0..4))
            .map(|_| Sanction {
                date: season_end - Duration::days(rng.gen_range(0..300)),
                severity: rng.gen_range(1..=8),
                kind: SanctionKind::Warning,
                category: pick(
                    &mut rng,
                    &[
                        SanctionCategory::Verbal,
                        SanctionCategory::RacketAbuse,
                        SanctionCategory::TimeViolation,
                    ],
                ),
                tournament: Some(pick(&mut rng, &CATEGORIES)),
                under_ranking_pressure: rng.gen_bool(0.3),
            })
            .collect();
        store.record_sanctions(
            player,
            (season_end - Duration::days(365), season_end),
            rng.gen_range(1..18),
            sanctions,
        );
    }

    let mut upcoming = Vec::with_capacity(spec.upcoming_matches);
    let mut winners = Vec::with_capacity(spec.upcoming_matches);
    for i in 0..spec.upcoming_matches {
        let (a, b) = pair(&mut rng, players);
        let id = format!("u{i}");
        let p_a = expected_score(skills[a as usize], skills[b as usize]);

        if rng.gen_bool(0.8) {
            let noisy = (p_a + rng.gen_range(-0.05..0.05)).clamp(0.05, 0.95);
            let margin = 1.05;
            let odds_a = 1.0 / (noisy * margin);
            let odds_b = 1.0 / ((1.0 - noisy) * margin);
            let drift = rng.gen_range(0.9..1.1);
            let share_a = rng.gen_range(20.0..80.0);
            let _ = store.push_market_snapshot(MarketSnapshot {
                match_id: id.clone(),
                odds_a: odds_a.max(1.01),
                odds_b: odds_b.max(1.01),
                odds_a_open: (odds_a * drift).max(1.01),
                odds_b_open: (odds_b / drift).max(1.01),
                volume: rng.gen_range(500.0..70_000.0),
                pct_bets_a: share_a,
                pct_bets_b: 100.0 - share_a,
                timestamp: season_end,
            });
        }
        if rng.gen_bool(0.5) {
            let support_a = rng.gen_range(10.0..90.0);
            store.set_environment(EnvironmentContext {
                match_id: id.clone(),
                support_pct_a: support_a,
                support_pct_b: 100.0 - support_a,
                ambiance_index: rng.gen_range(20.0..100.0),
                crowd: CrowdMetrics {
                    noise: rng.gen_range(2.0..10.0),
                    tension: rng.gen_range(2.0..10.0),
                    fill_pct: rng.gen_range(40.0..100.0),
                },
                weather: Some(Weather {
                    temperature_c: rng.gen_range(12.0..38.0),
                    humidity_pct: rng.gen_range(30.0..90.0),
                    wind_kmh: rng.gen_range(0.0..35.0),
                }),
                altitude_m: if rng.gen_bool(0.1) { 2_200.0 } else { 50.0 },
                recorded_at: season_end,
            });
        }

        let category = pick(&mut rng, &CATEGORIES);
        let round = pick(&mut rng, &ROUNDS);
        let req = MatchRequest::new(id, a, b)
            .on(pick(&mut rng, &Surface::ALL))
            .at(category, round)
            .lasting(if category == Category::GrandSlam { 180 } else { 100 });
        winners.push(if rng.gen_bool(p_a) { a } else { b });
        upcoming.push(req);
    }

    debug!(
        players,
        history = history.len(),
        upcoming = upcoming.len(),
        "synthetic season generated"
    );
    FakeSeason {
        store,
        history,
        upcoming,
        winners,
        skills,
        season_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::SignalSource;

    fn small() -> SeasonSpec {
        SeasonSpec {
            seed: 11,
            players: 12,
            history_matches: 300,
            upcoming_matches: 20,
        }
    }

    #[test]
    fn same_seed_same_season() {
        let cfg = EngineConfig::default();
        let a = synthetic_season(small(), &cfg);
        let b = synthetic_season(small(), &cfg);
        assert_eq!(a.skills, b.skills);
        assert_eq!(a.winners, b.winners);
        assert_eq!(a.history.len(), 300);
        assert_eq!(a.upcoming.len(), 20);
    }

    #[test]
    fn strongest_player_ends_above_weakest() {
        let cfg = EngineConfig::default();
        let season = synthetic_season(small(), &cfg);
        let best = (0..12).max_by(|x, y| season.skills[*x].total_cmp(&season.skills[*y])).unwrap();
        let worst = (0..12).min_by(|x, y| season.skills[*x].total_cmp(&season.skills[*y])).unwrap();
        let r = |p: usize| season.store.get_player_rating(p as PlayerId, None).unwrap().rating;
        assert!(r(best) > r(worst));
        assert!(season.store.get_form_window(best as PlayerId, 20).is_some());
    }
}
