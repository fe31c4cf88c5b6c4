use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};

use tennis_signal_engine::elo::RatingStore;
use tennis_signal_engine::{Category, RatingSink, Round, Surface};

const THREADS: u32 = 8;
const MATCHES_PER_THREAD: u32 = 250;

#[test]
fn concurrent_updates_sharing_a_player_lose_nothing() {
    let store = Arc::new(RatingStore::default());
    let start = Utc::now();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let rival = t + 1;
                let mut delta_for_hub = 0.0;
                for i in 0..MATCHES_PER_THREAD {
                    let (winner, loser) = if (i + t) % 3 == 0 { (rival, 0) } else { (0, rival) };
                    let u = store
                        .update(
                            winner,
                            loser,
                            None,
                            Category::Tour250,
                            Round::First,
                            start + Duration::minutes(i as i64),
                        )
                        .unwrap();
                    delta_for_hub += if winner == 0 { u.winner_delta } else { u.loser_delta };
                }
                delta_for_hub
            })
        })
        .collect();

    let hub_delta: f64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let hub = store.rating(0, None);
    assert_eq!(hub.matches, THREADS * MATCHES_PER_THREAD);
    assert!((hub.rating - (1500.0 + hub_delta)).abs() < 1e-6);

    let total: f64 = (0..=THREADS).map(|p| store.get_rating(p, None)).sum();
    assert!((total - 1500.0 * (THREADS + 1) as f64).abs() < 1e-6);
    for rival in 1..=THREADS {
        assert_eq!(store.rating(rival, None).matches, MATCHES_PER_THREAD);
    }
}

#[test]
fn opposite_lock_orders_do_not_deadlock() {
    let store = Arc::new(RatingStore::default());
    let handles: Vec<_> = [(1, 2), (2, 1), (1, 2), (2, 1)]
        .into_iter()
        .map(|(w, l)| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..500 {
                    store
                        .update(
                            w,
                            l,
                            Some(Surface::Clay),
                            Category::Masters,
                            Round::Final,
                            Utc::now(),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(store.rating(1, Some(Surface::Clay)).matches, 2_000);
    let sum = store.get_rating(1, Some(Surface::Clay)) + store.get_rating(2, Some(Surface::Clay));
    assert!((sum - 3_000.0).abs() < 1e-6);
}

#[test]
fn external_deltas_respect_the_floor() {
    let store = RatingStore::default();
    store.apply_rating_update(7, None, -5_000.0).unwrap();
    assert_eq!(store.get_rating(7, None), store.config().min_rating);
    assert!(store.apply_rating_update(7, None, f64::NAN).is_err());
}
