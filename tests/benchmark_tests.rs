//! Performance benchmarks for critical game systems

use assert_approx_eq::assert_approx_eq;
use server::catalog::{sample_challenges, InMemoryCatalog};
use server::clock::ManualClock;
use server::context::GameContext;
use server::fanout::ChannelFanout;
use server::game::GameStateMachine;
use server::store::InMemoryStore;
use shared::geo::{score_round, EARTH_RADIUS_KM};
use shared::{
    great_circle_distance, high_score_points, ChallengeId, Coordinate, Guess, GuessId,
    Participant, ParticipantId, RoundWindow, ScoringMode, SessionConfig, SessionId,
};
use std::sync::Arc;
use std::time::Instant;

/// Benchmarks great-circle distance computation
#[test]
fn benchmark_distance() {
    let a = Coordinate::new(48.8584, 2.2945);
    let b = Coordinate::new(-33.8568, 151.2153);

    let iterations = 100_000;
    let start = Instant::now();

    let mut total = 0.0;
    for i in 0..iterations {
        let shifted = Coordinate::new(a.lat, (a.lon + i as f64 * 0.001) % 180.0);
        total += great_circle_distance(shifted, b);
    }

    let duration = start.elapsed();
    println!(
        "Distance: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(total > 0.0);
    // Should complete in under 100ms for 100k iterations
    assert!(duration.as_millis() < 100);

    // the timed function still measures the right thing
    assert_approx_eq!(great_circle_distance(a, b), great_circle_distance(b, a), 1e-9);
    let quarter = great_circle_distance(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 90.0));
    assert_approx_eq!(quarter, std::f64::consts::FRAC_PI_2 * EARTH_RADIUS_KM, 1e-6);
}

/// Benchmarks the scoring pass for a full lobby in both modes
#[test]
fn benchmark_round_scoring() {
    let session_id = SessionId::new();
    let challenge_id = ChallengeId::new();
    let answer = Coordinate::new(41.7325, -49.9469);

    let participants: Vec<Participant> = shared::Color::PALETTE
        .iter()
        .enumerate()
        .map(|(i, color)| Participant {
            id: ParticipantId::new(),
            session_id,
            name: format!("p{}", i),
            score: 0,
            color: *color,
            joined_at: i as u64,
        })
        .collect();
    let guesses: Vec<Guess> = participants
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let coordinate = Coordinate::new(answer.lat - i as f64, answer.lon + i as f64);
            Guess {
                id: GuessId::new(),
                session_id,
                participant_id: p.id,
                challenge_id,
                round: 1,
                coordinate,
                distance_km: great_circle_distance(coordinate, answer),
                points: None,
                submitted_at: 0,
            }
        })
        .collect();

    let iterations = 10_000;
    let start = Instant::now();

    for i in 0..iterations {
        let mode = if i % 2 == 0 {
            ScoringMode::HighScore
        } else {
            ScoringMode::ClosestWins
        };
        let awards = score_round(mode, &participants, &guesses);
        assert_eq!(awards.len(), participants.len());
    }

    let duration = start.elapsed();
    println!(
        "Round scoring: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks point and countdown arithmetic used on every tick
#[test]
fn benchmark_points_and_countdown() {
    let window = RoundWindow::new(1_000_000, 15_000, 3_000);

    let iterations = 1_000_000;
    let start = Instant::now();

    let mut checksum = 0u64;
    for i in 0..iterations {
        checksum += high_score_points((i % 1500) as f64) as u64;
        checksum += window.remaining_secs(1_000_000 + (i % 20_000) as u64);
    }

    let duration = start.elapsed();
    println!(
        "Points and countdown: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(checksum > 0);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks a complete lobby-to-settlement cycle through the state machine
#[test]
fn benchmark_full_round_cycle() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let (fanout, _events) = ChannelFanout::new();
    let ctx = GameContext::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(InMemoryCatalog::with_challenges(sample_challenges())),
        Arc::new(fanout),
        clock,
    )
    .with_seed(42);
    let game = GameStateMachine::new(Arc::new(ctx));

    let sessions = 100;
    let start = Instant::now();

    tokio_test::block_on(async {
        for _ in 0..sessions {
            let (session, host) = game
                .create_session(SessionConfig::default(), "Host")
                .await
                .unwrap();
            let (_, guest) = game.join(&session.code, "Guest").await.unwrap();

            game.start_game(session.id, host.id).await.unwrap();
            game.begin_guessing(session.id, host.id).await.unwrap();
            game.submit_guess(session.id, host.id, 1, Coordinate::new(10.0, 10.0))
                .await
                .unwrap();
            game.submit_guess(session.id, guest.id, 1, Coordinate::new(-10.0, 20.0))
                .await
                .unwrap();

            let snapshot = game.snapshot(session.id).await.unwrap();
            assert!(snapshot.results.is_some());
        }
    });

    let duration = start.elapsed();
    println!(
        "Full round cycle: {} sessions in {:?} ({:.2} μs/session)",
        sessions,
        duration,
        duration.as_micros() as f64 / sessions as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}
