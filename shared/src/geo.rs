//! Great-circle distance and point awards
//!
//! Pure functions only. The server runs them when a round settles and the
//! client reuses them to preview how far a pin is from the answer once the
//! answer is revealed.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::{Guess, GuessId, Participant, ParticipantId, ScoringMode};
use crate::Coordinate;

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Points awarded for a perfect guess in high-score mode
pub const HIGH_SCORE_MAX_POINTS: f64 = 1000.0;

/// Haversine distance between two coordinates in kilometers.
///
/// The haversine term is clamped to [0, 1] so rounding near antipodal points
/// or the poles never pushes `asin` outside its domain.
pub fn great_circle_distance(a: Coordinate, b: Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let half_dlat = (lat2 - lat1) / 2.0;
    let half_dlon = (b.lon - a.lon).to_radians() / 2.0;

    let h = half_dlat.sin().powi(2) + lat1.cos() * lat2.cos() * half_dlon.sin().powi(2);
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// `max(0, round(1000 - distance_km))`
pub fn high_score_points(distance_km: f64) -> u32 {
    let points = (HIGH_SCORE_MAX_POINTS - distance_km).round();
    if points.is_nan() || points <= 0.0 {
        0
    } else {
        points as u32
    }
}

/// Points one participant earns from a scoring pass
#[derive(Debug, Clone, PartialEq)]
pub struct Award {
    pub participant_id: ParticipantId,
    /// `None` for participants who did not guess
    pub guess_id: Option<GuessId>,
    pub distance_km: Option<f64>,
    pub points: u32,
}

/// Scores one round.
///
/// Returns one award per participant, in participant order. Participants
/// without a guess get an explicit zero award.
pub fn score_round(mode: ScoringMode, participants: &[Participant], guesses: &[Guess]) -> Vec<Award> {
    let by_participant: HashMap<ParticipantId, &Guess> =
        guesses.iter().map(|g| (g.participant_id, g)).collect();

    let winner = match mode {
        ScoringMode::ClosestWins => closest_guess(guesses).map(|g| g.id),
        ScoringMode::HighScore => None,
    };

    participants
        .iter()
        .map(|participant| match by_participant.get(&participant.id) {
            Some(guess) => {
                let points = match mode {
                    ScoringMode::HighScore => high_score_points(guess.distance_km),
                    ScoringMode::ClosestWins if winner == Some(guess.id) => 1,
                    ScoringMode::ClosestWins => 0,
                };
                Award {
                    participant_id: participant.id,
                    guess_id: Some(guess.id),
                    distance_km: Some(guess.distance_km),
                    points,
                }
            }
            None => Award {
                participant_id: participant.id,
                guess_id: None,
                distance_km: None,
                points: 0,
            },
        })
        .collect()
}

/// Smallest distance wins; ties go to the earliest submission, then the lower id
pub fn closest_guess(guesses: &[Guess]) -> Option<&Guess> {
    guesses.iter().min_by(|a, b| compare_closeness(a, b))
}

fn compare_closeness(a: &Guess, b: &Guess) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then(a.submitted_at.cmp(&b.submitted_at))
        .then(a.participant_id.cmp(&b.participant_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChallengeId, Color, SessionId};
    use assert_approx_eq::assert_approx_eq;

    const PARIS: Coordinate = Coordinate {
        lat: 48.8566,
        lon: 2.3522,
    };
    const LONDON: Coordinate = Coordinate {
        lat: 51.5074,
        lon: -0.1278,
    };

    fn participant(name: &str) -> Participant {
        Participant {
            id: ParticipantId::new(),
            session_id: SessionId::new(),
            name: name.to_string(),
            score: 0,
            color: Color::Blue,
            joined_at: 0,
        }
    }

    fn guess_for(participant: &Participant, distance_km: f64, submitted_at: u64) -> Guess {
        Guess {
            id: GuessId::new(),
            session_id: participant.session_id,
            participant_id: participant.id,
            challenge_id: ChallengeId::new(),
            round: 1,
            coordinate: Coordinate::new(0.0, 0.0),
            distance_km,
            points: None,
            submitted_at,
        }
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(great_circle_distance(PARIS, PARIS), 0.0);
        let pole = Coordinate::new(90.0, 0.0);
        assert_eq!(great_circle_distance(pole, pole), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let pairs = [
            (PARIS, LONDON),
            (Coordinate::new(-33.86, 151.2), Coordinate::new(40.71, -74.0)),
            (Coordinate::new(89.9, 10.0), Coordinate::new(-89.9, -170.0)),
        ];
        for (a, b) in pairs {
            assert_eq!(great_circle_distance(a, b), great_circle_distance(b, a));
        }
    }

    #[test]
    fn test_known_distance() {
        assert_approx_eq!(great_circle_distance(PARIS, LONDON), 343.5, 1.0);
    }

    #[test]
    fn test_antipodal_and_polar_points_are_stable() {
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_KM;

        let d = great_circle_distance(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 180.0));
        assert!(d.is_finite());
        assert_approx_eq!(d, half_circumference, 0.01);

        let d = great_circle_distance(Coordinate::new(90.0, 0.0), Coordinate::new(-90.0, 45.0));
        assert!(d.is_finite());
        assert_approx_eq!(d, half_circumference, 0.01);
    }

    #[test]
    fn test_high_score_points() {
        assert_eq!(high_score_points(0.0), 1000);
        assert_eq!(high_score_points(250.0), 750);
        assert_eq!(high_score_points(999.4), 1);
        assert_eq!(high_score_points(1000.0), 0);
        assert_eq!(high_score_points(12_000.0), 0);
    }

    #[test]
    fn test_high_score_round_gives_everyone_points() {
        let a = participant("a");
        let b = participant("b");
        let silent = participant("silent");
        let guesses = vec![guess_for(&a, 100.0, 10), guess_for(&b, 1500.0, 5)];

        let awards = score_round(ScoringMode::HighScore, &[a, b, silent], &guesses);

        assert_eq!(awards.len(), 3);
        assert_eq!(awards[0].points, 900);
        assert_eq!(awards[1].points, 0);
        assert_eq!(awards[2].points, 0);
        assert!(awards[2].guess_id.is_none());
    }

    #[test]
    fn test_closest_wins_single_point() {
        let players: Vec<Participant> = ["a", "b", "c"].iter().map(|n| participant(n)).collect();
        let guesses = vec![
            guess_for(&players[0], 800.0, 1),
            guess_for(&players[1], 200.0, 2),
            guess_for(&players[2], 500.0, 3),
        ];

        let awards = score_round(ScoringMode::ClosestWins, &players, &guesses);
        let points: Vec<u32> = awards.iter().map(|a| a.points).collect();

        assert_eq!(points, vec![0, 1, 0]);
    }

    #[test]
    fn test_closest_wins_tie_goes_to_earliest() {
        let players: Vec<Participant> = ["early", "late"].iter().map(|n| participant(n)).collect();
        let guesses = vec![
            guess_for(&players[1], 42.0, 2_000),
            guess_for(&players[0], 42.0, 1_000),
        ];

        let awards = score_round(ScoringMode::ClosestWins, &players, &guesses);

        assert_eq!(awards[0].points, 1);
        assert_eq!(awards[1].points, 0);
    }

    #[test]
    fn test_closest_wins_without_guesses() {
        let players = vec![participant("a")];
        let awards = score_round(ScoringMode::ClosestWins, &players, &[]);
        assert_eq!(awards[0].points, 0);
        assert!(closest_guess(&[]).is_none());
    }
}
