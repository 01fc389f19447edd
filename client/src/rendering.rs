//! Plain-text rendering of the client view

use crate::game::ClientView;
use shared::{Participant, ParticipantId, RoundResults, Status, WindowState};
use std::fmt::Write;

/// Marks the local player's line
fn marker(id: ParticipantId, me: Option<ParticipantId>) -> &'static str {
    if Some(id) == me {
        "*"
    } else {
        " "
    }
}

pub fn render_lobby(view: &ClientView) -> String {
    let mut out = String::new();
    let code = view.code.as_deref().unwrap_or("------");
    let _ = writeln!(out, "Lobby {} ({} players)", code, view.participants.len());
    let host = view.session.as_ref().map(|s| s.host_id);
    for p in &view.participants {
        let role = if Some(p.id) == host { " (host)" } else { "" };
        let _ = writeln!(
            out,
            "{} {:<20} {:<7}{}",
            marker(p.id, view.participant_id),
            p.name,
            p.color,
            role
        );
    }
    out
}

pub fn render_standings(participants: &[Participant], me: Option<ParticipantId>) -> String {
    let mut out = String::new();
    for (rank, p) in participants.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}{:>2}. {:<20} {:>6}",
            marker(p.id, me),
            rank + 1,
            p.name,
            p.score
        );
    }
    out
}

pub fn render_results(results: &RoundResults, me: Option<ParticipantId>) -> String {
    let mut out = String::new();
    let answer = &results.challenge;
    let _ = writeln!(
        out,
        "Round {}: {} ({}) at {}",
        results.round, answer.title, answer.year, answer.coordinate
    );
    if !answer.description.is_empty() {
        let _ = writeln!(out, "  {}", answer.description);
    }
    for score in &results.scores {
        let distance = match score.distance_km {
            Some(km) => format!("{:>9.1} km", km),
            None => format!("{:>12}", "no guess"),
        };
        let _ = writeln!(
            out,
            "{} {:<20} {}  +{:<5} total {}",
            marker(score.participant_id, me),
            score.name,
            distance,
            score.points,
            score.total
        );
    }
    out
}

/// One-line status shown on demand and on each countdown step
pub fn render_status(view: &ClientView, local_now: u64) -> String {
    let Some(session) = view.session.as_ref() else {
        return "not in a session".to_string();
    };
    match session.status {
        Status::Waiting => format!(
            "waiting for the host to start ({} players)",
            view.participants.len()
        ),
        Status::Finished => "game over".to_string(),
        Status::Playing => {
            let title = view
                .challenge
                .as_ref()
                .map(|c| c.title.as_str())
                .unwrap_or("?");
            match view.countdown(local_now) {
                None => format!("round {}: {} (guessing not open yet)", session.current_round, title),
                Some(WindowState::Open { remaining_ms }) => format!(
                    "round {}: {} ({}s left, {}/{} guessed)",
                    session.current_round,
                    title,
                    remaining_ms.div_ceil(1000),
                    view.guessed.len(),
                    view.participants.len()
                ),
                Some(WindowState::Grace { .. }) => {
                    format!("round {}: {} (time's up, scoring)", session.current_round, title)
                }
                Some(WindowState::Closed) => {
                    format!("round {}: {} (scored)", session.current_round, title)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{Challenge, ChallengeId, Color, Coordinate, RoundScore, SessionId};

    fn participant(name: &str, score: u32) -> Participant {
        Participant {
            id: ParticipantId::new(),
            session_id: SessionId::new(),
            name: name.to_string(),
            score,
            color: Color::Violet,
            joined_at: 0,
        }
    }

    #[test]
    fn test_standings_mark_local_player() {
        let a = participant("ada", 900);
        let b = participant("bob", 300);
        let out = render_standings(&[a.clone(), b], Some(a.id));

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("* 1. ada"));
        assert!(lines[1].starts_with("  2. bob"));
    }

    #[test]
    fn test_results_show_non_responders() {
        let me = ParticipantId::new();
        let results = RoundResults {
            round: 2,
            challenge: Challenge {
                id: ChallengeId::new(),
                title: "Moon Landing".to_string(),
                description: "Apollo 11".to_string(),
                image_url: String::new(),
                coordinate: Coordinate::new(28.5721, -80.648),
                year: 1969,
            },
            scores: vec![
                RoundScore {
                    participant_id: me,
                    name: "ada".to_string(),
                    color: Color::Blue,
                    guess: Some(Coordinate::new(28.0, -81.0)),
                    distance_km: Some(72.4),
                    points: 928,
                    total: 1500,
                },
                RoundScore {
                    participant_id: ParticipantId::new(),
                    name: "bob".to_string(),
                    color: Color::Gold,
                    guess: None,
                    distance_km: None,
                    points: 0,
                    total: 40,
                },
            ],
        };

        let out = render_results(&results, Some(me));
        assert!(out.starts_with("Round 2: Moon Landing (1969)"));
        assert!(out.contains("72.4 km"));
        assert!(out.contains("no guess"));
        assert!(out.contains("+0"));
    }

    #[test]
    fn test_status_without_session() {
        let view = ClientView::new();
        assert_eq!(render_status(&view, 0), "not in a session");
    }
}
