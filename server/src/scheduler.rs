//! Server-side tracking of running guessing windows
//!
//! The countdown itself is the pure [`RoundWindow`] derivation shared with
//! the clients. This module only remembers which rounds are armed and turns
//! each window's progression into at most one grace notice and at most one
//! close per round. The server polls it on a fixed tick; polling more often
//! never changes the outcome.

use log::debug;
use shared::{RoundWindow, Session, SessionId, WindowState};
use std::collections::HashMap;

/// A transition observed by [`RoundScheduler::poll`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// The countdown reached zero; late submissions are still accepted
    GraceStarted { session_id: SessionId, round: u32 },
    /// The grace period elapsed; the round must settle
    Closed { session_id: SessionId, round: u32 },
}

#[derive(Debug, Clone, Copy)]
struct ArmedRound {
    round: u32,
    window: RoundWindow,
    grace_reported: bool,
}

#[derive(Debug, Default)]
pub struct RoundScheduler {
    armed: HashMap<SessionId, ArmedRound>,
}

impl RoundScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session's current guessing window, using the grace stamped on
    /// the session when it was created
    pub fn window_for(&self, session: &Session) -> Option<RoundWindow> {
        session.round_window()
    }

    /// Starts watching the session's current round. Re-arming replaces any
    /// earlier round of the same session.
    pub fn arm(&mut self, session: &Session) -> Option<RoundWindow> {
        let window = self.window_for(session)?;
        debug!(
            "Armed round {} of session {}: deadline {} closes {}",
            session.current_round,
            session.id,
            window.deadline(),
            window.closes_at()
        );
        self.armed.insert(
            session.id,
            ArmedRound {
                round: session.current_round,
                window,
                grace_reported: false,
            },
        );
        Some(window)
    }

    pub fn disarm(&mut self, session_id: SessionId) {
        self.armed.remove(&session_id);
    }

    pub fn is_armed(&self, session_id: SessionId) -> bool {
        self.armed.contains_key(&session_id)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Reports every transition reached by `now`. Closed rounds are removed,
    /// so each round yields `Closed` at most once.
    pub fn poll(&mut self, now: u64) -> Vec<WindowEvent> {
        let mut events = Vec::new();

        self.armed.retain(|session_id, armed| {
            match armed.window.state(now) {
                WindowState::Open { .. } => true,
                WindowState::Grace { .. } => {
                    if !armed.grace_reported {
                        armed.grace_reported = true;
                        events.push(WindowEvent::GraceStarted {
                            session_id: *session_id,
                            round: armed.round,
                        });
                    }
                    true
                }
                WindowState::Closed => {
                    events.push(WindowEvent::Closed {
                        session_id: *session_id,
                        round: armed.round,
                    });
                    false
                }
            }
        });

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ParticipantId, Phase, SessionConfig, Status, SETTLEMENT_GRACE_MS};

    fn guessing_session(started_at: u64) -> Session {
        Session {
            id: SessionId::new(),
            code: "ABC123".to_string(),
            host_id: ParticipantId::new(),
            status: Status::Playing,
            config: SessionConfig::default(),
            current_round: 1,
            phase: Phase::Guessing,
            phase_started_at: Some(started_at),
            current_challenge: None,
            used_challenges: Vec::new(),
            settled_round: 0,
            grace_ms: SETTLEMENT_GRACE_MS,
            created_at: 0,
        }
    }

    #[test]
    fn test_arm_requires_guessing_phase() {
        let mut scheduler = RoundScheduler::new();
        let mut session = guessing_session(0);
        session.phase = Phase::Showing;

        assert!(scheduler.arm(&session).is_none());
        assert_eq!(scheduler.armed_count(), 0);
    }

    #[test]
    fn test_close_fires_exactly_once() {
        let mut scheduler = RoundScheduler::new();
        let mut session = guessing_session(1_000);
        session.grace_ms = 3_000;
        scheduler.arm(&session);

        // 15s budget + 3s grace
        assert!(scheduler.poll(10_000).is_empty());
        assert_eq!(
            scheduler.poll(16_000),
            vec![WindowEvent::GraceStarted {
                session_id: session.id,
                round: 1
            }]
        );
        assert!(scheduler.poll(17_000).is_empty());
        assert_eq!(
            scheduler.poll(19_000),
            vec![WindowEvent::Closed {
                session_id: session.id,
                round: 1
            }]
        );
        assert!(scheduler.poll(19_100).is_empty());
        assert!(scheduler.poll(60_000).is_empty());
        assert!(!scheduler.is_armed(session.id));
    }

    #[test]
    fn test_late_poll_skips_straight_to_closed() {
        let mut scheduler = RoundScheduler::new();
        let session = guessing_session(0);
        scheduler.arm(&session);

        let events = scheduler.poll(1_000_000);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], WindowEvent::Closed { round: 1, .. }));
    }

    #[test]
    fn test_disarm_cancels() {
        let mut scheduler = RoundScheduler::new();
        let session = guessing_session(0);
        scheduler.arm(&session);
        scheduler.disarm(session.id);
        assert!(scheduler.poll(1_000_000).is_empty());
    }

    #[test]
    fn test_window_for_uses_session_grace() {
        let scheduler = RoundScheduler::new();
        let mut session = guessing_session(0);
        session.grace_ms = 500;
        let window = scheduler.window_for(&session).unwrap();
        assert_eq!(window.closes_at(), 15_500);

        // a session created under another grace keeps its own
        session.grace_ms = 8_000;
        let window = scheduler.window_for(&session).unwrap();
        assert_eq!(window.closes_at(), 23_000);
    }
}
