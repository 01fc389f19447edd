//! Change notifications pushed to every subscriber of a session
//!
//! Game logic publishes a [`SessionEvent`] after each committed change. The
//! network layer owns the receiving end of [`ChannelFanout`] and relays each
//! event to the clients bound to that session. Delivery is best effort:
//! subscribers that miss an event recover by requesting a fresh snapshot.

use log::debug;
use shared::{ChallengeView, Packet, Participant, ParticipantId, RoundResults, Session, SessionId};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The full session record changed
    SessionUpdated {
        session: Session,
        challenge: Option<ChallengeView>,
    },
    ParticipantsChanged {
        participants: Vec<Participant>,
    },
    GuessInserted {
        participant_id: ParticipantId,
        round: u32,
    },
    RoundSettled {
        results: RoundResults,
    },
}

impl SessionEvent {
    /// Wire form of this event, stamped with the server time it was sent at
    pub fn into_packet(self, server_time: u64) -> Packet {
        match self {
            SessionEvent::SessionUpdated { session, challenge } => Packet::SessionState {
                server_time,
                session,
                challenge,
            },
            SessionEvent::ParticipantsChanged { participants } => {
                Packet::Participants { participants }
            }
            SessionEvent::GuessInserted {
                participant_id,
                round,
            } => Packet::GuessInserted {
                participant_id,
                round,
            },
            SessionEvent::RoundSettled { results } => Packet::RoundResults { results },
        }
    }
}

pub trait NotificationFanout: Send + Sync {
    fn publish(&self, session_id: SessionId, event: SessionEvent);
}

/// One published event addressed to a session's subscribers
#[derive(Debug, Clone)]
pub struct Notification {
    pub session_id: SessionId,
    pub event: SessionEvent,
}

/// Fanout backed by an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelFanout {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelFanout {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationFanout for ChannelFanout {
    fn publish(&self, session_id: SessionId, event: SessionEvent) {
        if self.tx.send(Notification { session_id, event }).is_err() {
            debug!("Dropped event for session {}: no relay running", session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_published_events_reach_receiver_in_order() {
        let (fanout, mut rx) = ChannelFanout::new();
        let session_id = SessionId::new();
        let participant_id = ParticipantId::new();

        fanout.publish(
            session_id,
            SessionEvent::GuessInserted {
                participant_id,
                round: 1,
            },
        );
        fanout.publish(
            session_id,
            SessionEvent::ParticipantsChanged {
                participants: vec![],
            },
        );

        let first = rx.try_recv().unwrap();
        assert_eq!(first.session_id, session_id);
        assert!(matches!(first.event, SessionEvent::GuessInserted { round: 1, .. }));
        assert!(matches!(
            rx.try_recv().unwrap().event,
            SessionEvent::ParticipantsChanged { .. }
        ));
    }

    #[test]
    fn test_publish_without_receiver_does_not_panic() {
        let (fanout, rx) = ChannelFanout::new();
        drop(rx);
        fanout.publish(
            SessionId::new(),
            SessionEvent::ParticipantsChanged {
                participants: vec![],
            },
        );
    }

    #[test]
    fn test_event_to_packet() {
        let participant_id = ParticipantId::new();
        let packet = SessionEvent::GuessInserted {
            participant_id,
            round: 4,
        }
        .into_packet(0);

        match packet {
            Packet::GuessInserted {
                participant_id: p,
                round,
            } => {
                assert_eq!(p, participant_id);
                assert_eq!(round, 4);
            }
            _ => panic!("Unexpected packet type"),
        }
    }
}
