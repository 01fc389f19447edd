//! Persistence contract for sessions, participants and guesses
//!
//! The game logic only talks to [`SessionStore`]. The store owns the
//! uniqueness rules that must hold even when two requests race:
//! - join codes are unique across live sessions
//! - participant names are unique per session, compared case-insensitively
//! - at most one guess per (session, participant, round)
//! - a round's scoring pass is claimed at most once via [`SessionStore::mark_round_settled`]
//!
//! Deleting a session removes its participants and guesses with it.
//! [`InMemoryStore`] is the implementation the server ships with.

use async_trait::async_trait;
use log::debug;
use shared::{
    ChallengeId, Color, Coordinate, Guess, GuessId, Participant, ParticipantId, Phase, Session,
    SessionConfig, SessionId, Status,
};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Fields for a freshly created session. Everything else starts at its
/// waiting-room default.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub code: String,
    pub host_id: ParticipantId,
    pub config: SessionConfig,
    pub grace_ms: u64,
    pub created_at: u64,
}

#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub id: ParticipantId,
    pub session_id: SessionId,
    pub name: String,
    pub color: Color,
    pub joined_at: u64,
}

#[derive(Debug, Clone)]
pub struct NewGuess {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub challenge_id: ChallengeId,
    pub round: u32,
    pub coordinate: Coordinate,
    pub distance_km: f64,
    pub submitted_at: u64,
}

/// Partial update of a session's mutable fields. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub status: Option<Status>,
    pub current_round: Option<u32>,
    pub phase: Option<Phase>,
    pub phase_started_at: Option<Option<u64>>,
    pub current_challenge: Option<Option<ChallengeId>>,
    pub used_challenges: Option<Vec<ChallengeId>>,
}

impl SessionPatch {
    fn apply(self, session: &mut Session) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(round) = self.current_round {
            session.current_round = round;
        }
        if let Some(phase) = self.phase {
            session.phase = phase;
        }
        if let Some(started_at) = self.phase_started_at {
            session.phase_started_at = started_at;
        }
        if let Some(challenge) = self.current_challenge {
            session.current_challenge = challenge;
        }
        if let Some(used) = self.used_challenges {
            session.used_challenges = used;
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError>;

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError>;

    async fn get_session_by_code(&self, code: &str) -> Result<Option<Session>, StoreError>;

    async fn update_session(
        &self,
        id: SessionId,
        patch: SessionPatch,
    ) -> Result<Session, StoreError>;

    /// Removes the session and everything that belongs to it.
    /// Returns false if it was already gone.
    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError>;

    async fn add_participant(&self, new: NewParticipant) -> Result<Participant, StoreError>;

    async fn get_participant(
        &self,
        session_id: SessionId,
        id: ParticipantId,
    ) -> Result<Option<Participant>, StoreError>;

    /// Participants in join order
    async fn list_participants(&self, session_id: SessionId)
        -> Result<Vec<Participant>, StoreError>;

    async fn add_participant_score(
        &self,
        session_id: SessionId,
        id: ParticipantId,
        points: u32,
    ) -> Result<Participant, StoreError>;

    async fn update_participant_color(
        &self,
        session_id: SessionId,
        id: ParticipantId,
        color: Color,
    ) -> Result<Participant, StoreError>;

    /// Fails with `Conflict` if the participant already guessed this round
    async fn insert_guess(&self, new: NewGuess) -> Result<Guess, StoreError>;

    /// Guesses for one round in submission order
    async fn list_guesses(&self, session_id: SessionId, round: u32)
        -> Result<Vec<Guess>, StoreError>;

    async fn set_guess_points(
        &self,
        session_id: SessionId,
        guess_id: GuessId,
        points: u32,
    ) -> Result<Guess, StoreError>;

    /// Claims the scoring pass for `round`. Returns true for exactly one
    /// caller per round; the session's settled marker never moves backwards.
    async fn mark_round_settled(&self, session_id: SessionId, round: u32)
        -> Result<bool, StoreError>;
}

#[derive(Debug)]
struct SessionRecord {
    session: Session,
    participants: Vec<Participant>,
    guesses: Vec<Guess>,
}

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<SessionId, SessionRecord>,
    codes: HashMap<String, SessionId>,
}

impl Tables {
    fn record(&self, id: SessionId) -> Result<&SessionRecord, StoreError> {
        self.sessions
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", id)))
    }

    fn record_mut(&mut self, id: SessionId) -> Result<&mut SessionRecord, StoreError> {
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", id)))
    }
}

fn participant_mut(
    record: &mut SessionRecord,
    id: ParticipantId,
) -> Result<&mut Participant, StoreError> {
    record
        .participants
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| StoreError::NotFound(format!("participant {}", id)))
}

/// Process-local store backed by a single `RwLock`
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn create_session(&self, new: NewSession) -> Result<Session, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.codes.contains_key(&new.code) {
            return Err(StoreError::Conflict(format!("join code {} in use", new.code)));
        }

        let session = Session {
            id: SessionId::new(),
            code: new.code.clone(),
            host_id: new.host_id,
            status: Status::Waiting,
            config: new.config,
            current_round: 0,
            phase: Phase::Showing,
            phase_started_at: None,
            current_challenge: None,
            used_challenges: Vec::new(),
            settled_round: 0,
            grace_ms: new.grace_ms,
            created_at: new.created_at,
        };

        tables.codes.insert(new.code, session.id);
        tables.sessions.insert(
            session.id,
            SessionRecord {
                session: session.clone(),
                participants: Vec::new(),
                guesses: Vec::new(),
            },
        );
        Ok(session)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.sessions.get(&id).map(|r| r.session.clone()))
    }

    async fn get_session_by_code(&self, code: &str) -> Result<Option<Session>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .codes
            .get(code)
            .and_then(|id| tables.sessions.get(id))
            .map(|r| r.session.clone()))
    }

    async fn update_session(
        &self,
        id: SessionId,
        patch: SessionPatch,
    ) -> Result<Session, StoreError> {
        let mut tables = self.tables.write().await;
        let record = tables.record_mut(id)?;

        if let Some(used) = &patch.used_challenges {
            let mut seen = std::collections::HashSet::new();
            if !used.iter().all(|c| seen.insert(*c)) {
                return Err(StoreError::Conflict(
                    "used challenge list holds a duplicate".to_string(),
                ));
            }
        }

        patch.apply(&mut record.session);
        Ok(record.session.clone())
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.sessions.remove(&id) {
            Some(record) => {
                tables.codes.remove(&record.session.code);
                debug!(
                    "Deleted session {} with {} participants and {} guesses",
                    id,
                    record.participants.len(),
                    record.guesses.len()
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_participant(&self, new: NewParticipant) -> Result<Participant, StoreError> {
        let mut tables = self.tables.write().await;
        let record = tables.record_mut(new.session_id)?;

        let lowered = new.name.to_lowercase();
        if record
            .participants
            .iter()
            .any(|p| p.name.to_lowercase() == lowered)
        {
            return Err(StoreError::Conflict(format!("name {} in use", new.name)));
        }
        if record.participants.iter().any(|p| p.id == new.id) {
            return Err(StoreError::Conflict(format!("participant {} exists", new.id)));
        }

        let participant = Participant {
            id: new.id,
            session_id: new.session_id,
            name: new.name,
            score: 0,
            color: new.color,
            joined_at: new.joined_at,
        };
        record.participants.push(participant.clone());
        Ok(participant)
    }

    async fn get_participant(
        &self,
        session_id: SessionId,
        id: ParticipantId,
    ) -> Result<Option<Participant>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sessions
            .get(&session_id)
            .and_then(|r| r.participants.iter().find(|p| p.id == id))
            .cloned())
    }

    async fn list_participants(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<Participant>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.record(session_id)?.participants.clone())
    }

    async fn add_participant_score(
        &self,
        session_id: SessionId,
        id: ParticipantId,
        points: u32,
    ) -> Result<Participant, StoreError> {
        let mut tables = self.tables.write().await;
        let participant = participant_mut(tables.record_mut(session_id)?, id)?;
        participant.score = participant.score.saturating_add(points);
        Ok(participant.clone())
    }

    async fn update_participant_color(
        &self,
        session_id: SessionId,
        id: ParticipantId,
        color: Color,
    ) -> Result<Participant, StoreError> {
        let mut tables = self.tables.write().await;
        let participant = participant_mut(tables.record_mut(session_id)?, id)?;
        participant.color = color;
        Ok(participant.clone())
    }

    async fn insert_guess(&self, new: NewGuess) -> Result<Guess, StoreError> {
        let mut tables = self.tables.write().await;
        let record = tables.record_mut(new.session_id)?;

        if record
            .guesses
            .iter()
            .any(|g| g.participant_id == new.participant_id && g.round == new.round)
        {
            return Err(StoreError::Conflict(format!(
                "participant {} already guessed in round {}",
                new.participant_id, new.round
            )));
        }

        let guess = Guess {
            id: GuessId::new(),
            session_id: new.session_id,
            participant_id: new.participant_id,
            challenge_id: new.challenge_id,
            round: new.round,
            coordinate: new.coordinate,
            distance_km: new.distance_km,
            points: None,
            submitted_at: new.submitted_at,
        };
        record.guesses.push(guess.clone());
        Ok(guess)
    }

    async fn list_guesses(
        &self,
        session_id: SessionId,
        round: u32,
    ) -> Result<Vec<Guess>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .record(session_id)?
            .guesses
            .iter()
            .filter(|g| g.round == round)
            .cloned()
            .collect())
    }

    async fn set_guess_points(
        &self,
        session_id: SessionId,
        guess_id: GuessId,
        points: u32,
    ) -> Result<Guess, StoreError> {
        let mut tables = self.tables.write().await;
        let guess = tables
            .record_mut(session_id)?
            .guesses
            .iter_mut()
            .find(|g| g.id == guess_id)
            .ok_or_else(|| StoreError::NotFound(format!("guess {}", guess_id)))?;
        guess.points = Some(points);
        Ok(guess.clone())
    }

    async fn mark_round_settled(
        &self,
        session_id: SessionId,
        round: u32,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let session = &mut tables.record_mut(session_id)?.session;

        if round == 0 || round > session.current_round || session.settled_round >= round {
            return Ok(false);
        }
        session.settled_round = round;
        Ok(true)
    }
}
