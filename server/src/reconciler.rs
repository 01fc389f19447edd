//! Guess intake and the per-round scoring pass
//!
//! A round settles when every current participant has guessed or when its
//! guessing window closes, whichever comes first. Either path ends in
//! [`GuessReconciler::settle_locked`], and the store's conditional
//! `mark_round_settled` write lets only one of them run the scoring pass.

use log::{debug, info, warn};
use shared::geo::score_round;
use shared::{
    great_circle_distance, Coordinate, Guess, ParticipantId, RoundResults, RoundScore, Session,
    SessionId,
};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use crate::context::GameContext;
use crate::error::{GameError, GameResult, StoreError};
use crate::fanout::SessionEvent;
use crate::store::NewGuess;

#[derive(Clone)]
pub struct GuessReconciler {
    ctx: Arc<GameContext>,
}

impl GuessReconciler {
    pub fn new(ctx: Arc<GameContext>) -> Self {
        Self { ctx }
    }

    /// Records a participant's guess for `round`.
    ///
    /// The guess is stored with its distance to the answer and unresolved
    /// points. If it was the last outstanding guess the round settles before
    /// this returns.
    pub async fn submit(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        round: u32,
        coordinate: Coordinate,
    ) -> GameResult<Guess> {
        let _guard = self.ctx.locks.acquire(session_id).await;
        let store = &self.ctx.store;

        let session = store
            .get_session(session_id)
            .await?
            .ok_or(GameError::NotFound("session"))?;
        let participant = store
            .get_participant(session_id, participant_id)
            .await?
            .ok_or(GameError::NotFound("participant"))?;

        if !coordinate.is_valid() {
            return Err(GameError::InvalidCoordinate(coordinate));
        }

        let now = self.ctx.now_ms();
        self.check_window(&session, round, now).await?;

        let existing = store.list_guesses(session_id, round).await?;
        if existing.iter().any(|g| g.participant_id == participant.id) {
            return Err(GameError::DuplicateGuess {
                participant: participant.id,
                round,
            });
        }

        let challenge_id = session
            .current_challenge
            .ok_or(GameError::NotFound("challenge"))?;
        let challenge = self
            .ctx
            .catalog
            .get_challenge(challenge_id)
            .await?
            .ok_or(GameError::NotFound("challenge"))?;
        let distance_km = great_circle_distance(coordinate, challenge.coordinate);

        let guess = match store
            .insert_guess(NewGuess {
                session_id,
                participant_id: participant.id,
                challenge_id,
                round,
                coordinate,
                distance_km,
                submitted_at: now,
            })
            .await
        {
            Ok(guess) => guess,
            Err(StoreError::Conflict(_)) => {
                return Err(GameError::DuplicateGuess {
                    participant: participant.id,
                    round,
                })
            }
            Err(e) => return Err(e.into()),
        };

        debug!(
            "{} guessed {} in round {} of session {} ({:.1} km off)",
            participant.name, coordinate, round, session_id, distance_km
        );
        self.ctx.fanout.publish(
            session_id,
            SessionEvent::GuessInserted {
                participant_id: participant.id,
                round,
            },
        );

        // The guess is stored; a failed early settlement is left to the deadline poll.
        if let Err(e) = self.settle_if_complete(&session, &existing, &guess).await {
            warn!(
                "Round {} of session {} not settled after last guess: {}",
                round, session_id, e
            );
        }

        Ok(guess)
    }

    async fn settle_if_complete(
        &self,
        session: &Session,
        existing: &[Guess],
        latest: &Guess,
    ) -> GameResult<()> {
        let participants = self.ctx.store.list_participants(session.id).await?;
        let guessed: HashSet<ParticipantId> = existing
            .iter()
            .map(|g| g.participant_id)
            .chain(std::iter::once(latest.participant_id))
            .collect();
        if participants.iter().all(|p| guessed.contains(&p.id)) {
            info!(
                "All {} participants guessed round {} of session {}",
                participants.len(),
                session.current_round,
                session.id
            );
            self.settle_locked(session).await?;
        }
        Ok(())
    }

    async fn check_window(&self, session: &Session, round: u32, now: u64) -> GameResult<()> {
        if !session.is_guessing() {
            return Err(GameError::Phase("the round is not open for guessing".to_string()));
        }
        if round != session.current_round {
            return Err(GameError::Phase(format!(
                "round {} is not the current round {}",
                round, session.current_round
            )));
        }
        if session.is_round_settled() {
            return Err(GameError::Phase(format!("round {} is already scored", round)));
        }

        let window = self.ctx.scheduler.lock().await.window_for(session);
        match window {
            Some(window) if !window.is_closed(now) => Ok(()),
            _ => Err(GameError::Phase(format!(
                "the guessing window for round {} has closed",
                round
            ))),
        }
    }

    /// Settles `round` after its window closed. Does nothing if the session
    /// has already moved on or the round was scored.
    pub async fn settle_expired(
        &self,
        session_id: SessionId,
        round: u32,
    ) -> GameResult<Option<RoundResults>> {
        let _guard = self.ctx.locks.acquire(session_id).await;

        let session = match self.ctx.store.get_session(session_id).await? {
            Some(session) => session,
            None => return Ok(None),
        };
        if !session.is_guessing() || session.current_round != round {
            return Ok(None);
        }

        self.settle_locked(&session).await
    }

    /// Runs the scoring pass for the session's current round unless it
    /// already ran. The caller must hold the session lock.
    pub(crate) async fn settle_locked(&self, session: &Session) -> GameResult<Option<RoundResults>> {
        let store = &self.ctx.store;
        let round = session.current_round;

        if !store.mark_round_settled(session.id, round).await? {
            return Ok(None);
        }
        self.ctx.scheduler.lock().await.disarm(session.id);

        let participants = store.list_participants(session.id).await?;
        let guesses = store.list_guesses(session.id, round).await?;

        for award in score_round(session.config.mode, &participants, &guesses) {
            if let Some(guess_id) = award.guess_id {
                store
                    .set_guess_points(session.id, guess_id, award.points)
                    .await?;
            }
            if award.points > 0 {
                store
                    .add_participant_score(session.id, award.participant_id, award.points)
                    .await?;
            }
        }

        let results = self.build_results(session, round).await?;
        info!(
            "Settled round {} of session {}: {}/{} guessed, best {}",
            round,
            session.id,
            guesses.len(),
            participants.len(),
            results
                .scores
                .first()
                .filter(|s| s.guess.is_some())
                .map(|s| s.name.as_str())
                .unwrap_or("nobody")
        );

        let settled = store
            .get_session(session.id)
            .await?
            .ok_or(GameError::NotFound("session"))?;
        self.ctx.publish_session(&settled).await?;
        self.ctx.publish_participants(session.id).await?;
        self.ctx.fanout.publish(
            session.id,
            SessionEvent::RoundSettled {
                results: results.clone(),
            },
        );

        Ok(Some(results))
    }

    /// Results of the session's current round if it has been scored
    pub async fn current_results(&self, session: &Session) -> GameResult<Option<RoundResults>> {
        if !session.is_round_settled() {
            return Ok(None);
        }
        self.build_results(session, session.current_round)
            .await
            .map(Some)
    }

    async fn build_results(&self, session: &Session, round: u32) -> GameResult<RoundResults> {
        let challenge_id = session
            .current_challenge
            .ok_or(GameError::NotFound("challenge"))?;
        let challenge = self
            .ctx
            .catalog
            .get_challenge(challenge_id)
            .await?
            .ok_or(GameError::NotFound("challenge"))?;

        let participants = self.ctx.store.list_participants(session.id).await?;
        let guesses = self.ctx.store.list_guesses(session.id, round).await?;

        let mut scores: Vec<RoundScore> = participants
            .into_iter()
            .map(|p| {
                let guess = guesses.iter().find(|g| g.participant_id == p.id);
                RoundScore {
                    participant_id: p.id,
                    name: p.name,
                    color: p.color,
                    guess: guess.map(|g| g.coordinate),
                    distance_km: guess.map(|g| g.distance_km),
                    points: guess.and_then(|g| g.points).unwrap_or(0),
                    total: p.score,
                }
            })
            .collect();
        scores.sort_by(|a, b| closest_first(a.distance_km, b.distance_km));

        Ok(RoundResults {
            round,
            challenge,
            scores,
        })
    }
}

/// Guessers by distance, then everyone who did not guess
fn closest_first(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{sample_challenges, InMemoryCatalog};
    use crate::clock::ManualClock;
    use crate::fanout::ChannelFanout;
    use crate::game::GameStateMachine;
    use crate::store::{InMemoryStore, NewParticipant, NewSession, SessionPatch, SessionStore};
    use async_trait::async_trait;
    use shared::{Color, GuessId, Participant, SessionConfig};
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::time::Duration;

    /// In-memory store whose settlement claim can be switched to fail
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStore,
        fail_settlement: AtomicBool,
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn create_session(&self, new: NewSession) -> Result<Session, StoreError> {
            self.inner.create_session(new).await
        }

        async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
            self.inner.get_session(id).await
        }

        async fn get_session_by_code(&self, code: &str) -> Result<Option<Session>, StoreError> {
            self.inner.get_session_by_code(code).await
        }

        async fn update_session(
            &self,
            id: SessionId,
            patch: SessionPatch,
        ) -> Result<Session, StoreError> {
            self.inner.update_session(id, patch).await
        }

        async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
            self.inner.delete_session(id).await
        }

        async fn add_participant(&self, new: NewParticipant) -> Result<Participant, StoreError> {
            self.inner.add_participant(new).await
        }

        async fn get_participant(
            &self,
            session_id: SessionId,
            id: ParticipantId,
        ) -> Result<Option<Participant>, StoreError> {
            self.inner.get_participant(session_id, id).await
        }

        async fn list_participants(
            &self,
            session_id: SessionId,
        ) -> Result<Vec<Participant>, StoreError> {
            self.inner.list_participants(session_id).await
        }

        async fn add_participant_score(
            &self,
            session_id: SessionId,
            id: ParticipantId,
            points: u32,
        ) -> Result<Participant, StoreError> {
            self.inner.add_participant_score(session_id, id, points).await
        }

        async fn update_participant_color(
            &self,
            session_id: SessionId,
            id: ParticipantId,
            color: Color,
        ) -> Result<Participant, StoreError> {
            self.inner.update_participant_color(session_id, id, color).await
        }

        async fn insert_guess(&self, new: NewGuess) -> Result<Guess, StoreError> {
            self.inner.insert_guess(new).await
        }

        async fn list_guesses(
            &self,
            session_id: SessionId,
            round: u32,
        ) -> Result<Vec<Guess>, StoreError> {
            self.inner.list_guesses(session_id, round).await
        }

        async fn set_guess_points(
            &self,
            session_id: SessionId,
            guess_id: GuessId,
            points: u32,
        ) -> Result<Guess, StoreError> {
            self.inner.set_guess_points(session_id, guess_id, points).await
        }

        async fn mark_round_settled(
            &self,
            session_id: SessionId,
            round: u32,
        ) -> Result<bool, StoreError> {
            if self.fail_settlement.load(AtomicOrdering::SeqCst) {
                return Err(StoreError::Unavailable("settlement write timed out".to_string()));
            }
            self.inner.mark_round_settled(session_id, round).await
        }
    }

    #[test]
    fn test_non_responders_sort_last() {
        let mut distances = vec![None, Some(300.0), Some(12.5), None, Some(90.0)];
        distances.sort_by(|a, b| closest_first(*a, *b));
        assert_eq!(distances, vec![Some(12.5), Some(90.0), Some(300.0), None, None]);
    }

    #[tokio::test]
    async fn test_stored_guess_survives_failed_settlement() {
        let store = Arc::new(FlakyStore::default());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let (fanout, _events) = ChannelFanout::new();
        let ctx = GameContext::new(
            store.clone(),
            Arc::new(InMemoryCatalog::with_challenges(sample_challenges())),
            Arc::new(fanout),
            clock.clone(),
        )
        .with_seed(3);
        let game = GameStateMachine::new(Arc::new(ctx));

        let (session, host) = game
            .create_session(SessionConfig::default(), "Host")
            .await
            .unwrap();
        let (_, ada) = game.join(&session.code, "Ada").await.unwrap();
        game.start_game(session.id, host.id).await.unwrap();
        game.begin_guessing(session.id, host.id).await.unwrap();

        store.fail_settlement.store(true, AtomicOrdering::SeqCst);
        let spot = Coordinate::new(12.0, 34.0);
        game.submit_guess(session.id, host.id, 1, spot).await.unwrap();
        // last guess: storing succeeds, the early settlement does not
        let last = game.submit_guess(session.id, ada.id, 1, spot).await.unwrap();
        assert_eq!(last.participant_id, ada.id);

        let snapshot = game.snapshot(session.id).await.unwrap();
        assert_eq!(snapshot.session.settled_round, 0);
        assert!(snapshot.results.is_none());
        let retry = game.submit_guess(session.id, ada.id, 1, spot).await;
        assert!(matches!(retry, Err(GameError::DuplicateGuess { round: 1, .. })));

        store.fail_settlement.store(false, AtomicOrdering::SeqCst);
        clock.advance(Duration::from_millis(18_000));
        let settled = game.poll_deadlines().await;
        assert_eq!(settled.len(), 1);
        assert!(settled[0].scores.iter().all(|s| s.guess.is_some()));
        assert!(game.poll_deadlines().await.is_empty());

        let snapshot = game.snapshot(session.id).await.unwrap();
        assert_eq!(snapshot.session.settled_round, 1);
    }
}
