use log::{debug, info, warn};
use rand::seq::SliceRandom;
use shared::{
    Challenge, ChallengeId, ChallengeView, Color, Coordinate, Guess, Participant, ParticipantId,
    Phase, RoundPolicy, RoundResults, Session, SessionConfig, SessionId, Status, MAX_NAME_LENGTH,
};
use std::sync::Arc;

use crate::context::GameContext;
use crate::error::{GameError, GameResult, StoreError};
use crate::join_code::{generate_join_code, normalize_join_code};
use crate::reconciler::GuessReconciler;
use crate::scheduler::WindowEvent;
use crate::store::{NewParticipant, NewSession, SessionPatch};

const MAX_CODE_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    RoundLimit,
    TargetScore,
    ExhaustedContent,
    EndedByHost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundAdvance {
    Next(Session),
    Finished {
        session: Session,
        reason: FinishReason,
    },
}

impl RoundAdvance {
    pub fn session(&self) -> &Session {
        match self {
            RoundAdvance::Next(session) => session,
            RoundAdvance::Finished { session, .. } => session,
        }
    }
}

/// Everything a client needs to rebuild its view from scratch
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session: Session,
    /// Highest score first
    pub participants: Vec<Participant>,
    pub challenge: Option<ChallengeView>,
    /// Present once the current round has been scored
    pub results: Option<RoundResults>,
}

/// Authority over session status, phases and round progression.
///
/// Host commands are checked against the caller's participant id and the
/// current status/phase, applied through the store, then published to the
/// session's subscribers.
#[derive(Clone)]
pub struct GameStateMachine {
    ctx: Arc<GameContext>,
    reconciler: GuessReconciler,
}

impl GameStateMachine {
    pub fn new(ctx: Arc<GameContext>) -> Self {
        let reconciler = GuessReconciler::new(Arc::clone(&ctx));
        Self { ctx, reconciler }
    }

    pub fn context(&self) -> &Arc<GameContext> {
        &self.ctx
    }

    pub fn reconciler(&self) -> &GuessReconciler {
        &self.reconciler
    }

    pub async fn create_session(
        &self,
        config: SessionConfig,
        host_name: &str,
    ) -> GameResult<(Session, Participant)> {
        let name = validate_name(host_name)?;
        let now = self.ctx.now_ms();
        let host_id = ParticipantId::new();

        let session = self.insert_with_unique_code(config, host_id, now).await?;
        let host = self
            .ctx
            .store
            .add_participant(NewParticipant {
                id: host_id,
                session_id: session.id,
                name,
                color: Color::PALETTE[0],
                joined_at: now,
            })
            .await?;

        info!(
            "Session {} created with code {} by {} ({:?}, {:?}, {}s)",
            session.id,
            session.code,
            host.name,
            config.mode,
            config.policy,
            config.guess_time.secs()
        );
        Ok((session, host))
    }

    async fn insert_with_unique_code(
        &self,
        config: SessionConfig,
        host_id: ParticipantId,
        now: u64,
    ) -> GameResult<Session> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = {
                let mut rng = self.ctx.rng.lock().await;
                generate_join_code(&mut *rng)
            };
            if self.ctx.store.get_session_by_code(&code).await?.is_some() {
                debug!("Join code {} already in use, drawing another", code);
                continue;
            }

            match self
                .ctx
                .store
                .create_session(NewSession {
                    code,
                    host_id,
                    config,
                    grace_ms: self.ctx.grace_ms,
                    created_at: now,
                })
                .await
            {
                Ok(session) => return Ok(session),
                Err(StoreError::Conflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Conflict("no free join code found".to_string()).into())
    }

    pub async fn join(&self, code: &str, name: &str) -> GameResult<(Session, Participant)> {
        let code = normalize_join_code(code);
        let name = validate_name(name)?;

        let found = self
            .ctx
            .store
            .get_session_by_code(&code)
            .await?
            .ok_or(GameError::NotFound("session"))?;

        let _guard = self.ctx.locks.acquire(found.id).await;
        let session = self.load_session(found.id).await?;
        if session.status != Status::Waiting {
            return Err(GameError::invalid_transition("join", state_label(&session)));
        }

        let participants = self.ctx.store.list_participants(session.id).await?;
        let lowered = name.to_lowercase();
        if participants.iter().any(|p| p.name.to_lowercase() == lowered) {
            return Err(GameError::DuplicateName(name));
        }
        let used: Vec<Color> = participants.iter().map(|p| p.color).collect();
        let color = Color::first_free(&used).ok_or(GameError::SessionFull)?;

        let participant = match self
            .ctx
            .store
            .add_participant(NewParticipant {
                id: ParticipantId::new(),
                session_id: session.id,
                name: name.clone(),
                color,
                joined_at: self.ctx.now_ms(),
            })
            .await
        {
            Ok(participant) => participant,
            Err(StoreError::Conflict(_)) => return Err(GameError::DuplicateName(name)),
            Err(e) => return Err(e.into()),
        };

        info!(
            "{} joined session {} as {}",
            participant.name, session.code, participant.color
        );
        self.ctx.publish_participants(session.id).await?;
        Ok((session, participant))
    }

    pub async fn change_color(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        color: Color,
    ) -> GameResult<Participant> {
        let _guard = self.ctx.locks.acquire(session_id).await;
        let session = self.load_session(session_id).await?;
        if session.status != Status::Waiting {
            return Err(GameError::invalid_transition(
                "change color",
                state_label(&session),
            ));
        }

        let participants = self.ctx.store.list_participants(session_id).await?;
        let me = participants
            .iter()
            .find(|p| p.id == participant_id)
            .ok_or(GameError::NotFound("participant"))?;
        if me.color == color {
            return Ok(me.clone());
        }
        if participants
            .iter()
            .any(|p| p.id != participant_id && p.color == color)
        {
            return Err(GameError::ColorTaken(color));
        }

        let updated = self
            .ctx
            .store
            .update_participant_color(session_id, participant_id, color)
            .await?;
        debug!("{} switched to {}", updated.name, color);
        self.ctx.publish_participants(session_id).await?;
        Ok(updated)
    }

    /// Starts round 1. Retrying while the game is already running returns
    /// the current session unchanged.
    pub async fn start_game(
        &self,
        session_id: SessionId,
        caller: ParticipantId,
    ) -> GameResult<Session> {
        let _guard = self.ctx.locks.acquire(session_id).await;
        let session = self.load_session(session_id).await?;
        require_host(&session, caller, "start the game")?;

        match session.status {
            Status::Waiting => {}
            Status::Playing => {
                debug!("Session {} already started", session_id);
                return Ok(session);
            }
            Status::Finished => {
                return Err(GameError::invalid_transition(
                    "start the game",
                    state_label(&session),
                ))
            }
        }

        let participants = self.ctx.store.list_participants(session_id).await?;
        if participants.is_empty() {
            return Err(GameError::invalid_transition(
                "start the game",
                "without participants",
            ));
        }

        self.ctx.catalog.ensure_seeded().await?;
        let challenge = self.pick_challenge(&[]).await?;

        let session = self
            .ctx
            .store
            .update_session(
                session_id,
                SessionPatch {
                    status: Some(Status::Playing),
                    current_round: Some(1),
                    phase: Some(Phase::Showing),
                    phase_started_at: Some(Some(self.ctx.now_ms())),
                    current_challenge: Some(Some(challenge.id)),
                    used_challenges: Some(vec![challenge.id]),
                },
            )
            .await?;

        info!(
            "Session {} started with {} participants, round 1 is '{}'",
            session.code,
            participants.len(),
            challenge.title
        );
        self.ctx.publish_session(&session).await?;
        Ok(session)
    }

    /// Opens the map. The phase-start timestamp written here is the only
    /// source of the round's deadline.
    pub async fn begin_guessing(
        &self,
        session_id: SessionId,
        caller: ParticipantId,
    ) -> GameResult<Session> {
        let _guard = self.ctx.locks.acquire(session_id).await;
        let session = self.load_session(session_id).await?;
        require_host(&session, caller, "open guessing")?;

        if session.status != Status::Playing || session.phase != Phase::Showing {
            return Err(GameError::invalid_transition(
                "open guessing",
                state_label(&session),
            ));
        }

        let session = self
            .ctx
            .store
            .update_session(
                session_id,
                SessionPatch {
                    phase: Some(Phase::Guessing),
                    phase_started_at: Some(Some(self.ctx.now_ms())),
                    ..Default::default()
                },
            )
            .await?;

        if let Some(window) = self.ctx.scheduler.lock().await.arm(&session) {
            info!(
                "Round {} of session {} open for guessing until {}",
                session.current_round,
                session.code,
                window.deadline()
            );
        }
        self.ctx.publish_session(&session).await?;
        Ok(session)
    }

    /// Moves past the current guessing round.
    ///
    /// The outgoing round is scored first if nothing has scored it yet, so
    /// the termination check always sees current totals.
    pub async fn advance_round(
        &self,
        session_id: SessionId,
        caller: ParticipantId,
    ) -> GameResult<RoundAdvance> {
        let _guard = self.ctx.locks.acquire(session_id).await;
        let session = self.load_session(session_id).await?;
        require_host(&session, caller, "advance the round")?;

        if !session.is_guessing() {
            return Err(GameError::invalid_transition(
                "advance the round",
                state_label(&session),
            ));
        }

        self.reconciler.settle_locked(&session).await?;

        let participants = self.ctx.store.list_participants(session_id).await?;
        if let Some(reason) = termination_reason(&session, &participants) {
            let session = self.finish(session_id, reason).await?;
            return Ok(RoundAdvance::Finished { session, reason });
        }

        let challenge = match self.pick_challenge(&session.used_challenges).await {
            Ok(challenge) => challenge,
            Err(GameError::ExhaustedContent) => {
                let reason = FinishReason::ExhaustedContent;
                let session = self.finish(session_id, reason).await?;
                return Ok(RoundAdvance::Finished { session, reason });
            }
            Err(e) => return Err(e),
        };

        let mut used = session.used_challenges.clone();
        used.push(challenge.id);
        let next_round = session.current_round + 1;

        let session = self
            .ctx
            .store
            .update_session(
                session_id,
                SessionPatch {
                    current_round: Some(next_round),
                    phase: Some(Phase::Showing),
                    phase_started_at: Some(Some(self.ctx.now_ms())),
                    current_challenge: Some(Some(challenge.id)),
                    used_challenges: Some(used),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            "Session {} moved to round {}: '{}'",
            session.code, next_round, challenge.title
        );
        self.ctx.publish_session(&session).await?;
        Ok(RoundAdvance::Next(session))
    }

    /// Ends the game from any playing phase. Ending an already finished game
    /// is a no-op.
    pub async fn end_game(
        &self,
        session_id: SessionId,
        caller: ParticipantId,
    ) -> GameResult<Session> {
        let _guard = self.ctx.locks.acquire(session_id).await;
        let session = self.load_session(session_id).await?;
        require_host(&session, caller, "end the game")?;

        match session.status {
            Status::Playing => {}
            Status::Finished => return Ok(session),
            Status::Waiting => {
                return Err(GameError::invalid_transition(
                    "end the game",
                    state_label(&session),
                ))
            }
        }

        if session.is_guessing() {
            self.reconciler.settle_locked(&session).await?;
        }
        self.finish(session_id, FinishReason::EndedByHost).await
    }

    pub async fn submit_guess(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        round: u32,
        coordinate: Coordinate,
    ) -> GameResult<Guess> {
        self.reconciler
            .submit(session_id, participant_id, round, coordinate)
            .await
    }

    /// Settles every round whose guessing window has closed by now.
    /// Safe to call at any rate.
    pub async fn poll_deadlines(&self) -> Vec<RoundResults> {
        let now = self.ctx.now_ms();
        let events = self.ctx.scheduler.lock().await.poll(now);

        let mut settled = Vec::new();
        for event in events {
            match event {
                WindowEvent::GraceStarted { session_id, round } => {
                    debug!(
                        "Round {} of session {} past its deadline, grace running",
                        round, session_id
                    );
                }
                WindowEvent::Closed { session_id, round } => {
                    match self.reconciler.settle_expired(session_id, round).await {
                        Ok(Some(results)) => settled.push(results),
                        Ok(None) => {}
                        Err(e) => warn!(
                            "Failed to settle round {} of session {}: {}",
                            round, session_id, e
                        ),
                    }
                }
            }
        }
        settled
    }

    pub async fn snapshot(&self, session_id: SessionId) -> GameResult<SessionSnapshot> {
        let session = self.load_session(session_id).await?;

        let mut participants = self.ctx.store.list_participants(session_id).await?;
        participants.sort_by(|a, b| b.score.cmp(&a.score).then(a.joined_at.cmp(&b.joined_at)));

        let challenge = self.ctx.challenge_view(&session).await?;
        let results = self.reconciler.current_results(&session).await?;

        Ok(SessionSnapshot {
            session,
            participants,
            challenge,
            results,
        })
    }

    /// Deletes a finished session with its participants and guesses.
    /// Returns false if it was already gone.
    pub async fn discard_session(&self, session_id: SessionId) -> GameResult<bool> {
        let guard = self.ctx.locks.acquire(session_id).await;
        let session = match self.ctx.store.get_session(session_id).await? {
            Some(session) => session,
            None => return Ok(false),
        };
        if session.status != Status::Finished {
            return Err(GameError::invalid_transition(
                "discard the session",
                state_label(&session),
            ));
        }

        let removed = self.ctx.store.delete_session(session_id).await?;
        self.ctx.scheduler.lock().await.disarm(session_id);
        drop(guard);
        self.ctx.locks.forget(session_id).await;

        info!("Discarded session {}", session.code);
        Ok(removed)
    }

    async fn load_session(&self, session_id: SessionId) -> GameResult<Session> {
        self.ctx
            .store
            .get_session(session_id)
            .await?
            .ok_or(GameError::NotFound("session"))
    }

    async fn finish(&self, session_id: SessionId, reason: FinishReason) -> GameResult<Session> {
        let session = self
            .ctx
            .store
            .update_session(
                session_id,
                SessionPatch {
                    status: Some(Status::Finished),
                    ..Default::default()
                },
            )
            .await?;
        self.ctx.scheduler.lock().await.disarm(session_id);

        info!(
            "Session {} finished after round {} ({:?})",
            session.code, session.current_round, reason
        );
        self.ctx.publish_session(&session).await?;
        Ok(session)
    }

    /// Uniform pick among challenges not in `used`
    async fn pick_challenge(&self, used: &[ChallengeId]) -> GameResult<Challenge> {
        let eligible: Vec<Challenge> = self
            .ctx
            .catalog
            .list_challenges()
            .await?
            .into_iter()
            .filter(|c| !used.contains(&c.id))
            .collect();

        let mut rng = self.ctx.rng.lock().await;
        eligible
            .choose(&mut *rng)
            .cloned()
            .ok_or(GameError::ExhaustedContent)
    }
}

fn require_host(session: &Session, caller: ParticipantId, action: &'static str) -> GameResult<()> {
    if session.is_host(caller) {
        Ok(())
    } else {
        Err(GameError::Unauthorized(action))
    }
}

fn termination_reason(session: &Session, participants: &[Participant]) -> Option<FinishReason> {
    match session.config.policy {
        RoundPolicy::FixedRounds(max) if session.current_round + 1 > max => {
            Some(FinishReason::RoundLimit)
        }
        RoundPolicy::TargetScore(target) if participants.iter().any(|p| p.score >= target) => {
            Some(FinishReason::TargetScore)
        }
        _ => None,
    }
}

fn state_label(session: &Session) -> String {
    match (session.status, session.phase) {
        (Status::Waiting, _) => "waiting".to_string(),
        (Status::Playing, Phase::Showing) => "showing a challenge".to_string(),
        (Status::Playing, Phase::Guessing) => "guessing".to_string(),
        (Status::Finished, _) => "finished".to_string(),
    }
}

/// Trims a display name and checks its length
pub fn validate_name(raw: &str) -> GameResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(GameError::InvalidName("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(GameError::InvalidName("name must be at most 20 characters"));
    }
    Ok(name.to_string())
}
