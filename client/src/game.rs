use log::debug;
use shared::{
    great_circle_distance, ChallengeView, Coordinate, Participant, ParticipantId, Phase,
    RoundResults, RoundScore, Session, SessionId, Status, WindowState,
};
use std::collections::HashSet;

/// Something worth telling the player after a state update
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    GameStarted,
    RoundShowing { round: u32, title: String },
    GuessingOpened { round: u32, remaining_secs: u64 },
    RoundScored { round: u32 },
    GameFinished,
}

/// The client's copy of its session.
///
/// Server payloads replace local state wholesale. A session payload older
/// than the newest one seen is dropped, so reordered datagrams never roll
/// the view back.
#[derive(Debug, Default)]
pub struct ClientView {
    pub session_id: Option<SessionId>,
    pub participant_id: Option<ParticipantId>,
    pub code: Option<String>,

    pub session: Option<Session>,
    pub challenge: Option<ChallengeView>,
    pub participants: Vec<Participant>,
    pub last_results: Option<RoundResults>,

    /// Who has guessed in the current round
    pub guessed: HashSet<ParticipantId>,
    guess_sent_for: Option<u32>,
    /// Pin placed but not sent; submitted once the countdown runs out
    draft: Option<Coordinate>,

    last_server_time: u64,
    /// `server_time - local_time` from the latest state packet
    clock_offset_ms: i64,
}

impl ClientView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_identity(&mut self, session_id: SessionId, participant_id: ParticipantId, code: String) {
        self.session_id = Some(session_id);
        self.participant_id = Some(participant_id);
        self.code = Some(code);
    }

    pub fn is_host(&self) -> bool {
        match (&self.session, self.participant_id) {
            (Some(session), Some(me)) => session.is_host(me),
            _ => false,
        }
    }

    pub fn current_round(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.current_round)
    }

    /// Server time as estimated from the local clock
    pub fn server_now(&self, local_now: u64) -> u64 {
        local_now.saturating_add_signed(self.clock_offset_ms)
    }

    pub fn apply_session(
        &mut self,
        server_time: u64,
        local_now: u64,
        session: Session,
        challenge: Option<ChallengeView>,
    ) -> Vec<ViewEvent> {
        if server_time < self.last_server_time {
            debug!(
                "Dropping stale session state ({} < {})",
                server_time, self.last_server_time
            );
            return Vec::new();
        }
        self.last_server_time = server_time;
        self.clock_offset_ms = server_time as i64 - local_now as i64;

        let events = self.transitions(&session, challenge.as_ref(), local_now);

        if self.current_round() != session.current_round {
            self.guessed.clear();
            self.guess_sent_for = None;
            self.draft = None;
        }
        self.session = Some(session);
        self.challenge = challenge;
        events
    }

    fn transitions(
        &self,
        next: &Session,
        challenge: Option<&ChallengeView>,
        local_now: u64,
    ) -> Vec<ViewEvent> {
        let mut events = Vec::new();
        let prev = self.session.as_ref();
        let prev_status = prev.map(|s| s.status);
        let prev_key = prev.map(|s| (s.current_round, s.phase));

        if next.status == Status::Playing && prev_status == Some(Status::Waiting) {
            events.push(ViewEvent::GameStarted);
        }

        if next.status == Status::Playing && prev_key != Some((next.current_round, next.phase)) {
            match next.phase {
                Phase::Showing => events.push(ViewEvent::RoundShowing {
                    round: next.current_round,
                    title: challenge.map(|c| c.title.clone()).unwrap_or_default(),
                }),
                Phase::Guessing => {
                    let server_now = local_now.saturating_add_signed(self.clock_offset_ms);
                    let remaining_secs = next
                        .round_window()
                        .map_or(0, |w| w.remaining_secs(server_now));
                    events.push(ViewEvent::GuessingOpened {
                        round: next.current_round,
                        remaining_secs,
                    });
                }
            }
        }

        if next.status == Status::Finished && prev_status != Some(Status::Finished) {
            events.push(ViewEvent::GameFinished);
        }
        events
    }

    pub fn apply_participants(&mut self, mut participants: Vec<Participant>) {
        participants.sort_by(|a, b| b.score.cmp(&a.score).then(a.joined_at.cmp(&b.joined_at)));
        self.participants = participants;
    }

    pub fn apply_guess_inserted(&mut self, participant_id: ParticipantId, round: u32) {
        if round == self.current_round() {
            self.guessed.insert(participant_id);
        }
    }

    pub fn apply_results(&mut self, results: RoundResults) -> Option<ViewEvent> {
        let already_seen = self
            .last_results
            .as_ref()
            .is_some_and(|r| r.round == results.round && r.challenge.id == results.challenge.id);
        let round = results.round;
        self.last_results = Some(results);

        (!already_seen).then_some(ViewEvent::RoundScored { round })
    }

    pub fn mark_guess_sent(&mut self, round: u32) {
        self.guess_sent_for = Some(round);
    }

    pub fn set_draft(&mut self, coordinate: Coordinate) {
        self.draft = Some(coordinate);
    }

    pub fn draft(&self) -> Option<Coordinate> {
        self.draft
    }

    /// Hands out the unsent pin once the round's countdown reaches its grace
    /// period, and records it as sent
    pub fn take_due_draft(&mut self, local_now: u64) -> Option<(u32, Coordinate)> {
        let in_grace = matches!(self.countdown(local_now), Some(WindowState::Grace { .. }));
        if !in_grace || self.has_guessed() {
            return None;
        }
        let coordinate = self.draft.take()?;
        let round = self.current_round();
        self.mark_guess_sent(round);
        Some((round, coordinate))
    }

    pub fn has_guessed(&self) -> bool {
        let round = self.current_round();
        self.guess_sent_for == Some(round)
            || self
                .participant_id
                .is_some_and(|me| self.guessed.contains(&me))
    }

    /// Countdown state of the current round as seen from `local_now`
    pub fn countdown(&self, local_now: u64) -> Option<WindowState> {
        let session = self.session.as_ref()?;
        if session.is_round_settled() {
            return Some(WindowState::Closed);
        }
        let window = session.round_window()?;
        Some(window.state(self.server_now(local_now)))
    }

    pub fn can_guess(&self, local_now: u64) -> bool {
        !self.has_guessed()
            && matches!(
                self.countdown(local_now),
                Some(WindowState::Open { .. }) | Some(WindowState::Grace { .. })
            )
    }

    /// This participant's line in the latest results
    pub fn my_result(&self) -> Option<&RoundScore> {
        let me = self.participant_id?;
        self.last_results
            .as_ref()?
            .scores
            .iter()
            .find(|s| s.participant_id == me)
    }

    /// Distance from `coordinate` to the last revealed answer
    pub fn distance_to_answer(&self, coordinate: Coordinate) -> Option<f64> {
        let results = self.last_results.as_ref()?;
        Some(great_circle_distance(coordinate, results.challenge.coordinate))
    }
}
