pub mod geo;
pub mod model;
pub mod schedule;

use serde::{Deserialize, Serialize};

pub use geo::{great_circle_distance, high_score_points};
pub use model::{
    Challenge, ChallengeId, ChallengeView, Color, Coordinate, GameLength, Guess, GuessId,
    GuessTime, Participant, ParticipantId, Phase, RoundPolicy, RoundResults, RoundScore,
    ScoringMode, Session, SessionConfig, SessionId, Status,
};
pub use schedule::{RoundWindow, WindowState, SETTLEMENT_GRACE_MS};

pub const PROTOCOL_VERSION: u32 = 1;
/// Receive buffer size; one encoded packet must fit in a single datagram
pub const MAX_PACKET_SIZE: usize = 8192;
pub const JOIN_CODE_LENGTH: usize = 6;
pub const MAX_NAME_LENGTH: usize = 20;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    CreateSession {
        client_version: u32,
        host_name: String,
        config: SessionConfig,
    },
    Join {
        client_version: u32,
        code: String,
        name: String,
    },
    StartGame,
    BeginGuessing,
    SubmitGuess {
        round: u32,
        coordinate: Coordinate,
    },
    AdvanceRound,
    EndGame,
    ChangeColor {
        color: Color,
    },
    RequestState,
    Heartbeat {
        timestamp: u64,
    },
    Leave,

    SessionCreated {
        session_id: SessionId,
        participant_id: ParticipantId,
        code: String,
    },
    Joined {
        session_id: SessionId,
        participant_id: ParticipantId,
        code: String,
    },
    /// Full session record; clients replace their copy wholesale
    SessionState {
        server_time: u64,
        session: Session,
        challenge: Option<ChallengeView>,
    },
    Participants {
        participants: Vec<Participant>,
    },
    GuessAccepted {
        round: u32,
        distance_km: f64,
    },
    GuessInserted {
        participant_id: ParticipantId,
        round: u32,
    },
    RoundResults {
        results: RoundResults,
    },
    Rejected {
        kind: RejectKind,
        reason: String,
    },
    Disconnected {
        reason: String,
    },
}

/// Why the server refused a client action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectKind {
    Unauthorized,
    InvalidTransition,
    Phase,
    DuplicateGuess,
    DuplicateName,
    NotFound,
    ExhaustedContent,
    InvalidName,
    InvalidCoordinate,
    ColorTaken,
    SessionFull,
    NotInSession,
    VersionMismatch,
    Internal,
}
