//! Error types for the game server.
//!
//! Every failed operation leaves session state unchanged and is reported to
//! the caller as a rejected action; none of these tear a session down.

use shared::{Color, Coordinate, ParticipantId, RejectKind};

/// Failures raised by a [`SessionStore`](crate::store::SessionStore) or
/// [`ContentCatalog`](crate::catalog::ContentCatalog).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness constraint rejected the write
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("only the host may {0}")]
    Unauthorized(&'static str),

    #[error("cannot {action} while the game is {state}")]
    InvalidTransition { action: &'static str, state: String },

    /// Guess submitted outside an open guessing window
    #[error("guessing closed: {0}")]
    Phase(String),

    #[error("participant {participant} already guessed in round {round}")]
    DuplicateGuess {
        participant: ParticipantId,
        round: u32,
    },

    #[error("the name '{0}' is already taken in this game")]
    DuplicateName(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("no unused challenges remain")]
    ExhaustedContent,

    #[error("invalid name: {0}")]
    InvalidName(&'static str),

    #[error("coordinate {0} is out of range")]
    InvalidCoordinate(Coordinate),

    #[error("color {0} is already taken")]
    ColorTaken(Color),

    #[error("every marker color is taken")]
    SessionFull,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GameError {
    pub(crate) fn invalid_transition(action: &'static str, state: impl Into<String>) -> Self {
        GameError::InvalidTransition {
            action,
            state: state.into(),
        }
    }

    /// Wire-level classification sent back to the client
    pub fn reject_kind(&self) -> RejectKind {
        match self {
            GameError::Unauthorized(_) => RejectKind::Unauthorized,
            GameError::InvalidTransition { .. } => RejectKind::InvalidTransition,
            GameError::Phase(_) => RejectKind::Phase,
            GameError::DuplicateGuess { .. } => RejectKind::DuplicateGuess,
            GameError::DuplicateName(_) => RejectKind::DuplicateName,
            GameError::NotFound(_) | GameError::Store(StoreError::NotFound(_)) => {
                RejectKind::NotFound
            }
            GameError::ExhaustedContent => RejectKind::ExhaustedContent,
            GameError::InvalidName(_) => RejectKind::InvalidName,
            GameError::InvalidCoordinate(_) => RejectKind::InvalidCoordinate,
            GameError::ColorTaken(_) => RejectKind::ColorTaken,
            GameError::SessionFull => RejectKind::SessionFull,
            GameError::Store(_) => RejectKind::Internal,
        }
    }
}

pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_is_reported_as_not_found() {
        let err: GameError = StoreError::NotFound("session".to_string()).into();
        assert_eq!(err.reject_kind(), RejectKind::NotFound);

        let err: GameError = StoreError::Unavailable("disk".to_string()).into();
        assert_eq!(err.reject_kind(), RejectKind::Internal);
    }

    #[test]
    fn test_error_messages() {
        let err = GameError::invalid_transition("advance the round", "waiting");
        assert_eq!(
            err.to_string(),
            "cannot advance the round while the game is waiting"
        );
        assert_eq!(
            GameError::Unauthorized("end the game").to_string(),
            "only the host may end the game"
        );
    }
}
