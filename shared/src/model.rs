//! Data model shared by the server and the clients
//!
//! Every record that crosses the wire lives here: sessions, participants,
//! challenges, guesses and the per-round results. All types derive serde so
//! they can be embedded in `Packet`s and shipped with bincode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::schedule::RoundWindow;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifies one hosted game
    SessionId
);
id_type!(
    /// Opaque per-session participant identifier
    ParticipantId
);
id_type!(
    /// Identifies a catalog entry
    ChallengeId
);
id_type!(GuessId);

/// A point on the globe in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Latitude within [-90, 90], longitude within [-180, 180], both finite
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Waiting,
    Playing,
    Finished,
}

/// Sub-state of `Status::Playing`. Meaningless in any other status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Image is shown, the map is locked
    Showing,
    /// Map is interactive until the deadline plus grace
    Guessing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringMode {
    /// Every guess earns up to 1000 points based on proximity
    HighScore,
    /// Only the closest guess of the round earns a single point
    ClosestWins,
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high_score" | "highscore" => Ok(ScoringMode::HighScore),
            "closest_wins" | "closest" => Ok(ScoringMode::ClosestWins),
            other => Err(format!("unknown scoring mode '{}'", other)),
        }
    }
}

/// When a game ends on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPolicy {
    FixedRounds(u32),
    TargetScore(u32),
    Unbounded,
}

/// Named game lengths offered when creating a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameLength {
    Short,
    Medium,
    Long,
    Marathon,
}

impl GameLength {
    /// Resolves the preset into a policy for the given scoring mode.
    ///
    /// High-score games count rounds, closest-wins games race to a points target.
    pub fn policy_for(self, mode: ScoringMode) -> RoundPolicy {
        match (mode, self) {
            (_, GameLength::Marathon) => RoundPolicy::Unbounded,
            (ScoringMode::HighScore, GameLength::Short) => RoundPolicy::FixedRounds(5),
            (ScoringMode::HighScore, GameLength::Medium) => RoundPolicy::FixedRounds(10),
            (ScoringMode::HighScore, GameLength::Long) => RoundPolicy::FixedRounds(20),
            (ScoringMode::ClosestWins, GameLength::Short) => RoundPolicy::TargetScore(3),
            (ScoringMode::ClosestWins, GameLength::Medium) => RoundPolicy::TargetScore(5),
            (ScoringMode::ClosestWins, GameLength::Long) => RoundPolicy::TargetScore(10),
        }
    }
}

impl FromStr for GameLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "short" => Ok(GameLength::Short),
            "medium" => Ok(GameLength::Medium),
            "long" => Ok(GameLength::Long),
            "marathon" => Ok(GameLength::Marathon),
            other => Err(format!("unknown game length '{}'", other)),
        }
    }
}

/// Allowed per-round guessing budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuessTime {
    Fifteen,
    Twenty,
    Thirty,
}

impl GuessTime {
    pub fn secs(self) -> u64 {
        match self {
            GuessTime::Fifteen => 15,
            GuessTime::Twenty => 20,
            GuessTime::Thirty => 30,
        }
    }

    pub fn budget_ms(self) -> u64 {
        self.secs() * 1000
    }
}

impl TryFrom<u64> for GuessTime {
    type Error = String;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        match secs {
            15 => Ok(GuessTime::Fifteen),
            20 => Ok(GuessTime::Twenty),
            30 => Ok(GuessTime::Thirty),
            other => Err(format!("guess time must be 15, 20 or 30 seconds, got {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub mode: ScoringMode,
    pub policy: RoundPolicy,
    pub guess_time: GuessTime,
}

impl SessionConfig {
    pub fn preset(mode: ScoringMode, length: GameLength, guess_time: GuessTime) -> Self {
        Self {
            mode,
            policy: length.policy_for(mode),
            guess_time,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::preset(ScoringMode::HighScore, GameLength::Medium, GuessTime::Fifteen)
    }
}

/// Marker colors available to participants. Red is reserved for the answer pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Blue,
    Gold,
    Green,
    Orange,
    Yellow,
    Violet,
    Grey,
    Black,
}

impl Color {
    pub const PALETTE: [Color; 8] = [
        Color::Blue,
        Color::Gold,
        Color::Green,
        Color::Orange,
        Color::Yellow,
        Color::Violet,
        Color::Grey,
        Color::Black,
    ];

    /// First palette color nobody in `used` holds
    pub fn first_free(used: &[Color]) -> Option<Color> {
        Self::PALETTE.into_iter().find(|c| !used.contains(c))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::Blue => "blue",
            Color::Gold => "gold",
            Color::Green => "green",
            Color::Orange => "orange",
            Color::Yellow => "yellow",
            Color::Violet => "violet",
            Color::Grey => "grey",
            Color::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::PALETTE
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| format!("unknown color '{}'", s))
    }
}

/// One hosted game and everything needed to drive its rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub code: String,
    pub host_id: ParticipantId,
    pub status: Status,
    pub config: SessionConfig,
    pub current_round: u32,
    pub phase: Phase,
    /// Server time (ms) at which the current phase began
    pub phase_started_at: Option<u64>,
    pub current_challenge: Option<ChallengeId>,
    /// Challenges already shown, in order. Never holds duplicates.
    pub used_challenges: Vec<ChallengeId>,
    /// Highest round whose scoring pass has run
    pub settled_round: u32,
    /// Late-submission allowance after the deadline, fixed when the session is created
    pub grace_ms: u64,
    pub created_at: u64,
}

impl Session {
    pub fn is_host(&self, participant_id: ParticipantId) -> bool {
        self.host_id == participant_id
    }

    pub fn is_guessing(&self) -> bool {
        self.status == Status::Playing && self.phase == Phase::Guessing
    }

    pub fn is_round_settled(&self) -> bool {
        self.current_round > 0 && self.settled_round >= self.current_round
    }

    /// Guessing window for the current round, if one is running
    pub fn round_window(&self) -> Option<RoundWindow> {
        if !self.is_guessing() {
            return None;
        }
        self.phase_started_at.map(|started_at| {
            RoundWindow::new(started_at, self.config.guess_time.budget_ms(), self.grace_ms)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub session_id: SessionId,
    pub name: String,
    pub score: u32,
    pub color: Color,
    pub joined_at: u64,
}

/// Immutable catalog entry: a historical event and where it happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub coordinate: Coordinate,
    pub year: i32,
}

impl Challenge {
    /// What players may see before the round is settled
    pub fn view(&self) -> ChallengeView {
        ChallengeView {
            id: self.id,
            title: self.title.clone(),
            image_url: self.image_url.clone(),
        }
    }
}

/// A challenge with its answer withheld
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeView {
    pub id: ChallengeId,
    pub title: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guess {
    pub id: GuessId,
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub challenge_id: ChallengeId,
    pub round: u32,
    pub coordinate: Coordinate,
    pub distance_km: f64,
    /// Filled in by the round's scoring pass
    pub points: Option<u32>,
    pub submitted_at: u64,
}

/// One participant's line in a settled round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundScore {
    pub participant_id: ParticipantId,
    pub name: String,
    pub color: Color,
    /// `None` when the participant did not guess
    pub guess: Option<Coordinate>,
    pub distance_km: Option<f64>,
    pub points: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResults {
    pub round: u32,
    pub challenge: Challenge,
    /// Closest guess first, non-responders last
    pub scores: Vec<RoundScore>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validation() {
        assert!(Coordinate::new(0.0, 0.0).is_valid());
        assert!(Coordinate::new(90.0, -180.0).is_valid());
        assert!(!Coordinate::new(90.1, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, 181.0).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_length_presets() {
        assert_eq!(
            GameLength::Short.policy_for(ScoringMode::HighScore),
            RoundPolicy::FixedRounds(5)
        );
        assert_eq!(
            GameLength::Long.policy_for(ScoringMode::ClosestWins),
            RoundPolicy::TargetScore(10)
        );
        assert_eq!(
            GameLength::Marathon.policy_for(ScoringMode::ClosestWins),
            RoundPolicy::Unbounded
        );
    }

    #[test]
    fn test_guess_time_parsing() {
        assert_eq!(GuessTime::try_from(20u64).unwrap(), GuessTime::Twenty);
        assert_eq!(GuessTime::Thirty.budget_ms(), 30_000);
        assert!(GuessTime::try_from(10u64).is_err());
    }

    #[test]
    fn test_first_free_color() {
        assert_eq!(Color::first_free(&[]), Some(Color::Blue));
        assert_eq!(
            Color::first_free(&[Color::Blue, Color::Green]),
            Some(Color::Gold)
        );
        assert_eq!(Color::first_free(&Color::PALETTE), None);
    }

    #[test]
    fn test_color_parsing() {
        assert_eq!("Violet".parse::<Color>().unwrap(), Color::Violet);
        assert!("red".parse::<Color>().is_err());
    }

    #[test]
    fn test_round_window_only_while_guessing() {
        let mut session = Session {
            id: SessionId::new(),
            code: "ABC234".to_string(),
            host_id: ParticipantId::new(),
            status: Status::Playing,
            config: SessionConfig::default(),
            current_round: 1,
            phase: Phase::Showing,
            phase_started_at: Some(1_000),
            current_challenge: None,
            used_challenges: Vec::new(),
            settled_round: 0,
            grace_ms: 5_000,
            created_at: 0,
        };
        assert!(session.round_window().is_none());

        session.phase = Phase::Guessing;
        let window = session.round_window().unwrap();
        assert_eq!(window.deadline(), 16_000);
        assert_eq!(window.closes_at(), 21_000);

        session.status = Status::Finished;
        assert!(session.round_window().is_none());
    }
}
