//! Terminal command parsing

use shared::{Color, Coordinate, Packet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const HELP: &str = "\
commands:
  start              start the game (host)
  open               open guessing for the current round (host)
  guess <lat> <lon>  drop a pin
  pin <lat> <lon>    place a pin without sending it; sent when time runs out
  next               advance to the next round (host)
  end                end the game (host)
  color <name>       pick a lobby color
  state              request a fresh copy of the session
  help               show this list
  quit               leave the session";

/// A line typed by the player
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Open,
    Guess(Coordinate),
    Pin(Coordinate),
    Next,
    End,
    Color(Color),
    State,
    Help,
    Quit,
}

impl Command {
    /// Parses one line of input. Empty lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("start", []) => Command::Start,
            ("open", []) => Command::Open,
            ("guess" | "g", [lat, lon]) => Command::Guess(parse_coordinate(lat, lon)?),
            ("guess" | "g", _) => return Err("usage: guess <lat> <lon>".to_string()),
            ("pin" | "p", [lat, lon]) => Command::Pin(parse_coordinate(lat, lon)?),
            ("pin" | "p", _) => return Err("usage: pin <lat> <lon>".to_string()),
            ("next", []) => Command::Next,
            ("end", []) => Command::End,
            ("color", [name]) => Command::Color(name.parse()?),
            ("color", _) => return Err("usage: color <name>".to_string()),
            ("state", []) => Command::State,
            ("help" | "?", _) => Command::Help,
            ("quit" | "exit", _) => Command::Quit,
            (other, _) => return Err(format!("unknown command '{}', try 'help'", other)),
        };
        Ok(Some(command))
    }

    /// The packet this command sends. Guesses are tagged with `round`.
    pub fn to_packet(&self, round: u32) -> Option<Packet> {
        match self {
            Command::Start => Some(Packet::StartGame),
            Command::Open => Some(Packet::BeginGuessing),
            Command::Guess(coordinate) => Some(Packet::SubmitGuess {
                round,
                coordinate: *coordinate,
            }),
            Command::Next => Some(Packet::AdvanceRound),
            Command::End => Some(Packet::EndGame),
            Command::Color(color) => Some(Packet::ChangeColor { color: *color }),
            Command::State => Some(Packet::RequestState),
            Command::Pin(_) | Command::Help | Command::Quit => None,
        }
    }
}

fn parse_coordinate(lat: &str, lon: &str) -> Result<Coordinate, String> {
    let lat: f64 = lat.parse().map_err(|_| format!("bad latitude '{}'", lat))?;
    let lon: f64 = lon.parse().map_err(|_| format!("bad longitude '{}'", lon))?;
    let coordinate = Coordinate::new(lat, lon);
    if !coordinate.is_valid() {
        return Err(format!("{:.4}, {:.4} is not on the globe", lat, lon));
    }
    Ok(coordinate)
}

/// Local wall-clock time in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
