use crate::game::{ClientView, ViewEvent};
use crate::input::{get_timestamp, Command, HELP};
use crate::rendering::{render_lobby, render_results, render_standings, render_status};
use bincode::{deserialize, serialize};
use log::{error, info, warn};
use shared::{Packet, SessionConfig, Status, WindowState, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::interval;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const COUNTDOWN_INTERVAL: Duration = Duration::from_millis(250);

/// How the client enters a session
#[derive(Debug, Clone)]
pub enum Intent {
    Create { name: String, config: SessionConfig },
    Join { code: String, name: String },
}

impl Intent {
    fn packet(&self) -> Packet {
        match self {
            Intent::Create { name, config } => Packet::CreateSession {
                client_version: PROTOCOL_VERSION,
                host_name: name.clone(),
                config: *config,
            },
            Intent::Join { code, name } => Packet::Join {
                client_version: PROTOCOL_VERSION,
                code: code.clone(),
                name: name.clone(),
            },
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    intent: Intent,
    connected: bool,
    running: bool,

    view: ClientView,
    /// Last countdown second announced, to print each step once
    last_announced: Option<u64>,
}

impl Client {
    pub async fn new(server_addr: &str, intent: Intent) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            intent,
            connected: false,
            running: true,
            view: ClientView::new(),
            last_announced: None,
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server at {}...", self.server_addr);
        self.send_packet(&self.intent.packet()).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::SessionCreated {
                session_id,
                participant_id,
                code,
            } => {
                println!("Session created. Share the join code: {}", code);
                self.view.set_identity(session_id, participant_id, code);
                self.connected = true;
            }

            Packet::Joined {
                session_id,
                participant_id,
                code,
            } => {
                println!("Joined session {}", code);
                self.view.set_identity(session_id, participant_id, code);
                self.connected = true;
            }

            Packet::SessionState {
                server_time,
                session,
                challenge,
            } => {
                let events = self
                    .view
                    .apply_session(server_time, get_timestamp(), session, challenge);
                for event in events {
                    self.announce(event);
                }
            }

            Packet::Participants { participants } => {
                self.view.apply_participants(participants);
                let waiting = self
                    .view
                    .session
                    .as_ref()
                    .is_some_and(|s| s.status == Status::Waiting);
                if waiting {
                    print!("{}", render_lobby(&self.view));
                }
            }

            Packet::GuessAccepted { round, distance_km } => {
                self.view.mark_guess_sent(round);
                info!("Guess for round {} recorded ({:.1} km)", round, distance_km);
                println!("Pin dropped, waiting for the others...");
            }

            Packet::GuessInserted {
                participant_id,
                round,
            } => {
                self.view.apply_guess_inserted(participant_id, round);
            }

            Packet::RoundResults { results } => {
                if let Some(event) = self.view.apply_results(results) {
                    self.announce(event);
                }
            }

            Packet::Rejected { kind, reason } => {
                warn!("Rejected ({:?}): {}", kind, reason);
                println!("! {}", reason);
                if !self.connected {
                    self.running = false;
                }
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                println!("Disconnected: {}", reason);
                self.connected = false;
                self.running = false;
            }

            other => {
                warn!("Unexpected packet type: {:?}", other);
            }
        }
    }

    fn announce(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::GameStarted => println!("The game has started!"),
            ViewEvent::RoundShowing { round, title } => {
                self.last_announced = None;
                println!("--- Round {}: {} ---", round, title);
                if self.view.is_host() {
                    println!("Type 'open' when everyone has seen the picture.");
                }
            }
            ViewEvent::GuessingOpened {
                round,
                remaining_secs,
            } => {
                println!(
                    "Round {} guessing is open, {}s to drop a pin: guess <lat> <lon>",
                    round, remaining_secs
                );
            }
            ViewEvent::RoundScored { .. } => {
                if let Some(results) = &self.view.last_results {
                    print!("{}", render_results(results, self.view.participant_id));
                }
                if self.view.is_host() {
                    println!("Type 'next' for the next round or 'end' to finish.");
                }
            }
            ViewEvent::GameFinished => {
                println!("=== Game over ===");
                print!(
                    "{}",
                    render_standings(&self.view.participants, self.view.participant_id)
                );
            }
        }
    }

    async fn handle_line(&mut self, line: &str) -> Result<(), Box<dyn std::error::Error>> {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(()),
            Err(message) => {
                println!("{}", message);
                return Ok(());
            }
        };

        match command {
            Command::Help => println!("{}", HELP),
            Command::Quit => self.running = false,
            Command::State => {
                println!("{}", render_status(&self.view, get_timestamp()));
                self.send_packet(&Packet::RequestState).await?;
            }
            Command::Guess(_) if !self.view.can_guess(get_timestamp()) => {
                println!("You can't guess right now.");
            }
            Command::Pin(_) if !self.view.can_guess(get_timestamp()) => {
                println!("You can't place a pin right now.");
            }
            Command::Pin(coordinate) => {
                self.view.set_draft(coordinate);
                println!("Pin placed at {}, it is sent when time runs out", coordinate);
            }
            command => {
                if !self.connected {
                    println!("Not in a session yet.");
                    return Ok(());
                }
                if let Some(packet) = command.to_packet(self.view.current_round()) {
                    self.send_packet(&packet).await?;
                }
            }
        }
        Ok(())
    }

    /// Prints countdown steps: every 5 seconds, then each of the last five.
    /// Once the countdown is over an unsent pin goes out as the guess.
    async fn tick_countdown(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let now = get_timestamp();
        if let Some((round, coordinate)) = self.view.take_due_draft(now) {
            info!("Time is up, sending pin {} for round {}", coordinate, round);
            println!("Time's up! Sending your pin.");
            self.send_packet(&Packet::SubmitGuess { round, coordinate })
                .await?;
            return Ok(());
        }

        let Some(WindowState::Open { remaining_ms }) = self.view.countdown(now) else {
            return Ok(());
        };
        let secs = remaining_ms.div_ceil(1000);
        if self.last_announced == Some(secs) {
            return Ok(());
        }
        self.last_announced = Some(secs);
        if secs <= 5 || secs % 5 == 0 {
            let hint = if self.view.has_guessed() {
                ""
            } else if self.view.draft().is_some() {
                " (pin placed)"
            } else {
                " (no pin yet)"
            };
            println!("{}s left{}", secs, hint);
        }
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut lines = BufReader::new(stdin()).lines();
        let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
        let mut countdown_interval = interval(COUNTDOWN_INTERVAL);

        let mut buffer = [0u8; MAX_PACKET_SIZE];

        while self.running {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => match deserialize::<Packet>(&buffer[0..len]) {
                            Ok(packet) => self.handle_packet(packet).await,
                            Err(e) => warn!("Dropping malformed packet: {}", e),
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            if let Err(e) = self.handle_line(&line).await {
                                error!("Error sending command: {}", e);
                            }
                        }
                        Ok(None) => self.running = false,
                        Err(e) => {
                            error!("Error reading input: {}", e);
                            self.running = false;
                        }
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if self.connected {
                        let packet = Packet::Heartbeat { timestamp: get_timestamp() };
                        if let Err(e) = self.send_packet(&packet).await {
                            error!("Error sending heartbeat: {}", e);
                        }
                    }
                },

                _ = countdown_interval.tick() => {
                    if let Err(e) = self.tick_countdown().await {
                        error!("Error sending pin: {}", e);
                    }
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Leave).await;
        }

        Ok(())
    }
}
