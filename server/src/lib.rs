//! # Geography Game Server Library
//!
//! This library provides the authoritative server for a realtime multiplayer
//! geography-guessing game. Players join a shared session, see a historical
//! image, drop a pin where they think it happened before a shared deadline,
//! and are scored by how close the pin lands.
//!
//! ## Core Responsibilities
//!
//! ### Session Authority
//! The server owns every session's status and phase. Host commands (start,
//! open guessing, advance, end) are validated against the caller's identity
//! and the current state before anything changes. Clients only ever render
//! what the server publishes.
//!
//! ### Deadline Enforcement
//! A round's deadline is derived from the timestamp stamped when guessing
//! opened plus the session's guess-time budget. A short grace period absorbs
//! in-flight submissions, after which the round is closed and scored. The
//! same derivation lives in `shared` so clients count down identically.
//!
//! ### Exactly-Once Scoring
//! A round settles when everyone has guessed or when its window closes. Both
//! paths race for a conditional store write, so the scoring pass runs once
//! per round no matter how many submissions arrive at the deadline.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The session state machine: lobby operations, phase transitions, round
//! progression with a no-repeat challenge pool, and termination policies.
//!
//! ### Reconciler Module (`reconciler`)
//! Guess intake, completion detection and the per-round scoring pass.
//!
//! ### Scheduler Module (`scheduler`)
//! Tracks which guessing windows are running and reports each grace start
//! and close once.
//!
//! ### Collaborator Modules (`store`, `catalog`, `fanout`, `clock`)
//! Traits for persistence, challenge content, change notification and time,
//! each with the in-process implementation the binary runs on.
//!
//! ### Client Manager Module (`client_manager`)
//! Maps UDP addresses to connections and the session seat each one holds.
//!
//! ### Network Module (`network`)
//! UDP socket handling, packet dispatch into the state machine, relaying of
//! session events, and the deadline poll loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::catalog::InMemoryCatalog;
//! use server::clock::SystemClock;
//! use server::context::GameContext;
//! use server::fanout::ChannelFanout;
//! use server::game::GameStateMachine;
//! use server::network::{Server, ServerOptions};
//! use server::store::InMemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (fanout, notifications) = ChannelFanout::new();
//!     let ctx = GameContext::new(
//!         Arc::new(InMemoryStore::new()),
//!         Arc::new(InMemoryCatalog::new()),
//!         Arc::new(fanout),
//!         Arc::new(SystemClock),
//!     );
//!     let game = GameStateMachine::new(Arc::new(ctx));
//!
//!     let mut server =
//!         Server::new("127.0.0.1:8080", ServerOptions::default(), game, notifications).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! The server uses an event-driven architecture with internal async tasks that handle:
//! - **Network Receiver**: Continuously listens for incoming packets
//! - **Network Sender**: Processes outgoing packets and per-session broadcasts
//! - **Notification Relay**: Turns published session events into broadcasts
//! - **Timeout Checker**: Monitors client health and removes inactive connections
//! - **Main Loop**: Dispatches packets and polls guessing deadlines

pub mod catalog;
pub mod client_manager;
pub mod clock;
pub mod context;
pub mod error;
pub mod fanout;
pub mod game;
pub mod join_code;
pub mod locks;
pub mod network;
pub mod reconciler;
pub mod scheduler;
pub mod store;
