//! # Geography Game Client Library
//!
//! A terminal client for the geography-guessing game. It joins or hosts a
//! session over UDP, mirrors the server's session state, and turns typed
//! commands into packets.
//!
//! ## Architecture Overview
//!
//! The server is the only authority. The client never decides a round's
//! outcome; it replaces its copy of the session with whatever the server
//! last sent and renders from that copy.
//!
//! ### Latest-Wins State
//! Every `SessionState` packet carries the full session and the server time
//! it was produced at. Older payloads are dropped, so reordering on the wire
//! can never move the view backwards.
//!
//! ### Shared Countdown
//! The countdown is derived from the timestamp the server stamped when
//! guessing opened, using the same `RoundWindow` arithmetic the server
//! settles with. The client only corrects for the offset between its clock
//! and the server's. A pin placed with `pin` but never sent goes out as the
//! guess once the countdown reaches its grace period.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! The client view: session, participants, current challenge, last results,
//! who has guessed, and the countdown.
//!
//! ### Input Module (`input`)
//! Parses terminal lines into commands and commands into packets.
//!
//! ### Network Module (`network`)
//! Socket handling, the create or join handshake, heartbeats, and the main
//! select loop over socket, stdin and countdown.
//!
//! ### Rendering Module (`rendering`)
//! Plain-text lobby, results and standings.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, Intent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let intent = Intent::Join {
//!         code: "K7M2QX".to_string(),
//!         name: "Ada".to_string(),
//!     };
//!     let mut client = Client::new("127.0.0.1:8080", intent).await?;
//!     client.run().await
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
