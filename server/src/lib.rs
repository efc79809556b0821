//! # Chat Server Library
//!
//! This library provides a minimal multiplayer server speaking the
//! varint-framed protocol defined in the `shared` crate. Clients go through
//! a handshake, either query the server status or log in, and once logged
//! in they receive a small fixed world plus every chat line broadcast by
//! other players.
//!
//! ## Core Responsibilities
//!
//! ### Protocol State Machine
//! Each accepted socket starts in the handshake state and moves forward
//! only: to status (server list query and ping) or to login. A successful
//! login switches the socket to the post-login frame layout and hands it to
//! a session. Unknown packet ids before play are logged and ignored.
//!
//! ### Sessions
//! A logged-in player gets three concurrent loops:
//! - A send loop, the only task that writes to the socket
//! - A receive loop, handling chat and slash commands
//! - A tick loop, queueing keep-alives and time updates
//!
//! Any loop ending cancels the other two, and the player is unregistered
//! exactly once afterwards.
//!
//! ### Broadcasting
//! The player registry belongs to a single hub task. Joins, leaves, chat and
//! queries are messages on its mailbox, so they apply in one global order
//! without locks. Fan-out never blocks: a session whose outbound queue is
//! full loses that frame instead of stalling everyone else.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! TCP listener and per-connection task spawning.
//!
//! ### Connection Module (`connection`)
//! Handshake, status and login handling.
//!
//! ### Session Module (`session`)
//! The three per-player loops and teardown.
//!
//! ### Hub and Registry Modules (`hub`, `registry`)
//! The broadcast actor and the name-indexed player table it owns.
//!
//! ### Game Module (`game`)
//! Process-wide state: configuration, hub handle, session id allocation.
//!
//! ### Commands Module (`commands`)
//! `/list`, `/help` and the reply for anything else.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::new("0.0.0.0:25565", 20)).await?;
//!
//!     // Accepts connections until the future is dropped
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod game;
pub mod hub;
pub mod network;
pub mod registry;
pub mod session;
