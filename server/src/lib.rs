//! # Coordinator Server Library
//!
//! This library hosts the authoritative side of a networked basketball match.
//! One coordinator owns the canonical match state, applies every player's
//! inputs in client-frame order and publishes snapshots that all clients
//! reconcile against.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The coordinator runs the frame driver as the authority: it alone ticks the
//! game and shot clocks, runs the loose-ball safety net, resolves violations
//! and drives AI. Clients mirror those values from snapshots.
//!
//! ### Input Ingestion
//! Every player has a bounded input channel. Each tick the coordinator drains
//! all of them without blocking, drops packets that are duplicates, out of
//! order or stamped outside the accepted time window, and acknowledges the
//! highest sequence it applied.
//!
//! ### Snapshot Publication
//! Snapshots go out at a fixed cadence through one `watch` channel per player.
//! A slow receiver never sees a backlog: an undelivered snapshot is replaced
//! by the next one.
//!
//! ### Session Ownership
//! The session record names exactly one coordinating participant. Claims go
//! through a write lock with a re-read, and a participant that stops sending
//! is replaced through the same path.
//!
//! ## Module Organization
//!
//! - `client_manager`: address to player mapping, capacity and timeouts
//! - `coordinator`: the authority tick, drift detection and broadcast
//! - `input_channel`: per-player input queue with sequence and time checks
//! - `network`: UDP socket tasks and the main select loop
//! - `session`: the lockable coordinator claim
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::coordinator::{Coordinator, CoordinatorConfig};
//! use server::network::Server;
//! use server::session::SessionHandle;
//! use shared::rules::BasicRules;
//! use shared::FrameConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = Coordinator::new(
//!         CoordinatorConfig::default(),
//!         FrameConfig::authority(),
//!         BasicRules::new(),
//!     );
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16),
//!         8,
//!         coordinator,
//!         SessionHandle::new(5_000),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod coordinator;
pub mod input_channel;
pub mod network;
pub mod session;
