//! # Match Client Library
//!
//! This library provides the client side of a networked basketball match. It
//! sends the local player's keys to the coordinator, predicts their effect
//! locally and reconciles against the snapshots the coordinator broadcasts.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! Movement keys move the local player at once, with the same movement and
//! collision rule the coordinator applies. A client that is itself the session
//! coordinator skips prediction, since its inputs are already authoritative.
//!
//! ### Snapshot Reconciliation
//! Snapshots land in a latest-only slot. When a newer one is read, remote and
//! AI players are set to their broadcast positions exactly. The local player
//! is moved toward the authoritative position plus any unacknowledged inputs,
//! fully during inbound walks, stoppages and post-snap recovery and only
//! partially during normal play.
//!
//! ### Animation Hints
//! Snapshots carry short-lived cosmetic hints. Each one is played once; a lost
//! hint changes nothing but the visuals.
//!
//! ## Module Organization
//!
//! - `input`: sequencing and batching of key events into input packets
//! - `reconciler`: prediction, ack pruning and phase-aware correction
//! - `network`: UDP client loop, plus a solo mode running the authority locally
//! - `view`: text rendering of the court and scoreboard
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::reconciler::{ClientReconciler, ReconcileConfig};
//! use shared::Key;
//! use tokio::sync::watch;
//!
//! let (_snapshots_tx, snapshots) = watch::channel(None);
//! let mut reconciler = ClientReconciler::new(1, ReconcileConfig::default(), snapshots);
//!
//! reconciler.handle_input(Key::Right, 0, false);
//! if let Some(packet) = reconciler.take_packet(0) {
//!     // send `packet` to the coordinator
//!     let _ = packet;
//! }
//! reconciler.update();
//! ```

pub mod input;
pub mod network;
pub mod reconciler;
pub mod view;
