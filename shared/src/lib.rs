//! Court simulation and synchronization primitives shared by the coordinator and
//! its clients.
//!
//! Both roles run the same frame driver against the same [`MatchState`]; the
//! coordinator runs it as [`Role::Authority`] and clients as [`Role::Observer`].

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod clock;
pub mod error;
pub mod events;
pub mod frame;
pub mod hints;
pub mod hooks;
pub mod input;
pub mod jump;
pub mod phase;
pub mod possession;
pub mod protocol;
pub mod rules;
pub mod safety_net;
pub mod state;

pub use clock::MatchRules;
pub use error::SyncError;
pub use events::GameEvent;
pub use frame::{FrameConfig, FrameDriver, FrameOutcome, Role};
pub use phase::GamePhase;
pub use protocol::{InputEvent, InputPacket, Key, PhaseHint, StateSnapshot};
pub use state::{Controller, MatchState, PlayerId, Team};

pub const PROTOCOL_VERSION: u32 = 1;

pub const COURT_WIDTH: f32 = 80.0;
pub const COURT_HEIGHT: f32 = 20.0;
pub const MIDCOURT_X: f32 = COURT_WIDTH / 2.0;
pub const BASKET_INSET: f32 = 4.0;

pub const TICK_COUNTER_WRAP: u32 = 1_000_000;

pub const SHOT_CLOCK_DEFAULT: i32 = 24;
pub const SHOT_CLOCK_RESET_PAUSE_MS: u64 = 1500;
pub const GAME_LENGTH_SECONDS: i32 = 360;
pub const OVERTIME_LENGTH_SECONDS: i32 = 60;

pub const NULL_CARRIER_FRAME_LIMIT: u32 = 18;
pub const BALL_OUT_OF_BOUNDS_FRAME_LIMIT: u32 = 10;
pub const STALE_INBOUND_FRAME_LIMIT: u32 = 90;
pub const OUT_OF_BOUNDS_MARGIN: f32 = 2.0;
pub const INBOUND_GRACE_FRAMES: u16 = 30;

pub const MOVE_STEP: f32 = 1.0;
pub const TURBO_MOVE_STEP: f32 = 2.0;
pub const PLAYER_COLLISION_RADIUS: f32 = 1.5;
pub const MAX_TURBO: f32 = 100.0;
pub const TURBO_REGEN_PER_FRAME: f32 = 0.5;
pub const TURBO_COST_PER_STEP: f32 = 2.0;

pub const SHOVE_RANGE: f32 = 2.5;
pub const SHOVE_KNOCKBACK: f32 = 3.0;
pub const SHOVE_STUN_FRAMES: u16 = 20;
pub const SHOVE_FAILURE_STUN_FRAMES: u16 = 12;
pub const DUNK_RANGE: f32 = 5.0;

pub const HINT_BUFFER_CAPACITY: usize = 64;
pub const HINT_HORIZON_FRAMES: u32 = 6;

/// Every datagram exchanged between clients and the coordinator.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input(InputPacket),
    Disconnect,

    Connected {
        player_id: PlayerId,
        team: Team,
        coordinator: Option<PlayerId>,
    },
    Snapshot(StateSnapshot),
    Disconnected {
        reason: String,
    },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

pub fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dx * dx + dy * dy).sqrt()
}

pub fn clamp_to_court(x: f32, y: f32) -> (f32, f32) {
    (x.clamp(0.0, COURT_WIDTH), y.clamp(0.0, COURT_HEIGHT))
}

pub fn court_center() -> (f32, f32) {
    (MIDCOURT_X, COURT_HEIGHT / 2.0)
}

/// Wall-clock milliseconds, the time base for packet timestamps and frames.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
