//! Wire shapes for the input and state channels.
//!
//! Field names are shortened on the wire (`s`, `t`, `i` for input packets and
//! `f`, `t`, `p`, `b`, `g`, `m`, `a`, `ah`, `anims` for snapshots) so a full
//! snapshot stays well inside one datagram.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::SyncError;
use crate::hints::AnimationHint;
use crate::jump::JumpIndicator;
use crate::phase::GamePhase;
use crate::state::{Controller, MatchState, PlayerId, Team};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Shoot,
    Pass,
    Shove,
}

impl Key {
    /// Unit step for movement keys, `None` for action buttons.
    pub fn direction(self) -> Option<(f32, f32)> {
        match self {
            Key::Up => Some((0.0, -1.0)),
            Key::Down => Some((0.0, 1.0)),
            Key::Left => Some((-1.0, 0.0)),
            Key::Right => Some((1.0, 0.0)),
            Key::Shoot | Key::Pass | Key::Shove => None,
        }
    }

    pub fn is_movement(self) -> bool {
        self.direction().is_some()
    }
}

impl FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "w" | "up" => Ok(Key::Up),
            "s" | "down" => Ok(Key::Down),
            "a" | "left" => Ok(Key::Left),
            "d" | "right" => Ok(Key::Right),
            "k" | "shoot" => Ok(Key::Shoot),
            "j" | "pass" => Ok(Key::Pass),
            "l" | "shove" => Ok(Key::Shove),
            other => Err(format!("unknown key '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    #[serde(rename = "k")]
    pub key: Key,
    /// Client frame the key was pressed on. Used for cross-player ordering.
    #[serde(rename = "f")]
    pub frame: u32,
    #[serde(rename = "t", default)]
    pub turbo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputPacket {
    #[serde(rename = "s")]
    pub sequence: u32,
    #[serde(rename = "t")]
    pub timestamp: u64,
    #[serde(rename = "i")]
    pub inputs: Vec<InputEvent>,
}

/// How hard clients should trust the snapshot over their own prediction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseHint {
    #[default]
    NormalPlay,
    InboundWalk,
    PostSnapRecovery,
    Stoppage,
}

impl PhaseHint {
    pub fn for_state(state: &MatchState) -> PhaseHint {
        let phase = state.phase.kind;
        if phase == GamePhase::InboundSetup || state.fields.inbounding {
            PhaseHint::InboundWalk
        } else if phase.stops_clock() || state.violation.active {
            PhaseHint::Stoppage
        } else {
            PhaseHint::NormalPlay
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub id: PlayerId,
    #[serde(rename = "tm")]
    pub team: Team,
    #[serde(rename = "c")]
    pub controller: Controller,
    pub x: f32,
    pub y: f32,
    #[serde(rename = "tb")]
    pub turbo: f32,
    #[serde(rename = "st", default)]
    pub stunned: bool,
    #[serde(rename = "ji", default)]
    pub jump_indicator: Option<JumpIndicator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallEntry {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "c")]
    pub carrier: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameFieldsEntry {
    #[serde(rename = "tr")]
    pub time_remaining: i32,
    #[serde(rename = "sc")]
    pub shot_clock: i32,
    #[serde(rename = "h")]
    pub half: u8,
    #[serde(rename = "ot")]
    pub overtime_periods: u8,
    #[serde(rename = "s")]
    pub score: [u32; 2],
    #[serde(rename = "po")]
    pub possession: Team,
    #[serde(rename = "ph")]
    pub phase: GamePhase,
    #[serde(rename = "hn")]
    pub phase_hint: PhaseHint,
    #[serde(rename = "sp")]
    pub shot_in_progress: bool,
    #[serde(rename = "ra")]
    pub rebound_active: bool,
    #[serde(rename = "ib")]
    pub inbounding: bool,
    #[serde(rename = "gr")]
    pub game_running: bool,
    #[serde(rename = "va")]
    pub violation_active: bool,
    #[serde(rename = "co", default)]
    pub coordinator: Option<PlayerId>,
}

/// An in-progress block jump, so late joiners draw the arc mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimEntry {
    #[serde(rename = "p")]
    pub player: PlayerId,
    #[serde(rename = "e")]
    pub elapsed_ms: u64,
    #[serde(rename = "d")]
    pub duration_ms: u64,
    #[serde(rename = "h")]
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(rename = "f")]
    pub frame: u32,
    #[serde(rename = "t")]
    pub timestamp: u64,
    #[serde(rename = "p")]
    pub players: Vec<PlayerEntry>,
    #[serde(rename = "b")]
    pub ball: BallEntry,
    #[serde(rename = "g")]
    pub game: GameFieldsEntry,
    /// Player id to index in `players`.
    #[serde(rename = "m")]
    pub index: BTreeMap<PlayerId, u16>,
    /// Last applied input sequence per player.
    #[serde(rename = "a", default)]
    pub acks: BTreeMap<PlayerId, u32>,
    #[serde(rename = "ah", default)]
    pub hints: Vec<AnimationHint>,
    #[serde(default)]
    pub anims: Vec<AnimEntry>,
}

impl StateSnapshot {
    /// Reads the authoritative state into a broadcast unit. Acks, hints and the
    /// coordinator id are filled in by the caller.
    pub fn capture(state: &MatchState, frame: u32, now_ms: u64) -> Self {
        let players: Vec<PlayerEntry> = state
            .players
            .values()
            .map(|p| PlayerEntry {
                id: p.id,
                team: p.team,
                controller: p.controller,
                x: p.x,
                y: p.y,
                turbo: p.turbo,
                stunned: p.recovery.is_stunned(),
                jump_indicator: p.jump_indicator,
            })
            .collect();

        let index = players
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id, i as u16))
            .collect();

        let anims = state
            .players
            .values()
            .filter_map(|p| {
                p.block_jump.map(|jump| AnimEntry {
                    player: p.id,
                    elapsed_ms: jump.elapsed(now_ms),
                    duration_ms: jump.duration_ms,
                    height: jump.height,
                })
            })
            .collect();

        let fields = &state.fields;
        Self {
            frame,
            timestamp: now_ms,
            players,
            ball: BallEntry {
                x: state.ball.x,
                y: state.ball.y,
                carrier: state.ball.carrier,
            },
            game: GameFieldsEntry {
                time_remaining: fields.time_remaining,
                shot_clock: fields.shot_clock,
                half: fields.half,
                overtime_periods: fields.overtime_periods,
                score: fields.score,
                possession: fields.possession,
                phase: state.phase.kind,
                phase_hint: PhaseHint::for_state(state),
                shot_in_progress: fields.shot_in_progress,
                rebound_active: fields.rebound_active,
                inbounding: fields.inbounding,
                game_running: fields.game_running,
                violation_active: state.violation.active,
                coordinator: None,
            },
            index,
            acks: BTreeMap::new(),
            hints: Vec::new(),
            anims,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerEntry> {
        self.index
            .get(&id)
            .and_then(|&i| self.players.get(i as usize))
    }

    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
