//! Block-jump arc integration and the ground-plane direction indicator.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::state::{MatchState, PlayerState};

pub const BLOCK_JUMP_DURATION_MS: u64 = 600;
pub const BLOCK_JUMP_PEAK: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JumpIndicator {
    Ascending,
    Descending,
}

impl JumpIndicator {
    pub fn glyphs(self) -> &'static str {
        match self {
            JumpIndicator::Ascending => "^ ^",
            JumpIndicator::Descending => "v v",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockJump {
    pub started_at_ms: u64,
    pub duration_ms: u64,
    pub peak: f32,
    pub height: f32,
    prev_bottom: Option<f32>,
}

impl BlockJump {
    pub fn new(started_at_ms: u64) -> Self {
        Self {
            started_at_ms,
            duration_ms: BLOCK_JUMP_DURATION_MS,
            peak: BLOCK_JUMP_PEAK,
            height: 0.0,
            prev_bottom: None,
        }
    }

    pub fn elapsed(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.started_at_ms)
    }
}

/// Sinusoidal arc: zero at take-off and landing, `peak` half way through.
pub fn height_at(elapsed_ms: u64, duration_ms: u64, peak: f32) -> f32 {
    if duration_ms == 0 || elapsed_ms >= duration_ms {
        return 0.0;
    }
    let t = elapsed_ms as f32 / duration_ms as f32;
    peak * (PI * t).sin()
}

pub fn start_block_jump(player: &mut PlayerState, now_ms: u64) -> bool {
    if player.block_jump.is_some() {
        return false;
    }
    player.block_jump = Some(BlockJump::new(now_ms));
    player.jump_indicator = Some(JumpIndicator::Ascending);
    true
}

/// Advances every airborne player. The indicator reads the sprite's
/// screen-space bottom edge: smaller than last tick means rising.
pub fn integrate_block_jumps(state: &mut MatchState, now_ms: u64) {
    let mut redraw = false;
    for player in state.players.values_mut() {
        let Some(jump) = player.block_jump.as_mut() else {
            continue;
        };
        redraw = true;

        let elapsed = jump.elapsed(now_ms);
        if elapsed >= jump.duration_ms {
            player.block_jump = None;
            player.jump_indicator = None;
            continue;
        }

        jump.height = height_at(elapsed, jump.duration_ms, jump.peak);
        let bottom = player.y - jump.height;
        let indicator = match jump.prev_bottom {
            Some(prev) if bottom > prev => JumpIndicator::Descending,
            Some(prev) if bottom < prev => JumpIndicator::Ascending,
            _ => player.jump_indicator.unwrap_or(JumpIndicator::Ascending),
        };
        jump.prev_bottom = Some(bottom);
        player.jump_indicator = Some(indicator);
    }
    if redraw {
        state.fields.court_needs_redraw = true;
    }
}
