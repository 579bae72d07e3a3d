//! Loose-ball watchdog.
//!
//! Guarantees the match never deadlocks waiting for a ball owner that will not
//! appear. Three independent counters are bumped while their condition holds and
//! zeroed the moment it does not; the first to reach its limit forces an
//! emergency rebound.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::events::GameEvent;
use crate::hooks::SimHooks;
use crate::phase::GamePhase;
use crate::state::{Field, MatchState};
use crate::{
    court_center, BALL_OUT_OF_BOUNDS_FRAME_LIMIT, NULL_CARRIER_FRAME_LIMIT, OUT_OF_BOUNDS_MARGIN,
    STALE_INBOUND_FRAME_LIMIT,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyNetLimits {
    pub null_carrier_frames: u32,
    pub out_of_bounds_frames: u32,
    pub stale_inbound_frames: u32,
    pub out_of_bounds_margin: f32,
}

impl Default for SafetyNetLimits {
    fn default() -> Self {
        Self {
            null_carrier_frames: NULL_CARRIER_FRAME_LIMIT,
            out_of_bounds_frames: BALL_OUT_OF_BOUNDS_FRAME_LIMIT,
            stale_inbound_frames: STALE_INBOUND_FRAME_LIMIT,
            out_of_bounds_margin: OUT_OF_BOUNDS_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LooseBallWatch {
    pub frames_without_carrier: u32,
    pub frames_ball_out_of_bounds: u32,
    pub stale_inbound_frames: u32,
}

impl LooseBallWatch {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_clear(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LooseBallReason {
    NoCarrier,
    BallOutOfBounds,
    StaleInbound,
}

/// Runs one watchdog pass. Returns true when a recovery fired this tick.
pub fn evaluate(
    state: &mut MatchState,
    phase: GamePhase,
    limits: &SafetyNetLimits,
    ball_animating: bool,
    hooks: &mut dyn SimHooks,
) -> bool {
    if phase.suspends_safety_net() {
        state.loose_ball.reset();
        return false;
    }

    let fields = &state.fields;
    let no_carrier = state.ball.carrier.is_none();
    let grace_active = fields.inbound_grace_frames > 0;

    let lost = no_carrier
        && !fields.shot_in_progress
        && !fields.rebound_active
        && !fields.inbounding
        && !ball_animating;

    let out_of_bounds = !state.ball.in_bounds(limits.out_of_bounds_margin)
        && no_carrier
        && !fields.rebound_active
        && !fields.shot_in_progress;

    let stale_inbound = fields.inbounding
        && no_carrier
        && !ball_animating
        && phase != GamePhase::InboundSetup
        && fields.queued_pass.is_none()
        && !grace_active;

    let watch = &mut state.loose_ball;
    watch.frames_without_carrier = if lost { watch.frames_without_carrier + 1 } else { 0 };
    watch.frames_ball_out_of_bounds = if out_of_bounds {
        watch.frames_ball_out_of_bounds + 1
    } else {
        0
    };
    watch.stale_inbound_frames = if stale_inbound {
        watch.stale_inbound_frames + 1
    } else {
        0
    };

    if grace_active {
        state.fields.inbound_grace_frames -= 1;
    }

    let watch = state.loose_ball;
    let reason = if watch.frames_without_carrier >= limits.null_carrier_frames {
        LooseBallReason::NoCarrier
    } else if watch.frames_ball_out_of_bounds >= limits.out_of_bounds_frames {
        LooseBallReason::BallOutOfBounds
    } else if watch.stale_inbound_frames >= limits.stale_inbound_frames {
        LooseBallReason::StaleInbound
    } else {
        state.remember_ball_position();
        return false;
    };

    recover(state, reason, hooks);
    true
}

fn recover(state: &mut MatchState, reason: LooseBallReason, hooks: &mut dyn SimHooks) {
    let counters = state.loose_ball;
    warn!("Loose ball recovery ({:?}), counters {:?}", reason, counters);

    state.set(Field::Inbounding(false), "loose_ball_recovery");
    state.set(Field::InboundGrace(0), "loose_ball_recovery");
    state.set(Field::QueuedPass(None), "loose_ball_recovery");
    state.announce(GameEvent::LooseBall { reason, counters });

    let (x, y) = if state.ball.last_valid_x.is_finite() && state.ball.last_valid_y.is_finite() {
        state.ball.last_valid()
    } else {
        court_center()
    };
    state.ball.x = x;
    state.ball.y = y;
    state.set(Field::ReboundActive(true), "emergency_rebound");
    state.bump_counter("loose_ball_recoveries", "loose_ball_recovery");
    hooks.spawn_emergency_rebound(state, x, y);

    state.loose_ball.reset();
}
