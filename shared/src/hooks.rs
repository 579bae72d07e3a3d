//! Collaborators the frame driver calls into but does not implement: AI,
//! physics, rendering, the phase state machine and the animation system.
//!
//! Each is resolved once when the driver is built. Every method has a no-op
//! default so a missing subsystem is simply skipped.

use crate::state::{MatchState, PlayerId};

pub trait SimHooks: Send {
    fn rubber_band(&mut self, _state: &mut MatchState) {}

    fn update_ai(&mut self, _state: &mut MatchState) {}

    fn check_sprite_collision(&mut self, _state: &mut MatchState) {}

    fn refresh_visuals(&mut self, _state: &MatchState) {}

    /// The phase state machine. It is the only writer of `state.phase`.
    fn advance_phase(&mut self, _state: &mut MatchState, _now_ms: u64) {}

    fn update_sprites(&mut self, _state: &mut MatchState) {}

    fn resolve_pass_intents(&mut self, _state: &mut MatchState) {}

    fn draw_court(&mut self, _state: &MatchState) {}

    fn draw_score(&mut self, _state: &MatchState) {}

    /// External rule checker, called once per authority tick. `true` ends the
    /// tick with a violation.
    fn check_violations(&mut self, _flag_so_far: bool, _state: &mut MatchState) -> bool {
        false
    }

    /// Called when regulation time runs out. `true` means overtime was set up
    /// and the match continues.
    fn offer_overtime(&mut self, _state: &mut MatchState) -> bool {
        false
    }

    fn spawn_emergency_rebound(&mut self, _state: &mut MatchState, _x: f32, _y: f32) {}

    fn on_possession_change(&mut self, _state: &mut MatchState) {}

    fn on_forced_shot(&mut self, _state: &mut MatchState, _shooter: PlayerId) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl SimHooks for NoopHooks {}

pub trait AnimationSystem: Send {
    fn is_ball_animating(&self, state: &MatchState) -> bool;

    fn update(&mut self, _state: &mut MatchState) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoAnimations;

impl AnimationSystem for NoAnimations {
    fn is_ball_animating(&self, _state: &MatchState) -> bool {
        false
    }
}

/// Mode-specific input polling, run once per frame.
pub trait InputHandler: Send {
    fn poll(&mut self, state: &mut MatchState, now_ms: u64);
}

/// Multiplayer authority and observers: input arrives through the coordinator's
/// input channels instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl InputHandler for NoInput {
    fn poll(&mut self, _state: &mut MatchState, _now_ms: u64) {}
}
