//! Per-key input dispatch.
//!
//! The coordinator applies every queued input through [`apply_input`]; clients
//! reuse [`apply_movement`] to predict their own sprite. Movement is re-checked
//! against opposing players at the planned destination. Teammates never block
//! each other.

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::error::SyncError;
use crate::events::GameEvent;
use crate::hooks::InputHandler;
use crate::jump::start_block_jump;
use crate::protocol::{InputEvent, Key};
use crate::state::{Field, MatchState, PassIntent, PlayerId, Value};
use crate::{
    clamp_to_court, distance, DUNK_RANGE, MOVE_STEP, PLAYER_COLLISION_RADIUS, SHOVE_FAILURE_STUN_FRAMES,
    SHOVE_KNOCKBACK, SHOVE_RANGE, SHOVE_STUN_FRAMES, TURBO_COST_PER_STEP, TURBO_MOVE_STEP,
};

/// Side-table key holding the id of the most recent shooter.
pub const LAST_SHOOTER_KEY: &str = "last_shooter";
/// Side-table key set at release when the most recent shot is a dunk.
pub const LAST_SHOT_DUNK_KEY: &str = "last_shot_dunk";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Shot,
    BlockJump,
    Pass,
    Shove,
    ShoveMissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEffect {
    Ignored,
    Moved,
    Blocked,
    Action(ActionKind),
}

pub fn apply_input(
    state: &mut MatchState,
    id: PlayerId,
    event: &InputEvent,
    now_ms: u64,
) -> Result<InputEffect, SyncError> {
    let player = state.players.get(&id).ok_or(SyncError::UnknownPlayer(id))?;
    if player.recovery.is_stunned() {
        return Ok(InputEffect::Ignored);
    }

    let effect = match event.key {
        Key::Up | Key::Down | Key::Left | Key::Right => apply_movement(state, id, event.key, event.turbo),
        Key::Shoot => {
            if state.ball.carrier == Some(id) {
                attempt_shot(state, id);
                InputEffect::Action(ActionKind::Shot)
            } else {
                let jumped = state
                    .players
                    .get_mut(&id)
                    .map_or(false, |player| start_block_jump(player, now_ms));
                if jumped {
                    state.fields.court_needs_redraw = true;
                    InputEffect::Action(ActionKind::BlockJump)
                } else {
                    InputEffect::Ignored
                }
            }
        }
        Key::Pass => queue_pass(state, id),
        Key::Shove => shove(state, id),
    };
    Ok(effect)
}

/// Moves a player one step, turbo permitting. The destination is rejected if an
/// opponent already stands within the collision radius of it.
pub fn apply_movement(state: &mut MatchState, id: PlayerId, key: Key, turbo: bool) -> InputEffect {
    let Some((dx, dy)) = key.direction() else {
        return InputEffect::Ignored;
    };
    let Some(player) = state.players.get(&id) else {
        return InputEffect::Ignored;
    };
    if player.recovery.is_stunned() {
        return InputEffect::Ignored;
    }

    let boosted = turbo && player.recovery.turbo_disabled == 0 && player.turbo >= TURBO_COST_PER_STEP;
    let step = if boosted { TURBO_MOVE_STEP } else { MOVE_STEP };
    let team = player.team;
    let destination = clamp_to_court(player.x + dx * step, player.y + dy * step);

    let blocked = state
        .players
        .values()
        .filter(|other| other.team != team)
        .any(|other| distance(other.position(), destination) < PLAYER_COLLISION_RADIUS);
    if blocked {
        return InputEffect::Blocked;
    }

    if let Some(player) = state.players.get_mut(&id) {
        player.x = destination.0;
        player.y = destination.1;
        if boosted {
            player.turbo -= TURBO_COST_PER_STEP;
        }
    }
    if state.ball.carrier == Some(id) {
        state.ball.x = destination.0;
        state.ball.y = destination.1;
    }
    state.fields.court_needs_redraw = true;
    InputEffect::Moved
}

/// Releases the ball toward the shooter's basket. Resolution belongs to the
/// phase machine.
pub fn attempt_shot(state: &mut MatchState, id: PlayerId) {
    let Some(player) = state.players.get_mut(&id) else {
        return;
    };
    player.dribble_live = false;
    player.decision_pending = false;
    let dunk = distance(player.position(), player.team.basket()) <= DUNK_RANGE;

    state.set(Field::BallCarrier(None), "shot_release");
    state.set(Field::ShotInProgress(true), "shot_release");
    state.set_extra(LAST_SHOOTER_KEY, Value::Int(id as i64), "shot_release");
    state.set_extra(LAST_SHOT_DUNK_KEY, Value::Bool(dunk), "shot_release");
    state.emit(GameEvent::ShotAttempt { shooter: id, dunk });
}

fn queue_pass(state: &mut MatchState, id: PlayerId) -> InputEffect {
    if state.ball.carrier != Some(id) || state.fields.queued_pass.is_some() {
        return InputEffect::Ignored;
    }
    let Some(to) = state.nearest_teammate(id) else {
        return InputEffect::Ignored;
    };
    let intent = PassIntent {
        from: id,
        to,
        queued_at: state.tick_counter,
    };
    state.set(Field::QueuedPass(Some(intent)), "pass_input");
    InputEffect::Action(ActionKind::Pass)
}

fn shove(state: &mut MatchState, id: PlayerId) -> InputEffect {
    let Some(attacker) = state.players.get(&id) else {
        return InputEffect::Ignored;
    };
    let origin = attacker.position();
    let victim = state
        .players
        .values()
        .filter(|other| other.team != attacker.team)
        .map(|other| (other.id, distance(origin, other.position())))
        .filter(|(_, d)| *d <= SHOVE_RANGE)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(victim, _)| victim);

    let Some(victim) = victim else {
        if let Some(attacker) = state.players.get_mut(&id) {
            attacker.recovery.shove_failure_stun = SHOVE_FAILURE_STUN_FRAMES;
        }
        debug!("Player {} shoved at nobody", id);
        return InputEffect::Action(ActionKind::ShoveMissed);
    };

    if let Some(target) = state.players.get_mut(&victim) {
        let (dx, dy) = (target.x - origin.0, target.y - origin.1);
        let len = (dx * dx + dy * dy).sqrt();
        let (nx, ny) = if len > f32::EPSILON {
            (dx / len, dy / len)
        } else {
            (target.team.attack_direction() * -1.0, 0.0)
        };
        let (x, y) = clamp_to_court(target.x + nx * SHOVE_KNOCKBACK, target.y + ny * SHOVE_KNOCKBACK);
        target.x = x;
        target.y = y;
        target.recovery.shove_stun = SHOVE_STUN_FRAMES;
    }

    if state.ball.carrier == Some(victim) {
        state.set(Field::BallCarrier(None), "shove_strip");
        state.set(Field::ReboundActive(true), "shove_strip");
    }
    state.fields.court_needs_redraw = true;
    state.emit(GameEvent::ShoveKnockback {
        attacker: id,
        victim,
    });
    InputEffect::Action(ActionKind::Shove)
}

/// Local input for the authority in single-player: key events arrive on a
/// bounded channel and are drained once per frame. Closing the sender ends
/// input for the match.
pub struct ChannelInput {
    receiver: mpsc::Receiver<(PlayerId, InputEvent)>,
    closed: bool,
}

impl ChannelInput {
    pub fn new(receiver: mpsc::Receiver<(PlayerId, InputEvent)>) -> Self {
        Self {
            receiver,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl InputHandler for ChannelInput {
    fn poll(&mut self, state: &mut MatchState, now_ms: u64) {
        if self.closed {
            return;
        }
        loop {
            match self.receiver.try_recv() {
                Ok((id, event)) => {
                    if let Err(e) = apply_input(state, id, &event, now_ms) {
                        debug!("Dropped local input: {}", e);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("Local input channel closed");
                    self.closed = true;
                    break;
                }
            }
        }
    }
}
