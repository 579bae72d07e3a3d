//! Ball-handler watchdogs: stuck carriers, held dead balls and stalled
//! frontcourt advancement.

use log::{debug, warn};

use crate::state::{Field, MatchState, PlayerId};
use crate::distance;

#[derive(Debug, Clone, PartialEq)]
pub struct StuckLadder {
    /// Movement below this per tick counts as stuck.
    pub move_threshold: f32,
    /// A defender this close means the carrier is closely guarded.
    pub guard_radius: f32,
    pub guarded_pickup_ticks: u32,
    pub unguarded_decision_ticks: u32,
    pub dead_dribble_reraise_ticks: u32,
    pub forced_shot_ms: u64,
    pub five_second_ms: u64,
    pub advancement_threshold: f32,
    pub advancement_stall_ticks: u32,
}

impl Default for StuckLadder {
    fn default() -> Self {
        Self {
            move_threshold: 3.0,
            guard_radius: 4.0,
            guarded_pickup_ticks: 8,
            unguarded_decision_ticks: 20,
            dead_dribble_reraise_ticks: 30,
            forced_shot_ms: 4500,
            five_second_ms: 5000,
            advancement_threshold: 1.0,
            advancement_stall_ticks: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PossessionWatch {
    carrier: Option<PlayerId>,
    last_x: f32,
    last_y: f32,
    pub stuck_ticks: u32,
    held_by: Option<PlayerId>,
    dead_since_ms: Option<u64>,
    forced_shot_issued: bool,
    advancing: Option<PlayerId>,
    advance_ref_x: f32,
    pub advance_stall_ticks: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckAction {
    None,
    ForcePickup(PlayerId),
    ForceDecision(PlayerId),
    ReraiseDecision(PlayerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeldBallAction {
    None,
    ForceShot(PlayerId),
    FiveSecondViolation(PlayerId),
}

/// Counts ticks the carrier barely moves and escalates.
///
/// Escalation is a priority list, first match wins:
/// 1. closely guarded AI carrier with a live dribble: pick up the dribble and
///    force a decision,
/// 2. unguarded AI carrier with a live dribble: force a decision,
/// 3. AI carrier with a dead dribble and no pending decision: re-raise a
///    decision every `dead_dribble_reraise_ticks`.
pub fn track_stuck_carrier(state: &mut MatchState, ladder: &StuckLadder) -> StuckAction {
    let Some(carrier) = state.carrier() else {
        state.possession_watch.carrier = None;
        state.possession_watch.stuck_ticks = 0;
        return StuckAction::None;
    };
    let id = carrier.id;
    let (x, y) = carrier.position();
    let is_ai = carrier.is_ai();
    let dribble_live = carrier.dribble_live;
    let decision_pending = carrier.decision_pending;
    let guarded = state
        .nearest_opponent_distance(id)
        .map_or(false, |d| d <= ladder.guard_radius);

    let watch = &mut state.possession_watch;
    if watch.carrier != Some(id) {
        watch.carrier = Some(id);
        watch.last_x = x;
        watch.last_y = y;
        watch.stuck_ticks = 0;
        return StuckAction::None;
    }

    let moved = distance((watch.last_x, watch.last_y), (x, y));
    watch.last_x = x;
    watch.last_y = y;
    if moved >= ladder.move_threshold {
        watch.stuck_ticks = 0;
        return StuckAction::None;
    }
    watch.stuck_ticks += 1;
    let stuck = watch.stuck_ticks;

    if !is_ai {
        return StuckAction::None;
    }

    let action = if dribble_live && guarded && stuck >= ladder.guarded_pickup_ticks {
        StuckAction::ForcePickup(id)
    } else if dribble_live && !guarded && stuck >= ladder.unguarded_decision_ticks {
        StuckAction::ForceDecision(id)
    } else if !dribble_live
        && !decision_pending
        && ladder.dead_dribble_reraise_ticks > 0
        && stuck % ladder.dead_dribble_reraise_ticks == 0
    {
        StuckAction::ReraiseDecision(id)
    } else {
        StuckAction::None
    };

    if let Some(player) = state.players.get_mut(&id) {
        match action {
            StuckAction::ForcePickup(_) => {
                player.dribble_live = false;
                player.decision_pending = true;
                state.possession_watch.stuck_ticks = 0;
            }
            StuckAction::ForceDecision(_) => {
                player.decision_pending = true;
                state.possession_watch.stuck_ticks = 0;
            }
            StuckAction::ReraiseDecision(_) => {
                player.decision_pending = true;
            }
            StuckAction::None => {}
        }
    }
    if action != StuckAction::None {
        debug!("Stuck carrier {} after {} ticks: {:?}", id, stuck, action);
    }
    action
}

/// Five-second dead-ball timer. AI carriers are made to shoot at
/// `forced_shot_ms`; anyone still holding at `five_second_ms` is in violation.
pub fn track_held_ball(state: &mut MatchState, ladder: &StuckLadder, now_ms: u64) -> HeldBallAction {
    let held = state
        .carrier()
        .filter(|carrier| !carrier.dribble_live)
        .map(|carrier| (carrier.id, carrier.is_ai()));

    let watch = &mut state.possession_watch;
    let Some((id, is_ai)) = held else {
        watch.held_by = None;
        watch.dead_since_ms = None;
        watch.forced_shot_issued = false;
        return HeldBallAction::None;
    };

    if watch.held_by != Some(id) {
        watch.held_by = Some(id);
        watch.dead_since_ms = Some(now_ms);
        watch.forced_shot_issued = false;
    }
    let since = *watch.dead_since_ms.get_or_insert(now_ms);
    let held_for = now_ms.saturating_sub(since);

    if held_for >= ladder.five_second_ms {
        watch.held_by = None;
        watch.dead_since_ms = None;
        watch.forced_shot_issued = false;
        warn!("Player {} held a dead ball for {}ms", id, held_for);
        return HeldBallAction::FiveSecondViolation(id);
    }
    if is_ai && held_for >= ladder.forced_shot_ms && !watch.forced_shot_issued {
        watch.forced_shot_issued = true;
        return HeldBallAction::ForceShot(id);
    }
    HeldBallAction::None
}

/// Tracks forward progress of the current handler relative to where they got
/// the ball and returns whether advancement has stalled in the frontcourt.
pub fn track_advancement(state: &mut MatchState, ladder: &StuckLadder) -> bool {
    let handler = state.carrier().map(|c| (c.id, c.x, c.team));

    let stalled = {
        let watch = &mut state.possession_watch;
        match handler {
            None => {
                watch.advancing = None;
                watch.advance_stall_ticks = 0;
                false
            }
            Some((id, x, team)) => {
                if watch.advancing != Some(id) {
                    watch.advancing = Some(id);
                    watch.advance_ref_x = x;
                    watch.advance_stall_ticks = 0;
                }
                let progress = (x - watch.advance_ref_x) * team.attack_direction();
                if progress >= ladder.advancement_threshold {
                    watch.advance_ref_x = x;
                    watch.advance_stall_ticks = 0;
                } else if team.in_frontcourt(x) {
                    watch.advance_stall_ticks += 1;
                }
                watch.advance_stall_ticks >= ladder.advancement_stall_ticks
            }
        }
    };

    if stalled != state.fields.advancement_stalled {
        state.set(Field::AdvancementStalled(stalled), "frontcourt_progress");
    }
    stalled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MatchRules;
    use crate::state::{Controller, Team};

    fn state_with_carrier(controller: Controller) -> MatchState {
        let mut state = MatchState::new();
        state.add_player(1, Team::Home, controller);
        state.add_player(2, Team::Away, Controller::Ai);
        state.begin_match(&MatchRules::default());
        state.give_ball(1, "test");
        state
    }

    fn place(state: &mut MatchState, id: PlayerId, x: f32, y: f32) {
        let p = state.players.get_mut(&id).unwrap();
        p.x = x;
        p.y = y;
    }

    #[test]
    fn test_guarded_ai_carrier_picks_up_after_eight_ticks() {
        let mut state = state_with_carrier(Controller::Ai);
        place(&mut state, 1, 50.0, 10.0);
        place(&mut state, 2, 52.0, 10.0);
        let ladder = StuckLadder::default();

        assert_eq!(track_stuck_carrier(&mut state, &ladder), StuckAction::None);
        for _ in 0..7 {
            assert_eq!(track_stuck_carrier(&mut state, &ladder), StuckAction::None);
        }
        assert_eq!(
            track_stuck_carrier(&mut state, &ladder),
            StuckAction::ForcePickup(1)
        );
        assert!(!state.players[&1].dribble_live);
        assert!(state.players[&1].decision_pending);
    }

    #[test]
    fn test_unguarded_ai_carrier_forced_after_twenty_ticks() {
        let mut state = state_with_carrier(Controller::Ai);
        place(&mut state, 1, 50.0, 10.0);
        place(&mut state, 2, 10.0, 10.0);
        let ladder = StuckLadder::default();

        track_stuck_carrier(&mut state, &ladder);
        for _ in 0..19 {
            assert_eq!(track_stuck_carrier(&mut state, &ladder), StuckAction::None);
        }
        assert_eq!(
            track_stuck_carrier(&mut state, &ladder),
            StuckAction::ForceDecision(1)
        );
        assert!(state.players[&1].dribble_live);
    }

    #[test]
    fn test_dead_dribble_reraises_every_thirty_ticks() {
        let mut state = state_with_carrier(Controller::Ai);
        place(&mut state, 2, 10.0, 10.0);
        state.players.get_mut(&1).unwrap().dribble_live = false;
        let ladder = StuckLadder::default();

        track_stuck_carrier(&mut state, &ladder);
        let mut raised = 0;
        for _ in 0..60 {
            if let StuckAction::ReraiseDecision(_) = track_stuck_carrier(&mut state, &ladder) {
                raised += 1;
                state.players.get_mut(&1).unwrap().decision_pending = false;
            }
        }
        assert_eq!(raised, 2);
    }

    #[test]
    fn test_moving_carrier_resets_counter() {
        let mut state = state_with_carrier(Controller::Ai);
        place(&mut state, 2, 10.0, 10.0);
        let ladder = StuckLadder::default();

        track_stuck_carrier(&mut state, &ladder);
        for _ in 0..5 {
            track_stuck_carrier(&mut state, &ladder);
        }
        assert_eq!(state.possession_watch.stuck_ticks, 5);

        state.players.get_mut(&1).unwrap().x += 5.0;
        track_stuck_carrier(&mut state, &ladder);
        assert_eq!(state.possession_watch.stuck_ticks, 0);
    }

    #[test]
    fn test_human_carrier_never_escalates() {
        let mut state = state_with_carrier(Controller::Human);
        place(&mut state, 1, 50.0, 10.0);
        place(&mut state, 2, 51.0, 10.0);
        let ladder = StuckLadder::default();

        for _ in 0..100 {
            assert_eq!(track_stuck_carrier(&mut state, &ladder), StuckAction::None);
        }
    }

    #[test]
    fn test_held_ball_forces_shot_then_violation() {
        let mut state = state_with_carrier(Controller::Ai);
        state.players.get_mut(&1).unwrap().dribble_live = false;
        let ladder = StuckLadder::default();

        assert_eq!(track_held_ball(&mut state, &ladder, 1000), HeldBallAction::None);
        assert_eq!(track_held_ball(&mut state, &ladder, 5400), HeldBallAction::None);
        assert_eq!(
            track_held_ball(&mut state, &ladder, 5500),
            HeldBallAction::ForceShot(1)
        );
        assert_eq!(track_held_ball(&mut state, &ladder, 5800), HeldBallAction::None);
        assert_eq!(
            track_held_ball(&mut state, &ladder, 6000),
            HeldBallAction::FiveSecondViolation(1)
        );
    }

    #[test]
    fn test_human_held_ball_only_violates() {
        let mut state = state_with_carrier(Controller::Human);
        state.players.get_mut(&1).unwrap().dribble_live = false;
        let ladder = StuckLadder::default();

        assert_eq!(track_held_ball(&mut state, &ladder, 0), HeldBallAction::None);
        assert_eq!(track_held_ball(&mut state, &ladder, 4600), HeldBallAction::None);
        assert_eq!(
            track_held_ball(&mut state, &ladder, 5000),
            HeldBallAction::FiveSecondViolation(1)
        );
    }

    #[test]
    fn test_live_dribble_clears_held_timer() {
        let mut state = state_with_carrier(Controller::Ai);
        state.players.get_mut(&1).unwrap().dribble_live = false;
        let ladder = StuckLadder::default();

        track_held_ball(&mut state, &ladder, 0);
        state.players.get_mut(&1).unwrap().dribble_live = true;
        assert_eq!(track_held_ball(&mut state, &ladder, 6000), HeldBallAction::None);
    }

    #[test]
    fn test_advancement_stalls_in_frontcourt() {
        let mut state = state_with_carrier(Controller::Human);
        place(&mut state, 1, 60.0, 10.0);
        let mut ladder = StuckLadder::default();
        ladder.advancement_stall_ticks = 5;

        for _ in 0..4 {
            assert!(!track_advancement(&mut state, &ladder));
        }
        assert!(track_advancement(&mut state, &ladder));
        assert!(state.fields.advancement_stalled);

        place(&mut state, 1, 62.0, 10.0);
        assert!(!track_advancement(&mut state, &ladder));
        assert!(!state.fields.advancement_stalled);
    }

    #[test]
    fn test_backcourt_standing_does_not_stall() {
        let mut state = state_with_carrier(Controller::Human);
        place(&mut state, 1, 20.0, 10.0);
        let mut ladder = StuckLadder::default();
        ladder.advancement_stall_ticks = 3;

        for _ in 0..10 {
            assert!(!track_advancement(&mut state, &ladder));
        }
    }
}
