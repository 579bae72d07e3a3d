//! The frame driver: one simulation tick.
//!
//! The same driver runs on every participant. The [`Role`] it is built with
//! decides which steps are authoritative. The coordinator runs it as
//! [`Role::Authority`] and owns every simulation-affecting write; clients run it
//! as [`Role::Observer`] and only do local bookkeeping and presentation.

use log::{info, trace, warn};
use std::time::Duration;

use crate::clock::{DeferredAction, MatchRules, PauseStatus, ViolationKind};
use crate::error::SyncError;
use crate::events::GameEvent;
use crate::hooks::{AnimationSystem, InputHandler, NoAnimations, NoInput, NoopHooks, SimHooks};
use crate::input::attempt_shot;
use crate::jump::integrate_block_jumps;
use crate::phase::GamePhase;
use crate::possession::{track_advancement, track_held_ball, track_stuck_carrier, HeldBallAction};
use crate::safety_net::{self, SafetyNetLimits};
use crate::state::{Field, MatchState};
use crate::{MAX_TURBO, TICK_COUNTER_WRAP, TURBO_REGEN_PER_FRAME};

/// Which side of the session this driver simulates for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Canonical simulation: clocks, violations, safety net, AI, physics and
    /// phase advancement.
    Authority,
    /// Local mirror: bookkeeping, jump arcs, prediction input and drawing.
    Observer,
}

impl Role {
    pub fn is_authority(self) -> bool {
        self == Role::Authority
    }
}

#[derive(Debug, Clone)]
pub struct FrameConfig {
    pub role: Role,
    /// Minimum spacing between AI updates. 0 runs AI every tick.
    pub ai_interval_ms: u64,
    /// Target spacing between frames, used by the caller's loop.
    pub frame_delay_ms: u64,
    pub rules: MatchRules,
    pub limits: SafetyNetLimits,
    pub court_redraw_ms: u64,
    pub hud_redraw_ms: u64,
}

impl FrameConfig {
    pub fn authority() -> Self {
        Self::default()
    }

    pub fn observer() -> Self {
        Self {
            role: Role::Observer,
            ..Self::default()
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            role: Role::Authority,
            ai_interval_ms: 0,
            frame_delay_ms: 16,
            rules: MatchRules::default(),
            limits: SafetyNetLimits::default(),
            court_redraw_ms: 60,
            hud_redraw_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Continue,
    Halftime,
    Violation,
    GameOver,
}

pub struct FrameDriver {
    config: FrameConfig,
    hooks: Box<dyn SimHooks>,
    animations: Box<dyn AnimationSystem>,
    input: Box<dyn InputHandler>,
    last_ai_ms: Option<u64>,
    last_court_draw_ms: Option<u64>,
    last_hud_draw_ms: Option<u64>,
}

impl FrameDriver {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            hooks: Box::new(NoopHooks),
            animations: Box::new(NoAnimations),
            input: Box::new(NoInput),
            last_ai_ms: None,
            last_court_draw_ms: None,
            last_hud_draw_ms: None,
        }
    }

    pub fn with_hooks(mut self, hooks: impl SimHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn with_animations(mut self, animations: impl AnimationSystem + 'static) -> Self {
        self.animations = Box::new(animations);
        self
    }

    pub fn with_input(mut self, input: impl InputHandler + 'static) -> Self {
        self.input = Box::new(input);
        self
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(self.config.frame_delay_ms)
    }

    /// Advances the match by one tick.
    ///
    /// Returns early with [`FrameOutcome::Halftime`], [`FrameOutcome::Violation`]
    /// or [`FrameOutcome::GameOver`] so the caller can branch. The only error is
    /// a state store that was never started.
    pub fn run_frame(&mut self, state: &mut MatchState, now_ms: u64) -> Result<FrameOutcome, SyncError> {
        state.ensure_started()?;
        if !state.fields.game_running {
            return Ok(FrameOutcome::GameOver);
        }
        let authority = self.config.role.is_authority();

        let mut violation_pause_active = false;
        if authority {
            match state.violation.poll(now_ms) {
                PauseStatus::Idle => {}
                PauseStatus::Holding => violation_pause_active = true,
                PauseStatus::Expired(action) => {
                    if let Some(action) = action {
                        self.run_deferred(state, action);
                    }
                    state.clock.rearm();
                }
            }
        }

        Self::bookkeeping(state, now_ms);

        let phase = state.phase.kind;
        let simulating = authority
            && !violation_pause_active
            && phase != GamePhase::Paused
            && !state.fields.pause_menu_open;

        if simulating {
            self.hooks.rubber_band(state);
            let animating = self.animations.is_ball_animating(state);
            safety_net::evaluate(state, phase, &self.config.limits, animating, self.hooks.as_mut());
        }

        if simulating && !phase.stops_clock() {
            if let Some(outcome) = self.clock_block(state, now_ms) {
                return Ok(outcome);
            }
        }

        if authority && self.resolve_pending_halftime(state) {
            return Ok(FrameOutcome::Halftime);
        }

        integrate_block_jumps(state, now_ms);

        self.input.poll(state, now_ms);

        if simulating && !state.phase.kind.suspends_ai() && self.ai_due(now_ms) {
            self.last_ai_ms = Some(now_ms);
            self.hooks.update_ai(state);
        }

        for player in state.players.values_mut() {
            player.turbo = (player.turbo + TURBO_REGEN_PER_FRAME).min(MAX_TURBO);
            if !player.is_ai() {
                player.recovery.tick();
            }
        }

        if authority && state.phase.kind.allows_physics() {
            self.hooks.check_sprite_collision(state);
        }

        self.hooks.refresh_visuals(state);

        if authority {
            self.hooks.advance_phase(state, now_ms);
            if state.phase.kind.suspends_safety_net() {
                state.loose_ball.reset();
            }
        }

        self.animations.update(state);
        self.hooks.update_sprites(state);
        if authority {
            self.hooks.resolve_pass_intents(state);
        }

        self.draw(state, now_ms);

        if authority && state.fields.time_remaining <= 0 {
            if self.hooks.offer_overtime(state) {
                state.clock.rearm();
                return Ok(FrameOutcome::Continue);
            }
            state.set(Field::GameRunning(false), "time_expired");
            let score = state.fields.score;
            state.announce(GameEvent::GameOver { score });
            return Ok(FrameOutcome::GameOver);
        }

        trace!("Frame {} done ({:?})", state.tick_counter, state.phase.kind);
        Ok(FrameOutcome::Continue)
    }

    /// Previous positions for velocity, expired buffs, and the wrapping tick.
    fn bookkeeping(state: &mut MatchState, now_ms: u64) {
        for player in state.players.values_mut() {
            player.prev_x = player.x;
            player.prev_y = player.y;
            if player.buff.map_or(false, |buff| now_ms >= buff.expires_at_ms) {
                player.buff = None;
            }
        }
        state.tick_counter = (state.tick_counter + 1) % TICK_COUNTER_WRAP;
    }

    /// Clock decrement, halftime, shot clock and stuck carrier on the decrement
    /// edge, then held ball and advancement checks. `Some` ends the tick early.
    fn clock_block(&mut self, state: &mut MatchState, now_ms: u64) -> Option<FrameOutcome> {
        let rules = self.config.rules.clone();

        if state.clock.due(now_ms, rules.decrement_interval_ms()) {
            let before = state.fields.time_remaining;
            state.set(Field::TimeRemaining(before - 1), "clock_tick");
            state.set(Field::ShotClock(state.fields.shot_clock - 1), "clock_tick");

            let mark = rules.halftime_mark();
            if state.fields.half == 1 && before > mark && state.fields.time_remaining <= mark {
                if self.play_in_flight(state) {
                    info!("Halftime reached during a live play, deferring");
                    state.set(Field::PendingHalftime(true), "halftime_deferred");
                } else {
                    self.start_halftime(state);
                    return Some(FrameOutcome::Halftime);
                }
            }

            if state.fields.shot_clock <= 0 {
                let team = state.fields.possession;
                warn!("Shot clock violation on {:?}", team);
                state.announce(GameEvent::Violation {
                    kind: ViolationKind::ShotClock,
                    team,
                });
                state.violation.start(
                    ViolationKind::ShotClock,
                    now_ms + rules.violation_pause_ms,
                    DeferredAction::SwitchPossession,
                );
                state.set(Field::ShotClock(rules.shot_clock_seconds), "shot_clock_violation");
                return Some(FrameOutcome::Violation);
            }

            // Stuck ticks count clock decrements, not frames.
            track_stuck_carrier(state, &rules.stuck);
        }

        if self.resolve_pending_halftime(state) {
            return Some(FrameOutcome::Halftime);
        }

        match track_held_ball(state, &rules.stuck, now_ms) {
            HeldBallAction::None => {}
            HeldBallAction::ForceShot(id) => {
                info!("Forcing a shot from player {}", id);
                attempt_shot(state, id);
                self.hooks.on_forced_shot(state, id);
            }
            HeldBallAction::FiveSecondViolation(_) => {
                self.start_violation(state, ViolationKind::FiveSecond, now_ms + rules.violation_pause_ms);
                return Some(FrameOutcome::Violation);
            }
        }

        let stalled = track_advancement(state, &rules.stuck);
        if self.hooks.check_violations(stalled, state) {
            self.start_violation(state, ViolationKind::External, now_ms + rules.violation_pause_ms);
            return Some(FrameOutcome::Violation);
        }
        None
    }

    fn start_violation(&mut self, state: &mut MatchState, kind: ViolationKind, resume_at_ms: u64) {
        let team = state.fields.possession;
        warn!("{:?} violation on {:?}", kind, team);
        state.announce(GameEvent::Violation { kind, team });
        state
            .violation
            .start(kind, resume_at_ms, DeferredAction::SwitchPossession);
    }

    fn run_deferred(&mut self, state: &mut MatchState, action: DeferredAction) {
        match action {
            DeferredAction::SwitchPossession => {
                state.switch_possession(self.config.rules.shot_clock_seconds, "violation_resolved");
                self.hooks.on_possession_change(state);
            }
        }
    }

    fn play_in_flight(&self, state: &MatchState) -> bool {
        state.fields.shot_in_progress || self.animations.is_ball_animating(state)
    }

    fn resolve_pending_halftime(&mut self, state: &mut MatchState) -> bool {
        if !state.fields.pending_halftime || self.play_in_flight(state) {
            return false;
        }
        self.start_halftime(state);
        true
    }

    fn start_halftime(&mut self, state: &mut MatchState) {
        state.set(Field::PendingHalftime(false), "halftime");
        state.set(Field::Half(2), "halftime");
        state.set(Field::ShotClock(self.config.rules.shot_clock_seconds), "halftime");
        state.clock.rearm();
        state.announce(GameEvent::Halftime);
    }

    fn ai_due(&self, now_ms: u64) -> bool {
        match self.last_ai_ms {
            _ if self.config.ai_interval_ms == 0 => true,
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= self.config.ai_interval_ms,
        }
    }

    fn draw(&mut self, state: &mut MatchState, now_ms: u64) {
        let court_due = self
            .last_court_draw_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= self.config.court_redraw_ms);
        if state.fields.court_needs_redraw && court_due {
            self.hooks.draw_court(state);
            state.fields.court_needs_redraw = false;
            self.last_court_draw_ms = Some(now_ms);
        }

        let hud_due = self
            .last_hud_draw_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= self.config.hud_redraw_ms);
        if hud_due {
            self.hooks.draw_score(state);
            self.last_hud_draw_ms = Some(now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::apply_movement;
    use crate::protocol::Key;
    use crate::state::{Controller, Team};
    use crate::SHOT_CLOCK_DEFAULT;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn live_state() -> MatchState {
        let mut state = MatchState::new();
        state.add_player(1, Team::Home, Controller::Human);
        state.add_player(2, Team::Away, Controller::Human);
        state.begin_match(&MatchRules::default());
        state.set(Field::Phase(GamePhase::Normal), "test");
        state
    }

    fn count_events(state: &MatchState, pred: impl Fn(&GameEvent) -> bool) -> usize {
        state.events().iter().filter(|e| pred(e)).count()
    }

    #[test]
    fn test_unstarted_state_is_contract_error() {
        let mut driver = FrameDriver::new(FrameConfig::authority());
        let mut state = MatchState::new();
        assert!(matches!(
            driver.run_frame(&mut state, 0),
            Err(SyncError::MatchNotStarted)
        ));
    }

    #[test]
    fn test_shot_clock_expiry_schedules_one_possession_switch() {
        let mut driver = FrameDriver::new(FrameConfig::authority());
        let mut state = live_state();
        state.give_ball(1, "test");
        state.set(Field::ShotClock(1), "test");

        assert_eq!(driver.run_frame(&mut state, 0).unwrap(), FrameOutcome::Continue);
        assert_eq!(driver.run_frame(&mut state, 1000).unwrap(), FrameOutcome::Violation);

        assert_eq!(state.fields.shot_clock, SHOT_CLOCK_DEFAULT);
        assert!(state.violation.active);
        assert_eq!(state.violation.resume_at_ms, 1000 + crate::SHOT_CLOCK_RESET_PAUSE_MS);
        assert_eq!(
            state.violation.pending_action(),
            Some(DeferredAction::SwitchPossession)
        );

        let mut violations = 1;
        for now in [1100, 1500, 2000, 2500, 2600, 2700] {
            if driver.run_frame(&mut state, now).unwrap() == FrameOutcome::Violation {
                violations += 1;
            }
        }
        assert_eq!(violations, 1);
        assert_eq!(
            count_events(&state, |e| matches!(e, GameEvent::PossessionChange { .. })),
            1
        );
        assert_eq!(state.fields.possession, Team::Away);
        assert!(!state.violation.active);
    }

    #[test]
    fn test_pause_holds_clocks() {
        let mut driver = FrameDriver::new(FrameConfig::authority());
        let mut state = live_state();
        state.give_ball(1, "test");
        state.set(Field::ShotClock(1), "test");
        driver.run_frame(&mut state, 0).unwrap();
        driver.run_frame(&mut state, 1000).unwrap();

        let time = state.fields.time_remaining;
        driver.run_frame(&mut state, 2200).unwrap();
        assert_eq!(state.fields.time_remaining, time);
    }

    #[test]
    fn test_halftime_deferred_until_shot_resolves() {
        let mut driver = FrameDriver::new(FrameConfig::authority());
        let mut state = live_state();
        let mark = MatchRules::default().halftime_mark();
        state.set(Field::TimeRemaining(mark + 1), "test");
        state.set(Field::ShotInProgress(true), "test");

        driver.run_frame(&mut state, 0).unwrap();
        assert_eq!(driver.run_frame(&mut state, 1000).unwrap(), FrameOutcome::Continue);
        assert!(state.fields.pending_halftime);
        assert_eq!(state.fields.half, 1);

        assert_eq!(driver.run_frame(&mut state, 1050).unwrap(), FrameOutcome::Continue);
        assert_eq!(state.fields.half, 1);

        state.set(Field::ShotInProgress(false), "test");
        let mut halftimes = 0;
        for now in [1100, 1150, 1200, 2300] {
            if driver.run_frame(&mut state, now).unwrap() == FrameOutcome::Halftime {
                halftimes += 1;
            }
        }
        assert_eq!(halftimes, 1);
        assert_eq!(state.fields.half, 2);
        assert!(!state.fields.pending_halftime);
    }

    #[test]
    fn test_pending_halftime_resolves_with_clock_stopped() {
        let mut driver = FrameDriver::new(FrameConfig::authority());
        let mut state = live_state();
        state.set(Field::Phase(GamePhase::InboundSetup), "test");
        state.set(Field::PendingHalftime(true), "test");

        assert_eq!(driver.run_frame(&mut state, 0).unwrap(), FrameOutcome::Halftime);
        assert_eq!(state.fields.half, 2);
    }

    #[test]
    fn test_observer_never_ticks_clocks() {
        let mut driver = FrameDriver::new(FrameConfig::observer());
        let mut state = live_state();
        let (time, shot) = (state.fields.time_remaining, state.fields.shot_clock);

        for now in [0, 1000, 2000, 3000] {
            assert_eq!(driver.run_frame(&mut state, now).unwrap(), FrameOutcome::Continue);
        }
        assert_eq!(state.fields.time_remaining, time);
        assert_eq!(state.fields.shot_clock, shot);
        assert!(state.loose_ball.is_clear());
    }

    #[test]
    fn test_skip_phase_leaves_counters_zero() {
        let mut driver = FrameDriver::new(FrameConfig::authority());
        let mut state = live_state();
        for now in 0..5 {
            driver.run_frame(&mut state, now).unwrap();
        }
        assert!(state.loose_ball.frames_without_carrier > 0);

        state.set(Field::Phase(GamePhase::ReboundScramble), "test");
        driver.run_frame(&mut state, 10).unwrap();
        assert!(state.loose_ball.is_clear());
    }

    #[test]
    fn test_time_expiry_ends_game() {
        let mut driver = FrameDriver::new(FrameConfig::authority());
        let mut state = live_state();
        state.give_ball(1, "test");
        state.set(Field::Half(2), "test");
        state.set(Field::TimeRemaining(1), "test");

        driver.run_frame(&mut state, 0).unwrap();
        assert_eq!(driver.run_frame(&mut state, 1000).unwrap(), FrameOutcome::GameOver);
        assert!(!state.fields.game_running);
        assert_eq!(
            count_events(&state, |e| matches!(e, GameEvent::GameOver { .. })),
            1
        );
        assert_eq!(driver.run_frame(&mut state, 1100).unwrap(), FrameOutcome::GameOver);
    }

    struct Overtime;

    impl SimHooks for Overtime {
        fn offer_overtime(&mut self, state: &mut MatchState) -> bool {
            state.set(Field::TimeRemaining(60), "overtime");
            true
        }
    }

    #[test]
    fn test_overtime_hook_keeps_match_running() {
        let mut driver = FrameDriver::new(FrameConfig::authority()).with_hooks(Overtime);
        let mut state = live_state();
        state.give_ball(1, "test");
        state.set(Field::Half(2), "test");
        state.set(Field::TimeRemaining(1), "test");

        driver.run_frame(&mut state, 0).unwrap();
        assert_eq!(driver.run_frame(&mut state, 1000).unwrap(), FrameOutcome::Continue);
        assert!(state.fields.game_running);
        assert_eq!(state.fields.time_remaining, 60);
    }

    struct Flagger;

    impl SimHooks for Flagger {
        fn check_violations(&mut self, _flag_so_far: bool, _state: &mut MatchState) -> bool {
            true
        }
    }

    #[test]
    fn test_external_violation_short_circuits() {
        let mut driver = FrameDriver::new(FrameConfig::authority()).with_hooks(Flagger);
        let mut state = live_state();
        state.give_ball(1, "test");

        assert_eq!(driver.run_frame(&mut state, 0).unwrap(), FrameOutcome::Violation);
        assert_eq!(
            state.violation.pending_action(),
            Some(DeferredAction::SwitchPossession)
        );
    }

    #[derive(Clone)]
    struct Counter {
        ai: Arc<AtomicUsize>,
        court: Arc<AtomicUsize>,
    }

    impl SimHooks for Counter {
        fn update_ai(&mut self, _state: &mut MatchState) {
            self.ai.fetch_add(1, Ordering::SeqCst);
        }

        fn draw_court(&mut self, _state: &MatchState) {
            self.court.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_ai_and_court_redraw_are_throttled() {
        let counter = Counter {
            ai: Arc::new(AtomicUsize::new(0)),
            court: Arc::new(AtomicUsize::new(0)),
        };
        let config = FrameConfig {
            ai_interval_ms: 100,
            ..FrameConfig::authority()
        };
        let mut driver = FrameDriver::new(config).with_hooks(counter.clone());
        let mut state = live_state();
        state.give_ball(1, "test");

        for now in (0..300).step_by(10) {
            state.fields.court_needs_redraw = true;
            driver.run_frame(&mut state, now).unwrap();
        }
        assert_eq!(counter.ai.load(Ordering::SeqCst), 3);
        assert_eq!(counter.court.load(Ordering::SeqCst), 5);
    }

    fn ai_carrier_state() -> MatchState {
        let mut state = MatchState::new();
        state.add_player(1, Team::Home, Controller::Ai);
        state.add_player(2, Team::Away, Controller::Ai);
        state.begin_match(&MatchRules::default());
        state.set(Field::Phase(GamePhase::Normal), "test");
        for (id, x, y) in [(1, 20.0, 5.0), (2, 20.0, 18.0)] {
            let player = state.players.get_mut(&id).unwrap();
            player.x = x;
            player.y = y;
        }
        state.give_ball(1, "test");
        state
    }

    #[test]
    fn test_running_ai_carrier_is_never_escalated() {
        let mut driver = FrameDriver::new(FrameConfig::authority());
        let mut state = ai_carrier_state();

        // One step per 250ms frame, turning around every 40 steps.
        for frame in 0..240u64 {
            let key = if (frame / 40) % 2 == 0 { Key::Right } else { Key::Left };
            apply_movement(&mut state, 1, key, false);
            state.set(Field::ShotClock(SHOT_CLOCK_DEFAULT), "test");

            driver.run_frame(&mut state, frame * 250).unwrap();

            let carrier = &state.players[&1];
            assert!(carrier.dribble_live, "pickup forced at frame {}", frame);
            assert!(!carrier.decision_pending, "decision forced at frame {}", frame);
            assert!(state.possession_watch.stuck_ticks <= 1);
        }
    }

    #[test]
    fn test_standing_ai_carrier_escalates_per_clock_tick() {
        let mut driver = FrameDriver::new(FrameConfig::authority());
        let mut state = ai_carrier_state();

        // Many frames between decrements count as a single stuck tick.
        for now in (0..=20_000u64).step_by(250) {
            state.set(Field::ShotClock(SHOT_CLOCK_DEFAULT), "test");
            driver.run_frame(&mut state, now).unwrap();
        }
        assert_eq!(state.possession_watch.stuck_ticks, 19);
        assert!(!state.players[&1].decision_pending);

        state.set(Field::ShotClock(SHOT_CLOCK_DEFAULT), "test");
        driver.run_frame(&mut state, 21_000).unwrap();
        assert!(state.players[&1].decision_pending);
        assert!(state.players[&1].dribble_live);
    }

    #[test]
    fn test_turbo_regenerates_and_humans_recover() {
        let mut driver = FrameDriver::new(FrameConfig::authority());
        let mut state = live_state();
        state.give_ball(1, "test");
        state.players.get_mut(&1).unwrap().turbo = 10.0;
        state.players.get_mut(&1).unwrap().recovery.shove_stun = 2;

        driver.run_frame(&mut state, 0).unwrap();
        assert_eq!(state.players[&1].turbo, 10.0 + TURBO_REGEN_PER_FRAME);
        assert_eq!(state.players[&1].recovery.shove_stun, 1);
    }
}
