//! A compact phase machine so a match can be played end to end.
//!
//! [`BasicRules`] is the default [`SimHooks`] for the authority: opening tip,
//! loose-ball pickups, shot flight and resolution, rebound scrambles, inbounds,
//! pass intents and overtime on a tied score. AI is deliberately shallow.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::events::GameEvent;
use crate::hooks::SimHooks;
use crate::input::{apply_movement, attempt_shot, LAST_SHOOTER_KEY, LAST_SHOT_DUNK_KEY};
use crate::phase::{GamePhase, PhaseRecord};
use crate::protocol::Key;
use crate::state::{Field, MatchState, PlayerId, Team, Value};
use crate::{court_center, distance, SHOT_CLOCK_DEFAULT};

const TIP_DELAY_MS: u64 = 1000;
const SHOT_FLIGHT_MS: u64 = 800;
const SCORED_DELAY_MS: u64 = 1000;
const MISSED_DELAY_MS: u64 = 300;
const REBOUND_TIMEOUT_MS: u64 = 1500;
const INBOUND_DELAY_MS: u64 = 800;
const OVERTIME_INTRO_MS: u64 = 1500;
const PASS_FLIGHT_TICKS: u32 = 3;
const PICKUP_RANGE: f32 = 1.5;
const REBOUND_REACH: f32 = 3.0;
const THREE_POINT_RANGE: f32 = 22.0;
const AI_SHOT_RANGE: f32 = 20.0;

#[derive(Debug, Clone, Copy)]
struct ShotInFlight {
    shooter: PlayerId,
    team: Team,
    from: (f32, f32),
    released_ms: u64,
    dunk: bool,
}

pub struct BasicRules {
    rng: StdRng,
    make_chance: f64,
    dunk_chance: f64,
    shot_clock_seconds: i32,
    overtime_seconds: i32,
    shot: Option<ShotInFlight>,
    seen_phase: Option<PhaseRecord>,
    phase_since_ms: u64,
    seen_half: u8,
}

impl BasicRules {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            make_chance: 0.5,
            dunk_chance: 0.9,
            shot_clock_seconds: SHOT_CLOCK_DEFAULT,
            overtime_seconds: crate::OVERTIME_LENGTH_SECONDS,
            shot: None,
            seen_phase: None,
            phase_since_ms: 0,
            seen_half: 1,
        }
    }

    pub fn with_make_chance(mut self, make_chance: f64, dunk_chance: f64) -> Self {
        self.make_chance = make_chance.clamp(0.0, 1.0);
        self.dunk_chance = dunk_chance.clamp(0.0, 1.0);
        self
    }

    pub fn with_rules(mut self, rules: &crate::MatchRules) -> Self {
        self.shot_clock_seconds = rules.shot_clock_seconds;
        self.overtime_seconds = rules.overtime_seconds;
        self
    }

    fn enter(&mut self, state: &mut MatchState, phase: GamePhase, reason: &str) {
        state.set(Field::Phase(phase), reason);
    }

    fn phase_age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.phase_since_ms)
    }

    fn tip_off(&mut self, state: &mut MatchState) {
        let team = if self.rng.gen_bool(0.5) {
            Team::Home
        } else {
            Team::Away
        };
        let Some((winner, _)) = state.nearest_player_to(court_center(), Some(team)) else {
            return;
        };
        info!("{:?} wins the tip, player {}", team, winner);
        state.set(Field::Possession(team), "tip_off");
        state.set(Field::ShotClock(self.shot_clock_seconds), "tip_off");
        state.give_ball(winner, "tip_off");
        self.enter(state, GamePhase::Normal, "tip_off");
    }

    fn track_shot(&mut self, state: &mut MatchState, now_ms: u64) {
        if self.shot.is_none() && state.fields.shot_in_progress {
            let shooter = match state.extra(LAST_SHOOTER_KEY) {
                Some(Value::Int(id)) => *id as PlayerId,
                _ => return,
            };
            let Some(player) = state.players.get(&shooter) else {
                state.set(Field::ShotInProgress(false), "shooter_gone");
                return;
            };
            let dunk = matches!(state.extra(LAST_SHOT_DUNK_KEY), Some(Value::Bool(true)));
            self.shot = Some(ShotInFlight {
                shooter,
                team: player.team,
                from: player.position(),
                released_ms: now_ms,
                dunk,
            });
        }

        let Some(shot) = self.shot else {
            return;
        };
        let basket = shot.team.basket();
        let t = (now_ms.saturating_sub(shot.released_ms) as f32 / SHOT_FLIGHT_MS as f32).min(1.0);
        state.ball.x = shot.from.0 + (basket.0 - shot.from.0) * t;
        state.ball.y = shot.from.1 + (basket.1 - shot.from.1) * t;
        state.fields.court_needs_redraw = true;
        if t < 1.0 {
            return;
        }

        self.shot = None;
        state.set(Field::ShotInProgress(false), "shot_resolved");
        let chance = if shot.dunk {
            self.dunk_chance
        } else {
            self.make_chance
        };
        if self.rng.gen_bool(chance) {
            let points = if distance(shot.from, basket) > THREE_POINT_RANGE {
                3
            } else {
                2
            };
            let total = state.fields.score[shot.team.index()] + points;
            state.set(Field::Score(shot.team, total), "basket");
            state.announce(GameEvent::Basket {
                team: shot.team,
                points,
            });
            self.enter(state, GamePhase::ShotScored, "basket");
        } else {
            debug!("Player {} missed", shot.shooter);
            state.set(Field::ReboundActive(true), "shot_missed");
            self.enter(state, GamePhase::ShotMissed, "shot_missed");
        }
    }

    fn pick_up_loose_ball(&mut self, state: &mut MatchState) {
        if state.ball.carrier.is_some()
            || state.fields.shot_in_progress
            || state.fields.inbounding
            || state.fields.queued_pass.is_some()
        {
            return;
        }
        if state.fields.rebound_active {
            self.enter(state, GamePhase::ReboundScramble, "loose_ball");
            return;
        }
        if let Some((id, d)) = state.nearest_player_to(state.ball.position(), None) {
            if d <= PICKUP_RANGE {
                self.secure_ball(state, id, "pickup");
            }
        }
    }

    fn scramble(&mut self, state: &mut MatchState, now_ms: u64) {
        let Some((id, d)) = state.nearest_player_to(state.ball.position(), None) else {
            return;
        };
        if d > REBOUND_REACH && self.phase_age_ms(now_ms) < REBOUND_TIMEOUT_MS {
            return;
        }
        state.set(Field::ReboundActive(false), "rebound");
        self.secure_ball(state, id, "rebound");
        state.emit(GameEvent::Rebound { player: id });
        self.enter(state, GamePhase::Normal, "rebound");
    }

    fn secure_ball(&mut self, state: &mut MatchState, id: PlayerId, reason: &str) {
        let Some(team) = state.players.get(&id).map(|p| p.team) else {
            return;
        };
        if team != state.fields.possession {
            state.set(Field::Possession(team), reason);
            state.set(Field::ShotClock(self.shot_clock_seconds), reason);
        }
        state.give_ball(id, reason);
    }

    fn inbound(&mut self, state: &mut MatchState) {
        let team = state.fields.possession;
        let Some((id, _)) = state.nearest_player_to(state.ball.position(), Some(team)) else {
            return;
        };
        state.set(Field::Inbounding(false), "inbound_complete");
        state.set(Field::InboundGrace(0), "inbound_complete");
        state.set(Field::ShotClock(self.shot_clock_seconds), "inbound_complete");
        state.give_ball(id, "inbound");
        state.emit(GameEvent::ClearBall { player: id });
        self.enter(state, GamePhase::Normal, "inbound_complete");
    }
}

impl Default for BasicRules {
    fn default() -> Self {
        Self::new()
    }
}

impl SimHooks for BasicRules {
    fn update_ai(&mut self, state: &mut MatchState) {
        let ai: Vec<PlayerId> = state
            .players
            .values()
            .filter(|p| p.is_ai() && !p.recovery.is_stunned())
            .map(|p| p.id)
            .collect();

        for id in ai {
            let Some(player) = state.players.get(&id) else {
                continue;
            };
            let (team, pos, decision) = (player.team, player.position(), player.decision_pending);

            if state.ball.carrier == Some(id) {
                let basket = team.basket();
                if decision || distance(pos, basket) <= AI_SHOT_RANGE {
                    attempt_shot(state, id);
                    continue;
                }
                let key = if basket.0 > pos.0 { Key::Right } else { Key::Left };
                apply_movement(state, id, key, false);
            } else if state.ball.carrier.is_none() && !state.fields.shot_in_progress {
                let (bx, by) = state.ball.position();
                let key = if (bx - pos.0).abs() >= (by - pos.1).abs() {
                    if bx > pos.0 {
                        Key::Right
                    } else {
                        Key::Left
                    }
                } else if by > pos.1 {
                    Key::Down
                } else {
                    Key::Up
                };
                apply_movement(state, id, key, false);
            }
        }
    }

    fn advance_phase(&mut self, state: &mut MatchState, now_ms: u64) {
        if self.seen_phase != Some(state.phase) {
            self.seen_phase = Some(state.phase);
            self.phase_since_ms = now_ms;
        }

        if state.fields.half != self.seen_half {
            self.seen_half = state.fields.half;
            self.shot = None;
            state.set(Field::ShotInProgress(false), "second_half");
            state.set(Field::Possession(Team::Home), "second_half");
            state.switch_possession(self.shot_clock_seconds, "second_half");
            self.enter(state, GamePhase::InboundSetup, "second_half");
            return;
        }

        match state.phase.kind {
            GamePhase::JumpBall => {
                if self.phase_age_ms(now_ms) >= TIP_DELAY_MS {
                    self.tip_off(state);
                }
            }
            GamePhase::Normal => {
                self.track_shot(state, now_ms);
                if state.phase.kind == GamePhase::Normal {
                    self.pick_up_loose_ball(state);
                }
            }
            GamePhase::ShotScored => {
                if self.phase_age_ms(now_ms) >= SCORED_DELAY_MS {
                    state.switch_possession(self.shot_clock_seconds, "made_basket");
                    self.enter(state, GamePhase::InboundSetup, "made_basket");
                }
            }
            GamePhase::ShotMissed => {
                if self.phase_age_ms(now_ms) >= MISSED_DELAY_MS {
                    self.enter(state, GamePhase::ReboundScramble, "shot_missed");
                }
            }
            GamePhase::ReboundScramble => self.scramble(state, now_ms),
            GamePhase::InboundSetup => {
                if self.phase_age_ms(now_ms) >= INBOUND_DELAY_MS {
                    self.inbound(state);
                }
            }
            GamePhase::OvertimeIntro => {
                if self.phase_age_ms(now_ms) >= OVERTIME_INTRO_MS {
                    let (x, y) = court_center();
                    state.ball.x = x;
                    state.ball.y = y;
                    self.enter(state, GamePhase::JumpBall, "overtime_tip");
                }
            }
            GamePhase::Paused => {}
        }
    }

    fn resolve_pass_intents(&mut self, state: &mut MatchState) {
        let Some(intent) = state.fields.queued_pass else {
            return;
        };
        let age = state.tick_counter.wrapping_sub(intent.queued_at);
        if age < PASS_FLIGHT_TICKS {
            return;
        }
        state.set(Field::QueuedPass(None), "pass_resolved");
        if state.ball.carrier != Some(intent.from) || !state.players.contains_key(&intent.to) {
            debug!("Dropped pass {} -> {}", intent.from, intent.to);
            return;
        }
        state.give_ball(intent.to, "pass");
        state.set(Field::Inbounding(false), "pass");
        state.emit(GameEvent::Pass {
            from: intent.from,
            to: intent.to,
        });
    }

    fn offer_overtime(&mut self, state: &mut MatchState) -> bool {
        let [home, away] = state.fields.score;
        if home != away {
            return false;
        }
        let period = state.fields.overtime_periods + 1;
        self.shot = None;
        state.set(Field::OvertimePeriods(period), "overtime");
        state.set(Field::TimeRemaining(self.overtime_seconds), "overtime");
        state.set(Field::ShotClock(self.shot_clock_seconds), "overtime");
        state.set(Field::ShotInProgress(false), "overtime");
        state.set(Field::BallCarrier(None), "overtime");
        state.announce(GameEvent::Overtime { period });
        self.enter(state, GamePhase::OvertimeIntro, "overtime");
        true
    }

    fn spawn_emergency_rebound(&mut self, state: &mut MatchState, x: f32, y: f32) {
        debug!("Emergency rebound at ({:.1}, {:.1})", x, y);
        self.shot = None;
        state.set(Field::ShotInProgress(false), "emergency_rebound");
        self.enter(state, GamePhase::ReboundScramble, "emergency_rebound");
    }

    fn on_possession_change(&mut self, state: &mut MatchState) {
        self.enter(state, GamePhase::InboundSetup, "possession_change");
    }

    fn on_forced_shot(&mut self, _state: &mut MatchState, shooter: PlayerId) {
        debug!("Forced shot by {}", shooter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MatchRules;
    use crate::state::Controller;

    fn started() -> MatchState {
        let mut state = MatchState::new();
        state.add_player(1, Team::Home, Controller::Human);
        state.add_player(2, Team::Away, Controller::Human);
        state.begin_match(&MatchRules::default());
        state
    }

    #[test]
    fn test_tip_off_after_delay() {
        let mut rules = BasicRules::seeded(7);
        let mut state = started();

        rules.advance_phase(&mut state, 0);
        assert_eq!(state.phase.kind, GamePhase::JumpBall);
        rules.advance_phase(&mut state, 1000);
        assert_eq!(state.phase.kind, GamePhase::Normal);

        let carrier = state.ball.carrier.unwrap();
        assert_eq!(state.players[&carrier].team, state.fields.possession);
    }

    #[test]
    fn test_made_shot_scores_then_inbounds_to_other_team() {
        let mut rules = BasicRules::seeded(1).with_make_chance(1.0, 1.0);
        let mut state = started();
        state.set(Field::Phase(GamePhase::Normal), "test");
        state.set(Field::Possession(Team::Home), "test");
        state.give_ball(1, "test");
        attempt_shot(&mut state, 1);

        rules.advance_phase(&mut state, 0);
        assert!(state.fields.shot_in_progress);
        rules.advance_phase(&mut state, 400);
        assert!(state.fields.shot_in_progress);
        rules.advance_phase(&mut state, 800);

        assert!(!state.fields.shot_in_progress);
        assert_eq!(state.phase.kind, GamePhase::ShotScored);
        assert!(state.fields.score[0] >= 2);

        rules.advance_phase(&mut state, 900);
        rules.advance_phase(&mut state, 1900);
        assert_eq!(state.phase.kind, GamePhase::InboundSetup);
        assert_eq!(state.fields.possession, Team::Away);

        rules.advance_phase(&mut state, 2000);
        rules.advance_phase(&mut state, 2800);
        assert_eq!(state.phase.kind, GamePhase::Normal);
        assert_eq!(state.ball.carrier, Some(2));
        assert!(!state.fields.inbounding);
        assert!(state
            .events()
            .contains(&GameEvent::ClearBall { player: 2 }));
    }

    #[test]
    fn test_missed_shot_goes_to_rebound() {
        let mut rules = BasicRules::seeded(1).with_make_chance(0.0, 0.0);
        let mut state = started();
        state.set(Field::Phase(GamePhase::Normal), "test");
        state.give_ball(1, "test");
        attempt_shot(&mut state, 1);

        rules.advance_phase(&mut state, 0);
        rules.advance_phase(&mut state, 800);
        assert_eq!(state.phase.kind, GamePhase::ShotMissed);
        assert!(state.fields.rebound_active);

        rules.advance_phase(&mut state, 1000);
        rules.advance_phase(&mut state, 1300);
        assert_eq!(state.phase.kind, GamePhase::ReboundScramble);
        rules.advance_phase(&mut state, 1400);
        assert_eq!(state.phase.kind, GamePhase::ReboundScramble);
        rules.advance_phase(&mut state, 2900);
        assert_eq!(state.phase.kind, GamePhase::Normal);
        assert!(state.ball.carrier.is_some());
        assert!(!state.fields.rebound_active);
    }

    fn shoot_from(rules: &mut BasicRules, state: &mut MatchState, x: f32, y: f32, now: u64) {
        state.set(Field::Phase(GamePhase::Normal), "test");
        let shooter = state.players.get_mut(&1).unwrap();
        shooter.x = x;
        shooter.y = y;
        state.give_ball(1, "test");
        attempt_shot(state, 1);
        rules.advance_phase(state, now);
        rules.advance_phase(state, now + 800);
    }

    #[test]
    fn test_dunk_chance_applies_only_to_the_dunk() {
        let mut rules = BasicRules::seeded(1).with_make_chance(0.0, 1.0);
        let mut state = started();
        let basket = Team::Home.basket();

        shoot_from(&mut rules, &mut state, basket.0 - 2.0, basket.1, 0);
        assert_eq!(state.fields.score[0], 2);

        // Events are left in the queue, as when nobody drains them.
        shoot_from(&mut rules, &mut state, 40.0, basket.1, 5_000);
        assert_eq!(state.fields.score[0], 2);
        assert_eq!(state.phase.kind, GamePhase::ShotMissed);
        assert_eq!(state.extra(LAST_SHOT_DUNK_KEY), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_pass_intent_resolves_after_flight() {
        let mut rules = BasicRules::seeded(1);
        let mut state = started();
        state.add_player(3, Team::Home, Controller::Ai);
        state.give_ball(1, "test");
        state.set(
            Field::QueuedPass(Some(crate::state::PassIntent {
                from: 1,
                to: 3,
                queued_at: state.tick_counter,
            })),
            "test",
        );

        rules.resolve_pass_intents(&mut state);
        assert_eq!(state.ball.carrier, Some(1));

        state.tick_counter += PASS_FLIGHT_TICKS;
        rules.resolve_pass_intents(&mut state);
        assert_eq!(state.ball.carrier, Some(3));
        assert!(state.fields.queued_pass.is_none());
        assert!(state
            .events()
            .contains(&GameEvent::Pass { from: 1, to: 3 }));
    }

    #[test]
    fn test_overtime_only_on_tie() {
        let mut rules = BasicRules::seeded(1);
        let mut state = started();
        state.set(Field::Score(Team::Home, 10), "test");
        assert!(!rules.offer_overtime(&mut state));

        state.set(Field::Score(Team::Away, 10), "test");
        assert!(rules.offer_overtime(&mut state));
        assert_eq!(state.phase.kind, GamePhase::OvertimeIntro);
        assert_eq!(state.fields.overtime_periods, 1);
        assert_eq!(state.fields.time_remaining, crate::OVERTIME_LENGTH_SECONDS);
    }

    #[test]
    fn test_second_half_starts_with_inbound() {
        let mut rules = BasicRules::seeded(1);
        let mut state = started();
        state.set(Field::Phase(GamePhase::Normal), "test");
        state.set(Field::Half(2), "halftime");

        rules.advance_phase(&mut state, 0);
        assert_eq!(state.phase.kind, GamePhase::InboundSetup);
        assert_eq!(state.fields.possession, Team::Away);
        assert!(state.fields.inbounding);
    }
}
