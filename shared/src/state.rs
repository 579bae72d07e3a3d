//! Match-scoped shared state.
//!
//! Simulation-critical fields are typed. Every tracked mutation goes through
//! [`MatchState::set`] with a human readable reason, which is logged and kept in a
//! short journal for diagnostics. Genuinely dynamic values (debug counters and the
//! like) live in a small side table keyed by name.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::clock::{GameClock, MatchRules, ViolationPause};
use crate::error::SyncError;
use crate::events::GameEvent;
use crate::jump::{BlockJump, JumpIndicator};
use crate::phase::{GamePhase, PhaseRecord};
use crate::possession::PossessionWatch;
use crate::safety_net::LooseBallWatch;
use crate::{
    court_center, distance, BASKET_INSET, COURT_HEIGHT, COURT_WIDTH, INBOUND_GRACE_FRAMES,
    MAX_TURBO, MIDCOURT_X,
};

pub type PlayerId = u32;

const JOURNAL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    Home,
    Away,
}

impl Team {
    pub fn opponent(self) -> Team {
        match self {
            Team::Home => Team::Away,
            Team::Away => Team::Home,
        }
    }

    /// +1 when attacking toward increasing x, -1 otherwise.
    pub fn attack_direction(self) -> f32 {
        match self {
            Team::Home => 1.0,
            Team::Away => -1.0,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Team::Home => 0,
            Team::Away => 1,
        }
    }

    pub fn basket(self) -> (f32, f32) {
        let x = match self {
            Team::Home => COURT_WIDTH - BASKET_INSET,
            Team::Away => BASKET_INSET,
        };
        (x, COURT_HEIGHT / 2.0)
    }

    pub fn in_frontcourt(self, x: f32) -> bool {
        (x - MIDCOURT_X) * self.attack_direction() > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Controller {
    Human,
    Ai,
}

/// Frame countdowns that lock a player out of parts of the game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recovery {
    pub shove_stun: u16,
    pub turbo_disabled: u16,
    pub steal_recovery: u16,
    pub shove_failure_stun: u16,
}

impl Recovery {
    pub fn tick(&mut self) {
        self.shove_stun = self.shove_stun.saturating_sub(1);
        self.turbo_disabled = self.turbo_disabled.saturating_sub(1);
        self.steal_recovery = self.steal_recovery.saturating_sub(1);
        self.shove_failure_stun = self.shove_failure_stun.saturating_sub(1);
    }

    pub fn is_stunned(&self) -> bool {
        self.shove_stun > 0 || self.shove_failure_stun > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuffKind {
    OnFire,
    HotHand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buff {
    pub kind: BuffKind,
    pub expires_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub id: PlayerId,
    pub team: Team,
    pub controller: Controller,
    pub x: f32,
    pub y: f32,
    pub prev_x: f32,
    pub prev_y: f32,
    pub turbo: f32,
    pub dribble_live: bool,
    pub decision_pending: bool,
    pub recovery: Recovery,
    pub buff: Option<Buff>,
    pub block_jump: Option<BlockJump>,
    pub jump_indicator: Option<JumpIndicator>,
}

impl PlayerState {
    pub fn new(id: PlayerId, team: Team, controller: Controller, x: f32, y: f32) -> Self {
        Self {
            id,
            team,
            controller,
            x,
            y,
            prev_x: x,
            prev_y: y,
            turbo: MAX_TURBO,
            dribble_live: false,
            decision_pending: false,
            recovery: Recovery::default(),
            buff: None,
            block_jump: None,
            jump_indicator: None,
        }
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn is_ai(&self) -> bool {
        self.controller == Controller::Ai
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallState {
    pub x: f32,
    pub y: f32,
    pub carrier: Option<PlayerId>,
    pub last_valid_x: f32,
    pub last_valid_y: f32,
}

impl BallState {
    pub fn at_center() -> Self {
        let (x, y) = court_center();
        Self {
            x,
            y,
            carrier: None,
            last_valid_x: x,
            last_valid_y: y,
        }
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn in_bounds(&self, margin: f32) -> bool {
        self.x >= -margin
            && self.x <= COURT_WIDTH + margin
            && self.y >= -margin
            && self.y <= COURT_HEIGHT + margin
    }

    pub fn last_valid(&self) -> (f32, f32) {
        (self.last_valid_x, self.last_valid_y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassIntent {
    pub from: PlayerId,
    pub to: PlayerId,
    pub queued_at: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameFields {
    pub time_remaining: i32,
    pub shot_clock: i32,
    pub half: u8,
    pub overtime_periods: u8,
    pub score: [u32; 2],
    pub possession: Team,
    pub game_running: bool,
    pub pending_halftime: bool,
    pub shot_in_progress: bool,
    pub rebound_active: bool,
    pub inbounding: bool,
    pub inbound_grace_frames: u16,
    pub pause_menu_open: bool,
    pub court_needs_redraw: bool,
    pub queued_pass: Option<PassIntent>,
    pub advancement_stalled: bool,
}

impl GameFields {
    fn for_rules(rules: &MatchRules) -> Self {
        Self {
            time_remaining: rules.game_seconds,
            shot_clock: rules.shot_clock_seconds,
            half: 1,
            overtime_periods: 0,
            score: [0, 0],
            possession: Team::Home,
            game_running: true,
            pending_halftime: false,
            shot_in_progress: false,
            rebound_active: false,
            inbounding: false,
            inbound_grace_frames: 0,
            pause_menu_open: false,
            court_needs_redraw: true,
            queued_pass: None,
            advancement_stalled: false,
        }
    }
}

impl Default for GameFields {
    fn default() -> Self {
        Self::for_rules(&MatchRules::default())
    }
}

/// One reason-tagged assignment to a tracked field.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    TimeRemaining(i32),
    ShotClock(i32),
    Half(u8),
    OvertimePeriods(u8),
    Score(Team, u32),
    Possession(Team),
    Phase(GamePhase),
    GameRunning(bool),
    PendingHalftime(bool),
    ShotInProgress(bool),
    ReboundActive(bool),
    Inbounding(bool),
    InboundGrace(u16),
    PauseMenuOpen(bool),
    BallCarrier(Option<PlayerId>),
    QueuedPass(Option<PassIntent>),
    AdvancementStalled(bool),
}

/// Loosely typed value for the side table.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub tick: u32,
    pub field: Field,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct MatchState {
    started: bool,
    pub fields: GameFields,
    pub phase: PhaseRecord,
    pub players: BTreeMap<PlayerId, PlayerState>,
    pub ball: BallState,
    pub clock: GameClock,
    pub violation: ViolationPause,
    pub loose_ball: LooseBallWatch,
    pub possession_watch: PossessionWatch,
    pub tick_counter: u32,
    events: Vec<GameEvent>,
    extras: BTreeMap<String, Value>,
    journal: VecDeque<Change>,
}

impl MatchState {
    pub fn new() -> Self {
        Self {
            started: false,
            fields: GameFields::default(),
            phase: PhaseRecord::new(GamePhase::JumpBall, 0),
            players: BTreeMap::new(),
            ball: BallState::at_center(),
            clock: GameClock::default(),
            violation: ViolationPause::default(),
            loose_ball: LooseBallWatch::default(),
            possession_watch: PossessionWatch::default(),
            tick_counter: 0,
            events: Vec::new(),
            extras: BTreeMap::new(),
            journal: VecDeque::with_capacity(JOURNAL_CAPACITY),
        }
    }

    /// Starts a fresh match with the current roster back on its spawn spots.
    pub fn begin_match(&mut self, rules: &MatchRules) {
        self.fields = GameFields::for_rules(rules);
        self.phase = PhaseRecord::new(GamePhase::JumpBall, 0);
        self.ball = BallState::at_center();
        self.clock = GameClock::default();
        self.violation = ViolationPause::default();
        self.loose_ball = LooseBallWatch::default();
        self.possession_watch = PossessionWatch::default();
        self.tick_counter = 0;
        self.events.clear();
        self.extras.clear();
        self.journal.clear();

        let roster: Vec<(PlayerId, Team, Controller)> = self
            .players
            .values()
            .map(|p| (p.id, p.team, p.controller))
            .collect();
        self.players.clear();
        for (id, team, controller) in roster {
            self.add_player(id, team, controller);
        }

        self.started = true;
        info!("Match started with {} players", self.players.len());
    }

    /// Drops everything, roster included. The next match needs `begin_match`.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn ensure_started(&self) -> Result<(), SyncError> {
        if self.started {
            Ok(())
        } else {
            Err(SyncError::MatchNotStarted)
        }
    }

    pub fn add_player(&mut self, id: PlayerId, team: Team, controller: Controller) {
        let slot = self.players.values().filter(|p| p.team == team).count() as f32;
        let x = MIDCOURT_X - team.attack_direction() * (6.0 + slot * 4.0);
        let y = (4.0 + slot * 4.0).min(COURT_HEIGHT - 2.0);

        self.players
            .insert(id, PlayerState::new(id, team, controller, x, y));
        self.fields.court_needs_redraw = true;
        info!("Added player {} ({:?}) at ({}, {})", id, team, x, y);
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<PlayerState> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            if self.ball.carrier == Some(id) {
                self.set(Field::BallCarrier(None), "carrier_left_match");
            }
            self.fields.court_needs_redraw = true;
            info!("Removed player {}", id);
        }
        removed
    }

    /// Assigns a tracked field, logging and journaling the reason.
    pub fn set(&mut self, field: Field, reason: &str) {
        match &field {
            Field::TimeRemaining(v) => self.fields.time_remaining = *v,
            Field::ShotClock(v) => self.fields.shot_clock = *v,
            Field::Half(v) => self.fields.half = *v,
            Field::OvertimePeriods(v) => self.fields.overtime_periods = *v,
            Field::Score(team, v) => self.fields.score[team.index()] = *v,
            Field::Possession(team) => self.fields.possession = *team,
            Field::Phase(kind) => self.phase = PhaseRecord::new(*kind, self.tick_counter),
            Field::GameRunning(v) => self.fields.game_running = *v,
            Field::PendingHalftime(v) => self.fields.pending_halftime = *v,
            Field::ShotInProgress(v) => self.fields.shot_in_progress = *v,
            Field::ReboundActive(v) => self.fields.rebound_active = *v,
            Field::Inbounding(v) => self.fields.inbounding = *v,
            Field::InboundGrace(v) => self.fields.inbound_grace_frames = *v,
            Field::PauseMenuOpen(v) => self.fields.pause_menu_open = *v,
            Field::BallCarrier(v) => self.ball.carrier = *v,
            Field::QueuedPass(v) => self.fields.queued_pass = *v,
            Field::AdvancementStalled(v) => self.fields.advancement_stalled = *v,
        }

        debug!("[tick {}] set {:?} ({})", self.tick_counter, field, reason);
        if self.journal.len() == JOURNAL_CAPACITY {
            self.journal.pop_front();
        }
        self.journal.push_back(Change {
            tick: self.tick_counter,
            field,
            reason: reason.to_string(),
        });
    }

    pub fn journal(&self) -> impl Iterator<Item = &Change> {
        self.journal.iter()
    }

    pub fn set_extra(&mut self, key: &str, value: Value, reason: &str) {
        debug!("[tick {}] extra {} = {:?} ({})", self.tick_counter, key, value, reason);
        self.extras.insert(key.to_string(), value);
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    /// Adds one to an integer side-table counter, creating it at zero.
    pub fn bump_counter(&mut self, key: &str, reason: &str) -> i64 {
        let next = match self.extras.get(key) {
            Some(Value::Int(n)) => n + 1,
            _ => 1,
        };
        self.set_extra(key, Value::Int(next), reason);
        next
    }

    pub fn announce(&mut self, event: GameEvent) {
        info!("[tick {}] {:?}", self.tick_counter, event);
        self.events.push(event);
    }

    pub fn emit(&mut self, event: GameEvent) {
        debug!("[tick {}] {:?}", self.tick_counter, event);
        self.events.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[GameEvent] {
        &self.events
    }

    pub fn carrier(&self) -> Option<&PlayerState> {
        self.ball.carrier.and_then(|id| self.players.get(&id))
    }

    pub fn nearest_opponent_distance(&self, id: PlayerId) -> Option<f32> {
        let player = self.players.get(&id)?;
        self.players
            .values()
            .filter(|other| other.team != player.team)
            .map(|other| distance(player.position(), other.position()))
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn nearest_teammate(&self, id: PlayerId) -> Option<PlayerId> {
        let player = self.players.get(&id)?;
        self.players
            .values()
            .filter(|other| other.team == player.team && other.id != id)
            .min_by(|a, b| {
                distance(player.position(), a.position())
                    .total_cmp(&distance(player.position(), b.position()))
            })
            .map(|other| other.id)
    }

    pub fn nearest_player_to(&self, point: (f32, f32), team: Option<Team>) -> Option<(PlayerId, f32)> {
        self.players
            .values()
            .filter(|p| team.map_or(true, |t| p.team == t))
            .map(|p| (p.id, distance(p.position(), point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Hands the ball to a player and keeps it on their sprite.
    pub fn give_ball(&mut self, id: PlayerId, reason: &str) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };
        player.dribble_live = true;
        player.decision_pending = false;
        let (x, y) = player.position();
        self.ball.x = x;
        self.ball.y = y;
        self.set(Field::BallCarrier(Some(id)), reason);
        self.fields.court_needs_redraw = true;
    }

    /// Turns the ball over and sets up an inbound for the other team.
    pub fn switch_possession(&mut self, shot_clock: i32, reason: &str) {
        let team = self.fields.possession.opponent();
        self.set(Field::Possession(team), reason);
        self.set(Field::BallCarrier(None), reason);
        self.set(Field::ShotInProgress(false), reason);
        self.set(Field::ReboundActive(false), reason);
        self.set(Field::QueuedPass(None), reason);
        self.set(Field::ShotClock(shot_clock), reason);
        self.set(Field::Inbounding(true), reason);
        self.set(Field::InboundGrace(INBOUND_GRACE_FRAMES), reason);

        let (bx, _) = team.opponent().basket();
        self.ball.x = bx;
        self.ball.y = COURT_HEIGHT / 2.0;
        self.possession_watch = PossessionWatch::default();
        self.announce(GameEvent::PossessionChange { team });
    }

    /// Records the ball position as the fallback for emergency rebounds.
    pub fn remember_ball_position(&mut self) {
        if self.ball.in_bounds(0.0) {
            self.ball.last_valid_x = self.ball.x;
            self.ball.last_valid_y = self.ball.y;
        }
    }
}

impl Default for MatchState {
    fn default() -> Self {
        Self::new()
    }
}
