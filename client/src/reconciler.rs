//! Client side of multiplayer sync.
//!
//! The reconciler keeps a local mirror of the match. Local movement is
//! predicted immediately and sent in sequenced packets. Every newer snapshot
//! overwrites the mirror: remote and AI players are hard-set, the local player
//! is pulled toward the authoritative position plus any inputs the coordinator
//! has not acknowledged yet. How hard it is pulled depends on the phase hint
//! the coordinator broadcast.

use log::{debug, info, trace};
use shared::hints::{AnimationHint, HintKind};
use shared::input::apply_movement;
use shared::jump::BlockJump;
use shared::phase::PhaseRecord;
use shared::state::Recovery;
use shared::{
    distance, InputPacket, Key, MatchRules, MatchState, PhaseHint, PlayerId, StateSnapshot,
};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;

use crate::input::InputBatcher;

/// Latest-snapshot slot. Writers replace, the reconciler reads the newest.
pub type SnapshotReceiver = watch::Receiver<Option<Arc<StateSnapshot>>>;

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Share of the local error corrected per snapshot during normal play.
    pub normal_play_strength: f32,
    /// Share corrected while play is stopped.
    pub stoppage_strength: f32,
    /// Errors at or beyond this distance snap whatever the phase.
    pub snap_distance: f32,
    /// Sent inputs still unacknowledged after this long are treated as lost
    /// and no longer replayed.
    pub pending_timeout_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            normal_play_strength: 0.25,
            stoppage_strength: 1.0,
            snap_distance: 8.0,
            pending_timeout_ms: 1_000,
        }
    }
}

impl ReconcileConfig {
    pub fn strength(&self, hint: PhaseHint) -> f32 {
        match hint {
            PhaseHint::NormalPlay => self.normal_play_strength,
            PhaseHint::Stoppage => self.stoppage_strength,
            PhaseHint::InboundWalk | PhaseHint::PostSnapRecovery => 1.0,
        }
    }
}

/// Plays cosmetic hints. Each hint id reaches it once.
pub trait AnimationPlayer {
    fn play(&mut self, hint: &AnimationHint);
}

pub struct NoAnimationPlayer;

impl AnimationPlayer for NoAnimationPlayer {
    fn play(&mut self, _hint: &AnimationHint) {}
}

#[derive(Debug, Clone, Copy)]
struct PendingInput {
    /// Packet the event went out in. None until flushed.
    sequence: Option<u32>,
    sent_ms: Option<u64>,
    key: Key,
    turbo: bool,
    predicted: bool,
}

pub struct ClientReconciler {
    player: PlayerId,
    config: ReconcileConfig,
    state: MatchState,
    snapshots: SnapshotReceiver,
    batcher: InputBatcher,
    pending: VecDeque<PendingInput>,
    is_coordinator: bool,
    last_applied: Option<(u64, u32)>,
    last_ack: u32,
    last_error: f32,
    seen_hints: BTreeSet<u32>,
    animations: Box<dyn AnimationPlayer>,
}

impl ClientReconciler {
    pub fn new(player: PlayerId, config: ReconcileConfig, snapshots: SnapshotReceiver) -> Self {
        Self {
            player,
            config,
            state: MatchState::new(),
            snapshots,
            batcher: InputBatcher::new(),
            pending: VecDeque::new(),
            is_coordinator: false,
            last_applied: None,
            last_ack: 0,
            last_error: 0.0,
            seen_hints: BTreeSet::new(),
            animations: Box::new(NoAnimationPlayer),
        }
    }

    pub fn with_animations(mut self, animations: impl AnimationPlayer + 'static) -> Self {
        self.animations = Box::new(animations);
        self
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MatchState {
        &mut self.state
    }

    pub fn is_coordinator(&self) -> bool {
        self.is_coordinator
    }

    /// The coordinator's own inputs are applied authoritatively, so its client
    /// does not predict them.
    pub fn set_coordinator(&mut self, is_coordinator: bool) {
        if is_coordinator != self.is_coordinator {
            info!(
                "Player {} {} coordinator, prediction {}",
                self.player,
                if is_coordinator { "is" } else { "is no longer" },
                if is_coordinator { "off" } else { "on" }
            );
        }
        self.is_coordinator = is_coordinator;
    }

    pub fn last_applied_frame(&self) -> Option<u32> {
        self.last_applied.map(|(_, frame)| frame)
    }

    pub fn last_ack(&self) -> u32 {
        self.last_ack
    }

    /// Distance between prediction and reconciled target at the last snapshot.
    pub fn last_error(&self) -> f32 {
        self.last_error
    }

    pub fn pending_inputs(&self) -> usize {
        self.pending.len()
    }

    /// Queues a local key press and predicts it on the local player.
    pub fn handle_input(&mut self, key: Key, frame: u32, turbo: bool) {
        self.batcher.push(key, frame, turbo);

        let predicted = !self.is_coordinator
            && key.is_movement()
            && self.state.players.contains_key(&self.player);
        if predicted {
            let effect = apply_movement(&mut self.state, self.player, key, turbo);
            trace!("Predicted {:?}: {:?}", key, effect);
        }

        self.pending.push_back(PendingInput {
            sequence: None,
            sent_ms: None,
            key,
            turbo,
            predicted,
        });
    }

    /// Takes the next input packet to send, if any keys were pressed.
    ///
    /// Also forgets sent inputs whose ack never came. Either the coordinator
    /// applied them and the snapshots already show it, or the packet was lost.
    pub fn take_packet(&mut self, now_ms: u64) -> Option<InputPacket> {
        self.expire_pending(now_ms);

        let packet = self.batcher.flush(now_ms)?;
        for entry in self
            .pending
            .iter_mut()
            .filter(|entry| entry.sequence.is_none())
            .take(packet.inputs.len())
        {
            entry.sequence = Some(packet.sequence);
            entry.sent_ms = Some(now_ms);
        }
        Some(packet)
    }

    fn expire_pending(&mut self, now_ms: u64) {
        let timeout = self.config.pending_timeout_ms;
        let before = self.pending.len();
        self.pending.retain(|entry| {
            entry
                .sent_ms
                .map_or(true, |sent| now_ms.saturating_sub(sent) < timeout)
        });
        let expired = before - self.pending.len();
        if expired > 0 {
            debug!("Dropped {} inputs never acknowledged", expired);
        }
    }

    /// Applies the latest snapshot if it is newer than the last one applied.
    pub fn update(&mut self) -> bool {
        let latest = self.snapshots.borrow_and_update().clone();
        match latest {
            Some(snapshot) => self.apply_snapshot(&snapshot),
            None => false,
        }
    }

    /// Reconciles against one snapshot. Returns false for stale snapshots.
    pub fn apply_snapshot(&mut self, snapshot: &StateSnapshot) -> bool {
        // A restarted coordinator counts frames from zero again but its
        // timestamps keep growing.
        let stamp = (snapshot.timestamp, snapshot.frame);
        if self.last_applied.map_or(false, |last| stamp <= last) {
            trace!("Ignoring stale snapshot {}", snapshot.frame);
            return false;
        }

        if let Some(coordinator) = snapshot.game.coordinator {
            self.set_coordinator(coordinator == self.player);
        }

        if let Some(&ack) = snapshot.acks.get(&self.player) {
            self.last_ack = ack;
            self.pending
                .retain(|entry| entry.sequence.map_or(true, |sequence| sequence > ack));
        }

        let predicted = self.state.players.get(&self.player).map(|p| p.position());
        self.mirror(snapshot);
        if let Some(predicted) = predicted {
            self.correct_local(snapshot, predicted);
        }
        self.play_hints(snapshot);

        self.last_applied = Some(stamp);
        true
    }

    /// Overwrites the mirror with the snapshot. The local player ends up at its
    /// authoritative position.
    fn mirror(&mut self, snapshot: &StateSnapshot) {
        let state = &mut self.state;

        let gone: Vec<PlayerId> = state
            .players
            .keys()
            .filter(|id| !snapshot.index.contains_key(id))
            .copied()
            .collect();
        for id in gone {
            state.remove_player(id);
        }
        for entry in &snapshot.players {
            if !state.players.contains_key(&entry.id) {
                state.add_player(entry.id, entry.team, entry.controller);
            }
        }
        if !state.is_started() {
            state.begin_match(&MatchRules::default());
        }

        for entry in &snapshot.players {
            if let Some(player) = state.players.get_mut(&entry.id) {
                player.x = entry.x;
                player.y = entry.y;
                player.team = entry.team;
                player.controller = entry.controller;
                player.turbo = entry.turbo;
                player.jump_indicator = entry.jump_indicator;
                if entry.stunned {
                    player.recovery.shove_stun = player.recovery.shove_stun.max(1);
                } else {
                    player.recovery = Recovery::default();
                }
            }
        }

        // Block jumps resume mid-arc. An unchanged jump keeps its local
        // integration state.
        for player in state.players.values_mut() {
            let anim = snapshot.anims.iter().find(|anim| anim.player == player.id);
            let current = player.block_jump;
            player.block_jump = anim.map(|anim| {
                let started_at_ms = snapshot.timestamp.saturating_sub(anim.elapsed_ms);
                match current {
                    Some(jump) if jump.started_at_ms == started_at_ms => jump,
                    _ => {
                        let mut jump = BlockJump::new(started_at_ms);
                        jump.duration_ms = anim.duration_ms;
                        jump.height = anim.height;
                        jump
                    }
                }
            });
        }

        state.ball.x = snapshot.ball.x;
        state.ball.y = snapshot.ball.y;
        state.ball.carrier = snapshot.ball.carrier;
        state.remember_ball_position();

        let game = &snapshot.game;
        let fields = &mut state.fields;
        fields.time_remaining = game.time_remaining;
        fields.shot_clock = game.shot_clock;
        fields.half = game.half;
        fields.overtime_periods = game.overtime_periods;
        fields.score = game.score;
        fields.possession = game.possession;
        fields.shot_in_progress = game.shot_in_progress;
        fields.rebound_active = game.rebound_active;
        fields.inbounding = game.inbounding;
        fields.game_running = game.game_running;
        fields.court_needs_redraw = true;
        state.violation.active = game.violation_active;

        if state.phase.kind != game.phase {
            debug!("Phase {:?} -> {:?}", state.phase.kind, game.phase);
            state.phase = PhaseRecord::new(game.phase, state.tick_counter);
        }
    }

    fn correct_local(&mut self, snapshot: &StateSnapshot, predicted: (f32, f32)) {
        if self.is_coordinator || snapshot.player(self.player).is_none() {
            self.last_error = 0.0;
            return;
        }

        // Inputs still in flight go back on top of the authoritative position.
        for entry in self.pending.iter().filter(|entry| entry.predicted) {
            apply_movement(&mut self.state, self.player, entry.key, entry.turbo);
        }
        let Some(target) = self.state.players.get(&self.player).map(|p| p.position()) else {
            return;
        };

        let error = distance(predicted, target);
        let drift_snapped = snapshot.hints.iter().any(|hint| {
            hint.kind == HintKind::DriftSnap && hint.payload.player == Some(self.player)
        });
        let strength = if drift_snapped || error >= self.config.snap_distance {
            1.0
        } else {
            self.config.strength(snapshot.game.phase_hint)
        };

        let x = predicted.0 + (target.0 - predicted.0) * strength;
        let y = predicted.1 + (target.1 - predicted.1) * strength;
        if let Some(player) = self.state.players.get_mut(&self.player) {
            player.x = x;
            player.y = y;
        }
        if error > 0.0 {
            trace!(
                "Local error {:.2} under {:?}, corrected by {:.0}%",
                error,
                snapshot.game.phase_hint,
                strength * 100.0
            );
        }
        self.last_error = error;
    }

    fn play_hints(&mut self, snapshot: &StateSnapshot) {
        for hint in &snapshot.hints {
            if hint.is_live(snapshot.frame) && self.seen_hints.insert(hint.id) {
                self.animations.play(hint);
            }
        }
        self.seen_hints
            .retain(|id| snapshot.hints.iter().any(|hint| hint.id == *id));
    }
}
