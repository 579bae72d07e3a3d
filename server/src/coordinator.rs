//! Authority side of multiplayer sync.
//!
//! The coordinator owns the canonical [`MatchState`]. Each network tick it
//! drains every player's input channel, applies the inputs in client-frame
//! order, runs the frame driver and, at a fixed cadence, publishes a snapshot
//! to every player. Snapshot delivery is most-recent-wins: an undelivered
//! snapshot is replaced, never queued behind.

use log::{debug, info, warn};
use shared::frame::{FrameConfig, FrameDriver, FrameOutcome, Role};
use shared::hints::{AnimationHintBuffer, HintKind, HintPayload};
use shared::hooks::SimHooks;
use shared::input::apply_input;
use shared::{
    distance, Controller, GamePhase, InputEvent, InputPacket, MatchState, PhaseHint, PlayerId,
    StateSnapshot, SyncError, Team, HINT_HORIZON_FRAMES,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::input_channel::{InputChannel, TimestampWindow};

pub type SnapshotReceiver = watch::Receiver<Option<Arc<StateSnapshot>>>;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub broadcast_interval_ms: u64,
    /// Movement between two broadcasts at or beyond this distance is a snap.
    pub drift_threshold: f32,
    /// Updates the post-snap phase hint stays up after a drift snap.
    pub post_snap_recovery_ticks: u32,
    pub hint_horizon_frames: u32,
    pub timestamp_window: TimestampWindow,
    pub input_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            broadcast_interval_ms: 50,
            drift_threshold: 6.0,
            post_snap_recovery_ticks: 8,
            hint_horizon_frames: HINT_HORIZON_FRAMES,
            timestamp_window: TimestampWindow::default(),
            input_capacity: 256,
        }
    }
}

/// A player's ends of its two channels.
#[derive(Debug)]
pub struct PlayerLink {
    pub player: PlayerId,
    pub team: Team,
    pub inputs: mpsc::Sender<InputPacket>,
    pub snapshots: SnapshotReceiver,
}

struct Participant {
    inputs: InputChannel,
    snapshots: watch::Sender<Option<Arc<StateSnapshot>>>,
}

pub struct Coordinator {
    config: CoordinatorConfig,
    state: MatchState,
    driver: FrameDriver,
    participants: BTreeMap<PlayerId, Participant>,
    hints: AnimationHintBuffer,
    last_broadcast_positions: BTreeMap<PlayerId, (f32, f32)>,
    frame: u32,
    last_broadcast_ms: Option<u64>,
    post_snap_ticks: u32,
    session_owner: Option<PlayerId>,
    latest: Option<Arc<StateSnapshot>>,
}

impl Coordinator {
    /// Builds a coordinator around an authority frame driver. The role in
    /// `frame` is overridden.
    pub fn new(config: CoordinatorConfig, frame: FrameConfig, hooks: impl SimHooks + 'static) -> Self {
        let frame = FrameConfig {
            role: Role::Authority,
            ..frame
        };
        let hints = AnimationHintBuffer::new(config.hint_horizon_frames);
        Self {
            config,
            state: MatchState::new(),
            driver: FrameDriver::new(frame).with_hooks(hooks),
            participants: BTreeMap::new(),
            hints,
            last_broadcast_positions: BTreeMap::new(),
            frame: 0,
            last_broadcast_ms: None,
            post_snap_ticks: 0,
            session_owner: None,
            latest: None,
        }
    }

    /// Resets the match, keeping whoever is registered.
    pub fn start_match(&mut self) {
        let rules = self.driver.config().rules.clone();
        self.state.begin_match(&rules);
        self.frame = 0;
        self.last_broadcast_ms = None;
        self.last_broadcast_positions.clear();
        self.post_snap_ticks = 0;
        self.hints = AnimationHintBuffer::new(self.config.hint_horizon_frames);
    }

    /// Adds a human player and opens both of its channels.
    pub fn register_player(&mut self, id: PlayerId) -> PlayerLink {
        let team = self.next_team();
        self.register_player_on(id, team)
    }

    pub fn register_player_on(&mut self, id: PlayerId, team: Team) -> PlayerLink {
        self.state.add_player(id, team, Controller::Human);

        let (inputs, channel) = InputChannel::pair(id, self.config.input_capacity);
        let (snapshots_tx, snapshots_rx) = watch::channel(self.latest.clone());
        self.participants.insert(
            id,
            Participant {
                inputs: channel,
                snapshots: snapshots_tx,
            },
        );
        info!("Player {} joined on {:?}", id, team);

        PlayerLink {
            player: id,
            team,
            inputs,
            snapshots: snapshots_rx,
        }
    }

    /// Adds a computer-controlled player with no channels.
    pub fn add_ai_player(&mut self, id: PlayerId, team: Team) {
        self.state.add_player(id, team, Controller::Ai);
    }

    /// Drops the player and closes its snapshot channel.
    pub fn remove_player(&mut self, id: PlayerId) {
        self.participants.remove(&id);
        self.last_broadcast_positions.remove(&id);
        if self.state.remove_player(id).is_some() {
            info!("Player {} left", id);
        }
    }

    pub fn set_session_owner(&mut self, owner: Option<PlayerId>) {
        self.session_owner = owner;
    }

    pub fn session_owner(&self) -> Option<PlayerId> {
        self.session_owner
    }

    pub fn state(&self) -> &MatchState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MatchState {
        &mut self.state
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn player_count(&self) -> usize {
        self.participants.len()
    }

    pub fn acks(&self) -> BTreeMap<PlayerId, u32> {
        self.participants
            .iter()
            .map(|(id, p)| (*id, p.inputs.last_sequence()))
            .collect()
    }

    pub fn latest_snapshot(&self) -> Option<Arc<StateSnapshot>> {
        self.latest.clone()
    }

    /// One network tick. Returns the frame driver's outcome.
    pub fn update(&mut self, now_ms: u64) -> Result<FrameOutcome, SyncError> {
        self.state.ensure_started()?;
        self.post_snap_ticks = self.post_snap_ticks.saturating_sub(1);

        let mut pending: Vec<(PlayerId, InputEvent)> = Vec::new();
        for (id, participant) in self.participants.iter_mut() {
            for packet in participant.inputs.drain(now_ms, &self.config.timestamp_window) {
                pending.extend(packet.inputs.into_iter().map(|event| (*id, event)));
            }
        }
        // Stable: same-frame inputs keep player-id then arrival order.
        pending.sort_by_key(|(_, event)| event.frame);

        for (id, event) in &pending {
            if let Err(e) = apply_input(&mut self.state, *id, event, now_ms) {
                debug!("Skipped input from {}: {}", id, e);
            }
        }

        let outcome = self.driver.run_frame(&mut self.state, now_ms)?;
        self.frame = self.frame.wrapping_add(1);

        for event in self.state.drain_events() {
            let position = event
                .actor()
                .and_then(|id| self.state.players.get(&id))
                .map(|p| p.position())
                .unwrap_or_else(|| self.state.ball.position());
            self.hints.push_event(&event, position, self.frame);
        }
        self.hints.prune(self.frame);

        let due = self
            .last_broadcast_ms
            .map_or(true, |last| now_ms.saturating_sub(last) >= self.config.broadcast_interval_ms);
        if due {
            self.broadcast(now_ms);
        }

        Ok(outcome)
    }

    fn broadcast(&mut self, now_ms: u64) {
        self.detect_drift();

        let mut snapshot = StateSnapshot::capture(&self.state, self.frame, now_ms);
        if self.post_snap_ticks > 0 {
            snapshot.game.phase_hint = PhaseHint::PostSnapRecovery;
        }
        snapshot.game.coordinator = self.session_owner;
        snapshot.acks = self.acks();
        snapshot.hints = self.hints.live(self.frame);

        let snapshot = Arc::new(snapshot);
        for participant in self.participants.values() {
            participant.snapshots.send_replace(Some(Arc::clone(&snapshot)));
        }
        self.latest = Some(snapshot);
        self.last_broadcast_ms = Some(now_ms);
    }

    /// Tags players whose position jumped since the last broadcast so clients
    /// snap instead of easing. Inbound walk-ups are expected jumps.
    fn detect_drift(&mut self) {
        let inbound_transition =
            self.state.fields.inbounding || self.state.phase.kind == GamePhase::InboundSetup;

        let mut snapped = Vec::new();
        for player in self.state.players.values() {
            let now = player.position();
            if let Some(before) = self.last_broadcast_positions.insert(player.id, now) {
                if !inbound_transition && distance(before, now) >= self.config.drift_threshold {
                    snapped.push((player.id, now));
                }
            }
        }

        for (id, (x, y)) in snapped {
            warn!("Drift snap for player {} at ({:.1}, {:.1})", id, x, y);
            self.hints.push(
                HintKind::DriftSnap,
                HintPayload {
                    player: Some(id),
                    target: None,
                    x,
                    y,
                },
                self.frame,
            );
            self.post_snap_ticks = self.config.post_snap_recovery_ticks;
        }
    }

    fn next_team(&self) -> Team {
        let home = self
            .state
            .players
            .values()
            .filter(|p| p.team == Team::Home)
            .count();
        let away = self.state.players.len() - home;
        if home <= away {
            Team::Home
        } else {
            Team::Away
        }
    }
}
