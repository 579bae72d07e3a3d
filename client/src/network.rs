use crate::reconciler::{ClientReconciler, ReconcileConfig};
use crate::view::{LogAnimations, TextView};
use log::{debug, error, info, warn};
use shared::hooks::SimHooks;
use shared::input::ChannelInput;
use shared::rules::BasicRules;
use shared::{
    unix_millis, Controller, FrameConfig, FrameDriver, FrameOutcome, InputEvent, Key, MatchState,
    Packet, PlayerId, StateSnapshot, SyncError, Team, PROTOCOL_VERSION,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};

const RECV_BUFFER: usize = 8192;

/// Keys typed by the user, with their turbo flag.
pub type KeySource = mpsc::Receiver<(Key, bool)>;

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    player_id: Option<PlayerId>,
    connected: bool,

    snapshots: watch::Sender<Option<Arc<StateSnapshot>>>,
    reconciler: Option<ClientReconciler>,
    reconcile_config: ReconcileConfig,
    driver: FrameDriver,
    keys: KeySource,
    frame: u32,

    ping_ms: u64,
    fake_ping_ms: u64,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
        draw_court: bool,
        reconcile_config: ReconcileConfig,
        keys: KeySource,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;
        let (snapshots, _) = watch::channel(None);

        Ok(Client {
            socket,
            server_addr,
            player_id: None,
            connected: false,
            snapshots,
            reconciler: None,
            reconcile_config,
            driver: FrameDriver::new(FrameConfig::observer()).with_hooks(TextView::new(draw_court)),
            keys,
            frame: 0,
            ping_ms: 0,
            fake_ping_ms,
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");
        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = packet.encode()?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected {
                player_id,
                team,
                coordinator,
            } => {
                info!("Connected! Player {} on {:?}", player_id, team);
                self.player_id = Some(player_id);
                self.connected = true;

                let mut reconciler = ClientReconciler::new(
                    player_id,
                    self.reconcile_config.clone(),
                    self.snapshots.subscribe(),
                )
                .with_animations(LogAnimations);
                reconciler.set_coordinator(coordinator == Some(player_id));
                self.reconciler = Some(reconciler);
            }

            Packet::Snapshot(snapshot) => {
                self.ping_ms = unix_millis().saturating_sub(snapshot.timestamp);
                self.snapshots.send_replace(Some(Arc::new(snapshot)));
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.player_id = None;
                self.reconciler = None;
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    async fn send_inputs(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(reconciler) = self.reconciler.as_mut() else {
            // Typed before the handshake finished
            while self.keys.try_recv().is_ok() {}
            return Ok(());
        };

        while let Ok((key, turbo)) = self.keys.try_recv() {
            reconciler.handle_input(key, self.frame, turbo);
        }
        if let Some(packet) = reconciler.take_packet(unix_millis()) {
            debug!("Sending input {} ({} keys)", packet.sequence, packet.inputs.len());
            self.send_packet(&Packet::Input(packet)).await?;
        }
        Ok(())
    }

    fn step(&mut self) {
        let Some(reconciler) = self.reconciler.as_mut() else {
            return;
        };
        reconciler.update();
        if !reconciler.state().is_started() {
            return;
        }

        match self.driver.run_frame(reconciler.state_mut(), unix_millis()) {
            Ok(_) => self.frame = self.frame.wrapping_add(1),
            Err(e) => error!("Frame failed: {}", e),
        }
        // The coordinator owns events; the mirror's queue is discarded.
        reconciler.state_mut().drain_events();
        if self.frame % 300 == 0 {
            debug!(
                "Frame {}: ping {} ms, {} inputs pending",
                self.frame,
                self.ping_ms,
                reconciler.pending_inputs()
            );
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut frame_interval = interval(self.driver.frame_delay());
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut input_interval = interval(Duration::from_millis(16));
        let mut buffer = vec![0u8; RECV_BUFFER];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }
                            match Packet::decode(&buffer[..len]) {
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Bad packet from server: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = input_interval.tick() => {
                    if let Err(e) = self.send_inputs().await {
                        error!("Error sending input: {}", e);
                    }
                },

                _ = frame_interval.tick() => {
                    self.step();
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Leaving");
                    break;
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}

/// Runs a local match with this process as the authority.
///
/// The local player is player 1 on the home team. `opponents` AI players join
/// the away team and `teammates` AI players the home team.
pub async fn run_solo(
    mut keys: KeySource,
    draw_court: bool,
    frame: FrameConfig,
    teammates: u32,
    opponents: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    const LOCAL: PlayerId = 1;

    let (input_tx, input_rx) = mpsc::channel(256);
    let rules = frame.rules.clone();
    let mut driver = FrameDriver::new(frame)
        .with_hooks(SoloHooks {
            rules: BasicRules::new().with_rules(&rules),
            view: TextView::new(draw_court),
        })
        .with_input(ChannelInput::new(input_rx));

    let mut state = MatchState::new();
    state.add_player(LOCAL, Team::Home, Controller::Human);
    for n in 0..teammates {
        state.add_player(100 + n, Team::Home, Controller::Ai);
    }
    for n in 0..opponents.max(1) {
        state.add_player(200 + n, Team::Away, Controller::Ai);
    }
    state.begin_match(&rules);
    info!("Solo match started");

    let mut ticker = interval(driver.frame_delay());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut frame_no = 0u32;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Leaving");
                return Ok(());
            }
        }

        while let Ok((key, turbo)) = keys.try_recv() {
            let event = InputEvent {
                key,
                frame: frame_no,
                turbo,
            };
            if input_tx.try_send((LOCAL, event)).is_err() {
                warn!("Local input queue full, dropped {:?}", key);
            }
        }

        match solo_frame(&mut driver, &mut state, unix_millis())? {
            FrameOutcome::GameOver => {
                let score = state.fields.score;
                info!("Final: home {} away {}", score[0], score[1]);
                return Ok(());
            }
            FrameOutcome::Halftime => info!("Halftime"),
            FrameOutcome::Violation | FrameOutcome::Continue => {}
        }
        frame_no = frame_no.wrapping_add(1);
    }
}

/// Runs one local authority frame. Nothing else reads the event queue in solo
/// mode, so it is emptied here.
fn solo_frame(
    driver: &mut FrameDriver,
    state: &mut MatchState,
    now_ms: u64,
) -> Result<FrameOutcome, SyncError> {
    let outcome = driver.run_frame(state, now_ms)?;
    for event in state.drain_events() {
        debug!("Event: {:?}", event);
    }
    Ok(outcome)
}

/// The rules engine with the text view drawing on top.
struct SoloHooks {
    rules: BasicRules,
    view: TextView,
}

impl SimHooks for SoloHooks {
    fn update_ai(&mut self, state: &mut MatchState) {
        self.rules.update_ai(state);
    }

    fn advance_phase(&mut self, state: &mut MatchState, now_ms: u64) {
        self.rules.advance_phase(state, now_ms);
    }

    fn resolve_pass_intents(&mut self, state: &mut MatchState) {
        self.rules.resolve_pass_intents(state);
    }

    fn draw_court(&mut self, state: &MatchState) {
        self.view.draw_court(state);
    }

    fn draw_score(&mut self, state: &MatchState) {
        self.view.draw_score(state);
    }

    fn offer_overtime(&mut self, state: &mut MatchState) -> bool {
        self.rules.offer_overtime(state)
    }

    fn spawn_emergency_rebound(&mut self, state: &mut MatchState, x: f32, y: f32) {
        self.rules.spawn_emergency_rebound(state, x, y);
    }

    fn on_possession_change(&mut self, state: &mut MatchState) {
        self.rules.on_possession_change(state);
    }

    fn on_forced_shot(&mut self, state: &mut MatchState, shooter: PlayerId) {
        self.rules.on_forced_shot(state, shooter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::input::attempt_shot;
    use shared::MatchRules;

    #[test]
    fn test_solo_frame_empties_event_queue() {
        let mut driver = FrameDriver::new(FrameConfig::authority()).with_hooks(BasicRules::seeded(3));
        let mut state = MatchState::new();
        state.add_player(1, Team::Home, Controller::Human);
        state.add_player(200, Team::Away, Controller::Ai);
        state.begin_match(&MatchRules::default());
        state.give_ball(1, "test");
        attempt_shot(&mut state, 1);
        assert!(!state.events().is_empty());

        solo_frame(&mut driver, &mut state, 0).unwrap();
        assert!(state.events().is_empty());

        for now in (16..2_000).step_by(16) {
            solo_frame(&mut driver, &mut state, now).unwrap();
            assert!(state.events().is_empty());
        }
    }
}
