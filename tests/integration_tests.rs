//! Integration tests for networked multiplayer components
//!
//! These tests run the coordinator, the snapshot channels and the client
//! reconciler together, and exercise real UDP sockets.

use client::reconciler::{ClientReconciler, ReconcileConfig};
use server::coordinator::{Coordinator, CoordinatorConfig, PlayerLink};
use server::network::Server;
use server::session::SessionHandle;
use shared::hooks::NoopHooks;
use shared::{
    FrameConfig, InputEvent, InputPacket, Key, Packet, PlayerId, StateSnapshot, Team,
    PROTOCOL_VERSION,
};
use std::time::Duration;
use tokio::net::UdpSocket;

fn coordinator() -> Coordinator {
    Coordinator::new(CoordinatorConfig::default(), FrameConfig::authority(), NoopHooks)
}

fn packet(sequence: u32, timestamp: u64, key: Key, frame: u32) -> InputPacket {
    InputPacket {
        sequence,
        timestamp,
        inputs: vec![InputEvent {
            key,
            frame,
            turbo: false,
        }],
    }
}

fn reconciler_for(link: &PlayerLink) -> ClientReconciler {
    ClientReconciler::new(link.player, ReconcileConfig::default(), link.snapshots.clone())
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// A snapshot with hints and acks survives the datagram codec unchanged
    #[test]
    fn snapshot_packet_codec() {
        let mut coordinator = coordinator();
        let _home = coordinator.register_player(1);
        let _away = coordinator.register_player(2);
        coordinator.start_match();
        coordinator.update(1_000).unwrap();

        let snapshot = coordinator.latest_snapshot().unwrap();
        let bytes = Packet::Snapshot(snapshot.as_ref().clone()).encode().unwrap();

        match Packet::decode(&bytes).unwrap() {
            Packet::Snapshot(decoded) => assert_eq!(&decoded, snapshot.as_ref()),
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    /// Tests real UDP socket communication with encoded packets
    #[tokio::test]
    async fn udp_packet_round_trip() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let input = Packet::Input(packet(9, 1234, Key::Shove, 77));

        sender
            .send_to(&input.encode().unwrap(), receiver.local_addr().unwrap())
            .await
            .unwrap();

        let mut buf = vec![0u8; 2048];
        let (len, from) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(from, sender.local_addr().unwrap());
        match Packet::decode(&buf[..len]).unwrap() {
            Packet::Input(decoded) => {
                assert_eq!(decoded.sequence, 9);
                assert_eq!(decoded.inputs[0].key, Key::Shove);
                assert_eq!(decoded.inputs[0].frame, 77);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(Packet::decode(&[0xff, 0xff, 0xff, 0xff, 0x01]).is_err());
    }
}

/// COORDINATOR TO RECONCILER TESTS
mod sync_tests {
    use super::*;

    fn remote_positions(snapshot_source: &Coordinator, local: PlayerId) -> Vec<(PlayerId, f32, f32)> {
        snapshot_source
            .state()
            .players
            .values()
            .filter(|p| p.id != local)
            .map(|p| (p.id, p.x, p.y))
            .collect()
    }

    #[test]
    fn remote_players_match_coordinator_after_round_trip() {
        let mut coordinator = coordinator();
        let home = coordinator.register_player(1);
        let away = coordinator.register_player(2);
        coordinator.add_ai_player(50, Team::Home);
        coordinator.start_match();
        let mut reconciler = reconciler_for(&home);

        let keys = [Key::Left, Key::Left, Key::Down, Key::Left, Key::Up];
        for (i, key) in keys.iter().enumerate() {
            let now = i as u64 * 50;
            away.inputs.try_send(packet(i as u32 + 1, now, *key, i as u32)).unwrap();
            coordinator.update(now).unwrap();
        }
        assert!(reconciler.update());

        let mirrored: Vec<(PlayerId, f32, f32)> = reconciler
            .state()
            .players
            .values()
            .filter(|p| p.id != 1)
            .map(|p| (p.id, p.x, p.y))
            .collect();
        assert_eq!(mirrored, remote_positions(&coordinator, 1));
        assert_eq!(reconciler.last_applied_frame(), Some(coordinator.frame()));
    }

    #[test]
    fn acknowledged_input_settles_prediction() {
        let mut coordinator = coordinator();
        let home = coordinator.register_player(1);
        let _away = coordinator.register_player(2);
        coordinator.start_match();
        let mut reconciler = reconciler_for(&home);

        coordinator.update(0).unwrap();
        assert!(reconciler.update());
        let start = reconciler.state().players[&1].x;

        reconciler.handle_input(Key::Right, 1, false);
        assert_eq!(reconciler.state().players[&1].x, start + 1.0);
        let sent = reconciler.take_packet(50).unwrap();
        home.inputs.try_send(sent).unwrap();

        coordinator.update(50).unwrap();
        assert!(reconciler.update());

        assert_eq!(reconciler.last_ack(), 1);
        assert_eq!(reconciler.pending_inputs(), 0);
        assert_eq!(
            reconciler.state().players[&1].x,
            coordinator.state().players[&1].x
        );
        assert_eq!(coordinator.state().players[&1].x, start + 1.0);
    }

    #[test]
    fn session_owner_stops_predicting() {
        let mut coordinator = coordinator();
        let home = coordinator.register_player(1);
        coordinator.set_session_owner(Some(1));
        coordinator.start_match();
        let mut reconciler = reconciler_for(&home);

        coordinator.update(0).unwrap();
        reconciler.update();
        assert!(reconciler.is_coordinator());

        let before = reconciler.state().players[&1].x;
        reconciler.handle_input(Key::Right, 1, false);
        assert_eq!(reconciler.state().players[&1].x, before);
    }

    #[test]
    fn slow_reader_sees_only_latest_snapshot() {
        let mut coordinator = coordinator();
        let home = coordinator.register_player(1);
        coordinator.start_match();
        let mut reconciler = reconciler_for(&home);

        for tick in 0..10u64 {
            coordinator.update(tick * 50).unwrap();
        }

        let latest: Option<StateSnapshot> = home
            .snapshots
            .borrow()
            .as_ref()
            .map(|snapshot| snapshot.as_ref().clone());
        assert_eq!(latest.map(|s| s.frame), Some(10));
        assert!(reconciler.update());
        assert_eq!(reconciler.last_applied_frame(), Some(10));
    }
}

/// FULL SERVER OVER UDP
mod server_tests {
    use super::*;

    async fn recv(socket: &UdpSocket, buf: &mut [u8]) -> Packet {
        let (len, _) = socket.recv_from(buf).await.unwrap();
        Packet::decode(&buf[..len]).unwrap()
    }

    #[tokio::test]
    async fn client_input_is_acknowledged_in_snapshots() {
        let mut server = Server::new(
            "127.0.0.1:0",
            Duration::from_millis(10),
            4,
            coordinator(),
            SessionHandle::new(5_000),
        )
        .await
        .unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = async move {
            let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
            let mut buf = vec![0u8; 8192];
            let connect = Packet::Connect {
                client_version: PROTOCOL_VERSION,
            };
            socket
                .send_to(&connect.encode().unwrap(), server_addr)
                .await
                .unwrap();

            let player_id = match recv(&socket, &mut buf).await {
                Packet::Connected {
                    player_id,
                    coordinator,
                    ..
                } => {
                    assert_eq!(coordinator, Some(player_id));
                    player_id
                }
                other => panic!("Unexpected packet {:?}", other),
            };

            let input = Packet::Input(packet(1, shared::unix_millis(), Key::Up, 1));
            socket
                .send_to(&input.encode().unwrap(), server_addr)
                .await
                .unwrap();

            loop {
                if let Packet::Snapshot(snapshot) = recv(&socket, &mut buf).await {
                    if snapshot.acks.get(&player_id) == Some(&1) {
                        return snapshot;
                    }
                }
            }
        };

        tokio::select! {
            _ = server.run() => panic!("server stopped early"),
            snapshot = tokio::time::timeout(Duration::from_secs(5), client) => {
                let snapshot = snapshot.expect("no acknowledged snapshot in time");
                assert!(snapshot.player(1).is_some());
                assert_eq!(snapshot.game.coordinator, Some(1));
            }
        }
    }
}
