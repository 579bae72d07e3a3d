//! Headless bot that connects to a server and mashes random keys.

use rand::seq::SliceRandom;
use rand::Rng;
use shared::{unix_millis, InputEvent, InputPacket, Key, Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;

const KEYS: [Key; 7] = [
    Key::Up,
    Key::Down,
    Key::Left,
    Key::Right,
    Key::Shoot,
    Key::Pass,
    Key::Shove,
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server_addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let connect = Packet::Connect {
        client_version: PROTOCOL_VERSION,
    };
    socket.send_to(&connect.encode()?, server_addr).await?;
    println!("Sent connection request to {}", server_addr);

    let mut buf = vec![0u8; 8192];
    let (len, _) = socket.recv_from(&mut buf).await?;
    let player_id = match Packet::decode(&buf[..len])? {
        Packet::Connected {
            player_id,
            team,
            coordinator,
        } => {
            println!(
                "Connected as player {} on {:?}, coordinator {:?}",
                player_id, team, coordinator
            );
            player_id
        }
        Packet::Disconnected { reason } => {
            println!("Refused: {}", reason);
            return Ok(());
        }
        other => {
            println!("Unexpected packet: {:?}", other);
            return Ok(());
        }
    };

    let mut rng = rand::thread_rng();
    let mut frame = 0u32;
    for sequence in 1..=200u32 {
        frame += rng.gen_range(1..4);
        let key = *KEYS.choose(&mut rng).unwrap_or(&Key::Right);
        let packet = Packet::Input(InputPacket {
            sequence,
            timestamp: unix_millis(),
            inputs: vec![InputEvent {
                key,
                frame,
                turbo: rng.gen_bool(0.2),
            }],
        });
        socket.send_to(&packet.encode()?, server_addr).await?;

        if let Ok(Ok((len, _))) =
            tokio::time::timeout(Duration::from_millis(5), socket.recv_from(&mut buf)).await
        {
            if let Ok(Packet::Snapshot(snapshot)) = Packet::decode(&buf[..len]) {
                let ack = snapshot.acks.get(&player_id).copied().unwrap_or(0);
                if sequence % 20 == 0 {
                    println!(
                        "Frame {} score {:?} clock {} ack {}",
                        snapshot.frame, snapshot.game.score, snapshot.game.time_remaining, ack
                    );
                }
            }
        }

        sleep(Duration::from_millis(33)).await;
    }

    socket.send_to(&Packet::Disconnect.encode()?, server_addr).await?;
    println!("Disconnected");
    Ok(())
}
