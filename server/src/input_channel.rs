//! Per-player input queue feeding the coordinator.
//!
//! Each connected player owns one bounded channel. The network task is its only
//! writer and the coordinator its only reader. Every tick the coordinator drains
//! it without blocking and keeps only packets that pass the sequence and
//! timestamp checks.

use log::{debug, trace};
use shared::{InputPacket, PlayerId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

/// How far a packet timestamp may sit from the coordinator clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampWindow {
    /// Packets stamped further in the past are stale.
    pub max_age_ms: u64,
    /// Packets stamped further in the future come from a broken clock.
    pub max_lead_ms: u64,
}

impl Default for TimestampWindow {
    fn default() -> Self {
        Self {
            max_age_ms: 10_000,
            max_lead_ms: 1_000,
        }
    }
}

impl TimestampWindow {
    pub fn accepts(&self, timestamp: u64, now_ms: u64) -> bool {
        if timestamp <= now_ms {
            now_ms - timestamp <= self.max_age_ms
        } else {
            timestamp - now_ms <= self.max_lead_ms
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Duplicate,
    Stale,
}

/// The coordinator's end of one player's input channel.
#[derive(Debug)]
pub struct InputChannel {
    player: PlayerId,
    receiver: mpsc::Receiver<InputPacket>,
    last_sequence: u32,
    rejected: u64,
    closed: bool,
}

impl InputChannel {
    pub fn new(player: PlayerId, receiver: mpsc::Receiver<InputPacket>) -> Self {
        Self {
            player,
            receiver,
            last_sequence: 0,
            rejected: 0,
            closed: false,
        }
    }

    /// Creates a channel pair with room for `capacity` unread packets.
    pub fn pair(player: PlayerId, capacity: usize) -> (mpsc::Sender<InputPacket>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self::new(player, receiver))
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Highest sequence accepted so far. Sent back to the client as its ack.
    pub fn last_sequence(&self) -> u32 {
        self.last_sequence
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Takes every waiting packet and returns the accepted ones in arrival order.
    pub fn drain(&mut self, now_ms: u64, window: &TimestampWindow) -> Vec<InputPacket> {
        let mut accepted = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(packet) => match self.check(&packet, now_ms, window) {
                    Ok(()) => {
                        self.last_sequence = packet.sequence;
                        accepted.push(packet);
                    }
                    Err(reason) => {
                        self.rejected += 1;
                        debug!(
                            "Dropped input {} from player {}: {:?}",
                            packet.sequence, self.player, reason
                        );
                    }
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        debug!("Input channel for player {} closed", self.player);
                    }
                    self.closed = true;
                    break;
                }
            }
        }
        if !accepted.is_empty() {
            trace!(
                "Player {}: {} packets, last sequence {}",
                self.player,
                accepted.len(),
                self.last_sequence
            );
        }
        accepted
    }

    fn check(&self, packet: &InputPacket, now_ms: u64, window: &TimestampWindow) -> Result<(), Rejection> {
        if packet.sequence <= self.last_sequence {
            return Err(Rejection::Duplicate);
        }
        if !window.accepts(packet.timestamp, now_ms) {
            return Err(Rejection::Stale);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{InputEvent, Key};

    fn packet(sequence: u32, timestamp: u64) -> InputPacket {
        InputPacket {
            sequence,
            timestamp,
            inputs: vec![InputEvent {
                key: Key::Right,
                frame: sequence,
                turbo: false,
            }],
        }
    }

    #[test]
    fn test_out_of_order_packet_is_dropped() {
        let (tx, mut channel) = InputChannel::pair(7, 16);
        tx.try_send(packet(5, 10_000)).unwrap();
        tx.try_send(packet(3, 10_000)).unwrap();

        let accepted = channel.drain(10_000, &TimestampWindow::default());
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].sequence, 5);
        assert_eq!(channel.last_sequence(), 5);
        assert_eq!(channel.rejected(), 1);
    }

    #[test]
    fn test_retransmission_is_idempotent() {
        let (tx, mut channel) = InputChannel::pair(1, 16);
        tx.try_send(packet(1, 5_000)).unwrap();
        assert_eq!(channel.drain(5_000, &TimestampWindow::default()).len(), 1);

        tx.try_send(packet(1, 5_000)).unwrap();
        tx.try_send(packet(1, 5_000)).unwrap();
        assert!(channel.drain(5_000, &TimestampWindow::default()).is_empty());
        assert_eq!(channel.last_sequence(), 1);
    }

    #[test]
    fn test_timestamp_window() {
        let window = TimestampWindow::default();
        let now = 100_000;
        assert!(window.accepts(now, now));
        assert!(window.accepts(now - 10_000, now));
        assert!(!window.accepts(now - 10_001, now));
        assert!(window.accepts(now + 1_000, now));
        assert!(!window.accepts(now + 1_001, now));
    }

    #[test]
    fn test_stale_packet_leaves_sequence_untouched() {
        let (tx, mut channel) = InputChannel::pair(1, 16);
        tx.try_send(packet(4, 0)).unwrap();

        assert!(channel.drain(50_000, &TimestampWindow::default()).is_empty());
        assert_eq!(channel.last_sequence(), 0);

        tx.try_send(packet(2, 50_000)).unwrap();
        assert_eq!(channel.drain(50_000, &TimestampWindow::default()).len(), 1);
    }

    #[test]
    fn test_drop_of_sender_closes_channel() {
        let (tx, mut channel) = InputChannel::pair(1, 4);
        drop(tx);
        assert!(channel.drain(0, &TimestampWindow::default()).is_empty());
        assert!(channel.is_closed());
    }
}
