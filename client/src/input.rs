//! Client input management with sequencing and batching

use log::warn;
use shared::{InputEvent, InputPacket, Key};

/// Upper bound on events carried by one packet. Keeps datagrams small.
pub const MAX_BATCH: usize = 32;

/// Collects key events between sends and wraps them in sequenced packets
pub struct InputBatcher {
    next_sequence: u32,
    queued: Vec<InputEvent>,
}

impl InputBatcher {
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            queued: Vec::new(),
        }
    }

    pub fn push(&mut self, key: Key, frame: u32, turbo: bool) {
        self.queued.push(InputEvent { key, frame, turbo });
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Sequence the next packet will carry.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Wraps queued events into the next packet, oldest first.
    ///
    /// Returns None when nothing is queued so idle clients send nothing.
    pub fn flush(&mut self, now_ms: u64) -> Option<InputPacket> {
        if self.queued.is_empty() {
            return None;
        }
        let take = self.queued.len().min(MAX_BATCH);
        let inputs: Vec<InputEvent> = self.queued.drain(..take).collect();

        let packet = InputPacket {
            sequence: self.next_sequence,
            timestamp: now_ms,
            inputs,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1).max(1);
        Some(packet)
    }
}

impl Default for InputBatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses one line of typed keys, e.g. `d d! k`.
///
/// A trailing `!` asks for turbo. Unknown tokens are skipped with a warning.
pub fn parse_keys(line: &str) -> Vec<(Key, bool)> {
    line.split_whitespace()
        .filter_map(|token| {
            let (name, turbo) = match token.strip_suffix('!') {
                Some(name) => (name, true),
                None => (token, false),
            };
            match name.parse::<Key>() {
                Ok(key) => Some((key, turbo)),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            }
        })
        .collect()
}
