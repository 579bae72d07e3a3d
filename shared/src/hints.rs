//! Best-effort cosmetic event side channel.
//!
//! Hints let remote clients play matching animations (shot arcs, passes,
//! knockbacks). They never feed back into the simulation; a client that misses
//! one is still consistent once the next snapshot lands.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::events::GameEvent;
use crate::state::PlayerId;
use crate::{HINT_BUFFER_CAPACITY, HINT_HORIZON_FRAMES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HintKind {
    Shot,
    Pass,
    Dunk,
    Rebound,
    ClearBall,
    ShoveKnockback,
    /// The player's authoritative position jumped; snap instead of easing.
    DriftSnap,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HintPayload {
    #[serde(rename = "p")]
    pub player: Option<PlayerId>,
    #[serde(rename = "o")]
    pub target: Option<PlayerId>,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationHint {
    pub id: u32,
    #[serde(rename = "k")]
    pub kind: HintKind,
    #[serde(rename = "d")]
    pub payload: HintPayload,
    #[serde(rename = "of")]
    pub origin_frame: u32,
    #[serde(rename = "ef")]
    pub expires_at_frame: u32,
}

impl AnimationHint {
    pub fn is_live(&self, frame: u32) -> bool {
        frame <= self.expires_at_frame
    }
}

/// Ring buffer of live hints, oldest evicted first when full.
#[derive(Debug, Clone)]
pub struct AnimationHintBuffer {
    entries: VecDeque<AnimationHint>,
    capacity: usize,
    horizon: u32,
    next_id: u32,
}

impl AnimationHintBuffer {
    pub fn new(horizon: u32) -> Self {
        Self::with_capacity(HINT_BUFFER_CAPACITY, horizon)
    }

    pub fn with_capacity(capacity: usize, horizon: u32) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            horizon,
            next_id: 1,
        }
    }

    pub fn push(&mut self, kind: HintKind, payload: HintPayload, frame: u32) -> u32 {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.entries.push_back(AnimationHint {
            id,
            kind,
            payload,
            origin_frame: frame,
            expires_at_frame: frame.saturating_add(self.horizon),
        });
        id
    }

    /// Records a hint for a simulation event, if it has a visual.
    pub fn push_event(&mut self, event: &GameEvent, position: (f32, f32), frame: u32) -> Option<u32> {
        let kind = event.hint_kind()?;
        let payload = HintPayload {
            player: event.actor(),
            target: event.target(),
            x: position.0,
            y: position.1,
        };
        Some(self.push(kind, payload, frame))
    }

    pub fn prune(&mut self, frame: u32) {
        self.entries.retain(|hint| hint.is_live(frame));
    }

    pub fn live(&self, frame: u32) -> Vec<AnimationHint> {
        self.entries
            .iter()
            .filter(|hint| hint.is_live(frame))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AnimationHintBuffer {
    fn default() -> Self {
        Self::new(HINT_HORIZON_FRAMES)
    }
}
