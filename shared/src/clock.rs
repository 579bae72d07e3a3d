//! Game/shot clock cadence, match rules and timed violation pauses.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::possession::StuckLadder;
use crate::{GAME_LENGTH_SECONDS, OVERTIME_LENGTH_SECONDS, SHOT_CLOCK_DEFAULT, SHOT_CLOCK_RESET_PAUSE_MS};

#[derive(Debug, Clone, PartialEq)]
pub struct MatchRules {
    pub game_seconds: i32,
    pub overtime_seconds: i32,
    pub shot_clock_seconds: i32,
    pub violation_pause_ms: u64,
    /// Real milliseconds per game second at a clock speed of 1.0.
    pub tick_interval_ms: u64,
    pub clock_speed: f32,
    pub stuck: StuckLadder,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            game_seconds: GAME_LENGTH_SECONDS,
            overtime_seconds: OVERTIME_LENGTH_SECONDS,
            shot_clock_seconds: SHOT_CLOCK_DEFAULT,
            violation_pause_ms: SHOT_CLOCK_RESET_PAUSE_MS,
            tick_interval_ms: 1000,
            clock_speed: 1.0,
            stuck: StuckLadder::default(),
        }
    }
}

impl MatchRules {
    pub fn decrement_interval_ms(&self) -> u64 {
        let speed = if self.clock_speed > 0.0 {
            self.clock_speed
        } else {
            1.0
        };
        ((self.tick_interval_ms as f32 / speed).floor() as u64).max(1)
    }

    pub fn halftime_mark(&self) -> i32 {
        self.game_seconds / 2
    }
}

/// Tracks when the clocks last ticked down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GameClock {
    last_decrement_ms: Option<u64>,
}

impl GameClock {
    /// True once per elapsed interval. The first call only arms the clock.
    pub fn due(&mut self, now_ms: u64, interval_ms: u64) -> bool {
        match self.last_decrement_ms {
            None => {
                self.last_decrement_ms = Some(now_ms);
                false
            }
            Some(last) if now_ms.saturating_sub(last) >= interval_ms => {
                self.last_decrement_ms = Some(now_ms);
                true
            }
            Some(_) => false,
        }
    }

    /// Forget the cadence so stopped time is not charged on restart.
    pub fn rearm(&mut self) {
        self.last_decrement_ms = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    ShotClock,
    FiveSecond,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredAction {
    SwitchPossession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseStatus {
    Idle,
    Holding,
    Expired(Option<DeferredAction>),
}

/// A timed suspension of authority-side simulation with at most one deferred
/// action attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViolationPause {
    pub active: bool,
    pub reason: Option<ViolationKind>,
    pub resume_at_ms: u64,
    pending_action: Option<DeferredAction>,
}

impl ViolationPause {
    /// Returns false without touching anything if a pause is already pending.
    pub fn start(&mut self, reason: ViolationKind, resume_at_ms: u64, action: DeferredAction) -> bool {
        if self.active || self.pending_action.is_some() {
            warn!(
                "Ignoring {:?} pause, {:?} already pending",
                reason, self.reason
            );
            return false;
        }
        self.active = true;
        self.reason = Some(reason);
        self.resume_at_ms = resume_at_ms;
        self.pending_action = Some(action);
        true
    }

    /// Hands back the deferred action exactly once, on the first poll at or after
    /// `resume_at_ms`.
    pub fn poll(&mut self, now_ms: u64) -> PauseStatus {
        if !self.active {
            return PauseStatus::Idle;
        }
        if now_ms < self.resume_at_ms {
            return PauseStatus::Holding;
        }
        PauseStatus::Expired(self.force_clear())
    }

    /// Abort path: clears the pause and returns whatever action was still owed.
    pub fn force_clear(&mut self) -> Option<DeferredAction> {
        self.active = false;
        self.reason = None;
        self.pending_action.take()
    }

    pub fn pending_action(&self) -> Option<DeferredAction> {
        self.pending_action
    }
}
