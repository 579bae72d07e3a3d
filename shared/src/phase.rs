//! Discrete modes of play and the subsystems each one permits.

use serde::{Deserialize, Serialize};

use crate::TICK_COUNTER_WRAP;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GamePhase {
    Normal,
    InboundSetup,
    ShotScored,
    ShotMissed,
    ReboundScramble,
    JumpBall,
    OvertimeIntro,
    Paused,
}

impl GamePhase {
    /// Phases during which the loose-ball watchdog is held off and its
    /// counters are forced to zero.
    pub const SAFETY_NET_SKIP: [GamePhase; 6] = [
        GamePhase::ShotScored,
        GamePhase::InboundSetup,
        GamePhase::ShotMissed,
        GamePhase::ReboundScramble,
        GamePhase::JumpBall,
        GamePhase::OvertimeIntro,
    ];

    pub fn suspends_safety_net(self) -> bool {
        Self::SAFETY_NET_SKIP.contains(&self)
    }

    pub fn suspends_ai(self) -> bool {
        self.suspends_safety_net() || self == GamePhase::Paused
    }

    pub fn stops_clock(self) -> bool {
        matches!(
            self,
            GamePhase::InboundSetup
                | GamePhase::ShotScored
                | GamePhase::JumpBall
                | GamePhase::OvertimeIntro
                | GamePhase::Paused
        )
    }

    pub fn allows_physics(self) -> bool {
        self != GamePhase::OvertimeIntro
    }
}

/// The active phase and the tick it began on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub kind: GamePhase,
    pub started_at: u32,
}

impl PhaseRecord {
    pub fn new(kind: GamePhase, started_at: u32) -> Self {
        Self { kind, started_at }
    }

    /// Ticks spent in this phase, tolerant of the tick counter wrapping.
    pub fn age(&self, tick: u32) -> u32 {
        if tick >= self.started_at {
            tick - self.started_at
        } else {
            TICK_COUNTER_WRAP - self.started_at + tick
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_list_membership() {
        assert!(GamePhase::InboundSetup.suspends_safety_net());
        assert!(GamePhase::ReboundScramble.suspends_safety_net());
        assert!(!GamePhase::Normal.suspends_safety_net());
        assert!(!GamePhase::Paused.suspends_safety_net());
    }

    #[test]
    fn test_ai_also_stops_when_paused() {
        assert!(GamePhase::Paused.suspends_ai());
        assert!(GamePhase::JumpBall.suspends_ai());
        assert!(!GamePhase::Normal.suspends_ai());
    }

    #[test]
    fn test_clock_stopping_phases() {
        assert!(GamePhase::ShotScored.stops_clock());
        assert!(GamePhase::Paused.stops_clock());
        assert!(!GamePhase::ShotMissed.stops_clock());
        assert!(!GamePhase::ReboundScramble.stops_clock());
        assert!(!GamePhase::Normal.stops_clock());
    }

    #[test]
    fn test_physics_off_only_in_overtime_intro() {
        assert!(!GamePhase::OvertimeIntro.allows_physics());
        assert!(GamePhase::JumpBall.allows_physics());
    }

    #[test]
    fn test_phase_age_wraps() {
        let record = PhaseRecord::new(GamePhase::Normal, TICK_COUNTER_WRAP - 2);
        assert_eq!(record.age(TICK_COUNTER_WRAP - 1), 1);
        assert_eq!(record.age(3), 5);
    }
}
