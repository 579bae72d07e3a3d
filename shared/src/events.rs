//! Things that happened during a tick.
//!
//! The simulation pushes events into the state's queue; the coordinator drains
//! them once per update, turning the cosmetic ones into animation hints.

use serde::{Deserialize, Serialize};

use crate::clock::ViolationKind;
use crate::hints::HintKind;
use crate::safety_net::{LooseBallReason, LooseBallWatch};
use crate::state::{PlayerId, Team};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    ShotAttempt {
        shooter: PlayerId,
        dunk: bool,
    },
    Basket {
        team: Team,
        points: u32,
    },
    Pass {
        from: PlayerId,
        to: PlayerId,
    },
    Rebound {
        player: PlayerId,
    },
    ClearBall {
        player: PlayerId,
    },
    ShoveKnockback {
        attacker: PlayerId,
        victim: PlayerId,
    },
    LooseBall {
        reason: LooseBallReason,
        counters: LooseBallWatch,
    },
    Violation {
        kind: ViolationKind,
        team: Team,
    },
    PossessionChange {
        team: Team,
    },
    Halftime,
    Overtime {
        period: u8,
    },
    GameOver {
        score: [u32; 2],
    },
}

impl GameEvent {
    /// Hint type for remote animation playback, if the event has a visual.
    pub fn hint_kind(&self) -> Option<HintKind> {
        match self {
            GameEvent::ShotAttempt { dunk: true, .. } => Some(HintKind::Dunk),
            GameEvent::ShotAttempt { dunk: false, .. } => Some(HintKind::Shot),
            GameEvent::Pass { .. } => Some(HintKind::Pass),
            GameEvent::Rebound { .. } => Some(HintKind::Rebound),
            GameEvent::ClearBall { .. } => Some(HintKind::ClearBall),
            GameEvent::ShoveKnockback { .. } => Some(HintKind::ShoveKnockback),
            _ => None,
        }
    }

    /// The player the animation is anchored on.
    pub fn actor(&self) -> Option<PlayerId> {
        match self {
            GameEvent::ShotAttempt { shooter, .. } => Some(*shooter),
            GameEvent::Pass { from, .. } => Some(*from),
            GameEvent::Rebound { player } | GameEvent::ClearBall { player } => Some(*player),
            GameEvent::ShoveKnockback { attacker, .. } => Some(*attacker),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<PlayerId> {
        match self {
            GameEvent::Pass { to, .. } => Some(*to),
            GameEvent::ShoveKnockback { victim, .. } => Some(*victim),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosmetic_events_map_to_hints() {
        let dunk = GameEvent::ShotAttempt {
            shooter: 3,
            dunk: true,
        };
        assert_eq!(dunk.hint_kind(), Some(HintKind::Dunk));
        assert_eq!(dunk.actor(), Some(3));

        let pass = GameEvent::Pass { from: 1, to: 2 };
        assert_eq!(pass.hint_kind(), Some(HintKind::Pass));
        assert_eq!(pass.target(), Some(2));
    }

    #[test]
    fn test_rule_events_have_no_hint() {
        assert_eq!(GameEvent::Halftime.hint_kind(), None);
        let violation = GameEvent::Violation {
            kind: ViolationKind::ShotClock,
            team: Team::Home,
        };
        assert_eq!(violation.hint_kind(), None);
    }
}
