use thiserror::Error;

use crate::state::PlayerId;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The state store was never initialised with `begin_match`. This is a
    /// caller bug, not a runtime condition.
    #[error("match state used before begin_match")]
    MatchNotStarted,

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}
