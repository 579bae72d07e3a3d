//! The lockable session record: who is in the session and who coordinates it.
//!
//! Exactly one participant holds the coordinator role. Claims are written under
//! the record's write lock and re-read after the lock is acquired, so of two
//! racing claims only the first lands. A coordinator whose heartbeat goes stale
//! can be replaced through the same path.

use log::{debug, info, warn};
use shared::PlayerId;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    pub coordinator: Option<PlayerId>,
    pub players: Vec<PlayerId>,
    /// Last time the coordinator was heard from.
    pub heartbeat_ms: Option<u64>,
}

impl SessionRecord {
    fn coordinator_alive(&self, now_ms: u64, timeout_ms: u64) -> bool {
        match (self.coordinator, self.heartbeat_ms) {
            (Some(_), Some(beat)) => now_ms.saturating_sub(beat) <= timeout_ms,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    record: Arc<RwLock<SessionRecord>>,
    heartbeat_timeout_ms: u64,
}

impl SessionHandle {
    pub fn new(heartbeat_timeout_ms: u64) -> Self {
        Self {
            record: Arc::new(RwLock::new(SessionRecord::default())),
            heartbeat_timeout_ms,
        }
    }

    pub async fn join(&self, player: PlayerId) {
        let mut record = self.record.write().await;
        if !record.players.contains(&player) {
            record.players.push(player);
        }
    }

    /// Removes the player. Returns true if they were coordinating.
    pub async fn leave(&self, player: PlayerId) -> bool {
        let mut record = self.record.write().await;
        record.players.retain(|p| *p != player);
        if record.coordinator == Some(player) {
            record.coordinator = None;
            record.heartbeat_ms = None;
            info!("Coordinator {} left the session", player);
            true
        } else {
            false
        }
    }

    /// Tries to take the coordinator role. Returns whether `player` holds it
    /// afterwards.
    pub async fn claim(&self, player: PlayerId, now_ms: u64) -> bool {
        {
            let record = self.record.read().await;
            if record.coordinator_alive(now_ms, self.heartbeat_timeout_ms) {
                return record.coordinator == Some(player);
            }
        }

        let mut record = self.record.write().await;
        // Someone may have claimed between the two locks.
        if record.coordinator == Some(player) {
            record.heartbeat_ms = Some(now_ms);
            return true;
        }
        if record.coordinator_alive(now_ms, self.heartbeat_timeout_ms) {
            debug!(
                "Player {} lost the coordinator claim to {:?}",
                player, record.coordinator
            );
            return false;
        }
        if let Some(stale) = record.coordinator {
            warn!("Coordinator {} is stale, replacing with {}", stale, player);
        }
        record.coordinator = Some(player);
        record.heartbeat_ms = Some(now_ms);
        if !record.players.contains(&player) {
            record.players.push(player);
        }
        info!("Player {} is now coordinating", player);
        true
    }

    /// Refreshes the heartbeat. Only the coordinator can do so.
    pub async fn heartbeat(&self, player: PlayerId, now_ms: u64) -> bool {
        let mut record = self.record.write().await;
        if record.coordinator != Some(player) {
            return false;
        }
        record.heartbeat_ms = Some(now_ms);
        true
    }

    pub async fn is_coordinator_alive(&self, now_ms: u64) -> bool {
        self.record
            .read()
            .await
            .coordinator_alive(now_ms, self.heartbeat_timeout_ms)
    }

    pub async fn coordinator(&self) -> Option<PlayerId> {
        self.record.read().await.coordinator
    }

    /// Hands a vacant or stale role to the longest-standing participant.
    pub async fn elect(&self, now_ms: u64) -> Option<PlayerId> {
        if self.is_coordinator_alive(now_ms).await {
            return self.coordinator().await;
        }
        let (mut candidates, stale) = {
            let record = self.record.read().await;
            (record.players.clone(), record.coordinator)
        };
        // A stale coordinator only gets the role back if nobody else can take it.
        if let Some(stale) = stale {
            candidates.retain(|p| *p != stale);
            candidates.push(stale);
        }
        for candidate in candidates {
            if self.claim(candidate, now_ms).await {
                return Some(candidate);
            }
            if self.is_coordinator_alive(now_ms).await {
                return self.coordinator().await;
            }
        }
        None
    }

    pub async fn snapshot(&self) -> SessionRecord {
        self.record.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_claim_wins() {
        let session = SessionHandle::new(1_000);
        assert!(session.claim(1, 0).await);
        assert!(!session.claim(2, 10).await);
        assert_eq!(session.coordinator().await, Some(1));
    }

    #[tokio::test]
    async fn test_claim_race_has_single_winner() {
        for _ in 0..50 {
            let session = SessionHandle::new(1_000);
            let a = {
                let session = session.clone();
                tokio::spawn(async move { session.claim(1, 0).await })
            };
            let b = {
                let session = session.clone();
                tokio::spawn(async move { session.claim(2, 0).await })
            };
            let (a, b) = (a.await.unwrap(), b.await.unwrap());

            assert!(a ^ b, "exactly one claim must win");
            let record = session.snapshot().await;
            let winner = if a { 1 } else { 2 };
            assert_eq!(record.coordinator, Some(winner));
        }
    }

    #[tokio::test]
    async fn test_stale_coordinator_is_replaced() {
        let session = SessionHandle::new(1_000);
        session.join(1).await;
        session.join(2).await;
        assert!(session.claim(1, 0).await);
        assert!(session.heartbeat(1, 500).await);
        assert!(!session.heartbeat(2, 500).await);

        assert!(session.is_coordinator_alive(1_500).await);
        assert!(!session.is_coordinator_alive(1_501).await);
        assert!(session.claim(2, 1_501).await);
        assert_eq!(session.coordinator().await, Some(2));
    }

    #[tokio::test]
    async fn test_leave_and_elect() {
        let session = SessionHandle::new(1_000);
        for id in [3, 4, 5] {
            session.join(id).await;
        }
        assert_eq!(session.elect(0).await, Some(3));

        assert!(session.leave(3).await);
        assert_eq!(session.coordinator().await, None);
        assert_eq!(session.elect(10).await, Some(4));
        assert_eq!(session.snapshot().await.players, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_elect_passes_over_stale_coordinator() {
        let session = SessionHandle::new(1_000);
        session.join(1).await;
        session.join(2).await;
        assert_eq!(session.elect(0).await, Some(1));

        assert_eq!(session.elect(2_000).await, Some(2));
        assert!(!session.heartbeat(1, 2_100).await);
    }

    #[tokio::test]
    async fn test_lone_stale_coordinator_keeps_role() {
        let session = SessionHandle::new(1_000);
        session.join(1).await;
        assert_eq!(session.elect(0).await, Some(1));
        assert_eq!(session.elect(5_000).await, Some(1));
        assert!(session.is_coordinator_alive(5_500).await);
    }

    #[test]
    fn test_blocking_claim_with_tokio_test() {
        let session = SessionHandle::new(1_000);
        assert!(tokio_test::block_on(session.claim(9, 0)));
        assert_eq!(tokio_test::block_on(session.coordinator()), Some(9));
    }
}
