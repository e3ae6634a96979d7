use tokio::sync::RwLock;

use crate::types::{Session, SessionId, SessionSnapshot, SessionState};

/// Single owner of a session's mutable state. Readers only ever get copies,
/// and every write happens under the write lock, so no reader can observe a
/// half-applied cycle.
pub struct StateOwner {
    id: SessionId,
    session: RwLock<Session>,
}

impl StateOwner {
    pub fn new(session: Session) -> Self {
        Self {
            id: session.id,
            session: RwLock::new(session),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from_session(&*self.session.read().await)
    }

    /// Full copy of the session, for persistence.
    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.session.read().await.state
    }

    /// Runs one mutation atomically with respect to snapshot reads.
    pub(crate) async fn apply<R>(&self, mutation: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.session.write().await;
        mutation(&mut session)
    }

    /// Moves a running session into `state`. Sessions that already ended keep
    /// their state and this returns false.
    pub async fn conclude(&self, state: SessionState) -> bool {
        self.apply(|session| {
            if session.state == SessionState::Running {
                session.state = state;
                true
            } else {
                false
            }
        })
        .await
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionConfig;
    use std::sync::Arc;

    fn owner() -> StateOwner {
        StateOwner::new(Session::start(
            "claim".to_string(),
            vec![0.0],
            SessionConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let owner = owner();
        let before = owner.snapshot().await;

        owner.apply(|s| s.support = 0.7).await;

        assert_eq!(before.support, 0.5);
        assert_eq!(owner.snapshot().await.support, 0.7);
    }

    #[tokio::test]
    async fn test_readers_never_see_partial_updates() {
        let owner = Arc::new(owner());

        let writer = {
            let owner = owner.clone();
            tokio::spawn(async move {
                for i in 1..=200u64 {
                    owner
                        .apply(|s| {
                            s.cycle_count = i;
                            s.support = 0.2 + (i % 7) as f64 * 0.1;
                            s.claim = format!("claim-{}", i);
                        })
                        .await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let reader = {
            let owner = owner.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let snap = owner.snapshot().await;
                    if snap.cycle_count > 0 {
                        assert_eq!(snap.claim, format!("claim-{}", snap.cycle_count));
                        let expected = 0.2 + (snap.cycle_count % 7) as f64 * 0.1;
                        assert_eq!(snap.support, expected);
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_conclude_only_from_running() {
        let owner = owner();
        assert!(owner.conclude(SessionState::Stopped).await);
        assert!(!owner.conclude(SessionState::Stopped).await);
        assert_eq!(owner.state().await, SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_conclude_keeps_first_terminal_state() {
        let owner = owner();
        assert!(owner.conclude(SessionState::Exhausted).await);
        assert!(!owner.conclude(SessionState::Stopped).await);
        assert_eq!(owner.state().await, SessionState::Exhausted);
    }
}
