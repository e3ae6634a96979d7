use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StopReason {
    BudgetExceeded { total: f64, limit: f64 },
    External(String),
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::BudgetExceeded { total, limit } => {
                write!(f, "cost ${:.4} reached limit ${:.4}", total, limit)
            }
            StopReason::External(reason) => write!(f, "stopped: {}", reason),
        }
    }
}

/// Session-level stop request. The first reason wins; later requests are no-ops.
/// Stopping prevents new cycles but never preempts running workers.
#[derive(Debug, Clone)]
pub struct StopSignal {
    sender: Arc<watch::Sender<Option<StopReason>>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Returns `true` only for the call that actually stopped the session.
    pub fn stop(&self, reason: StopReason) -> bool {
        self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.borrow().is_some()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<StopReason>> {
        self.sender.subscribe()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_stop_wins() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());

        assert!(signal.stop(StopReason::External("operator".to_string())));
        assert!(!signal.stop(StopReason::BudgetExceeded {
            total: 2.0,
            limit: 1.0
        }));

        assert_eq!(
            signal.reason(),
            Some(StopReason::External("operator".to_string()))
        );
    }

    #[tokio::test]
    async fn test_subscribers_observe_stop() {
        let signal = StopSignal::new();
        let mut rx = signal.subscribe();
        let clone = signal.clone();

        let waiter = tokio::spawn(async move {
            let seen = rx.wait_for(|r| r.is_some()).await.ok().and_then(|r| r.clone());
            seen
        });

        clone.stop(StopReason::External("done".to_string()));
        let seen = waiter.await.unwrap();
        assert_eq!(seen, Some(StopReason::External("done".to_string())));
    }
}
