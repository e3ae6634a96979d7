use std::sync::Arc;
use tokio::sync::Mutex;

use crate::engine::control::{StopReason, StopSignal};
use crate::error::PersistenceError;
use crate::events::{NotificationBus, SessionEvent};
use crate::storage::Persistence;
use crate::types::{CostEntry, SessionId};

// Ledger unit. Entries below a micro-dollar still accumulate.
const NANOS_PER_USD: f64 = 1_000_000_000.0;

fn to_nanos(usd: f64) -> i64 {
    (usd * NANOS_PER_USD).round() as i64
}

fn from_nanos(nanos: i64) -> f64 {
    nanos as f64 / NANOS_PER_USD
}

#[derive(Debug, Default)]
struct CostLedger {
    entries: Vec<CostEntry>,
    total_nanos: i64,
    stop_issued: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostVerdict {
    pub total: f64,
    /// True only for the entry whose arrival crossed the ceiling.
    pub breached: bool,
}

/// Running cost ledger for one session. The append, total and ceiling check
/// happen under one lock so concurrent reports can neither double-fire the
/// stop signal nor both slip under the ceiling.
pub struct CostGovernor {
    session_id: SessionId,
    limit_nanos: Option<i64>,
    ledger: Mutex<CostLedger>,
    stop: StopSignal,
    persistence: Arc<dyn Persistence>,
    bus: Arc<dyn NotificationBus>,
}

impl CostGovernor {
    pub fn new(
        session_id: SessionId,
        limit: Option<f64>,
        stop: StopSignal,
        persistence: Arc<dyn Persistence>,
        bus: Arc<dyn NotificationBus>,
    ) -> Self {
        Self {
            session_id,
            limit_nanos: limit.map(to_nanos),
            ledger: Mutex::new(CostLedger::default()),
            stop,
            persistence,
            bus,
        }
    }

    pub fn limit(&self) -> Option<f64> {
        self.limit_nanos.map(from_nanos)
    }

    pub async fn record(&self, entry: CostEntry) -> CostVerdict {
        let verdict = {
            let mut ledger = self.ledger.lock().await;
            ledger.total_nanos += to_nanos(entry.usd);
            ledger.entries.push(entry.clone());

            let over = self
                .limit_nanos
                .map(|limit| ledger.total_nanos >= limit)
                .unwrap_or(false);

            let breached = over && !ledger.stop_issued;
            if breached {
                ledger.stop_issued = true;
            }

            CostVerdict {
                total: from_nanos(ledger.total_nanos),
                breached,
            }
        };

        if verdict.breached {
            let limit = self.limit().unwrap_or_default();
            log::warn!(
                "Session {} cost ${:.4} reached limit ${:.4}; stopping",
                self.session_id,
                verdict.total,
                limit
            );
            self.stop.stop(StopReason::BudgetExceeded {
                total: verdict.total,
                limit,
            });
        }

        if let Err(e) = self.persistence.record_cost(&entry).await {
            log::error!("{}", PersistenceError::new("cost entry", e));
        }

        self.bus.publish(SessionEvent::CostRecorded {
            session_id: self.session_id,
            role: entry.role,
            usd: entry.usd,
            total: verdict.total,
        });

        verdict
    }

    pub async fn total(&self) -> f64 {
        from_nanos(self.ledger.lock().await.total_nanos)
    }

    pub async fn entries(&self) -> Vec<CostEntry> {
        self.ledger.lock().await.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastBus;
    use crate::storage::InMemoryStore;
    use crate::types::{Role, TokenUsage};

    fn governor(limit: Option<f64>, stop: StopSignal) -> (Arc<CostGovernor>, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let governor = CostGovernor::new(
            SessionId::nil(),
            limit,
            stop,
            store.clone(),
            Arc::new(BroadcastBus::default()),
        );
        (Arc::new(governor), store)
    }

    fn entry(usd: f64) -> CostEntry {
        CostEntry::new(SessionId::nil(), Role::Critic, 1, TokenUsage::default(), usd)
    }

    #[tokio::test]
    async fn test_total_accumulates() {
        let (gov, store) = governor(None, StopSignal::new());
        gov.record(entry(0.1)).await;
        gov.record(entry(0.2)).await;

        assert!((gov.total().await - 0.3).abs() < 1e-9);
        assert_eq!(gov.entries().await.len(), 2);
        assert_eq!(store.get_cost_entries(SessionId::nil()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_breach_fires_once() {
        let stop = StopSignal::new();
        let (gov, _) = governor(Some(0.5), stop.clone());

        assert!(!gov.record(entry(0.4)).await.breached);
        assert!(gov.record(entry(0.2)).await.breached);
        assert!(!gov.record(entry(0.3)).await.breached);

        assert!(matches!(
            stop.reason(),
            Some(StopReason::BudgetExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_tenths_sum_exactly_to_ceiling() {
        let stop = StopSignal::new();
        let (gov, _) = governor(Some(1.0), stop.clone());
        for _ in 0..10 {
            gov.record(entry(0.1)).await;
        }
        assert!(stop.is_stopped());
    }

    #[tokio::test]
    async fn test_just_under_ceiling_never_fires() {
        let stop = StopSignal::new();
        let (gov, _) = governor(Some(1.0), stop.clone());
        for _ in 0..9 {
            gov.record(entry(0.11)).await;
        }
        assert!((gov.total().await - 0.99).abs() < 1e-9);
        assert!(!stop.is_stopped());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reports_breach_exactly_once() {
        let stop = StopSignal::new();
        let (gov, _) = governor(Some(1.0), stop.clone());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let gov = gov.clone();
                tokio::spawn(async move { gov.record(entry(0.1)).await })
            })
            .collect();
        let verdicts = futures::future::join_all(handles).await;

        let breaches = verdicts
            .into_iter()
            .filter(|v| v.as_ref().unwrap().breached)
            .count();
        assert_eq!(breaches, 1);
        assert!(stop.is_stopped());
    }

    #[tokio::test]
    async fn test_sub_micro_entries_reach_the_ceiling() {
        let stop = StopSignal::new();
        let (gov, _) = governor(Some(0.0004), stop.clone());
        for _ in 0..999 {
            gov.record(entry(0.0000004)).await;
        }
        assert!(!stop.is_stopped());
        assert!(gov.total().await > 0.0);

        assert!(gov.record(entry(0.0000004)).await.breached);
        assert!((gov.total().await - 0.0004).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_no_limit_never_stops() {
        let stop = StopSignal::new();
        let (gov, _) = governor(None, stop.clone());
        gov.record(entry(1000.0)).await;
        assert!(!stop.is_stopped());
    }
}
