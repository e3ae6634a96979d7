use futures::future::join_all;
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;

use crate::engine::worker::{run_worker, WorkerDeps, WorkerReport};
use crate::error::WorkerError;
use crate::types::{Role, SessionSnapshot, WorkerOutcome};

/// Fans a cycle's roles out as independent tasks and collects one outcome per
/// role. A worker that fails, panics or runs past the deadline becomes an
/// invalid outcome; it never takes the cycle down with it.
pub struct TaskOrchestrator {
    deps: WorkerDeps,
    timeout: Duration,
}

impl TaskOrchestrator {
    pub fn new(deps: WorkerDeps, timeout: Duration) -> Self {
        Self { deps, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run_cycle(
        &self,
        roles: &BTreeSet<Role>,
        snapshot: Arc<SessionSnapshot>,
        cycle: u64,
    ) -> Vec<WorkerReport> {
        let handles: Vec<(Role, _)> = roles
            .iter()
            .map(|&role| {
                let snapshot = snapshot.clone();
                let deps = self.deps.clone();
                let timeout = self.timeout;
                // The deadline lives inside the task so an expired worker's
                // future is dropped rather than left running detached.
                let handle = tokio::spawn(async move {
                    tokio::time::timeout(timeout, run_worker(role, snapshot, cycle, deps)).await
                });
                (role, handle)
            })
            .collect();

        let (order, futures): (Vec<Role>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(futures).await;

        order
            .into_iter()
            .zip(joined)
            .map(|(role, joined)| {
                let err = match joined {
                    Ok(Ok(Ok(report))) => return report,
                    Ok(Ok(Err(err))) => err,
                    Ok(Err(_elapsed)) => WorkerError::Timeout {
                        role,
                        after: self.timeout,
                    },
                    Err(join_err) => WorkerError::Crashed {
                        role,
                        reason: join_failure(join_err),
                    },
                };
                log::warn!("Cycle {}: {}", cycle, err);
                WorkerReport {
                    outcome: WorkerOutcome::invalid(role, err.to_string()),
                    response_text: None,
                }
            })
            .inspect(|report| {
                let o = &report.outcome;
                if o.valid {
                    log::info!("Cycle {}: {} delta {:+.3}", cycle, o.role, o.delta);
                }
            })
            .collect()
    }
}

fn join_failure(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        "task cancelled".to_string()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
