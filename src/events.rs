use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Role, SessionId, SessionState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    CycleStarted {
        session_id: SessionId,
        cycle: u64,
        roles: Vec<Role>,
    },
    CycleComplete {
        session_id: SessionId,
        cycle: u64,
        support: f64,
        valid_outcomes: usize,
        invalid_outcomes: usize,
    },
    ClaimChanged {
        session_id: SessionId,
        cycle: u64,
        state: SessionState,
        final_support: f64,
    },
    CostRecorded {
        session_id: SessionId,
        role: Role,
        usd: f64,
        total: f64,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::CycleStarted { session_id, .. }
            | SessionEvent::CycleComplete { session_id, .. }
            | SessionEvent::ClaimChanged { session_id, .. }
            | SessionEvent::CostRecorded { session_id, .. } => *session_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::CycleStarted { .. } => "cycle_started",
            SessionEvent::CycleComplete { .. } => "cycle_complete",
            SessionEvent::ClaimChanged { .. } => "claim_changed",
            SessionEvent::CostRecorded { .. } => "cost_recorded",
        }
    }
}

/// Fire-and-forget publication of session events.
pub trait NotificationBus: Send + Sync {
    fn publish(&self, event: SessionEvent);
}

#[derive(Debug, Clone)]
pub struct BroadcastBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationBus for BroadcastBus {
    fn publish(&self, event: SessionEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}
