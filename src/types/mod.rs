pub mod frontier;
pub mod outcome;
pub mod role;
pub mod session;

pub use frontier::{FrontierIdea, MIN_SPONSORS};
pub use outcome::{Contribution, CostEntry, TokenUsage, WorkerOutcome};
pub use role::{Role, RoleGroup};
pub use session::{
    CemeteryEntry, GraduatedEntry, Session, SessionConfig, SessionSnapshot, TrajectoryPoint,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type SessionId = Uuid;
pub type IdeaId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Running,  // Cycles are being scheduled
    Killed,   // Claim archived into the cemetery
    Graduated, // Claim archived into the graduated list
    Stopped,  // External or budget stop
    Exhausted, // Cycle limit reached
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Running => "Running",
            SessionState::Killed => "Killed",
            SessionState::Graduated => "Graduated",
            SessionState::Stopped => "Stopped",
            SessionState::Exhausted => "Exhausted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Killed" => SessionState::Killed,
            "Graduated" => SessionState::Graduated,
            "Stopped" => SessionState::Stopped,
            "Exhausted" => SessionState::Exhausted,
            _ => SessionState::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Running)
    }
}
