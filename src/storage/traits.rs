use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Contribution, CostEntry, Session, SessionId, TrajectoryPoint};

/// Append-only logs plus point read/write of the session row.
#[async_trait]
pub trait Persistence: Send + Sync {
    // Session row
    async fn save_session(&self, session: &Session) -> Result<()>;
    async fn load_session(&self, id: SessionId) -> Result<Option<Session>>;
    async fn list_sessions(&self) -> Result<Vec<Session>>;

    // Append-only logs
    async fn record_contribution(&self, contribution: &Contribution) -> Result<()>;
    async fn record_trajectory_point(
        &self,
        session_id: SessionId,
        point: &TrajectoryPoint,
    ) -> Result<()>;
    async fn record_cost(&self, entry: &CostEntry) -> Result<()>;

    async fn get_contributions(&self, session_id: SessionId) -> Result<Vec<Contribution>>;
    async fn get_cost_entries(&self, session_id: SessionId) -> Result<Vec<CostEntry>>;
}
