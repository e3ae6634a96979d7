use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::storage::traits::Persistence;
use crate::types::{Contribution, CostEntry, Session, SessionId, TrajectoryPoint};

#[derive(Clone, Default)]
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    contributions: Arc<RwLock<HashMap<SessionId, Vec<Contribution>>>>,
    trajectories: Arc<RwLock<HashMap<SessionId, Vec<TrajectoryPoint>>>>,
    costs: Arc<RwLock<HashMap<SessionId, Vec<CostEntry>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_trajectory(&self, session_id: SessionId) -> Vec<TrajectoryPoint> {
        self.trajectories
            .read()
            .await
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Persistence for InMemoryStore {
    async fn save_session(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn load_session(&self, id: SessionId) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<Session> = sessions.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn record_contribution(&self, contribution: &Contribution) -> Result<()> {
        let mut contributions = self.contributions.write().await;
        contributions
            .entry(contribution.session_id)
            .or_default()
            .push(contribution.clone());
        Ok(())
    }

    async fn record_trajectory_point(
        &self,
        session_id: SessionId,
        point: &TrajectoryPoint,
    ) -> Result<()> {
        let mut trajectories = self.trajectories.write().await;
        trajectories
            .entry(session_id)
            .or_default()
            .push(point.clone());
        Ok(())
    }

    async fn record_cost(&self, entry: &CostEntry) -> Result<()> {
        let mut costs = self.costs.write().await;
        costs.entry(entry.session_id).or_default().push(entry.clone());
        Ok(())
    }

    async fn get_contributions(&self, session_id: SessionId) -> Result<Vec<Contribution>> {
        let contributions = self.contributions.read().await;
        Ok(contributions.get(&session_id).cloned().unwrap_or_default())
    }

    async fn get_cost_entries(&self, session_id: SessionId) -> Result<Vec<CostEntry>> {
        let costs = self.costs.read().await;
        Ok(costs.get(&session_id).cloned().unwrap_or_default())
    }
}
