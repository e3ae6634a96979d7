use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FrontierIdea, SessionId, SessionState, MIN_SPONSORS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub claim: String,
    pub support: f64,
    pub cycle_count: u64,
    pub cemetery: Vec<CemeteryEntry>,
    pub graduated: Vec<GraduatedEntry>,
    pub trajectory: Vec<TrajectoryPoint>,
    pub embedding: Vec<f32>,
    pub state: SessionState,
    pub config: SessionConfig,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CemeteryEntry {
    pub claim: String,
    pub cycle_killed: u64,
    pub cause_of_death: String,
    pub final_support: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraduatedEntry {
    pub claim: String,
    pub cycle_graduated: u64,
    pub final_support: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub cycle_number: u64,
    pub claim_text: String,
    pub support: f64,
    pub embedding: Vec<f32>,
}

/// Numeric policy for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub birth_support: f64,
    pub death_threshold: f64,
    pub graduation_threshold: f64,
    pub decay_per_cycle: f64,
    pub support_floor: f64,
    pub support_ceiling: f64,
    pub stagnation_window: usize,
    pub movement_threshold: f64,
    pub frontier_pivot_probability: f64,
    pub frontier_min_sponsors: u32,
    pub frontier_max_age: u32,
    pub worker_timeout_secs: u64,
    pub max_cycles: u64,
    pub cost_limit: Option<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            birth_support: 0.5,
            death_threshold: 0.2,
            graduation_threshold: 0.85,
            decay_per_cycle: 0.02,
            support_floor: 0.2,
            support_ceiling: 0.9,
            stagnation_window: 5,
            movement_threshold: 0.1,
            frontier_pivot_probability: 0.2,
            frontier_min_sponsors: MIN_SPONSORS,
            frontier_max_age: 20,
            worker_timeout_secs: 60,
            max_cycles: 100,
            cost_limit: None,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.support_floor > self.support_ceiling {
            bail!(
                "support floor {} is above ceiling {}",
                self.support_floor,
                self.support_ceiling
            );
        }
        if self.death_threshold < self.support_floor {
            bail!(
                "death threshold {} is below the support floor {}; claims could never die",
                self.death_threshold,
                self.support_floor
            );
        }
        if self.graduation_threshold > self.support_ceiling {
            bail!(
                "graduation threshold {} is above the support ceiling {}; claims could never graduate",
                self.graduation_threshold,
                self.support_ceiling
            );
        }
        if !(self.support_floor..=self.support_ceiling).contains(&self.birth_support) {
            bail!("birth support {} is outside [floor, ceiling]", self.birth_support);
        }
        if !(0.0..=1.0).contains(&self.frontier_pivot_probability) {
            bail!(
                "frontier pivot probability {} must be within [0, 1]",
                self.frontier_pivot_probability
            );
        }
        if self.frontier_min_sponsors < MIN_SPONSORS {
            bail!(
                "frontier min sponsors {} must be at least {}",
                self.frontier_min_sponsors,
                MIN_SPONSORS
            );
        }
        if self.stagnation_window < 2 {
            bail!("stagnation window must cover at least two trajectory points");
        }
        if let Some(limit) = self.cost_limit {
            if limit < 0.0 {
                bail!("cost limit must not be negative");
            }
        }
        Ok(())
    }

    pub fn clamp_support(&self, value: f64) -> f64 {
        value.clamp(self.support_floor, self.support_ceiling)
    }
}

impl Session {
    pub fn start(claim: String, embedding: Vec<f32>, config: SessionConfig) -> Self {
        Self {
            id: SessionId::new_v4(),
            claim,
            support: config.birth_support,
            cycle_count: 0,
            cemetery: Vec::new(),
            graduated: Vec::new(),
            trajectory: Vec::new(),
            embedding,
            state: SessionState::Running,
            config,
            created_at: Utc::now(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }
}

/// Point-in-time, read-only view of a session handed to the scheduler and workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub claim: String,
    pub support: f64,
    pub cycle_count: u64,
    pub state: SessionState,
    pub cemetery: Vec<CemeteryEntry>,
    pub graduated: Vec<GraduatedEntry>,
    pub trajectory: Vec<TrajectoryPoint>,
    pub embedding: Vec<f32>,
    pub frontier: Vec<FrontierIdea>,
    pub pivot_idea: Option<FrontierIdea>,
    pub cost_total: f64,
    pub cost_limit: Option<f64>,
}

impl SessionSnapshot {
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id,
            claim: session.claim.clone(),
            support: session.support,
            cycle_count: session.cycle_count,
            state: session.state,
            cemetery: session.cemetery.clone(),
            graduated: session.graduated.clone(),
            trajectory: session.trajectory.clone(),
            embedding: session.embedding.clone(),
            frontier: Vec::new(),
            pivot_idea: None,
            cost_total: 0.0,
            cost_limit: session.config.cost_limit,
        }
    }

    pub fn with_frontier(mut self, frontier: Vec<FrontierIdea>) -> Self {
        self.frontier = frontier;
        self
    }

    pub fn with_pivot(mut self, idea: Option<FrontierIdea>) -> Self {
        self.pivot_idea = idea;
        self
    }

    pub fn with_cost_total(mut self, total: f64) -> Self {
        self.cost_total = total;
        self
    }

    pub fn recent_trajectory(&self, count: usize) -> &[TrajectoryPoint] {
        let start = self.trajectory.len().saturating_sub(count);
        &self.trajectory[start..]
    }
}
