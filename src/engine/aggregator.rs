use serde::{Deserialize, Serialize};

use crate::engine::state::StateOwner;
use crate::types::{
    CemeteryEntry, GraduatedEntry, Session, SessionConfig, SessionState, TrajectoryPoint,
    WorkerOutcome,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transition {
    Continued(TrajectoryPoint),
    Killed(CemeteryEntry),
    Graduated(GraduatedEntry),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub cycle: u64,
    pub previous_support: f64,
    pub unclamped_support: f64,
    pub new_support: f64,
    pub transition: Transition,
}

impl Resolution {
    pub fn is_terminal(&self) -> bool {
        !matches!(self.transition, Transition::Continued(_))
    }
}

/// `current + sum(valid deltas) - decay`, before clamping.
pub fn raw_support(current: f64, outcomes: &[WorkerOutcome], decay: f64) -> f64 {
    let delta: f64 = outcomes.iter().map(WorkerOutcome::effective_delta).sum();
    current + delta - decay
}

pub fn next_support(config: &SessionConfig, current: f64, outcomes: &[WorkerOutcome]) -> f64 {
    config.clamp_support(raw_support(current, outcomes, config.decay_per_cycle))
}

/// Names the role with the most negative valid delta, or decay if none pulled down.
pub fn cause_of_death(outcomes: &[WorkerOutcome]) -> String {
    outcomes
        .iter()
        .filter(|o| o.counts() && o.delta < 0.0)
        .min_by(|a, b| a.delta.total_cmp(&b.delta))
        .map(|o| match &o.error {
            Some(err) => format!("{} ({:+.3}): {}", o.role, o.delta, err),
            None => format!("{} ({:+.3})", o.role, o.delta),
        })
        .unwrap_or_else(|| "support decay".to_string())
}

/// Folds one cycle's outcomes into the session. Sole writer of support,
/// cycle count, cemetery and graduated list.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceAggregator;

impl ConfidenceAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn fold(&self, session: &mut Session, cycle: u64, outcomes: &[WorkerOutcome]) -> Resolution {
        let config = &session.config;
        let previous_support = session.support;
        let unclamped_support = raw_support(previous_support, outcomes, config.decay_per_cycle);
        let new_support = config.clamp_support(unclamped_support);

        let transition = if new_support <= config.death_threshold {
            let entry = CemeteryEntry {
                claim: session.claim.clone(),
                cycle_killed: cycle,
                cause_of_death: cause_of_death(outcomes),
                final_support: new_support,
            };
            session.cemetery.push(entry.clone());
            session.state = SessionState::Killed;
            Transition::Killed(entry)
        } else if new_support >= config.graduation_threshold {
            let entry = GraduatedEntry {
                claim: session.claim.clone(),
                cycle_graduated: cycle,
                final_support: new_support,
            };
            session.graduated.push(entry.clone());
            session.state = SessionState::Graduated;
            Transition::Graduated(entry)
        } else {
            session.cycle_count += 1;
            let point = TrajectoryPoint {
                cycle_number: cycle,
                claim_text: session.claim.clone(),
                support: new_support,
                embedding: session.embedding.clone(),
            };
            session.trajectory.push(point.clone());
            Transition::Continued(point)
        };

        session.support = new_support;

        Resolution {
            cycle,
            previous_support,
            unclamped_support,
            new_support,
            transition,
        }
    }

    /// Applies the cycle through the state owner as one atomic step.
    pub async fn aggregate(
        &self,
        state: &StateOwner,
        cycle: u64,
        outcomes: &[WorkerOutcome],
    ) -> Resolution {
        let resolution = state
            .apply(|session| self.fold(session, cycle, outcomes))
            .await;

        match &resolution.transition {
            Transition::Killed(entry) => log::info!(
                "Cycle {}: claim killed at support {:.3} ({})",
                cycle,
                entry.final_support,
                entry.cause_of_death
            ),
            Transition::Graduated(entry) => log::info!(
                "Cycle {}: claim graduated at support {:.3}",
                cycle,
                entry.final_support
            ),
            Transition::Continued(_) => log::debug!(
                "Cycle {}: support {:.3} -> {:.3}",
                cycle,
                resolution.previous_support,
                resolution.new_support
            ),
        }

        resolution
    }
}
