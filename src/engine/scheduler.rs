use std::collections::BTreeSet;
use std::sync::Arc;

use crate::engine::random::RandomSource;
use crate::engine::stagnation::{StagnationDetector, StagnationReport};
use crate::types::{Role, RoleGroup, SessionConfig, SessionSnapshot, MIN_SPONSORS};

const ANALYTICAL_PERIOD: u64 = 3;
const STRUCTURAL_PERIOD: u64 = 5;
const HISTORY_MIN_CYCLE: u64 = 5;
const NAVIGATION_MIN_CYCLE: u64 = 5;
const CEMETERY_SUPPORT_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, PartialEq)]
pub struct CyclePlan {
    pub cycle: u64,
    pub roles: BTreeSet<Role>,
    pub stagnation: StagnationReport,
}

impl CyclePlan {
    pub fn includes(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

/// Decides which roles run in a cycle from the cycle number and a snapshot.
pub struct CycleScheduler {
    detector: StagnationDetector,
    pivot_probability: f64,
    min_sponsors: u32,
    rng: Arc<dyn RandomSource>,
}

impl CycleScheduler {
    pub fn new(config: &SessionConfig, rng: Arc<dyn RandomSource>) -> Self {
        Self {
            detector: StagnationDetector::new(config.stagnation_window, config.movement_threshold),
            pivot_probability: config.frontier_pivot_probability,
            min_sponsors: config.frontier_min_sponsors.max(MIN_SPONSORS),
            rng,
        }
    }

    pub fn plan(&self, cycle: u64, snapshot: &SessionSnapshot) -> CyclePlan {
        let stagnation = self.detector.assess(&snapshot.trajectory);
        let stagnant = stagnation.is_stagnant();

        // Drawn every cycle so the random stream does not depend on pool contents.
        let pivot_drawn = self.rng.next_unit() < self.pivot_probability;
        let frontier_ready = snapshot
            .frontier
            .iter()
            .any(|idea| idea.is_eligible(self.min_sponsors));

        let roles = Role::all()
            .into_iter()
            .filter(|role| match role.group() {
                RoleGroup::Core => true,
                RoleGroup::Analytical => cycle % ANALYTICAL_PERIOD == 0,
                RoleGroup::Structural => {
                    cycle % STRUCTURAL_PERIOD == 0
                        && (!role.consults_history() || cycle >= HISTORY_MIN_CYCLE)
                }
                RoleGroup::CemeteryPattern => snapshot.support < CEMETERY_SUPPORT_THRESHOLD,
                RoleGroup::Navigation => cycle >= NAVIGATION_MIN_CYCLE && stagnant,
                RoleGroup::Frontier => pivot_drawn && frontier_ready,
            })
            .collect();

        CyclePlan {
            cycle,
            roles,
            stagnation,
        }
    }
}
