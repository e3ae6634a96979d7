use std::sync::Arc;

use crate::engine::cost::CostGovernor;
use crate::error::WorkerError;
use crate::providers::{GenerationRequest, GenerationService, Message};
use crate::types::{CostEntry, Role, SessionSnapshot, WorkerOutcome};
use crate::validation::{Judgment, ValidationOutcome, ValidatorRegistry};

const HISTORY_POINTS: usize = 5;
const CEMETERY_ENTRIES: usize = 5;

/// Delta bounds for a role: the most it may add and the most it may take away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaBounds {
    pub max_boost: f64,
    pub max_penalty: f64,
}

impl Role {
    pub fn delta_bounds(&self) -> DeltaBounds {
        let (max_boost, max_penalty) = match self {
            Role::Critic => (0.02, 0.15),
            Role::Advocate => (0.10, 0.02),
            Role::Empiricist => (0.08, 0.10),
            Role::Logician => (0.08, 0.10),
            Role::Skeptic => (0.03, 0.12),
            Role::Analogist => (0.06, 0.06),
            Role::Architect => (0.06, 0.08),
            Role::Decomposer => (0.05, 0.08),
            Role::Historian => (0.05, 0.08),
            Role::NoveltyScout => (0.05, 0.05),
            Role::Gravedigger => (0.02, 0.12),
            Role::Navigator => (0.04, 0.04),
            Role::FrontierPivot => (0.06, 0.06),
        };
        DeltaBounds {
            max_boost,
            max_penalty,
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            Role::Critic => "Find the strongest objection to the claim.",
            Role::Advocate => "Make the strongest case for the claim as stated.",
            Role::Empiricist => "Judge whether the claim is backed by observable evidence.",
            Role::Logician => "Check the claim for internal consistency and valid inference.",
            Role::Skeptic => "Identify hidden assumptions the claim depends on.",
            Role::Analogist => "Test the claim against analogous cases from other domains.",
            Role::Architect => "Assess whether the claim is well structured and scoped.",
            Role::Decomposer => "Split the claim into sub-claims and weigh the weakest one.",
            Role::Historian => "Review how support for this claim has moved over recent cycles.",
            Role::NoveltyScout => "Judge whether recent refinements added anything new.",
            Role::Gravedigger => "Compare the claim with previously killed claims and their causes.",
            Role::Navigator => "The session is stagnating. Judge whether the claim should change direction.",
            Role::FrontierPivot => "Weigh the claim against the sponsored frontier idea below.",
        }
    }

    /// Builds the generation request for this role from an immutable snapshot.
    pub fn build_request(&self, snapshot: &SessionSnapshot, cycle: u64) -> GenerationRequest {
        let mut context_parts = vec![
            format!("Cycle: {}", cycle),
            format!("Claim: {}", snapshot.claim),
            format!("Current support: {:.3}", snapshot.support),
        ];

        if self.consults_history() || *self == Role::Navigator {
            let recent = snapshot.recent_trajectory(HISTORY_POINTS);
            if !recent.is_empty() {
                context_parts.push("Recent trajectory:".to_string());
                for point in recent {
                    context_parts.push(format!(
                        "- cycle {}: support {:.3} ({})",
                        point.cycle_number, point.support, point.claim_text
                    ));
                }
            }
        }

        if *self == Role::Gravedigger {
            let start = snapshot.cemetery.len().saturating_sub(CEMETERY_ENTRIES);
            context_parts.push("Cemetery:".to_string());
            for entry in &snapshot.cemetery[start..] {
                context_parts.push(format!(
                    "- \"{}\" died at cycle {} ({})",
                    entry.claim, entry.cycle_killed, entry.cause_of_death
                ));
            }
        }

        if *self == Role::FrontierPivot {
            if let Some(idea) = &snapshot.pivot_idea {
                context_parts.push(format!(
                    "Frontier idea ({} sponsors): {}",
                    idea.sponsor_count, idea.idea_text
                ));
            }
        }

        GenerationRequest {
            role: *self,
            messages: vec![
                Message::system(format!(
                    "You are the {} in a structured debate. {} Respond with SUPPORT, CHALLENGE, or UNCERTAIN, then your reasoning, then 'confidence: <0..1>'.",
                    self.as_str(),
                    self.instructions()
                )),
                Message::user(context_parts.join("\n")),
            ],
            max_tokens: 1024,
        }
    }

    /// Runs the response through this role's validator.
    pub fn parse_response(&self, validators: &ValidatorRegistry, response: &str) -> ValidationOutcome {
        validators.validator_for(*self).validate(*self, response)
    }

    /// Signed delta for a judgment, scaled by confidence into this role's bounds.
    pub fn confidence_delta(&self, judgment: &Judgment) -> f64 {
        let bounds = self.delta_bounds();
        match judgment {
            Judgment::Support { confidence } => bounds.max_boost * confidence.clamp(0.0, 1.0),
            Judgment::Challenge { confidence, .. } => {
                -bounds.max_penalty * confidence.clamp(0.0, 1.0)
            }
            Judgment::Uncertain { .. } => 0.0,
        }
    }
}

/// Shared, read-only collaborators every worker needs.
#[derive(Clone)]
pub struct WorkerDeps {
    pub service: Arc<dyn GenerationService>,
    pub validators: ValidatorRegistry,
    pub cost: Arc<CostGovernor>,
}

#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub outcome: WorkerOutcome,
    pub response_text: Option<String>,
}

/// One worker's pipeline: request, generation, cost report, validation, delta.
pub async fn run_worker(
    role: Role,
    snapshot: Arc<SessionSnapshot>,
    cycle: u64,
    deps: WorkerDeps,
) -> Result<WorkerReport, WorkerError> {
    let request = role.build_request(&snapshot, cycle);

    let generation = deps
        .service
        .generate(&request)
        .await
        .map_err(|e| WorkerError::Generation {
            role,
            reason: e.to_string(),
        })?;

    deps.cost
        .record(CostEntry::new(
            snapshot.session_id,
            role,
            cycle,
            generation.usage,
            generation.cost_usd,
        ))
        .await;

    let validation = role.parse_response(&deps.validators, &generation.text);
    let outcome = if validation.valid && !validation.delta.is_finite() {
        let err = WorkerError::Validation {
            role,
            reason: format!("non-finite delta {}", validation.delta),
        };
        log::warn!("{}", err);
        WorkerOutcome::invalid(role, err.to_string())
    } else if validation.valid {
        WorkerOutcome::valid(role, validation.delta)
    } else {
        let reason = validation
            .error
            .unwrap_or_else(|| "response rejected".to_string());
        let err = WorkerError::Validation { role, reason };
        log::warn!("{}", err);
        WorkerOutcome::invalid(role, err.to_string())
    };

    Ok(WorkerReport {
        outcome,
        response_text: Some(generation.text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CemeteryEntry, FrontierIdea, Session, SessionConfig, TrajectoryPoint};

    fn snapshot() -> SessionSnapshot {
        let session = Session::start(
            "Heat flows from cold to hot".to_string(),
            vec![0.0; 4],
            SessionConfig::default(),
        );
        SessionSnapshot::from_session(&session)
    }

    #[test]
    fn test_confidence_delta_respects_bounds() {
        for role in Role::all() {
            let bounds = role.delta_bounds();
            let up = role.confidence_delta(&Judgment::Support { confidence: 1.0 });
            let down = role.confidence_delta(&Judgment::Challenge {
                reason: String::new(),
                confidence: 1.0,
            });
            assert!((up - bounds.max_boost).abs() < 1e-12);
            assert!((down + bounds.max_penalty).abs() < 1e-12);
            assert_eq!(
                role.confidence_delta(&Judgment::Uncertain {
                    reason: String::new()
                }),
                0.0
            );
        }
    }

    #[test]
    fn test_build_request_carries_claim() {
        let snap = snapshot();
        let request = Role::Critic.build_request(&snap, 3);
        assert_eq!(request.role, Role::Critic);
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[1].content.contains("Heat flows"));
        assert!(request.messages[1].content.contains("Cycle: 3"));
    }

    #[test]
    fn test_history_roles_see_trajectory() {
        let mut snap = snapshot();
        snap.trajectory.push(TrajectoryPoint {
            cycle_number: 4,
            claim_text: "earlier".to_string(),
            support: 0.61,
            embedding: vec![],
        });

        let historian = Role::Historian.build_request(&snap, 5);
        assert!(historian.messages[1].content.contains("support 0.610"));

        let critic = Role::Critic.build_request(&snap, 5);
        assert!(!critic.messages[1].content.contains("Recent trajectory"));
    }

    #[test]
    fn test_gravedigger_and_pivot_context() {
        let mut snap = snapshot();
        snap.cemetery.push(CemeteryEntry {
            claim: "perpetual motion".to_string(),
            cycle_killed: 2,
            cause_of_death: "logician: contradiction".to_string(),
            final_support: 0.2,
        });
        let mut idea = FrontierIdea::new("consider open systems".to_string());
        idea.sponsor_count = 3;
        snap = snap.with_pivot(Some(idea));

        let grave = Role::Gravedigger.build_request(&snap, 7);
        assert!(grave.messages[1].content.contains("perpetual motion"));

        let pivot = Role::FrontierPivot.build_request(&snap, 7);
        assert!(pivot.messages[1].content.contains("consider open systems"));
    }
}
