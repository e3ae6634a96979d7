use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::engine::aggregator::{ConfidenceAggregator, Resolution, Transition};
use crate::engine::control::{StopReason, StopSignal};
use crate::engine::cost::CostGovernor;
use crate::engine::frontier::FrontierPool;
use crate::engine::orchestrator::TaskOrchestrator;
use crate::engine::random::RandomSource;
use crate::engine::scheduler::CycleScheduler;
use crate::engine::state::StateOwner;
use crate::engine::worker::{WorkerDeps, WorkerReport};
use crate::error::PersistenceError;
use crate::events::{NotificationBus, SessionEvent};
use crate::providers::{EmbeddingProvider, GenerationService};
use crate::storage::Persistence;
use crate::types::{
    CemeteryEntry, Contribution, FrontierIdea, GraduatedEntry, Role, Session, SessionConfig,
    SessionId, SessionSnapshot, SessionState, WorkerOutcome,
};
use crate::validation::ValidatorRegistry;

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Killed(CemeteryEntry),
    Graduated(GraduatedEntry),
    Stopped { reason: StopReason },
    Exhausted { cycles: u64 },
}

impl std::fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionOutcome::Killed(entry) => write!(
                f,
                "killed at cycle {} with support {:.3} ({})",
                entry.cycle_killed, entry.final_support, entry.cause_of_death
            ),
            SessionOutcome::Graduated(entry) => write!(
                f,
                "graduated at cycle {} with support {:.3}",
                entry.cycle_graduated, entry.final_support
            ),
            SessionOutcome::Stopped { reason } => write!(f, "{}", reason),
            SessionOutcome::Exhausted { cycles } => {
                write!(f, "cycle limit reached after {} cycles", cycles)
            }
        }
    }
}

/// Collaborators shared by every session a process runs.
#[derive(Clone)]
pub struct SessionServices {
    pub generation: Arc<dyn GenerationService>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub persistence: Arc<dyn Persistence>,
    pub bus: Arc<dyn NotificationBus>,
    pub validators: ValidatorRegistry,
}

/// Cheap, cloneable view onto a running session for callers outside the driver.
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<StateOwner>,
    frontier: Arc<FrontierPool>,
    cost: Arc<CostGovernor>,
    stop: StopSignal,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.state.id()
    }

    /// Snapshot including the frontier pool and running cost.
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state
            .snapshot()
            .await
            .with_frontier(self.frontier.all().await)
            .with_cost_total(self.cost.total().await)
    }

    /// Requests a stop. Takes effect before the next cycle is scheduled.
    pub fn stop(&self, reason: impl Into<String>) -> bool {
        self.stop.stop(StopReason::External(reason.into()))
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub async fn propose_idea(&self, idea_text: &str) -> FrontierIdea {
        self.frontier.propose(idea_text).await
    }

    pub async fn state(&self) -> SessionState {
        self.state.state().await
    }
}

/// Runs one session's cycles sequentially until it dies, graduates, is
/// stopped or hits the cycle limit.
pub struct CycleDriver {
    handle: SessionHandle,
    scheduler: CycleScheduler,
    orchestrator: TaskOrchestrator,
    aggregator: ConfidenceAggregator,
    persistence: Arc<dyn Persistence>,
    bus: Arc<dyn NotificationBus>,
    max_cycles: u64,
    frontier_max_age: u32,
    finished: OnceLock<SessionOutcome>,
}

impl CycleDriver {
    /// Embeds the claim, creates the session at birth support and persists it.
    pub async fn start(
        claim: &str,
        config: SessionConfig,
        services: &SessionServices,
        rng: Arc<dyn RandomSource>,
    ) -> Result<Self> {
        config.validate()?;
        let claim = claim.trim();
        if claim.is_empty() {
            anyhow::bail!("claim must not be empty");
        }

        let embedding = services
            .embeddings
            .embed(claim)
            .await
            .context("Failed to embed claim")?;
        let session = Session::start(claim.to_string(), embedding, config.clone());
        log::info!(
            "Session {} started for \"{}\" at support {:.3}",
            session.id,
            session.claim,
            session.support
        );

        if let Err(e) = services.persistence.save_session(&session).await {
            log::error!("{}", PersistenceError::new("session", e));
        }

        let stop = StopSignal::new();
        let cost = Arc::new(CostGovernor::new(
            session.id,
            config.cost_limit,
            stop.clone(),
            services.persistence.clone(),
            services.bus.clone(),
        ));
        let deps = WorkerDeps {
            service: services.generation.clone(),
            validators: services.validators.clone(),
            cost: cost.clone(),
        };

        let handle = SessionHandle {
            state: Arc::new(StateOwner::new(session)),
            frontier: Arc::new(FrontierPool::new(config.frontier_min_sponsors, rng.clone())),
            cost,
            stop,
        };

        Ok(Self {
            handle,
            scheduler: CycleScheduler::new(&config, rng),
            orchestrator: TaskOrchestrator::new(
                deps,
                Duration::from_secs(config.worker_timeout_secs),
            ),
            aggregator: ConfidenceAggregator::new(),
            persistence: services.persistence.clone(),
            bus: services.bus.clone(),
            max_cycles: config.max_cycles,
            frontier_max_age: config.frontier_max_age,
            finished: OnceLock::new(),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub async fn run(self) -> SessionOutcome {
        loop {
            if let Some(outcome) = self.step().await {
                log::info!("Session {} finished: {}", self.handle.id(), outcome);
                return outcome;
            }
        }
    }

    /// Runs at most one cycle. Returns the outcome once the session is over;
    /// after that every call returns the same outcome without running anything.
    pub async fn step(&self) -> Option<SessionOutcome> {
        if let Some(outcome) = self.finished.get() {
            log::debug!(
                "Session {} already finished ({}); not scheduling",
                self.handle.id(),
                outcome
            );
            return Some(outcome.clone());
        }

        let outcome = self.advance().await?;
        Some(self.finished.get_or_init(|| outcome).clone())
    }

    async fn advance(&self) -> Option<SessionOutcome> {
        if let Some(reason) = self.handle.stop.reason() {
            self.archive(SessionState::Stopped).await;
            return Some(SessionOutcome::Stopped { reason });
        }

        let base = self.handle.snapshot().await;
        if base.cycle_count >= self.max_cycles {
            self.archive(SessionState::Exhausted).await;
            return Some(SessionOutcome::Exhausted {
                cycles: base.cycle_count,
            });
        }

        let cycle = base.cycle_count + 1;
        let mut plan = self.scheduler.plan(cycle, &base);

        let mut pivot = None;
        if plan.includes(Role::FrontierPivot) {
            pivot = self.handle.frontier.select_weighted().await;
            if pivot.is_none() {
                plan.roles.remove(&Role::FrontierPivot);
            }
        }
        let snapshot = Arc::new(base.with_pivot(pivot));

        log::info!(
            "Session {} cycle {}: running {} roles at support {:.3}",
            snapshot.session_id,
            cycle,
            plan.roles.len(),
            snapshot.support
        );
        self.bus.publish(SessionEvent::CycleStarted {
            session_id: snapshot.session_id,
            cycle,
            roles: plan.roles.iter().copied().collect(),
        });

        let reports = self
            .orchestrator
            .run_cycle(&plan.roles, snapshot.clone(), cycle)
            .await;
        self.record_contributions(snapshot.session_id, cycle, &reports)
            .await;

        let outcomes: Vec<WorkerOutcome> = reports.into_iter().map(|r| r.outcome).collect();
        let resolution = self
            .aggregator
            .aggregate(&self.handle.state, cycle, &outcomes)
            .await;
        self.record_resolution(snapshot.session_id, &resolution)
            .await;

        let valid = outcomes.iter().filter(|o| o.counts()).count();
        self.bus.publish(SessionEvent::CycleComplete {
            session_id: snapshot.session_id,
            cycle,
            support: resolution.new_support,
            valid_outcomes: valid,
            invalid_outcomes: outcomes.len() - valid,
        });

        self.handle.frontier.age().await;
        let pruned = self.handle.frontier.prune(self.frontier_max_age).await;
        if pruned > 0 {
            log::debug!("Pruned {} stale frontier ideas", pruned);
        }

        match resolution.transition {
            Transition::Killed(entry) => Some(SessionOutcome::Killed(entry)),
            Transition::Graduated(entry) => Some(SessionOutcome::Graduated(entry)),
            Transition::Continued(_) => None,
        }
    }

    async fn record_contributions(&self, session_id: SessionId, cycle: u64, reports: &[WorkerReport]) {
        for report in reports {
            let contribution = Contribution::from_outcome(
                session_id,
                cycle,
                &report.outcome,
                report.response_text.clone(),
            );
            if let Err(e) = self.persistence.record_contribution(&contribution).await {
                log::error!("{}", PersistenceError::new("contribution", e));
            }
        }
    }

    async fn record_resolution(&self, session_id: SessionId, resolution: &Resolution) {
        if let Transition::Continued(point) = &resolution.transition {
            if let Err(e) = self
                .persistence
                .record_trajectory_point(session_id, point)
                .await
            {
                log::error!("{}", PersistenceError::new("trajectory point", e));
            }
        }

        self.save_session().await;

        if let Some((state, final_support)) = match &resolution.transition {
            Transition::Killed(entry) => Some((SessionState::Killed, entry.final_support)),
            Transition::Graduated(entry) => Some((SessionState::Graduated, entry.final_support)),
            Transition::Continued(_) => None,
        } {
            self.bus.publish(SessionEvent::ClaimChanged {
                session_id,
                cycle: resolution.cycle,
                state,
                final_support,
            });
        }
    }

    /// Ends a running session without a kill or graduation, persists it and
    /// tells subscribers the claim is settled.
    async fn archive(&self, state: SessionState) {
        if !self.handle.state.conclude(state).await {
            return;
        }
        self.save_session().await;
        let snapshot = self.handle.state.snapshot().await;
        self.bus.publish(SessionEvent::ClaimChanged {
            session_id: snapshot.session_id,
            cycle: snapshot.cycle_count,
            state,
            final_support: snapshot.support,
        });
    }

    async fn save_session(&self) {
        let session = self.handle.state.session().await;
        if let Err(e) = self.persistence.save_session(&session).await {
            log::error!("{}", PersistenceError::new("session", e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::random::FixedRandom;
    use crate::events::BroadcastBus;
    use crate::providers::{HashedEmbeddingProvider, MockGenerationService};
    use crate::storage::InMemoryStore;

    fn services(generation: MockGenerationService) -> (SessionServices, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let services = SessionServices {
            generation: Arc::new(generation),
            embeddings: Arc::new(HashedEmbeddingProvider::default()),
            persistence: store.clone(),
            bus: Arc::new(BroadcastBus::default()),
            validators: ValidatorRegistry::with_verdicts().unwrap(),
        };
        (services, store)
    }

    async fn driver(generation: MockGenerationService, config: SessionConfig) -> (CycleDriver, Arc<InMemoryStore>) {
        let (services, store) = services(generation);
        let driver = CycleDriver::start(
            "Water boils at lower temperatures at altitude",
            config,
            &services,
            Arc::new(FixedRandom::always(0.99)),
        )
        .await
        .unwrap();
        (driver, store)
    }

    #[tokio::test]
    async fn test_single_cycle_mixed_deltas() {
        let service = MockGenerationService::new()
            .respond(Role::Advocate, "SUPPORT\nconfidence: 1.0")
            .respond(Role::Critic, "CHALLENGE\nconfidence: 1.0");
        let (driver, store) = driver(service, SessionConfig::default()).await;

        assert!(driver.step().await.is_none());

        let snap = driver.handle().snapshot().await;
        // 0.5 + 0.10 - 0.15 - 0.02
        assert!((snap.support - 0.43).abs() < 1e-9);
        assert_eq!(snap.cycle_count, 1);
        assert_eq!(snap.trajectory.len(), 1);

        let contributions = store.get_contributions(snap.session_id).await.unwrap();
        assert_eq!(contributions.len(), 2);
        assert_eq!(store.get_trajectory(snap.session_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_first_cycle() {
        let (driver, store) = driver(MockGenerationService::new(), SessionConfig::default()).await;
        let handle = driver.handle();
        assert!(handle.stop("operator"));
        assert!(!handle.stop("again"));

        let outcome = driver.run().await;
        assert_eq!(
            outcome,
            SessionOutcome::Stopped {
                reason: StopReason::External("operator".to_string())
            }
        );
        assert_eq!(handle.state().await, SessionState::Stopped);

        let saved = store.load_session(handle.id()).await.unwrap().unwrap();
        assert_eq!(saved.state, SessionState::Stopped);
        assert!(store.get_contributions(handle.id()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_limit_exhausts() {
        let (mut services, store) = services(MockGenerationService::new());
        let bus = Arc::new(BroadcastBus::default());
        services.bus = bus.clone();
        let config = SessionConfig {
            max_cycles: 3,
            ..SessionConfig::default()
        };
        let driver = CycleDriver::start("claim", config, &services, Arc::new(FixedRandom::always(0.99)))
            .await
            .unwrap();
        let handle = driver.handle();
        let mut events = bus.subscribe();

        let outcome = driver.run().await;
        assert_eq!(outcome, SessionOutcome::Exhausted { cycles: 3 });

        assert_eq!(handle.state().await, SessionState::Exhausted);
        let saved = store.load_session(handle.id()).await.unwrap().unwrap();
        assert_eq!(saved.state, SessionState::Exhausted);

        let mut settled = None;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::ClaimChanged { state, cycle, .. } = event {
                settled = Some((state, cycle));
            }
        }
        assert_eq!(settled, Some((SessionState::Exhausted, 3)));
    }

    #[tokio::test]
    async fn test_step_after_death_changes_nothing() {
        let service = MockGenerationService::with_response("CHALLENGE\nconfidence: 1.0");
        let (driver, store) = driver(service, SessionConfig::default()).await;
        let handle = driver.handle();

        let outcome = loop {
            if let Some(outcome) = driver.step().await {
                break outcome;
            }
        };
        assert!(matches!(outcome, SessionOutcome::Killed(_)));
        let contributions = store.get_contributions(handle.id()).await.unwrap().len();

        // A stop requested after death does not rewrite the outcome.
        handle.stop("late");
        assert_eq!(driver.step().await, Some(outcome));

        let snap = handle.snapshot().await;
        assert_eq!(snap.state, SessionState::Killed);
        assert_eq!(snap.cemetery.len(), 1);
        assert_eq!(
            store.get_contributions(handle.id()).await.unwrap().len(),
            contributions
        );
    }

    #[tokio::test]
    async fn test_start_rejects_empty_claim() {
        let (services, _) = services(MockGenerationService::new());
        let result = CycleDriver::start(
            "   ",
            SessionConfig::default(),
            &services,
            Arc::new(FixedRandom::always(0.0)),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_pivot_role_dropped_when_nothing_selectable() {
        let config = SessionConfig {
            frontier_pivot_probability: 1.0,
            ..SessionConfig::default()
        };
        let (services, store) = services(MockGenerationService::new());
        let driver = CycleDriver::start("claim", config, &services, Arc::new(FixedRandom::always(0.0)))
            .await
            .unwrap();

        let handle = driver.handle();
        let idea = handle.propose_idea("consider open systems").await;
        handle.propose_idea("Consider open systems").await;

        // First cycle consumes the only eligible idea.
        driver.step().await;
        let first = store.get_contributions(handle.id()).await.unwrap();
        assert!(first.iter().any(|c| c.role == Role::FrontierPivot));
        let snap = handle.snapshot().await;
        assert!(snap.frontier.iter().any(|i| i.id == idea.id && i.activated));

        driver.step().await;
        let second: Vec<_> = store
            .get_contributions(handle.id())
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.cycle == 2)
            .collect();
        assert!(!second.iter().any(|c| c.role == Role::FrontierPivot));
    }
}
