pub mod aggregator;
pub mod control;
pub mod cost;
pub mod cycle;
pub mod frontier;
pub mod orchestrator;
pub mod random;
pub mod registry;
pub mod scheduler;
pub mod stagnation;
pub mod state;
pub mod worker;

pub use aggregator::{ConfidenceAggregator, Resolution, Transition};
pub use control::{StopReason, StopSignal};
pub use cost::{CostGovernor, CostVerdict};
pub use cycle::{CycleDriver, SessionHandle, SessionOutcome, SessionServices};
pub use frontier::FrontierPool;
pub use orchestrator::TaskOrchestrator;
pub use random::{FixedRandom, RandomSource, SeededRandom};
pub use registry::SessionRegistry;
pub use scheduler::{CyclePlan, CycleScheduler};
pub use stagnation::{StagnationDetector, StagnationReport};
pub use state::StateOwner;
pub use worker::{run_worker, DeltaBounds, WorkerDeps, WorkerReport};
