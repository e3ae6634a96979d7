use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Role, SessionId};

/// What one worker contributed to one cycle. Consumed once by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub role: Role,
    pub valid: bool,
    pub delta: f64,
    pub error: Option<String>,
}

impl WorkerOutcome {
    pub fn valid(role: Role, delta: f64) -> Self {
        Self {
            role,
            valid: true,
            delta,
            error: None,
        }
    }

    pub fn invalid(role: Role, error: impl Into<String>) -> Self {
        Self {
            role,
            valid: false,
            delta: 0.0,
            error: Some(error.into()),
        }
    }

    /// Whether this outcome moves support at all. Non-finite deltas never do.
    pub fn counts(&self) -> bool {
        self.valid && self.delta.is_finite()
    }

    /// Delta that actually counts toward aggregation.
    pub fn effective_delta(&self) -> f64 {
        if self.counts() {
            self.delta
        } else {
            0.0
        }
    }
}

/// Persisted record of a worker's raw contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub session_id: SessionId,
    pub cycle: u64,
    pub role: Role,
    pub valid: bool,
    pub delta: f64,
    pub error: Option<String>,
    pub response_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Contribution {
    pub fn from_outcome(
        session_id: SessionId,
        cycle: u64,
        outcome: &WorkerOutcome,
        response_text: Option<String>,
    ) -> Self {
        Self {
            session_id,
            cycle,
            role: outcome.role,
            valid: outcome.valid,
            delta: outcome.delta,
            error: outcome.error.clone(),
            response_text,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub session_id: SessionId,
    pub role: Role,
    pub cycle: u64,
    pub usage: TokenUsage,
    pub usd: f64,
    pub recorded_at: DateTime<Utc>,
}

impl CostEntry {
    pub fn new(session_id: SessionId, role: Role, cycle: u64, usage: TokenUsage, usd: f64) -> Self {
        Self {
            session_id,
            role,
            cycle,
            usage,
            usd,
            recorded_at: Utc::now(),
        }
    }
}
