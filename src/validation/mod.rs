pub mod verdict;

pub use verdict::{Judgment, VerdictValidator};

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Role;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub delta: f64,
    pub error: Option<String>,
}

impl ValidationOutcome {
    pub fn accepted(delta: f64) -> Self {
        Self {
            valid: true,
            delta,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            delta: 0.0,
            error: Some(error.into()),
        }
    }
}

/// Opaque per-role decision over a raw generation response.
pub trait ResponseValidator: Send + Sync {
    fn validate(&self, role: Role, response: &str) -> ValidationOutcome;
}

/// Maps roles to validators, falling back to a shared default.
#[derive(Clone)]
pub struct ValidatorRegistry {
    default: Arc<dyn ResponseValidator>,
    overrides: HashMap<Role, Arc<dyn ResponseValidator>>,
}

impl ValidatorRegistry {
    pub fn new(default: Arc<dyn ResponseValidator>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_verdicts() -> Result<Self> {
        Ok(Self::new(Arc::new(VerdictValidator::new()?)))
    }

    pub fn register(mut self, role: Role, validator: Arc<dyn ResponseValidator>) -> Self {
        self.overrides.insert(role, validator);
        self
    }

    pub fn validator_for(&self, role: Role) -> &dyn ResponseValidator {
        self.overrides
            .get(&role)
            .map(|v| v.as_ref())
            .unwrap_or(self.default.as_ref())
    }
}
