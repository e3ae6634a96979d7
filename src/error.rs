use std::time::Duration;
use thiserror::Error;

use crate::types::Role;

/// Per-worker failures. None of these are fatal to a cycle; each one is
/// rendered into the `error` field of that worker's outcome.
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    #[error("{role} timed out after {}s", after.as_secs_f64())]
    Timeout { role: Role, after: Duration },

    #[error("{role} crashed: {reason}")]
    Crashed { role: Role, reason: String },

    #[error("{role} generation failed: {reason}")]
    Generation { role: Role, reason: String },

    #[error("{role} response rejected: {reason}")]
    Validation { role: Role, reason: String },
}

impl WorkerError {
    pub fn role(&self) -> Role {
        match self {
            WorkerError::Timeout { role, .. }
            | WorkerError::Crashed { role, .. }
            | WorkerError::Generation { role, .. }
            | WorkerError::Validation { role, .. } => *role,
        }
    }
}

#[derive(Debug, Error)]
#[error("persistence failure while writing {what}: {source}")]
pub struct PersistenceError {
    pub what: &'static str,
    #[source]
    pub source: anyhow::Error,
}

impl PersistenceError {
    pub fn new(what: &'static str, source: anyhow::Error) -> Self {
        Self { what, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = WorkerError::Timeout {
            role: Role::Critic,
            after: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "critic timed out after 60s");
        assert_eq!(err.role(), Role::Critic);
    }

    #[test]
    fn test_crash_message_keeps_reason() {
        let err = WorkerError::Crashed {
            role: Role::Navigator,
            reason: "index out of bounds".to_string(),
        };
        assert!(err.to_string().contains("index out of bounds"));
    }

    #[test]
    fn test_persistence_error_display() {
        let err = PersistenceError::new("cost entry", anyhow::anyhow!("connection reset"));
        assert!(err.to_string().contains("cost entry"));
        assert!(err.to_string().contains("connection reset"));
    }
}
