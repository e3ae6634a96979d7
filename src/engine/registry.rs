use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::cycle::{CycleDriver, SessionHandle, SessionOutcome, SessionServices};
use crate::engine::random::{RandomSource, SeededRandom};
use crate::types::{SessionConfig, SessionId};

#[derive(Clone)]
struct Entry {
    handle: SessionHandle,
    outcome: Arc<RwLock<Option<SessionOutcome>>>,
}

/// Sessions started by this process, each driven on its own task.
pub struct SessionRegistry {
    services: SessionServices,
    defaults: SessionConfig,
    seed: Option<u64>,
    sessions: RwLock<HashMap<SessionId, Entry>>,
}

impl SessionRegistry {
    pub fn new(services: SessionServices, defaults: SessionConfig, seed: Option<u64>) -> Self {
        Self {
            services,
            defaults,
            seed,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn defaults(&self) -> &SessionConfig {
        &self.defaults
    }

    pub fn services(&self) -> &SessionServices {
        &self.services
    }

    fn rng(&self) -> Arc<dyn RandomSource> {
        match self.seed {
            Some(seed) => Arc::new(SeededRandom::from_seed(seed)),
            None => Arc::new(SeededRandom::from_entropy()),
        }
    }

    /// Starts a session in the background and returns its handle.
    pub async fn start(&self, claim: &str, config: Option<SessionConfig>) -> Result<SessionHandle> {
        let config = config.unwrap_or_else(|| self.defaults.clone());
        let driver = CycleDriver::start(claim, config, &self.services, self.rng()).await?;
        let handle = driver.handle();

        let entry = Entry {
            handle: handle.clone(),
            outcome: Arc::new(RwLock::new(None)),
        };
        self.sessions.write().await.insert(handle.id(), entry.clone());

        tokio::spawn(async move {
            let outcome = driver.run().await;
            *entry.outcome.write().await = Some(outcome);
        });

        Ok(handle)
    }

    pub async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).map(|e| e.handle.clone())
    }

    pub async fn outcome(&self, id: SessionId) -> Option<SessionOutcome> {
        let entry = self.sessions.read().await.get(&id).cloned()?;
        let outcome = entry.outcome.read().await.clone();
        outcome
    }

    pub async fn list(&self) -> Vec<SessionHandle> {
        self.sessions
            .read()
            .await
            .values()
            .map(|e| e.handle.clone())
            .collect()
    }

    /// `None` when the session is unknown, otherwise whether this call stopped it.
    pub async fn stop(&self, id: SessionId, reason: &str) -> Option<bool> {
        self.get(id).await.map(|handle| handle.stop(reason))
    }
}
