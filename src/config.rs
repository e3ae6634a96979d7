use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::SessionConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub database_url: Option<String>,
    pub seed: Option<u64>,
    pub session: SessionConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Loads settings from a TOML file. Unknown keys are rejected.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.session.validate()?;
        Ok(config)
    }

    /// Overrides file values with whatever is set in the environment.
    pub fn merge_env(self) -> Result<Self> {
        self.merge_from(|key| std::env::var(key).ok())
    }

    pub fn merge_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.anthropic_api_key = Some(key);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(limit) = parse_var::<f64>(&lookup, "CRUCIBLE_COST_LIMIT")? {
            self.session.cost_limit = Some(limit);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CRUCIBLE_WORKER_TIMEOUT_SECS")? {
            self.session.worker_timeout_secs = secs;
        }
        if let Some(cycles) = parse_var::<u64>(&lookup, "CRUCIBLE_MAX_CYCLES")? {
            self.session.max_cycles = cycles;
        }
        if let Some(seed) = parse_var::<u64>(&lookup, "CRUCIBLE_SEED")? {
            self.seed = Some(seed);
        }

        self.session.validate()?;
        Ok(self)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}
