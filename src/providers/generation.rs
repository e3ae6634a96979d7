use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::types::{Role, TokenUsage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A fully built request for one worker role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub role: Role,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation>;
}

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_million: 3.0,
            output_per_million: 15.0,
        }
    }
}

impl Pricing {
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_million
            + usage.output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicGenerationService {
    api_key: String,
    model: String,
    pricing: Pricing,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl AnthropicGenerationService {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: "claude-3-5-sonnet-20240620".to_string(),
            pricing: Pricing::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }
}

#[async_trait]
impl GenerationService for AnthropicGenerationService {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let system_msg = request
            .messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.clone());

        let api_messages: Vec<AnthropicMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| AnthropicMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();

        let body = AnthropicRequest {
            model: self.model.clone(),
            messages: api_messages,
            max_tokens: request.max_tokens,
            system: system_msg,
        };

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;
            anyhow::bail!("Anthropic API error {}: {}", status, body);
        }

        let result: AnthropicResponse = response.json().await?;
        let text = result
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| anyhow::anyhow!("No content in response"))?;

        let usage = TokenUsage {
            input_tokens: result.usage.input_tokens,
            output_tokens: result.usage.output_tokens,
        };

        Ok(Generation {
            text,
            usage,
            cost_usd: self.pricing.cost(&usage),
        })
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail(String),
    Panic(String),
}

// Mock service for tests and offline runs
#[derive(Debug, Clone)]
pub struct MockGenerationService {
    default: Scripted,
    per_role: HashMap<Role, Scripted>,
    delays: HashMap<Role, Duration>,
    cost_usd: f64,
    usage: TokenUsage,
}

impl MockGenerationService {
    pub fn new() -> Self {
        Self {
            default: Scripted::Reply("UNCERTAIN - mock response".to_string()),
            per_role: HashMap::new(),
            delays: HashMap::new(),
            cost_usd: 0.0,
            usage: TokenUsage::default(),
        }
    }

    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            default: Scripted::Reply(response.into()),
            ..Self::new()
        }
    }

    pub fn respond(mut self, role: Role, response: impl Into<String>) -> Self {
        self.per_role.insert(role, Scripted::Reply(response.into()));
        self
    }

    pub fn fail(mut self, role: Role, message: impl Into<String>) -> Self {
        self.per_role.insert(role, Scripted::Fail(message.into()));
        self
    }

    pub fn panic_on(mut self, role: Role, message: impl Into<String>) -> Self {
        self.per_role.insert(role, Scripted::Panic(message.into()));
        self
    }

    pub fn delay(mut self, role: Role, delay: Duration) -> Self {
        self.delays.insert(role, delay);
        self
    }

    pub fn with_cost(mut self, cost_usd: f64, usage: TokenUsage) -> Self {
        self.cost_usd = cost_usd;
        self.usage = usage;
        self
    }
}

impl Default for MockGenerationService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationService for MockGenerationService {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        if let Some(delay) = self.delays.get(&request.role) {
            tokio::time::sleep(*delay).await;
        }

        match self.per_role.get(&request.role).unwrap_or(&self.default) {
            Scripted::Reply(text) => Ok(Generation {
                text: text.clone(),
                usage: self.usage,
                cost_usd: self.cost_usd,
            }),
            Scripted::Fail(message) => anyhow::bail!("{}", message),
            Scripted::Panic(message) => panic!("{}", message),
        }
    }
}
