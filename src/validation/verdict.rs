use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ResponseValidator, ValidationOutcome};
use crate::types::Role;

const DEFAULT_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Judgment {
    Support { confidence: f64 },
    Challenge { reason: String, confidence: f64 },
    Uncertain { reason: String },
}

/// Reads a SUPPORT / CHALLENGE / UNCERTAIN verdict with an optional confidence,
/// either from free text or from a `{"verdict": .., "confidence": ..}` body.
#[derive(Debug, Clone)]
pub struct VerdictValidator {
    verdict_re: Regex,
    confidence_re: Regex,
}

impl VerdictValidator {
    pub fn new() -> Result<Self> {
        Ok(Self {
            verdict_re: Regex::new(r"(?i)\b(support|confirm|challenge|refute|uncertain)\b")?,
            confidence_re: Regex::new(r"(?i)confidence\s*[:=]?\s*(-?\d+(?:\.\d+)?)")?,
        })
    }

    pub fn parse_judgment(&self, response: &str) -> std::result::Result<Judgment, String> {
        let trimmed = response.trim();
        if trimmed.starts_with('{') {
            if let Ok(body) = serde_json::from_str::<Value>(trimmed) {
                return Self::judgment_from_json(&body);
            }
        }

        let verdict = self
            .verdict_re
            .captures(trimmed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
            .ok_or_else(|| "response carries no verdict".to_string())?;

        let confidence = match self.confidence_re.captures(trimmed).and_then(|c| c.get(1)) {
            Some(m) => m
                .as_str()
                .parse::<f64>()
                .map_err(|e| format!("unreadable confidence: {}", e))?,
            None => DEFAULT_CONFIDENCE,
        };

        let reason = trimmed.lines().skip(1).collect::<Vec<_>>().join("\n");
        Self::build(&verdict, confidence, reason.trim().to_string())
    }

    fn judgment_from_json(body: &Value) -> std::result::Result<Judgment, String> {
        let verdict = body
            .get("verdict")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "json response missing \"verdict\"".to_string())?
            .to_lowercase();
        let confidence = body
            .get("confidence")
            .and_then(|c| c.as_f64())
            .unwrap_or(DEFAULT_CONFIDENCE);
        let reason = body
            .get("reason")
            .and_then(|r| r.as_str())
            .unwrap_or_default()
            .to_string();
        Self::build(&verdict, confidence, reason)
    }

    fn build(verdict: &str, confidence: f64, reason: String) -> std::result::Result<Judgment, String> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence {} outside [0, 1]", confidence));
        }

        match verdict {
            "support" | "confirm" => Ok(Judgment::Support { confidence }),
            "challenge" | "refute" => Ok(Judgment::Challenge { reason, confidence }),
            "uncertain" => Ok(Judgment::Uncertain { reason }),
            other => Err(format!("unknown verdict \"{}\"", other)),
        }
    }
}

impl ResponseValidator for VerdictValidator {
    fn validate(&self, role: Role, response: &str) -> ValidationOutcome {
        match self.parse_judgment(response) {
            Ok(judgment) => ValidationOutcome::accepted(role.confidence_delta(&judgment)),
            Err(reason) => ValidationOutcome::rejected(reason),
        }
    }
}
