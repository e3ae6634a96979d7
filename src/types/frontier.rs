use serde::{Deserialize, Serialize};

use super::IdeaId;

/// No idea is ever eligible for selection with fewer sponsors than this.
pub const MIN_SPONSORS: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierIdea {
    pub id: IdeaId,
    pub idea_text: String,
    pub sponsor_count: u32,
    pub cycles_alive: u32,
    pub activated: bool,
}

impl FrontierIdea {
    pub fn new(idea_text: String) -> Self {
        Self {
            id: IdeaId::new_v4(),
            idea_text,
            sponsor_count: 1,
            cycles_alive: 0,
            activated: false,
        }
    }

    pub fn is_eligible(&self, min_sponsors: u32) -> bool {
        self.sponsor_count >= min_sponsors && !self.activated
    }

    /// Selection weight: more sponsors raise it, age lowers it.
    pub fn weight(&self) -> f64 {
        self.sponsor_count as f64 / (1.0 + self.cycles_alive as f64)
    }

    pub fn normalized_text(text: &str) -> String {
        text.split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_ordering() {
        let mut young = FrontierIdea::new("a".to_string());
        young.sponsor_count = 3;
        let mut old = young.clone();
        old.cycles_alive = 4;
        let mut fewer = young.clone();
        fewer.sponsor_count = 2;

        assert!(young.weight() > old.weight());
        assert!(young.weight() > fewer.weight());
    }

    #[test]
    fn test_eligibility() {
        let mut idea = FrontierIdea::new("idea".to_string());
        assert!(!idea.is_eligible(2));
        idea.sponsor_count = 2;
        assert!(idea.is_eligible(2));
        idea.activated = true;
        assert!(!idea.is_eligible(2));
    }

    #[test]
    fn test_normalized_text() {
        assert_eq!(
            FrontierIdea::normalized_text("  Try   THE inverse "),
            "try the inverse"
        );
    }
}
