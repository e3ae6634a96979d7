use serde::{Deserialize, Serialize};

/// The fixed roster of worker roles that can be scheduled in a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    // Core
    Critic,
    Advocate,
    // Analytical
    Empiricist,
    Logician,
    Skeptic,
    Analogist,
    // Structural
    Architect,
    Decomposer,
    Historian,
    NoveltyScout,
    // Conditional
    Gravedigger,
    Navigator,
    FrontierPivot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleGroup {
    Core,
    Analytical,
    Structural,
    CemeteryPattern,
    Navigation,
    Frontier,
}

impl Role {
    pub const CORE: [Role; 2] = [Role::Critic, Role::Advocate];

    pub const ANALYTICAL: [Role; 4] = [
        Role::Empiricist,
        Role::Logician,
        Role::Skeptic,
        Role::Analogist,
    ];

    pub const STRUCTURAL: [Role; 4] = [
        Role::Architect,
        Role::Decomposer,
        Role::Historian,
        Role::NoveltyScout,
    ];

    pub fn all() -> Vec<Self> {
        vec![
            Role::Critic,
            Role::Advocate,
            Role::Empiricist,
            Role::Logician,
            Role::Skeptic,
            Role::Analogist,
            Role::Architect,
            Role::Decomposer,
            Role::Historian,
            Role::NoveltyScout,
            Role::Gravedigger,
            Role::Navigator,
            Role::FrontierPivot,
        ]
    }

    pub fn group(&self) -> RoleGroup {
        match self {
            Role::Critic | Role::Advocate => RoleGroup::Core,
            Role::Empiricist | Role::Logician | Role::Skeptic | Role::Analogist => {
                RoleGroup::Analytical
            }
            Role::Architect | Role::Decomposer | Role::Historian | Role::NoveltyScout => {
                RoleGroup::Structural
            }
            Role::Gravedigger => RoleGroup::CemeteryPattern,
            Role::Navigator => RoleGroup::Navigation,
            Role::FrontierPivot => RoleGroup::Frontier,
        }
    }

    /// Roles that read the trajectory history and so need a few cycles behind them.
    pub fn consults_history(&self) -> bool {
        matches!(self, Role::Historian | Role::NoveltyScout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Critic => "critic",
            Role::Advocate => "advocate",
            Role::Empiricist => "empiricist",
            Role::Logician => "logician",
            Role::Skeptic => "skeptic",
            Role::Analogist => "analogist",
            Role::Architect => "architect",
            Role::Decomposer => "decomposer",
            Role::Historian => "historian",
            Role::NoveltyScout => "novelty_scout",
            Role::Gravedigger => "gravedigger",
            Role::Navigator => "navigator",
            Role::FrontierPivot => "frontier_pivot",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Role::all().into_iter().find(|r| r.as_str() == s)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_has_thirteen_roles() {
        assert_eq!(Role::all().len(), 13);
    }

    #[test]
    fn test_role_name_roundtrip() {
        for role in Role::all() {
            assert_eq!(Role::from_str(role.as_str()), Some(role));
        }
        assert_eq!(Role::from_str("oracle"), None);
    }

    #[test]
    fn test_group_membership() {
        for role in Role::CORE {
            assert_eq!(role.group(), RoleGroup::Core);
        }
        for role in Role::ANALYTICAL {
            assert_eq!(role.group(), RoleGroup::Analytical);
        }
        for role in Role::STRUCTURAL {
            assert_eq!(role.group(), RoleGroup::Structural);
        }
        assert!(Role::Historian.consults_history());
        assert!(!Role::Architect.consults_history());
    }
}
