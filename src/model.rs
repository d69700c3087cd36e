use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-entity-kind sync phases, in the order a full run executes them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Labels,
    Milestones,
    IssueTypes,
    ProjectItems,
    Branches,
    Issues,
    PullRequests,
    Releases,
    Vulnerabilities,
}

impl SyncPhase {
    pub const ALL: [SyncPhase; 9] = [
        SyncPhase::Labels,
        SyncPhase::Milestones,
        SyncPhase::IssueTypes,
        SyncPhase::ProjectItems,
        SyncPhase::Branches,
        SyncPhase::Issues,
        SyncPhase::PullRequests,
        SyncPhase::Releases,
        SyncPhase::Vulnerabilities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Labels => "labels",
            SyncPhase::Milestones => "milestones",
            SyncPhase::IssueTypes => "issue_types",
            SyncPhase::ProjectItems => "project_items",
            SyncPhase::Branches => "branches",
            SyncPhase::Issues => "issues",
            SyncPhase::PullRequests => "pull_requests",
            SyncPhase::Releases => "releases",
            SyncPhase::Vulnerabilities => "vulnerabilities",
        }
    }

    pub fn parse_phase(s: &str) -> Option<Self> {
        SyncPhase::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a phase did on one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    /// Remote and local counts matched; nothing fetched.
    Skipped,
    /// Another instance holds the phase lock.
    Locked,
    Synced { fetched: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_round_trip_by_name() {
        for phase in SyncPhase::ALL {
            assert_eq!(SyncPhase::parse_phase(phase.as_str()), Some(phase));
        }
        assert_eq!(SyncPhase::parse_phase("nope"), None);
    }

    #[test]
    fn labels_run_first_and_vulnerabilities_last() {
        assert_eq!(SyncPhase::ALL[0], SyncPhase::Labels);
        assert_eq!(SyncPhase::ALL[8], SyncPhase::Vulnerabilities);
        let branches = SyncPhase::ALL.iter().position(|p| *p == SyncPhase::Branches);
        let prs = SyncPhase::ALL.iter().position(|p| *p == SyncPhase::PullRequests);
        assert!(branches < prs);
    }
}
