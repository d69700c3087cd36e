//! Count-equality short-circuit for sync phases.
use anyhow::Result;
use tracing::debug;

use crate::db::{self, Pool, Table};
use crate::github::model::RepositoryStats;
use crate::model::SyncPhase;

/// A phase needs a full fetch unless the remote and local counts are equal.
pub fn should_fetch(remote_count: i64, local_count: i64) -> bool {
    remote_count != local_count
}

/// Unknown remote counts always fetch.
pub fn should_fetch_known(remote_count: Option<i64>, local_count: i64) -> bool {
    remote_count.map_or(true, |remote| should_fetch(remote, local_count))
}

/// Remote aggregate count for a phase, if the statistics query reports one.
pub fn remote_count(stats: Option<&RepositoryStats>, phase: SyncPhase) -> Option<i64> {
    let stats = stats?;
    let total = match phase {
        SyncPhase::Labels => stats.labels,
        SyncPhase::Milestones => stats.milestones,
        SyncPhase::Branches => stats.refs,
        SyncPhase::Issues => stats.issues,
        SyncPhase::PullRequests => stats.pull_requests,
        SyncPhase::Releases => stats.releases,
        SyncPhase::Vulnerabilities => stats.vulnerability_alerts,
        SyncPhase::IssueTypes | SyncPhase::ProjectItems => None,
    };
    total.map(|t| t.total_count)
}

pub fn local_table(phase: SyncPhase) -> Table {
    match phase {
        SyncPhase::Labels => Table::Labels,
        SyncPhase::Milestones => Table::Milestones,
        SyncPhase::IssueTypes => Table::IssueTypes,
        SyncPhase::ProjectItems => Table::ProjectItems,
        SyncPhase::Branches => Table::Branches,
        SyncPhase::Issues => Table::Issues,
        SyncPhase::PullRequests => Table::PullRequests,
        SyncPhase::Releases => Table::Releases,
        SyncPhase::Vulnerabilities => Table::Vulnerabilities,
    }
}

/// Decide whether `phase` must fetch this cycle. The local count is only
/// read when a remote count is available.
pub async fn needs_sync(
    pool: &Pool,
    stats: Option<&RepositoryStats>,
    phase: SyncPhase,
) -> Result<bool> {
    let Some(remote) = remote_count(stats, phase) else {
        return Ok(true);
    };
    let local = db::count(pool, local_table(phase)).await?;
    debug!(%phase, remote, local, "sync gate");
    Ok(should_fetch(remote, local))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::model::TotalCount;

    #[test]
    fn equal_counts_skip() {
        assert!(!should_fetch(42, 42));
        assert!(should_fetch(43, 42));
        assert!(should_fetch(0, 1));
        assert!(should_fetch_known(None, 0));
        assert!(!should_fetch_known(Some(0), 0));
    }

    #[test]
    fn phases_without_stats_have_no_remote_count() {
        let stats = RepositoryStats {
            labels: Some(TotalCount { total_count: 5 }),
            ..Default::default()
        };
        assert_eq!(remote_count(Some(&stats), SyncPhase::Labels), Some(5));
        assert_eq!(remote_count(Some(&stats), SyncPhase::Milestones), None);
        assert_eq!(remote_count(Some(&stats), SyncPhase::IssueTypes), None);
        assert_eq!(remote_count(None, SyncPhase::Labels), None);
    }
}
