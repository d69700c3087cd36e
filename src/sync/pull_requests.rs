//! Per-branch pull-request reconciliation.
//!
//! A release branch only sees pull requests merged into it after it was cut.
//! Its history is completed with master pull requests merged up to the
//! branch's earliest own merge. Branches renamed from `X.Y-release` to
//! `release/X.Y` are fetched under both names.
use anyhow::Result;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

use super::SyncContext;
use crate::db::{self, model::Branch, model::BranchPullRequest, model::Milestone, Pool};
use crate::error::{ClientError, LocalProcessingError};
use crate::github::model::{PullRequestDto, RemoteRecord};
use crate::github::{convert, pagination::fetch_all, queries};
use crate::model::PhaseOutcome;

/// Maps a current branch name to the name it had before the rename scheme changed.
#[derive(Debug, Clone)]
pub struct BranchRename {
    pattern: Regex,
    replacement: String,
}

impl BranchRename {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }

    pub fn historical_name(&self, name: &str) -> Option<String> {
        if !self.pattern.is_match(name) {
            return None;
        }
        Some(
            self.pattern
                .replace(name, self.replacement.as_str())
                .into_owned(),
        )
    }
}

/// Union by external ID, keeping the first occurrence.
pub fn union_by_id(first: Vec<PullRequestDto>, second: Vec<PullRequestDto>) -> Vec<PullRequestDto> {
    let mut seen = HashSet::new();
    first
        .into_iter()
        .chain(second)
        .filter(|pr| seen.insert(pr.external_id().to_string()))
        .collect()
}

/// Stable sort by merge time, oldest first, unmerged last.
pub fn sort_by_merged_at(prs: &mut [PullRequestDto]) {
    prs.sort_by_key(|pr| (pr.merged_at.is_none(), pr.merged_at));
}

/// Keep the first pull request for each number, preserving order.
pub fn dedup_by_number(prs: Vec<PullRequestDto>) -> Vec<PullRequestDto> {
    let mut seen = HashSet::new();
    prs.into_iter().filter(|pr| seen.insert(pr.number)).collect()
}

fn same_ids(a: &[PullRequestDto], b: &[PullRequestDto]) -> bool {
    let left: HashSet<&str> = a.iter().map(|pr| pr.external_id()).collect();
    let right: HashSet<&str> = b.iter().map(|pr| pr.external_id()).collect();
    left == right
}

/// Complete a branch's sorted pull requests with inherited master history.
///
/// `branch` must already be sorted with [`sort_by_merged_at`].
pub fn merge_with_master(branch: Vec<PullRequestDto>, master: &[PullRequestDto]) -> Vec<PullRequestDto> {
    if branch.is_empty() {
        return branch;
    }
    if master.is_empty() || same_ids(&branch, master) {
        return master.to_vec();
    }
    let cutoff = branch[0].merged_at;
    let inherited = master
        .iter()
        .filter(|pr| match (pr.merged_at, cutoff) {
            (Some(merged), Some(cutoff)) => merged <= cutoff,
            _ => false,
        })
        .cloned();
    dedup_by_number(inherited.chain(branch).collect())
}

/// ID maps resolved once per cycle.
#[derive(Debug, Default)]
pub struct ReconcileLookups {
    pub milestones: HashMap<String, Milestone>,
    pub labels: HashSet<String>,
    pub issues: HashSet<String>,
}

impl ReconcileLookups {
    pub async fn load(pool: &Pool) -> Result<Self> {
        let milestones = db::find_all_milestones(pool)
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();
        let labels = db::find_all_labels(pool)
            .await?
            .into_iter()
            .map(|l| l.id)
            .collect();
        let issues = db::find_all_issue_ids(pool).await?;
        Ok(Self {
            milestones,
            labels,
            issues,
        })
    }
}

async fn fetch_branch_history(
    ctx: &SyncContext<'_>,
    rename: &BranchRename,
    branch_name: &str,
) -> Result<Vec<PullRequestDto>, ClientError> {
    let query = ctx.queries.get(queries::PULL_REQUESTS_BY_BRANCH)?;
    let mut vars = ctx.repository_variables();
    vars.insert("branch".into(), branch_name.into());
    let current: Vec<PullRequestDto> = fetch_all(ctx.client, query, &vars).await?;

    let Some(old_name) = rename.historical_name(branch_name) else {
        return Ok(current);
    };
    vars.insert("branch".into(), old_name.as_str().into());
    let historical: Vec<PullRequestDto> = fetch_all(ctx.client, query, &vars).await?;
    debug!(
        branch = branch_name,
        historical = %old_name,
        current = current.len(),
        previous = historical.len(),
        "merged renamed branch history"
    );
    Ok(union_by_id(current, historical))
}

#[instrument(skip_all)]
pub(super) async fn reconcile_pull_requests(ctx: &SyncContext<'_>) -> Result<PhaseOutcome> {
    let rename = BranchRename::new(
        &ctx.cfg.branches.rename_pattern,
        &ctx.cfg.branches.rename_replacement,
    )?;
    let lookups = ReconcileLookups::load(ctx.pool).await?;
    let default_branch = ctx.cfg.default_branch();

    let mut master = fetch_branch_history(ctx, &rename, default_branch).await?;
    sort_by_merged_at(&mut master);
    info!(branch = default_branch, prs = master.len(), "master history fetched");

    let branches = db::find_all_branches(ctx.pool).await?;
    let mut stored = 0usize;
    for branch in &branches {
        match reconcile_branch(ctx, &lookups, &rename, branch, &master).await {
            Ok(n) => stored += n,
            Err(source) => {
                let err = LocalProcessingError {
                    branch: branch.name.clone(),
                    source,
                };
                warn!(error = %err, "skipping branch");
            }
        }
    }
    Ok(PhaseOutcome::Synced { fetched: stored })
}

async fn reconcile_branch(
    ctx: &SyncContext<'_>,
    lookups: &ReconcileLookups,
    rename: &BranchRename,
    branch: &Branch,
    master: &[PullRequestDto],
) -> Result<usize> {
    let mut own = if branch.name == ctx.cfg.default_branch() {
        master.to_vec()
    } else {
        fetch_branch_history(ctx, rename, &branch.name).await?
    };

    let existing = db::count_branch_pull_requests(ctx.pool, &branch.id).await?;
    if own.len() as i64 == existing {
        debug!(branch = %branch.name, existing, "branch unchanged");
        return Ok(0);
    }
    sort_by_merged_at(&mut own);
    if own.is_empty() {
        return Ok(0);
    }

    let merged = merge_with_master(own, master);
    persist_branch(ctx.pool, lookups, branch, &merged).await?;
    debug!(branch = %branch.name, prs = merged.len(), "branch reconciled");
    Ok(merged.len())
}

async fn persist_branch(
    pool: &Pool,
    lookups: &ReconcileLookups,
    branch: &Branch,
    prs: &[PullRequestDto],
) -> Result<()> {
    let entities: Vec<_> = prs
        .iter()
        .map(|dto| convert::pull_request_from_dto(dto, &lookups.milestones))
        .collect();
    let labels: Vec<_> = prs
        .iter()
        .flat_map(|dto| convert::pull_request_labels_from_dto(dto, &lookups.labels))
        .collect();
    let issues: Vec<_> = prs
        .iter()
        .flat_map(|dto| convert::pull_request_issues_from_dto(dto, &lookups.issues))
        .collect();

    let existing = db::find_branch_pull_request_keys(pool, &branch.id).await?;
    let links: Vec<_> = prs
        .iter()
        .filter(|dto| !existing.contains(&BranchPullRequest::key(&branch.id, &dto.id)))
        .map(|dto| BranchPullRequest::new(&branch.id, &dto.id))
        .collect();

    db::upsert_pull_requests(pool, &entities).await?;
    db::insert_pull_request_labels(pool, &labels).await?;
    db::insert_pull_request_issues(pool, &issues).await?;
    db::insert_branch_pull_requests(pool, &links).await?;
    Ok(())
}
