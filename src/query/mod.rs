//! Read side over the persisted data: release listings, label highlights and
//! issue trees.
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::db::{
    self,
    model::{Issue, PullRequest, Release},
    Pool,
};
use crate::error::ReadError;

pub mod highlight;
pub mod issue_tree;

pub use highlight::{Highlight, LabelPolicy};
pub use issue_tree::{IssueArena, IssueNode, TreeContext};

#[derive(Debug, Clone)]
pub struct ReadSettings {
    pub policy: LabelPolicy,
    pub default_points: f64,
    pub epic_type: String,
}

impl ReadSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            policy: LabelPolicy::from_config(&cfg.labels),
            default_points: cfg.issues.default_points,
            epic_type: cfg.issues.epic_type.clone(),
        }
    }
}

pub async fn list_releases(pool: &Pool) -> Result<Vec<Release>, ReadError> {
    Ok(db::find_all_releases(pool).await?)
}

async fn require_release(pool: &Pool, release_id: &str) -> Result<Release, ReadError> {
    db::find_release(pool, release_id)
        .await?
        .ok_or_else(|| ReadError::not_found("release", release_id))
}

pub async fn release_pull_requests(
    pool: &Pool,
    release_id: &str,
) -> Result<Vec<PullRequest>, ReadError> {
    require_release(pool, release_id).await?;
    Ok(db::find_pull_requests_for_release(pool, release_id).await?)
}

#[instrument(skip_all, fields(release = release_id))]
pub async fn release_highlights(
    pool: &Pool,
    settings: &ReadSettings,
    release_id: &str,
) -> Result<Vec<Highlight>, ReadError> {
    require_release(pool, release_id).await?;
    let occurrences = db::find_label_occurrences_for_release(pool, release_id).await?;
    debug!(occurrences = occurrences.len(), "ranking labels");
    Ok(highlight::rank_highlights(&occurrences, &settings.policy))
}

/// Issues closed by the release's pull requests, as pruned trees.
#[instrument(skip_all, fields(release = release_id))]
pub async fn release_issue_tree(
    pool: &Pool,
    settings: &ReadSettings,
    release_id: &str,
) -> Result<Vec<IssueNode>, ReadError> {
    require_release(pool, release_id).await?;
    let issues = db::find_issues_closed_by_release(pool, release_id).await?;
    flat_set_tree(pool, settings, issues).await
}

#[instrument(skip_all, fields(milestone = milestone_id))]
pub async fn milestone_issue_tree(
    pool: &Pool,
    settings: &ReadSettings,
    milestone_id: &str,
) -> Result<Vec<IssueNode>, ReadError> {
    db::find_milestone(pool, milestone_id)
        .await?
        .ok_or_else(|| ReadError::not_found("milestone", milestone_id))?;
    let issues = db::find_issues_by_milestone(pool, milestone_id).await?;
    flat_set_tree(pool, settings, issues).await
}

/// Every epic with its sub-issues loaded level by level.
#[instrument(skip_all)]
pub async fn epic_issue_trees(
    pool: &Pool,
    settings: &ReadSettings,
) -> Result<Vec<IssueNode>, ReadError> {
    let epics = db::find_issues_by_type_name(pool, &settings.epic_type).await?;
    let descendants = load_descendants(pool, &epics).await?;
    let arena = IssueArena::new(epics.iter().cloned().chain(descendants));
    let ctx = tree_context(pool, settings, &arena.ids()).await?;
    Ok(issue_tree::assemble(&epics, &arena, &ctx))
}

async fn flat_set_tree(
    pool: &Pool,
    settings: &ReadSettings,
    issues: Vec<Issue>,
) -> Result<Vec<IssueNode>, ReadError> {
    let arena = IssueArena::new(issues.iter().cloned());
    let ctx = tree_context(pool, settings, &arena.ids()).await?;
    Ok(issue_tree::assemble(&issues, &arena, &ctx))
}

/// Breadth-first walk down parent links. Already-seen IDs are not reloaded.
async fn load_descendants(pool: &Pool, roots: &[Issue]) -> Result<Vec<Issue>, ReadError> {
    let mut seen: HashSet<String> = roots.iter().map(|i| i.id.clone()).collect();
    let mut frontier: Vec<String> = seen.iter().cloned().collect();
    let mut found = Vec::new();
    while !frontier.is_empty() {
        let level = db::find_issues_by_parent_ids(pool, &frontier).await?;
        frontier = Vec::new();
        for issue in level {
            if seen.insert(issue.id.clone()) {
                frontier.push(issue.id.clone());
                found.push(issue);
            }
        }
    }
    Ok(found)
}

async fn tree_context(
    pool: &Pool,
    settings: &ReadSettings,
    issue_ids: &[String],
) -> Result<TreeContext, ReadError> {
    let milestones = db::find_all_milestones(pool)
        .await?
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect();
    let issue_types = db::find_all_issue_types(pool)
        .await?
        .into_iter()
        .map(|t| (t.id.clone(), t))
        .collect();
    let priorities = db::find_all_issue_priorities(pool)
        .await?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    let mut labels: HashMap<String, Vec<_>> = HashMap::new();
    for (issue_id, label) in db::find_labels_for_issues(pool, issue_ids).await? {
        if settings.policy.is_excluded(&label) {
            continue;
        }
        labels.entry(issue_id).or_default().push(label);
    }

    Ok(TreeContext {
        milestones,
        issue_types,
        priorities,
        labels,
        default_points: settings.default_points,
    })
}
