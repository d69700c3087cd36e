//! Straight fetch-map-upsert phases.
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

use super::SyncContext;
use crate::db::{self, model::ProjectItem};
use crate::github::model::{
    BranchDto, IssueDto, IssueTypeDto, LabelDto, MilestoneDto, ProjectItemDto, VulnerabilityDto,
};
use crate::github::{convert, pagination::fetch_all, queries};
use crate::model::PhaseOutcome;

#[instrument(skip_all)]
pub(super) async fn sync_labels(ctx: &SyncContext<'_>) -> Result<PhaseOutcome> {
    let query = ctx.queries.get(queries::LABELS)?;
    let dtos: Vec<LabelDto> = fetch_all(ctx.client, query, &ctx.repository_variables()).await?;
    let labels: Vec<_> = dtos.iter().map(convert::label_from_dto).collect();
    db::upsert_labels(ctx.pool, &labels).await?;
    Ok(PhaseOutcome::Synced {
        fetched: dtos.len(),
    })
}

#[instrument(skip_all)]
pub(super) async fn sync_milestones(ctx: &SyncContext<'_>) -> Result<PhaseOutcome> {
    let query = ctx.queries.get(queries::MILESTONES)?;
    let dtos: Vec<MilestoneDto> =
        fetch_all(ctx.client, query, &ctx.repository_variables()).await?;
    let milestones: Vec<_> = dtos.iter().map(convert::milestone_from_dto).collect();
    db::upsert_milestones(ctx.pool, &milestones).await?;
    Ok(PhaseOutcome::Synced {
        fetched: dtos.len(),
    })
}

#[instrument(skip_all)]
pub(super) async fn sync_issue_types(ctx: &SyncContext<'_>) -> Result<PhaseOutcome> {
    let query = ctx.queries.get(queries::ISSUE_TYPES)?;
    let dtos: Vec<IssueTypeDto> =
        fetch_all(ctx.client, query, &ctx.repository_variables()).await?;
    let types: Vec<_> = dtos.iter().map(convert::issue_type_from_dto).collect();
    db::upsert_issue_types(ctx.pool, &types).await?;
    Ok(PhaseOutcome::Synced {
        fetched: dtos.len(),
    })
}

/// Planning fields live on an organization project; without a configured
/// project number there is nothing to read.
#[instrument(skip_all)]
pub(super) async fn sync_project_items(ctx: &SyncContext<'_>) -> Result<PhaseOutcome> {
    let Some(project) = ctx.cfg.github.project_number else {
        debug!("no project configured");
        return Ok(PhaseOutcome::Skipped);
    };
    let query = ctx.queries.get(queries::PROJECT_ITEMS)?;
    let mut vars = ctx.repository_variables();
    vars.insert("project".into(), project.into());
    let dtos: Vec<ProjectItemDto> = fetch_all(ctx.client, query, &vars).await?;

    let mut items = Vec::with_capacity(dtos.len());
    let mut priorities = HashMap::new();
    for (item, priority) in dtos.iter().filter_map(convert::project_item_from_dto) {
        if let Some(p) = priority {
            priorities.insert(p.id.clone(), p);
        }
        items.push(item);
    }
    let priorities: Vec<_> = priorities.into_values().collect();
    db::upsert_project_items(ctx.pool, &items, &priorities).await?;
    info!(items = items.len(), priorities = priorities.len(), "project items stored");
    Ok(PhaseOutcome::Synced {
        fetched: dtos.len(),
    })
}

#[instrument(skip_all)]
pub(super) async fn sync_branches(ctx: &SyncContext<'_>) -> Result<PhaseOutcome> {
    let query = ctx.queries.get(queries::BRANCHES)?;
    let dtos: Vec<BranchDto> = fetch_all(ctx.client, query, &ctx.repository_variables()).await?;
    let branches: Vec<_> = dtos.iter().map(convert::branch_from_dto).collect();
    db::upsert_branches(ctx.pool, &branches).await?;
    Ok(PhaseOutcome::Synced {
        fetched: dtos.len(),
    })
}

#[instrument(skip_all)]
pub(super) async fn sync_issues(ctx: &SyncContext<'_>) -> Result<PhaseOutcome> {
    let query = ctx.queries.get(queries::ISSUES)?;
    let dtos: Vec<IssueDto> = fetch_all(ctx.client, query, &ctx.repository_variables()).await?;

    let project_items: HashMap<String, ProjectItem> = db::find_all_project_items(ctx.pool)
        .await?
        .into_iter()
        .map(|item| (item.issue_id.clone(), item))
        .collect();
    let known_labels: HashSet<String> = db::find_all_labels(ctx.pool)
        .await?
        .into_iter()
        .map(|l| l.id)
        .collect();

    let issues: Vec<_> = dtos
        .iter()
        .map(|dto| convert::issue_from_dto(dto, &project_items))
        .collect();
    let issue_labels: Vec<_> = dtos
        .iter()
        .flat_map(|dto| convert::issue_labels_from_dto(dto, &known_labels))
        .collect();

    db::upsert_issues(ctx.pool, &issues).await?;
    db::insert_issue_labels(ctx.pool, &issue_labels).await?;
    Ok(PhaseOutcome::Synced {
        fetched: dtos.len(),
    })
}

#[instrument(skip_all)]
pub(super) async fn sync_vulnerabilities(ctx: &SyncContext<'_>) -> Result<PhaseOutcome> {
    let query = ctx.queries.get(queries::VULNERABILITIES)?;
    let dtos: Vec<VulnerabilityDto> =
        fetch_all(ctx.client, query, &ctx.repository_variables()).await?;
    let vulnerabilities: Vec<_> = dtos.iter().map(convert::vulnerability_from_dto).collect();
    db::upsert_vulnerabilities(ctx.pool, &vulnerabilities).await?;
    Ok(PhaseOutcome::Synced {
        fetched: dtos.len(),
    })
}
