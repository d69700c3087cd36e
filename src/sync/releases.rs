//! Release timeline: maps releases to branches and attributes merged pull
//! requests to releases by publish-time windows.
use anyhow::Result;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, instrument};

use super::SyncContext;
use crate::db::{
    self,
    model::{Branch, PullRequest, Release, ReleasePullRequest},
};
use crate::github::model::ReleaseDto;
use crate::github::{convert, pagination::fetch_all, queries};
use crate::model::PhaseOutcome;

static PRE_RELEASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)-(rc\d*|beta\d*|b\d+)\b").expect("pre-release pattern"));
static VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^v(\d+)\.(\d+)").expect("version pattern"));

pub fn is_pre_release(dto: &ReleaseDto) -> bool {
    dto.is_prerelease
        || PRE_RELEASE.is_match(&dto.tag_name)
        || dto.name.as_deref().is_some_and(|n| PRE_RELEASE.is_match(n))
}

/// Split into (stable, pre-release).
pub fn partition(dtos: Vec<ReleaseDto>) -> (Vec<ReleaseDto>, Vec<ReleaseDto>) {
    let (invalid, valid): (Vec<_>, Vec<_>) = dtos.into_iter().partition(is_pre_release);
    (valid, invalid)
}

/// `MAJOR.MINOR` from a `vMAJOR.MINOR...` tag, falling back to the name.
pub fn version_of(dto: &ReleaseDto) -> Option<String> {
    let name = dto.name.as_deref().map(str::trim);
    std::iter::once(dto.tag_name.trim())
        .chain(name)
        .find_map(|s| VERSION.captures(s))
        .map(|c| format!("{}.{}", &c[1], &c[2]))
}

/// Whether `version` occurs in `name` as a whole version component: no digit
/// or dot before it and no digit after it. `7.8` matches `release/7.8` and
/// `release/7.8.1` but not `release/17.8` or `release/7.80`.
pub fn names_version(name: &str, version: &str) -> bool {
    name.match_indices(version).any(|(start, _)| {
        let before = name[..start].chars().next_back();
        let after = name[start + version.len()..].chars().next();
        before.map_or(true, |c| !c.is_ascii_digit() && c != '.')
            && after.map_or(true, |c| !c.is_ascii_digit())
    })
}

/// First branch (by name) naming the version, else the default branch.
pub fn assign_branch<'a>(
    version: Option<&str>,
    branches: &'a [Branch],
    default_branch: &str,
) -> Option<&'a Branch> {
    let mut sorted: Vec<&Branch> = branches.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    version
        .and_then(|v| sorted.iter().copied().find(|b| names_version(&b.name, v)))
        .or_else(|| sorted.into_iter().find(|b| b.name == default_branch))
}

/// Earliest publish date of any pre-release sharing a stable release's
/// `MAJOR.MINOR`, keyed by the stable release ID.
pub fn earliest_pre_release_dates(
    valid: &[ReleaseDto],
    invalid: &[ReleaseDto],
) -> HashMap<String, DateTime<Utc>> {
    let mut by_version: HashMap<String, DateTime<Utc>> = HashMap::new();
    for pre in invalid {
        let (Some(version), Some(published)) = (version_of(pre), pre.published_at) else {
            continue;
        };
        by_version
            .entry(version)
            .and_modify(|d| *d = (*d).min(published))
            .or_insert(published);
    }
    valid
        .iter()
        .filter_map(|r| {
            let date = by_version.get(&version_of(r)?)?;
            Some((r.id.clone(), *date))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub release: Release,
    pub nightly: bool,
    pub pre_release_from: Option<DateTime<Utc>>,
}

impl TimelineEntry {
    pub fn new(release: Release, pre_release_from: Option<DateTime<Utc>>) -> Self {
        let nightly = release.name.to_ascii_lowercase().contains("nightly");
        Self {
            release,
            nightly,
            pre_release_from,
        }
    }

    fn window_end(&self) -> Option<DateTime<Utc>> {
        self.pre_release_from.or(self.release.published_at)
    }
}

/// Non-nightly first, then by publish time with unpublished last.
pub fn sort_timeline(entries: &mut [TimelineEntry]) {
    entries.sort_by_key(|e| {
        (
            e.nightly,
            e.release.published_at.is_none(),
            e.release.published_at,
        )
    });
}

/// Attribute pool pull requests to each release after the first, by
/// `previous publish <= merged_at < window end`.
pub fn assign_windows(timeline: &[TimelineEntry], pool: &[PullRequest]) -> Vec<ReleasePullRequest> {
    let mut out = Vec::new();
    for pair in timeline.windows(2) {
        let (prev, current) = (&pair[0], &pair[1]);
        let (Some(from), Some(to)) = (prev.release.published_at, current.window_end()) else {
            continue;
        };
        out.extend(
            pool.iter()
                .filter(|pr| pr.merged_at.is_some_and(|m| from <= m && m < to))
                .map(|pr| ReleasePullRequest {
                    release_id: current.release.id.clone(),
                    pull_request_id: pr.id.clone(),
                }),
        );
    }
    out
}

/// Plan every release↔pull-request row for one run.
///
/// Releases on non-default branches are windowed against their branch's
/// pool; each such branch's earliest release is carried onto the default
/// branch timeline and windowed against the default pool. Releases with no
/// branch get nothing.
pub fn plan_assignments(
    entries: &[TimelineEntry],
    default_branch_id: Option<&str>,
    pools: &HashMap<String, Vec<PullRequest>>,
) -> Vec<ReleasePullRequest> {
    let empty = Vec::new();
    let mut by_branch: BTreeMap<&str, Vec<TimelineEntry>> = BTreeMap::new();
    for entry in entries {
        if let Some(branch_id) = entry.release.branch_id.as_deref() {
            by_branch.entry(branch_id).or_default().push(entry.clone());
        }
    }

    let mut assignments = Vec::new();
    let mut default_timeline = default_branch_id
        .and_then(|id| by_branch.remove(id))
        .unwrap_or_default();

    for (branch_id, mut group) in by_branch {
        sort_timeline(&mut group);
        if group.len() > 1 {
            let pool = pools.get(branch_id).unwrap_or(&empty);
            assignments.extend(assign_windows(&group, pool));
        }
        default_timeline.push(group.swap_remove(0));
    }

    if let Some(default_id) = default_branch_id {
        sort_timeline(&mut default_timeline);
        let pool = pools.get(default_id).unwrap_or(&empty);
        assignments.extend(assign_windows(&default_timeline, pool));
    }
    assignments
}

#[instrument(skip_all)]
pub(super) async fn inject_releases(ctx: &SyncContext<'_>) -> Result<PhaseOutcome> {
    let query = ctx.queries.get(queries::RELEASES)?;
    let dtos: Vec<ReleaseDto> = fetch_all(ctx.client, query, &ctx.repository_variables()).await?;
    let fetched = dtos.len();
    let (valid, invalid) = partition(dtos);
    debug!(stable = valid.len(), pre_releases = invalid.len(), "releases partitioned");

    let branches = db::find_all_branches(ctx.pool).await?;
    let default_name = ctx.cfg.default_branch();
    let default_branch_id = branches
        .iter()
        .find(|b| b.name == default_name)
        .map(|b| b.id.clone());
    let pre_dates = earliest_pre_release_dates(&valid, &invalid);

    let entries: Vec<TimelineEntry> = valid
        .iter()
        .map(|dto| {
            let branch = assign_branch(version_of(dto).as_deref(), &branches, default_name);
            let release = convert::release_from_dto(dto, branch.map(|b| b.id.clone()));
            TimelineEntry::new(release, pre_dates.get(&dto.id).copied())
        })
        .collect();

    let mut pools: HashMap<String, Vec<PullRequest>> = HashMap::new();
    for branch_id in entries
        .iter()
        .filter_map(|e| e.release.branch_id.clone())
        .chain(default_branch_id.clone())
    {
        if !pools.contains_key(&branch_id) {
            let pool = db::find_pull_requests_for_branch(ctx.pool, &branch_id).await?;
            pools.insert(branch_id, pool);
        }
    }

    let assignments = plan_assignments(&entries, default_branch_id.as_deref(), &pools);
    let releases: Vec<Release> = entries.into_iter().map(|e| e.release).collect();
    db::save_release_timeline(ctx.pool, &releases, &assignments).await?;
    info!(
        releases = releases.len(),
        assignments = assignments.len(),
        "release timeline stored"
    );
    Ok(PhaseOutcome::Synced { fetched })
}
