use super::model::{
    Branch, BranchPullRequest, Issue, IssueLabel, IssuePriority, IssueType, Label, Milestone,
    ProjectItem, PullRequest, PullRequestIssue, PullRequestLabel, Release, ReleasePullRequest,
    Vulnerability,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;
use tracing::instrument;

pub type Pool = SqlitePool;

/// SQLite caps bound parameters per statement; IN-lists are chunked below it.
const IN_LIST_CHUNK: usize = 500;

const ISSUE_COLUMNS: &str = "i.id, i.number, i.title, i.state, i.closed_at, i.milestone_id, \
     i.issue_type_id, i.issue_priority_id, i.points, i.parent_id, i.business_value";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. In-memory URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Tables whose row counts feed the sync gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Labels,
    Milestones,
    IssueTypes,
    ProjectItems,
    Branches,
    Issues,
    PullRequests,
    Releases,
    Vulnerabilities,
    BranchPullRequests,
    ReleasePullRequests,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Labels => "labels",
            Table::Milestones => "milestones",
            Table::IssueTypes => "issue_types",
            Table::ProjectItems => "project_items",
            Table::Branches => "branches",
            Table::Issues => "issues",
            Table::PullRequests => "pull_requests",
            Table::Releases => "releases",
            Table::Vulnerabilities => "vulnerabilities",
            Table::BranchPullRequests => "branch_pull_requests",
            Table::ReleasePullRequests => "release_pull_requests",
        }
    }
}

#[instrument(skip_all, fields(table = table.as_str()))]
pub async fn count(pool: &Pool, table: Table) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
    let count: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    Ok(count)
}

// ---------------------------------------------------------------------------
// Upserts
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(rows = labels.len()))]
pub async fn upsert_labels(pool: &Pool, labels: &[Label]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for label in labels {
        sqlx::query(
            "INSERT INTO labels (id, name, description, color) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
             description = excluded.description, color = excluded.color",
        )
        .bind(&label.id)
        .bind(&label.name)
        .bind(label.description.as_deref())
        .bind(&label.color)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(labels.len())
}

#[instrument(skip_all, fields(rows = milestones.len()))]
pub async fn upsert_milestones(pool: &Pool, milestones: &[Milestone]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for m in milestones {
        sqlx::query(
            "INSERT INTO milestones (id, number, title, state, due_on, closed_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET number = excluded.number, title = excluded.title, \
             state = excluded.state, due_on = excluded.due_on, closed_at = excluded.closed_at",
        )
        .bind(&m.id)
        .bind(m.number)
        .bind(&m.title)
        .bind(&m.state)
        .bind(m.due_on)
        .bind(m.closed_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(milestones.len())
}

#[instrument(skip_all, fields(rows = types.len()))]
pub async fn upsert_issue_types(pool: &Pool, types: &[IssueType]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for t in types {
        sqlx::query(
            "INSERT INTO issue_types (id, name, description, color) VALUES (?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, \
             description = excluded.description, color = excluded.color",
        )
        .bind(&t.id)
        .bind(&t.name)
        .bind(t.description.as_deref())
        .bind(t.color.as_deref())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(types.len())
}

#[instrument(skip_all, fields(items = items.len(), priorities = priorities.len()))]
pub async fn upsert_project_items(
    pool: &Pool,
    items: &[ProjectItem],
    priorities: &[IssuePriority],
) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for p in priorities {
        sqlx::query(
            "INSERT INTO issue_priorities (id, name) VALUES (?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(&p.id)
        .bind(&p.name)
        .execute(&mut *tx)
        .await?;
    }
    for item in items {
        sqlx::query(
            "INSERT INTO project_items (id, issue_id, points, priority_id, business_value) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET issue_id = excluded.issue_id, points = excluded.points, \
             priority_id = excluded.priority_id, business_value = excluded.business_value",
        )
        .bind(&item.id)
        .bind(&item.issue_id)
        .bind(item.points)
        .bind(item.priority_id.as_deref())
        .bind(item.business_value.as_deref())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(items.len())
}

#[instrument(skip_all, fields(rows = branches.len()))]
pub async fn upsert_branches(pool: &Pool, branches: &[Branch]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for b in branches {
        sqlx::query(
            "INSERT INTO branches (id, name) VALUES (?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(&b.id)
        .bind(&b.name)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(branches.len())
}

#[instrument(skip_all, fields(rows = issues.len()))]
pub async fn upsert_issues(pool: &Pool, issues: &[Issue]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for i in issues {
        sqlx::query(
            "INSERT INTO issues (id, number, title, state, closed_at, milestone_id, issue_type_id, \
             issue_priority_id, points, parent_id, business_value) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET number = excluded.number, title = excluded.title, \
             state = excluded.state, closed_at = excluded.closed_at, \
             milestone_id = excluded.milestone_id, issue_type_id = excluded.issue_type_id, \
             issue_priority_id = excluded.issue_priority_id, points = excluded.points, \
             parent_id = excluded.parent_id, business_value = excluded.business_value",
        )
        .bind(&i.id)
        .bind(i.number)
        .bind(&i.title)
        .bind(&i.state)
        .bind(i.closed_at)
        .bind(i.milestone_id.as_deref())
        .bind(i.issue_type_id.as_deref())
        .bind(i.issue_priority_id.as_deref())
        .bind(i.points)
        .bind(i.parent_id.as_deref())
        .bind(i.business_value.as_deref())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(issues.len())
}

#[instrument(skip_all, fields(rows = pull_requests.len()))]
pub async fn upsert_pull_requests(pool: &Pool, pull_requests: &[PullRequest]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for pr in pull_requests {
        sqlx::query(
            "INSERT INTO pull_requests (id, number, title, merged_at, milestone_id) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET number = excluded.number, title = excluded.title, \
             merged_at = excluded.merged_at, milestone_id = excluded.milestone_id",
        )
        .bind(&pr.id)
        .bind(pr.number)
        .bind(&pr.title)
        .bind(pr.merged_at)
        .bind(pr.milestone_id.as_deref())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(pull_requests.len())
}

#[instrument(skip_all, fields(rows = vulnerabilities.len()))]
pub async fn upsert_vulnerabilities(pool: &Pool, vulnerabilities: &[Vulnerability]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for v in vulnerabilities {
        sqlx::query(
            "INSERT INTO vulnerabilities (id, ghsa_id, severity, summary, published_at, permalink) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET ghsa_id = excluded.ghsa_id, \
             severity = excluded.severity, summary = excluded.summary, \
             published_at = excluded.published_at, permalink = excluded.permalink",
        )
        .bind(&v.id)
        .bind(&v.ghsa_id)
        .bind(&v.severity)
        .bind(&v.summary)
        .bind(v.published_at)
        .bind(v.permalink.as_deref())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(vulnerabilities.len())
}

/// Persist releases and their pull-request assignments in one transaction.
#[instrument(skip_all, fields(releases = releases.len(), assignments = assignments.len()))]
pub async fn save_release_timeline(
    pool: &Pool,
    releases: &[Release],
    assignments: &[ReleasePullRequest],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    for r in releases {
        upsert_release_tx(&mut tx, r).await?;
    }
    for a in assignments {
        sqlx::query(
            "INSERT OR IGNORE INTO release_pull_requests (release_id, pull_request_id) VALUES (?, ?)",
        )
        .bind(&a.release_id)
        .bind(&a.pull_request_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn upsert_release_tx(tx: &mut Transaction<'_, Sqlite>, r: &Release) -> Result<()> {
    sqlx::query(
        "INSERT INTO releases (id, tag_name, name, published_at, branch_id, commit_sha) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(id) DO UPDATE SET tag_name = excluded.tag_name, name = excluded.name, \
         published_at = excluded.published_at, branch_id = excluded.branch_id, \
         commit_sha = excluded.commit_sha",
    )
    .bind(&r.id)
    .bind(&r.tag_name)
    .bind(&r.name)
    .bind(r.published_at)
    .bind(r.branch_id.as_deref())
    .bind(r.commit_sha.as_deref())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Association rows (insert-once, never deleted)
// ---------------------------------------------------------------------------

#[instrument(skip_all, fields(rows = rows.len()))]
pub async fn insert_issue_labels(pool: &Pool, rows: &[IssueLabel]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query("INSERT OR IGNORE INTO issue_labels (issue_id, label_id) VALUES (?, ?)")
            .bind(&row.issue_id)
            .bind(&row.label_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(rows.len())
}

#[instrument(skip_all, fields(rows = rows.len()))]
pub async fn insert_pull_request_labels(pool: &Pool, rows: &[PullRequestLabel]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query(
            "INSERT OR IGNORE INTO pull_request_labels (pull_request_id, label_id) VALUES (?, ?)",
        )
        .bind(&row.pull_request_id)
        .bind(&row.label_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(rows.len())
}

#[instrument(skip_all, fields(rows = rows.len()))]
pub async fn insert_pull_request_issues(pool: &Pool, rows: &[PullRequestIssue]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query(
            "INSERT OR IGNORE INTO pull_request_issues (pull_request_id, issue_id) VALUES (?, ?)",
        )
        .bind(&row.pull_request_id)
        .bind(&row.issue_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(rows.len())
}

#[instrument(skip_all, fields(rows = rows.len()))]
pub async fn insert_branch_pull_requests(pool: &Pool, rows: &[BranchPullRequest]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query(
            "INSERT OR IGNORE INTO branch_pull_requests (id, branch_id, pull_request_id) \
             VALUES (?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.branch_id)
        .bind(&row.pull_request_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(rows.len())
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

pub async fn find_all_labels(pool: &Pool) -> Result<Vec<Label>> {
    let rows = sqlx::query_as::<_, Label>(
        "SELECT id, name, description, color FROM labels ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_all_milestones(pool: &Pool) -> Result<Vec<Milestone>> {
    let rows = sqlx::query_as::<_, Milestone>(
        "SELECT id, number, title, state, due_on, closed_at FROM milestones ORDER BY number",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_milestone(pool: &Pool, id: &str) -> Result<Option<Milestone>> {
    let row = sqlx::query_as::<_, Milestone>(
        "SELECT id, number, title, state, due_on, closed_at FROM milestones WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn find_all_issue_types(pool: &Pool) -> Result<Vec<IssueType>> {
    let rows = sqlx::query_as::<_, IssueType>(
        "SELECT id, name, description, color FROM issue_types ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_all_issue_priorities(pool: &Pool) -> Result<Vec<IssuePriority>> {
    let rows = sqlx::query_as::<_, IssuePriority>(
        "SELECT id, name FROM issue_priorities ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_all_project_items(pool: &Pool) -> Result<Vec<ProjectItem>> {
    let rows = sqlx::query_as::<_, ProjectItem>(
        "SELECT id, issue_id, points, priority_id, business_value FROM project_items ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_all_branches(pool: &Pool) -> Result<Vec<Branch>> {
    let rows = sqlx::query_as::<_, Branch>("SELECT id, name FROM branches ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn find_all_issue_ids(pool: &Pool) -> Result<HashSet<String>> {
    let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM issues")
        .fetch_all(pool)
        .await?;
    Ok(ids.into_iter().collect())
}

pub async fn find_all_releases(pool: &Pool) -> Result<Vec<Release>> {
    let rows = sqlx::query_as::<_, Release>(
        "SELECT id, tag_name, name, published_at, branch_id, commit_sha FROM releases \
         ORDER BY published_at IS NULL, published_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_release(pool: &Pool, id: &str) -> Result<Option<Release>> {
    let row = sqlx::query_as::<_, Release>(
        "SELECT id, tag_name, name, published_at, branch_id, commit_sha FROM releases WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn count_branch_pull_requests(pool: &Pool, branch_id: &str) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM branch_pull_requests WHERE branch_id = ?")
            .bind(branch_id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

pub async fn find_branch_pull_request_keys(pool: &Pool, branch_id: &str) -> Result<HashSet<String>> {
    let keys: Vec<String> =
        sqlx::query_scalar("SELECT id FROM branch_pull_requests WHERE branch_id = ?")
            .bind(branch_id)
            .fetch_all(pool)
            .await?;
    Ok(keys.into_iter().collect())
}

/// Pull requests associated with a branch, oldest merge first.
pub async fn find_pull_requests_for_branch(pool: &Pool, branch_id: &str) -> Result<Vec<PullRequest>> {
    let rows = sqlx::query_as::<_, PullRequest>(
        "SELECT p.id, p.number, p.title, p.merged_at, p.milestone_id \
         FROM pull_requests p JOIN branch_pull_requests b ON b.pull_request_id = p.id \
         WHERE b.branch_id = ? ORDER BY p.merged_at IS NULL, p.merged_at",
    )
    .bind(branch_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn find_pull_requests_for_release(pool: &Pool, release_id: &str) -> Result<Vec<PullRequest>> {
    let rows = sqlx::query_as::<_, PullRequest>(
        "SELECT p.id, p.number, p.title, p.merged_at, p.milestone_id \
         FROM pull_requests p JOIN release_pull_requests r ON r.pull_request_id = p.id \
         WHERE r.release_id = ? ORDER BY p.merged_at IS NULL, p.merged_at",
    )
    .bind(release_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Every label occurrence reachable from a release: labels on its pull
/// requests plus labels on the issues those pull requests close. Duplicates
/// are kept; they are the popularity signal.
#[instrument(skip_all)]
pub async fn find_label_occurrences_for_release(pool: &Pool, release_id: &str) -> Result<Vec<Label>> {
    let rows = sqlx::query_as::<_, Label>(
        "SELECT l.id, l.name, l.description, l.color \
         FROM release_pull_requests rp \
         JOIN pull_request_labels pl ON pl.pull_request_id = rp.pull_request_id \
         JOIN labels l ON l.id = pl.label_id \
         WHERE rp.release_id = ? \
         UNION ALL \
         SELECT l.id, l.name, l.description, l.color \
         FROM release_pull_requests rp \
         JOIN pull_request_issues pi ON pi.pull_request_id = rp.pull_request_id \
         JOIN issue_labels il ON il.issue_id = pi.issue_id \
         JOIN labels l ON l.id = il.label_id \
         WHERE rp.release_id = ?",
    )
    .bind(release_id)
    .bind(release_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Issues closed by any pull request attributed to the release.
pub async fn find_issues_closed_by_release(pool: &Pool, release_id: &str) -> Result<Vec<Issue>> {
    let sql = format!(
        "SELECT DISTINCT {ISSUE_COLUMNS} FROM issues i \
         JOIN pull_request_issues pi ON pi.issue_id = i.id \
         JOIN release_pull_requests rp ON rp.pull_request_id = pi.pull_request_id \
         WHERE rp.release_id = ? ORDER BY i.number"
    );
    let rows = sqlx::query_as::<_, Issue>(&sql)
        .bind(release_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn find_issues_by_milestone(pool: &Pool, milestone_id: &str) -> Result<Vec<Issue>> {
    let sql = format!("SELECT {ISSUE_COLUMNS} FROM issues i WHERE i.milestone_id = ? ORDER BY i.number");
    let rows = sqlx::query_as::<_, Issue>(&sql)
        .bind(milestone_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn find_issues_by_type_name(pool: &Pool, type_name: &str) -> Result<Vec<Issue>> {
    let sql = format!(
        "SELECT {ISSUE_COLUMNS} FROM issues i JOIN issue_types t ON t.id = i.issue_type_id \
         WHERE t.name = ? ORDER BY i.number"
    );
    let rows = sqlx::query_as::<_, Issue>(&sql)
        .bind(type_name)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Direct sub-issues of the given parents.
pub async fn find_issues_by_parent_ids(pool: &Pool, parent_ids: &[String]) -> Result<Vec<Issue>> {
    let mut out = Vec::new();
    for chunk in parent_ids.chunks(IN_LIST_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ISSUE_COLUMNS} FROM issues i WHERE i.parent_id IN ("
        ));
        let mut sep = qb.separated(", ");
        for id in chunk {
            sep.push_bind(id.clone());
        }
        sep.push_unseparated(") ORDER BY i.number");
        out.extend(qb.build_query_as::<Issue>().fetch_all(pool).await?);
    }
    Ok(out)
}

#[derive(sqlx::FromRow)]
struct IssueLabelRow {
    issue_id: String,
    id: String,
    name: String,
    description: Option<String>,
    color: String,
}

/// Labels attached to any of the given issues, as `(issue_id, label)` pairs.
#[instrument(skip_all, fields(issues = issue_ids.len()))]
pub async fn find_labels_for_issues(pool: &Pool, issue_ids: &[String]) -> Result<Vec<(String, Label)>> {
    let mut out = Vec::new();
    for chunk in issue_ids.chunks(IN_LIST_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT il.issue_id, l.id, l.name, l.description, l.color \
             FROM issue_labels il JOIN labels l ON l.id = il.label_id WHERE il.issue_id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in chunk {
            sep.push_bind(id.clone());
        }
        sep.push_unseparated(") ORDER BY l.name");
        let rows = qb.build_query_as::<IssueLabelRow>().fetch_all(pool).await?;
        out.extend(rows.into_iter().map(|r| {
            (
                r.issue_id,
                Label {
                    id: r.id,
                    name: r.name,
                    description: r.description,
                    color: r.color,
                },
            )
        }));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Lease locks
// ---------------------------------------------------------------------------

/// Take the named lock if it is free or its lease has run out. Returns whether
/// this owner now holds it.
#[instrument(skip_all, fields(lock = name))]
pub async fn try_acquire_lock(
    pool: &Pool,
    name: &str,
    owner: &str,
    now: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<bool> {
    let res = sqlx::query(
        "INSERT INTO sync_locks (name, owner, locked_at, locked_until) VALUES (?, ?, ?, ?) \
         ON CONFLICT(name) DO UPDATE SET owner = excluded.owner, \
         locked_at = excluded.locked_at, locked_until = excluded.locked_until \
         WHERE sync_locks.locked_until <= excluded.locked_at",
    )
    .bind(name)
    .bind(owner)
    .bind(now)
    .bind(until)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Shorten the lease held by `owner` so it expires at `until`.
#[instrument(skip_all, fields(lock = name))]
pub async fn release_lock(pool: &Pool, name: &str, owner: &str, until: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE sync_locks SET locked_until = ? WHERE name = ? AND owner = ?")
        .bind(until)
        .bind(name)
        .bind(owner)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_pool() -> Pool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn prepare_sqlite_url_adds_create_mode() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested").join("db.sqlite");
        let url = prepare_sqlite_url(&format!("sqlite://{}", path.display()));
        assert!(url.ends_with("db.sqlite?mode=rwc"));
        assert!(path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn upsert_updates_in_place() {
        let pool = setup_pool().await;
        let mut label = Label {
            id: "L_1".into(),
            name: "bug".into(),
            description: None,
            color: "d73a4a".into(),
        };
        upsert_labels(&pool, std::slice::from_ref(&label)).await.unwrap();
        label.name = "defect".into();
        upsert_labels(&pool, std::slice::from_ref(&label)).await.unwrap();

        assert_eq!(count(&pool, Table::Labels).await.unwrap(), 1);
        let all = find_all_labels(&pool).await.unwrap();
        assert_eq!(all[0].name, "defect");
    }

    #[tokio::test]
    async fn branch_pull_request_rows_are_inserted_once() {
        let pool = setup_pool().await;
        let row = BranchPullRequest::new("B_1", "PR_1");
        insert_branch_pull_requests(&pool, &[row.clone(), row.clone()])
            .await
            .unwrap();
        insert_branch_pull_requests(&pool, &[row]).await.unwrap();
        assert_eq!(count_branch_pull_requests(&pool, "B_1").await.unwrap(), 1);
        let keys = find_branch_pull_request_keys(&pool, "B_1").await.unwrap();
        assert!(keys.contains("B_1:PR_1"));
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_lease_ends() {
        let pool = setup_pool().await;
        assert!(try_acquire_lock(&pool, "labels", "a", at(1), at(3)).await.unwrap());
        assert!(!try_acquire_lock(&pool, "labels", "b", at(2), at(4)).await.unwrap());
        assert!(try_acquire_lock(&pool, "labels", "b", at(3), at(5)).await.unwrap());

        // Releasing with a foreign owner is a no-op.
        release_lock(&pool, "labels", "a", at(1)).await.unwrap();
        assert!(!try_acquire_lock(&pool, "labels", "c", at(4), at(6)).await.unwrap());

        release_lock(&pool, "labels", "b", at(4)).await.unwrap();
        assert!(try_acquire_lock(&pool, "labels", "c", at(4), at(6)).await.unwrap());
    }

    #[tokio::test]
    async fn parent_lookup_handles_empty_and_chunked_lists() {
        let pool = setup_pool().await;
        assert!(find_issues_by_parent_ids(&pool, &[]).await.unwrap().is_empty());

        let child = Issue {
            id: "I_2".into(),
            number: 2,
            title: "child".into(),
            state: "OPEN".into(),
            closed_at: None,
            milestone_id: None,
            issue_type_id: None,
            issue_priority_id: None,
            points: Some(2.0),
            parent_id: Some("I_1".into()),
            business_value: None,
        };
        upsert_issues(&pool, &[child]).await.unwrap();
        let mut parents: Vec<String> = (0..700).map(|n| format!("X_{}", n)).collect();
        parents.push("I_1".into());
        let found = find_issues_by_parent_ids(&pool, &parents).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "I_2");
    }
}
