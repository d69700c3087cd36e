//! Persisted entities and association rows.
//!
//! Keep these structs focused on the data stored in SQLite. Sync and read
//! logic lives in `sync` and `query`.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Milestone {
    pub id: String,
    pub number: i64,
    pub title: String,
    pub state: String,
    pub due_on: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct IssueType {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct IssuePriority {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ProjectItem {
    pub id: String,
    pub issue_id: String,
    pub points: Option<f64>,
    pub priority_id: Option<String>,
    pub business_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Branch {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Issue {
    pub id: String,
    pub number: i64,
    pub title: String,
    pub state: String,
    pub closed_at: Option<DateTime<Utc>>,
    pub milestone_id: Option<String>,
    pub issue_type_id: Option<String>,
    pub issue_priority_id: Option<String>,
    pub points: Option<f64>,
    pub parent_id: Option<String>,
    pub business_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PullRequest {
    pub id: String,
    pub number: i64,
    pub title: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub milestone_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Release {
    pub id: String,
    pub tag_name: String,
    pub name: String,
    pub published_at: Option<DateTime<Utc>>,
    pub branch_id: Option<String>,
    pub commit_sha: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Vulnerability {
    pub id: String,
    pub ghsa_id: String,
    pub severity: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
    pub permalink: Option<String>,
}

/// Branch to pull request link, keyed by `"{branch_id}:{pull_request_id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, sqlx::FromRow)]
pub struct BranchPullRequest {
    pub id: String,
    pub branch_id: String,
    pub pull_request_id: String,
}

impl BranchPullRequest {
    pub fn key(branch_id: &str, pull_request_id: &str) -> String {
        format!("{}:{}", branch_id, pull_request_id)
    }

    pub fn new(branch_id: &str, pull_request_id: &str) -> Self {
        Self {
            id: Self::key(branch_id, pull_request_id),
            branch_id: branch_id.to_string(),
            pull_request_id: pull_request_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, sqlx::FromRow)]
pub struct ReleasePullRequest {
    pub release_id: String,
    pub pull_request_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, sqlx::FromRow)]
pub struct IssueLabel {
    pub issue_id: String,
    pub label_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, sqlx::FromRow)]
pub struct PullRequestLabel {
    pub pull_request_id: String,
    pub label_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, sqlx::FromRow)]
pub struct PullRequestIssue {
    pub pull_request_id: String,
    pub issue_id: String,
}
