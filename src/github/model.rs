//! Wire DTOs for the GitHub GraphQL API. Field names follow the API's camelCase.
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Anything fetched from the API, identified by its stable node ID.
pub trait RemoteRecord {
    fn external_id(&self) -> &str;
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub id: String,
}

/// A nested `{ nodes: [{ id }] }` list such as labels on an issue.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeRefList {
    #[serde(default)]
    pub nodes: Vec<NodeRef>,
}

impl NodeRefList {
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct LabelDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub color: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneDto {
    pub id: String,
    pub number: i64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub due_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct IssueTypeDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct NumberFieldValue {
    #[serde(default)]
    pub number: Option<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SingleSelectFieldValue {
    #[serde(default)]
    pub option_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Project (v2) item carrying planning fields for an issue.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectItemDto {
    pub id: String,
    #[serde(default)]
    pub content: Option<NodeRef>,
    #[serde(default)]
    pub points: Option<NumberFieldValue>,
    #[serde(default)]
    pub priority: Option<SingleSelectFieldValue>,
    #[serde(default)]
    pub business_value: Option<SingleSelectFieldValue>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BranchDto {
    pub id: String,
    pub name: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssueDto {
    pub id: String,
    pub number: i64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub milestone: Option<NodeRef>,
    #[serde(default)]
    pub issue_type: Option<NodeRef>,
    #[serde(default)]
    pub parent: Option<NodeRef>,
    #[serde(default)]
    pub labels: Option<NodeRefList>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestDto {
    pub id: String,
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub milestone: Option<NodeRef>,
    #[serde(default)]
    pub labels: Option<NodeRefList>,
    #[serde(default)]
    pub closing_issues_references: Option<NodeRefList>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CommitRef {
    pub oid: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDto {
    pub id: String,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_prerelease: bool,
    #[serde(default)]
    pub tag_commit: Option<CommitRef>,
}

impl ReleaseDto {
    /// Display name, falling back to the tag when the release is unnamed.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.tag_name)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAdvisoryDto {
    pub ghsa_id: String,
    pub summary: String,
    pub severity: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub permalink: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VulnerabilityDto {
    pub id: String,
    pub security_advisory: SecurityAdvisoryDto,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TotalCount {
    pub total_count: i64,
}

/// Aggregate counts from the lightweight statistics query.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStats {
    #[serde(default)]
    pub labels: Option<TotalCount>,
    #[serde(default)]
    pub milestones: Option<TotalCount>,
    #[serde(default)]
    pub issues: Option<TotalCount>,
    #[serde(default)]
    pub pull_requests: Option<TotalCount>,
    #[serde(default)]
    pub releases: Option<TotalCount>,
    #[serde(default)]
    pub refs: Option<TotalCount>,
    #[serde(default)]
    pub vulnerability_alerts: Option<TotalCount>,
}

macro_rules! remote_record {
    ($($ty:ty),* $(,)?) => {
        $(impl RemoteRecord for $ty {
            fn external_id(&self) -> &str {
                &self.id
            }
        })*
    };
}

remote_record!(
    LabelDto,
    MilestoneDto,
    IssueTypeDto,
    ProjectItemDto,
    BranchDto,
    IssueDto,
    PullRequestDto,
    ReleaseDto,
    VulnerabilityDto,
);
