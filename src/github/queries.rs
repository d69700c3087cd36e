//! Registry of GraphQL documents and the path to the connection in each response.
//!
//! The registry is built once at startup and shared read-only; adding a query
//! means adding a row to [`QueryRegistry::builtin`].
use std::collections::HashMap;

use crate::error::ClientError;

pub const REPOSITORY_STATS: &str = "repository_stats";
pub const LABELS: &str = "labels";
pub const MILESTONES: &str = "milestones";
pub const ISSUE_TYPES: &str = "issue_types";
pub const PROJECT_ITEMS: &str = "project_items";
pub const BRANCHES: &str = "branches";
pub const ISSUES: &str = "issues";
pub const PULL_REQUESTS_BY_BRANCH: &str = "pull_requests_by_branch";
pub const RELEASES: &str = "releases";
pub const VULNERABILITIES: &str = "vulnerabilities";

/// One logical query: its document and the dot-separated path under `data`
/// where the interesting object lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDef {
    pub name: &'static str,
    pub document: &'static str,
    pub retrieve_path: &'static str,
}

#[derive(Debug, Clone)]
pub struct QueryRegistry {
    queries: HashMap<&'static str, QueryDef>,
}

impl QueryRegistry {
    pub fn builtin() -> Self {
        let rows = [
            (REPOSITORY_STATS, STATS_DOC, "repository"),
            (LABELS, LABELS_DOC, "repository.labels"),
            (MILESTONES, MILESTONES_DOC, "repository.milestones"),
            (ISSUE_TYPES, ISSUE_TYPES_DOC, "repository.issueTypes"),
            (PROJECT_ITEMS, PROJECT_ITEMS_DOC, "organization.projectV2.items"),
            (BRANCHES, BRANCHES_DOC, "repository.refs"),
            (ISSUES, ISSUES_DOC, "repository.issues"),
            (PULL_REQUESTS_BY_BRANCH, PULL_REQUESTS_DOC, "repository.pullRequests"),
            (RELEASES, RELEASES_DOC, "repository.releases"),
            (VULNERABILITIES, VULNERABILITIES_DOC, "repository.vulnerabilityAlerts"),
        ];
        let queries = rows
            .into_iter()
            .map(|(name, document, retrieve_path)| {
                (
                    name,
                    QueryDef {
                        name,
                        document,
                        retrieve_path,
                    },
                )
            })
            .collect();
        Self { queries }
    }

    pub fn get(&self, name: &str) -> Result<&QueryDef, ClientError> {
        self.queries
            .get(name)
            .ok_or_else(|| ClientError::UnknownQuery(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

const STATS_DOC: &str = r#"query RepositoryStats($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    labels { totalCount }
    milestones { totalCount }
    issues { totalCount }
    pullRequests(states: MERGED) { totalCount }
    releases { totalCount }
    refs(refPrefix: "refs/heads/") { totalCount }
    vulnerabilityAlerts { totalCount }
  }
}"#;

const LABELS_DOC: &str = r#"query Labels($owner: String!, $name: String!, $pageSize: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    labels(first: $pageSize, after: $after) {
      nodes { id name description color }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#;

const MILESTONES_DOC: &str = r#"query Milestones($owner: String!, $name: String!, $pageSize: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    milestones(first: $pageSize, after: $after, states: [OPEN, CLOSED]) {
      nodes { id number title state dueOn closedAt }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#;

const ISSUE_TYPES_DOC: &str = r#"query IssueTypes($owner: String!, $name: String!, $pageSize: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    issueTypes(first: $pageSize, after: $after) {
      nodes { id name description color }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#;

const PROJECT_ITEMS_DOC: &str = r#"query ProjectItems($owner: String!, $project: Int!, $pageSize: Int!, $after: String) {
  organization(login: $owner) {
    projectV2(number: $project) {
      items(first: $pageSize, after: $after) {
        nodes {
          id
          content { ... on Issue { id } }
          points: fieldValueByName(name: "Points") {
            ... on ProjectV2ItemFieldNumberValue { number }
          }
          priority: fieldValueByName(name: "Priority") {
            ... on ProjectV2ItemFieldSingleSelectValue { optionId name }
          }
          businessValue: fieldValueByName(name: "Business Value") {
            ... on ProjectV2ItemFieldSingleSelectValue { optionId name }
          }
        }
        pageInfo { hasNextPage endCursor }
      }
    }
  }
}"#;

const BRANCHES_DOC: &str = r#"query Branches($owner: String!, $name: String!, $pageSize: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    refs(refPrefix: "refs/heads/", first: $pageSize, after: $after) {
      nodes { id name }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#;

const ISSUES_DOC: &str = r#"query Issues($owner: String!, $name: String!, $pageSize: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    issues(first: $pageSize, after: $after) {
      nodes {
        id number title state closedAt
        milestone { id }
        issueType { id }
        parent { id }
        labels(first: 50) { nodes { id } }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#;

const PULL_REQUESTS_DOC: &str = r#"query PullRequestsByBranch($owner: String!, $name: String!, $branch: String!, $pageSize: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    pullRequests(baseRefName: $branch, states: MERGED, first: $pageSize, after: $after) {
      edges {
        node {
          id number title mergedAt
          milestone { id }
          labels(first: 50) { nodes { id } }
          closingIssuesReferences(first: 50) { nodes { id } }
        }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#;

const RELEASES_DOC: &str = r#"query Releases($owner: String!, $name: String!, $pageSize: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    releases(first: $pageSize, after: $after) {
      nodes { id tagName name publishedAt isPrerelease tagCommit { oid } }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#;

const VULNERABILITIES_DOC: &str = r#"query Vulnerabilities($owner: String!, $name: String!, $pageSize: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    vulnerabilityAlerts(first: $pageSize, after: $after) {
      nodes {
        id
        securityAdvisory { ghsaId summary severity publishedAt permalink }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_every_query() {
        let registry = QueryRegistry::builtin();
        assert_eq!(registry.len(), 10);
        for name in [
            REPOSITORY_STATS,
            LABELS,
            MILESTONES,
            ISSUE_TYPES,
            PROJECT_ITEMS,
            BRANCHES,
            ISSUES,
            PULL_REQUESTS_BY_BRANCH,
            RELEASES,
            VULNERABILITIES,
        ] {
            let def = registry.get(name).unwrap();
            assert_eq!(def.name, name);
            assert!(!def.retrieve_path.is_empty());
        }
    }

    #[test]
    fn paginated_documents_accept_cursor() {
        let registry = QueryRegistry::builtin();
        let def = registry.get(PULL_REQUESTS_BY_BRANCH).unwrap();
        assert!(def.document.contains("$after: String"));
        assert!(def.document.contains("pageInfo"));
    }

    #[test]
    fn unknown_query_is_an_error() {
        let registry = QueryRegistry::builtin();
        assert!(matches!(
            registry.get("nope"),
            Err(ClientError::UnknownQuery(name)) if name == "nope"
        ));
    }
}
