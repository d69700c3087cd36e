//! Typed conversions from wire DTOs to persisted entities.
//!
//! Reference lookups take the ID maps built once per sync cycle; references
//! that cannot be resolved map to `None` or are dropped.
use std::collections::{HashMap, HashSet};

use super::model::{
    BranchDto, IssueDto, IssueTypeDto, LabelDto, MilestoneDto, ProjectItemDto, PullRequestDto,
    ReleaseDto, VulnerabilityDto,
};
use crate::db::model::{
    Branch, Issue, IssueLabel, IssuePriority, IssueType, Label, Milestone, ProjectItem,
    PullRequest, PullRequestIssue, PullRequestLabel, Release, Vulnerability,
};

pub fn label_from_dto(dto: &LabelDto) -> Label {
    Label {
        id: dto.id.clone(),
        name: dto.name.clone(),
        description: dto.description.clone(),
        color: dto.color.clone(),
    }
}

pub fn milestone_from_dto(dto: &MilestoneDto) -> Milestone {
    Milestone {
        id: dto.id.clone(),
        number: dto.number,
        title: dto.title.clone(),
        state: dto.state.clone(),
        due_on: dto.due_on,
        closed_at: dto.closed_at,
    }
}

pub fn issue_type_from_dto(dto: &IssueTypeDto) -> IssueType {
    IssueType {
        id: dto.id.clone(),
        name: dto.name.clone(),
        description: dto.description.clone(),
        color: dto.color.clone(),
    }
}

/// Project items that do not point at an issue (drafts, pull requests) are skipped.
/// The priority option, when set, becomes an [`IssuePriority`] row.
pub fn project_item_from_dto(dto: &ProjectItemDto) -> Option<(ProjectItem, Option<IssuePriority>)> {
    let issue_id = dto.content.as_ref()?.id.clone();
    let priority = dto.priority.as_ref().and_then(|p| {
        Some(IssuePriority {
            id: p.option_id.clone()?,
            name: p.name.clone().unwrap_or_default(),
        })
    });
    let item = ProjectItem {
        id: dto.id.clone(),
        issue_id,
        points: dto.points.as_ref().and_then(|p| p.number),
        priority_id: priority.as_ref().map(|p| p.id.clone()),
        business_value: dto.business_value.as_ref().and_then(|b| b.name.clone()),
    };
    Some((item, priority))
}

pub fn branch_from_dto(dto: &BranchDto) -> Branch {
    Branch {
        id: dto.id.clone(),
        name: dto.name.clone(),
    }
}

/// Planning fields (points, priority, business value) come from the project
/// item attached to the issue, if any.
pub fn issue_from_dto(dto: &IssueDto, project_items: &HashMap<String, ProjectItem>) -> Issue {
    let item = project_items.get(&dto.id);
    Issue {
        id: dto.id.clone(),
        number: dto.number,
        title: dto.title.clone(),
        state: dto.state.clone(),
        closed_at: dto.closed_at,
        milestone_id: dto.milestone.as_ref().map(|m| m.id.clone()),
        issue_type_id: dto.issue_type.as_ref().map(|t| t.id.clone()),
        issue_priority_id: item.and_then(|i| i.priority_id.clone()),
        points: item.and_then(|i| i.points),
        parent_id: dto.parent.as_ref().map(|p| p.id.clone()),
        business_value: item.and_then(|i| i.business_value.clone()),
    }
}

pub fn issue_labels_from_dto(dto: &IssueDto, known_labels: &HashSet<String>) -> Vec<IssueLabel> {
    dto.labels
        .iter()
        .flat_map(|list| list.ids())
        .filter(|id| known_labels.contains(*id))
        .map(|label_id| IssueLabel {
            issue_id: dto.id.clone(),
            label_id: label_id.to_string(),
        })
        .collect()
}

pub fn pull_request_from_dto(
    dto: &PullRequestDto,
    milestones: &HashMap<String, Milestone>,
) -> PullRequest {
    PullRequest {
        id: dto.id.clone(),
        number: dto.number,
        title: dto.title.clone(),
        merged_at: dto.merged_at,
        milestone_id: dto
            .milestone
            .as_ref()
            .and_then(|m| milestones.get(&m.id))
            .map(|m| m.id.clone()),
    }
}

pub fn pull_request_labels_from_dto(
    dto: &PullRequestDto,
    known_labels: &HashSet<String>,
) -> Vec<PullRequestLabel> {
    dto.labels
        .iter()
        .flat_map(|list| list.ids())
        .filter(|id| known_labels.contains(*id))
        .map(|label_id| PullRequestLabel {
            pull_request_id: dto.id.clone(),
            label_id: label_id.to_string(),
        })
        .collect()
}

pub fn pull_request_issues_from_dto(
    dto: &PullRequestDto,
    known_issues: &HashSet<String>,
) -> Vec<PullRequestIssue> {
    dto.closing_issues_references
        .iter()
        .flat_map(|list| list.ids())
        .filter(|id| known_issues.contains(*id))
        .map(|issue_id| PullRequestIssue {
            pull_request_id: dto.id.clone(),
            issue_id: issue_id.to_string(),
        })
        .collect()
}

pub fn release_from_dto(dto: &ReleaseDto, branch_id: Option<String>) -> Release {
    Release {
        id: dto.id.clone(),
        tag_name: dto.tag_name.clone(),
        name: dto.display_name().to_string(),
        published_at: dto.published_at,
        branch_id,
        commit_sha: dto.tag_commit.as_ref().map(|c| c.oid.clone()),
    }
}

pub fn vulnerability_from_dto(dto: &VulnerabilityDto) -> Vulnerability {
    let advisory = &dto.security_advisory;
    Vulnerability {
        id: dto.id.clone(),
        ghsa_id: advisory.ghsa_id.clone(),
        severity: advisory.severity.clone(),
        summary: advisory.summary.clone(),
        published_at: advisory.published_at,
        permalink: advisory.permalink.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pr_dto() -> PullRequestDto {
        serde_json::from_value(json!({
            "id": "PR_1",
            "number": 4,
            "title": "Speed up search",
            "mergedAt": "2024-01-15T10:00:00Z",
            "milestone": { "id": "M_unknown" },
            "labels": { "nodes": [{ "id": "L_1" }, { "id": "L_gone" }] },
            "closingIssuesReferences": { "nodes": [{ "id": "I_1" }] }
        }))
        .unwrap()
    }

    #[test]
    fn unresolved_references_are_dropped() {
        let dto = pr_dto();
        let pr = pull_request_from_dto(&dto, &HashMap::new());
        assert_eq!(pr.milestone_id, None);

        let labels: HashSet<String> = ["L_1".to_string()].into();
        let rows = pull_request_labels_from_dto(&dto, &labels);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label_id, "L_1");

        assert!(pull_request_issues_from_dto(&dto, &HashSet::new()).is_empty());
    }

    #[test]
    fn issue_takes_planning_fields_from_project_item() {
        let dto: IssueDto = serde_json::from_value(json!({
            "id": "I_1",
            "number": 10,
            "title": "Epic",
            "state": "OPEN",
            "parent": { "id": "I_0" }
        }))
        .unwrap();
        let item_dto: ProjectItemDto = serde_json::from_value(json!({
            "id": "PVTI_1",
            "content": { "id": "I_1" },
            "points": { "number": 8.0 },
            "priority": { "optionId": "P_high", "name": "High" }
        }))
        .unwrap();
        let (item, priority) = project_item_from_dto(&item_dto).unwrap();
        assert_eq!(priority.unwrap().name, "High");

        let items = HashMap::from([(item.issue_id.clone(), item)]);
        let issue = issue_from_dto(&dto, &items);
        assert_eq!(issue.points, Some(8.0));
        assert_eq!(issue.issue_priority_id.as_deref(), Some("P_high"));
        assert_eq!(issue.parent_id.as_deref(), Some("I_0"));
    }

    #[test]
    fn draft_project_items_are_skipped() {
        let dto: ProjectItemDto = serde_json::from_value(json!({ "id": "PVTI_2" })).unwrap();
        assert!(project_item_from_dto(&dto).is_none());
    }
}
