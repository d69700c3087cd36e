//! Parent/sub-issue trees with point roll-ups and label-based pruning.
//!
//! Issues are held in an ID-keyed arena with explicit child ID lists; nodes
//! are only materialised when the tree is built. Parent links are assumed
//! acyclic.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::db::model::{Issue, IssuePriority, IssueType, Label, Milestone};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueNode {
    pub id: String,
    pub number: i64,
    pub title: String,
    pub state: String,
    pub closed_at: Option<DateTime<Utc>>,
    pub milestone: Option<Milestone>,
    pub issue_type: Option<IssueType>,
    pub priority: Option<IssuePriority>,
    pub business_value: Option<String>,
    pub labels: Vec<Label>,
    /// Own points (or the default) plus every descendant's, pruned or not.
    pub points: f64,
    pub children: Vec<IssueNode>,
}

/// Reference data resolved once per tree build.
#[derive(Debug, Clone, Default)]
pub struct TreeContext {
    pub milestones: HashMap<String, Milestone>,
    pub issue_types: HashMap<String, IssueType>,
    pub priorities: HashMap<String, IssuePriority>,
    /// Qualifying labels per issue ID.
    pub labels: HashMap<String, Vec<Label>>,
    pub default_points: f64,
}

#[derive(Debug, Default)]
pub struct IssueArena {
    issues: HashMap<String, Issue>,
    children: HashMap<String, Vec<String>>,
}

impl IssueArena {
    pub fn new(issues: impl IntoIterator<Item = Issue>) -> Self {
        let mut arena = IssueArena::default();
        for issue in issues {
            arena.issues.entry(issue.id.clone()).or_insert(issue);
        }
        let mut links: Vec<(&Issue, &str)> = arena
            .issues
            .values()
            .filter_map(|i| i.parent_id.as_deref().map(|p| (i, p)))
            .filter(|(_, parent)| arena.issues.contains_key(*parent))
            .collect();
        links.sort_by_key(|(i, _)| i.number);
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for (issue, parent) in links {
            children
                .entry(parent.to_string())
                .or_default()
                .push(issue.id.clone());
        }
        arena.children = children;
        arena
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.issues.keys().cloned().collect()
    }

    fn build(&self, id: &str, ctx: &TreeContext) -> Option<IssueNode> {
        let issue = self.issues.get(id)?;
        let children: Vec<IssueNode> = self
            .children
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.build(child, ctx))
            .collect();
        let points = issue.points.unwrap_or(ctx.default_points)
            + children.iter().map(|c| c.points).sum::<f64>();
        Some(IssueNode {
            id: issue.id.clone(),
            number: issue.number,
            title: issue.title.clone(),
            state: issue.state.clone(),
            closed_at: issue.closed_at,
            milestone: lookup(&ctx.milestones, issue.milestone_id.as_deref()),
            issue_type: lookup(&ctx.issue_types, issue.issue_type_id.as_deref()),
            priority: lookup(&ctx.priorities, issue.issue_priority_id.as_deref()),
            business_value: issue.business_value.clone(),
            labels: ctx.labels.get(id).cloned().unwrap_or_default(),
            points,
            children,
        })
    }
}

fn lookup<T: Clone>(map: &HashMap<String, T>, id: Option<&str>) -> Option<T> {
    id.and_then(|id| map.get(id)).cloned()
}

/// Roots of a flat set: members whose parent is not a member. Ordered by number.
pub fn roots(input: &[Issue]) -> Vec<&Issue> {
    let ids: HashSet<&str> = input.iter().map(|i| i.id.as_str()).collect();
    let mut roots: Vec<&Issue> = input
        .iter()
        .filter(|i| i.parent_id.as_deref().map_or(true, |p| !ids.contains(p)))
        .collect();
    roots.sort_by_key(|i| i.number);
    roots
}

/// Drop subtrees with no qualifying label anywhere in them.
pub fn prune(mut node: IssueNode) -> Option<IssueNode> {
    node.children = std::mem::take(&mut node.children)
        .into_iter()
        .filter_map(prune)
        .collect();
    if node.labels.is_empty() && node.children.is_empty() {
        None
    } else {
        Some(node)
    }
}

/// Build pruned trees for `input`. Children come from `arena`, which holds
/// `input` and, for on-demand views, their loaded descendants.
pub fn assemble(input: &[Issue], arena: &IssueArena, ctx: &TreeContext) -> Vec<IssueNode> {
    roots(input)
        .into_iter()
        .filter_map(|root| arena.build(&root.id, ctx))
        .filter_map(prune)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(id: &str, number: i64, parent: Option<&str>, points: Option<f64>) -> Issue {
        Issue {
            id: id.into(),
            number,
            title: id.into(),
            state: "OPEN".into(),
            closed_at: None,
            milestone_id: None,
            issue_type_id: None,
            issue_priority_id: None,
            points,
            parent_id: parent.map(str::to_string),
            business_value: None,
        }
    }

    fn ctx_with_labels(labelled: &[&str]) -> TreeContext {
        let label = Label {
            id: "L_1".into(),
            name: "feature".into(),
            description: None,
            color: "0075ca".into(),
        };
        TreeContext {
            labels: labelled
                .iter()
                .map(|id| (id.to_string(), vec![label.clone()]))
                .collect(),
            default_points: 3.0,
            ..Default::default()
        }
    }

    #[test]
    fn unlabelled_parent_survives_through_labelled_child() {
        let input = vec![
            issue("P", 1, None, Some(5.0)),
            issue("C", 2, Some("P"), None),
            issue("Q", 3, None, None),
            issue("D", 4, Some("Q"), None),
        ];
        let arena = IssueArena::new(input.clone());
        let trees = assemble(&input, &arena, &ctx_with_labels(&["C"]));
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].id, "P");
        assert_eq!(trees[0].children[0].id, "C");
        assert_eq!(trees[0].points, 8.0);
    }

    #[test]
    fn points_include_pruned_children() {
        let input = vec![
            issue("P", 1, None, Some(1.0)),
            issue("C1", 2, Some("P"), Some(2.0)),
            issue("C2", 3, Some("P"), None),
        ];
        let arena = IssueArena::new(input.clone());
        let trees = assemble(&input, &arena, &ctx_with_labels(&["P"]));
        assert_eq!(trees[0].points, 6.0);
        assert!(trees[0].children.is_empty());
    }

    #[test]
    fn orphaned_children_become_roots() {
        let input = vec![issue("C", 2, Some("missing"), None), issue("A", 1, None, None)];
        let found: Vec<_> = roots(&input).into_iter().map(|i| i.id.as_str()).collect();
        assert_eq!(found, vec!["A", "C"]);
    }

    #[test]
    fn on_demand_descendants_outside_input_are_children() {
        let epics = vec![issue("E", 1, None, None)];
        let arena = IssueArena::new(vec![
            issue("E", 1, None, None),
            issue("S1", 5, Some("E"), Some(1.0)),
            issue("S2", 6, Some("S1"), Some(2.0)),
        ]);
        let trees = assemble(&epics, &arena, &ctx_with_labels(&["S2"]));
        assert_eq!(trees[0].children[0].children[0].id, "S2");
        assert_eq!(trees[0].points, 6.0);
    }
}
