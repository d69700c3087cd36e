mod common;

use chrono::{TimeZone, Utc};
use common::{setup_pool, test_config};
use release_radar::db::{
    self,
    model::{
        Issue, IssueLabel, IssueType, Label, Milestone, PullRequest, PullRequestIssue,
        PullRequestLabel, Release, ReleasePullRequest,
    },
};
use release_radar::error::ReadError;
use release_radar::query::{self, ReadSettings};

fn label(id: &str, color: &str) -> Label {
    Label {
        id: id.into(),
        name: id.into(),
        description: None,
        color: color.into(),
    }
}

fn issue(id: &str, number: i64, parent: Option<&str>) -> Issue {
    Issue {
        id: id.into(),
        number,
        title: format!("Issue {}", number),
        state: "CLOSED".into(),
        closed_at: None,
        milestone_id: Some("M_1".into()),
        issue_type_id: None,
        issue_priority_id: None,
        points: None,
        parent_id: parent.map(str::to_string),
        business_value: None,
    }
}

fn pull_request(id: &str, number: i64) -> PullRequest {
    PullRequest {
        id: id.into(),
        number,
        title: id.into(),
        merged_at: Some(Utc.with_ymd_and_hms(2024, 1, number as u32, 0, 0, 0).unwrap()),
        milestone_id: None,
    }
}

async fn seed_release(pool: &sqlx::SqlitePool) {
    let release = Release {
        id: "R_1".into(),
        tag_name: "v7.8.0".into(),
        name: "v7.8.0".into(),
        published_at: Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()),
        branch_id: None,
        commit_sha: Some("abc123".into()),
    };
    let prs: Vec<PullRequest> = (1..=10).map(|n| pull_request(&format!("PR_{n}"), n)).collect();
    let assignments: Vec<ReleasePullRequest> = prs
        .iter()
        .map(|pr| ReleasePullRequest {
            release_id: "R_1".into(),
            pull_request_id: pr.id.clone(),
        })
        .collect();
    db::upsert_pull_requests(pool, &prs).await.unwrap();
    db::save_release_timeline(pool, &[release], &assignments)
        .await
        .unwrap();
}

#[tokio::test]
async fn priority_labels_rank_before_popular_ones() {
    let pool = setup_pool().await;
    let cfg = test_config();
    seed_release(&pool).await;
    db::upsert_labels(
        &pool,
        &[
            label("urgent", "B60205"),
            label("feature", "0075ca"),
            label("triage", "ededed"),
        ],
    )
    .await
    .unwrap();

    // "feature" on all ten pull requests, "urgent" reached twice, once via a closed issue.
    let mut pr_labels: Vec<PullRequestLabel> = (1..=10)
        .map(|n| PullRequestLabel {
            pull_request_id: format!("PR_{n}"),
            label_id: "feature".into(),
        })
        .collect();
    pr_labels.push(PullRequestLabel {
        pull_request_id: "PR_1".into(),
        label_id: "urgent".into(),
    });
    pr_labels.push(PullRequestLabel {
        pull_request_id: "PR_2".into(),
        label_id: "triage".into(),
    });
    db::insert_pull_request_labels(&pool, &pr_labels).await.unwrap();
    db::upsert_issues(&pool, &[issue("I_1", 1, None)]).await.unwrap();
    db::insert_pull_request_issues(
        &pool,
        &[PullRequestIssue {
            pull_request_id: "PR_3".into(),
            issue_id: "I_1".into(),
        }],
    )
    .await
    .unwrap();
    db::insert_issue_labels(
        &pool,
        &[IssueLabel {
            issue_id: "I_1".into(),
            label_id: "urgent".into(),
        }],
    )
    .await
    .unwrap();

    let settings = ReadSettings::from_config(&cfg);
    let ranked = query::release_highlights(&pool, &settings, "R_1").await.unwrap();
    let ids: Vec<_> = ranked.iter().map(|h| h.label.id.as_str()).collect();
    assert_eq!(ids, vec!["urgent", "feature"]);
    assert_eq!(ranked[0].occurrences, 2);
    assert_eq!(ranked[1].occurrences, 10);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let pool = setup_pool().await;
    let settings = ReadSettings::from_config(&test_config());

    let err = query::release_highlights(&pool, &settings, "R_404")
        .await
        .unwrap_err();
    assert!(matches!(err, ReadError::NotFound { kind: "release", ref id } if id == "R_404"));

    let err = query::milestone_issue_tree(&pool, &settings, "M_404")
        .await
        .unwrap_err();
    assert!(matches!(err, ReadError::NotFound { kind: "milestone", .. }));
}

#[tokio::test]
async fn milestone_tree_prunes_unlabelled_branches() {
    let pool = setup_pool().await;
    let settings = ReadSettings::from_config(&test_config());
    db::upsert_milestones(
        &pool,
        &[Milestone {
            id: "M_1".into(),
            number: 1,
            title: "7.8".into(),
            state: "OPEN".into(),
            due_on: None,
            closed_at: None,
        }],
    )
    .await
    .unwrap();
    db::upsert_labels(&pool, &[label("feature", "0075ca"), label("triage", "EDEDED")])
        .await
        .unwrap();
    db::upsert_issues(
        &pool,
        &[
            issue("P", 1, None),
            issue("C", 2, Some("P")),
            issue("Q", 3, None),
            issue("D", 4, Some("Q")),
        ],
    )
    .await
    .unwrap();
    db::insert_issue_labels(
        &pool,
        &[
            IssueLabel {
                issue_id: "C".into(),
                label_id: "feature".into(),
            },
            // Excluded color does not qualify.
            IssueLabel {
                issue_id: "D".into(),
                label_id: "triage".into(),
            },
        ],
    )
    .await
    .unwrap();

    let trees = query::milestone_issue_tree(&pool, &settings, "M_1").await.unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].id, "P");
    assert_eq!(trees[0].milestone.as_ref().unwrap().title, "7.8");
    assert_eq!(trees[0].points, 6.0);
    assert_eq!(trees[0].children.len(), 1);
    assert_eq!(trees[0].children[0].labels[0].id, "feature");
}

#[tokio::test]
async fn epic_trees_load_sub_issues_on_demand() {
    let pool = setup_pool().await;
    let settings = ReadSettings::from_config(&test_config());
    db::upsert_issue_types(
        &pool,
        &[IssueType {
            id: "T_epic".into(),
            name: "Epic".into(),
            description: None,
            color: None,
        }],
    )
    .await
    .unwrap();
    db::upsert_labels(&pool, &[label("feature", "0075ca")]).await.unwrap();

    let mut epic = issue("E", 1, None);
    epic.issue_type_id = Some("T_epic".into());
    epic.milestone_id = None;
    let mut task = issue("T", 2, Some("E"));
    task.points = Some(2.0);
    let mut sub = issue("S", 3, Some("T"));
    sub.points = Some(1.0);
    db::upsert_issues(&pool, &[epic, task, sub]).await.unwrap();
    db::insert_issue_labels(
        &pool,
        &[IssueLabel {
            issue_id: "S".into(),
            label_id: "feature".into(),
        }],
    )
    .await
    .unwrap();

    let trees = query::epic_issue_trees(&pool, &settings).await.unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].issue_type.as_ref().unwrap().name, "Epic");
    assert_eq!(trees[0].children[0].children[0].id, "S");
    assert_eq!(trees[0].points, 6.0);
}

#[tokio::test]
async fn release_tree_uses_closed_issues() {
    let pool = setup_pool().await;
    let settings = ReadSettings::from_config(&test_config());
    seed_release(&pool).await;
    db::upsert_labels(&pool, &[label("feature", "0075ca")]).await.unwrap();
    db::upsert_issues(&pool, &[issue("I_1", 1, None), issue("I_2", 2, None)])
        .await
        .unwrap();
    db::insert_pull_request_issues(
        &pool,
        &[PullRequestIssue {
            pull_request_id: "PR_1".into(),
            issue_id: "I_1".into(),
        }],
    )
    .await
    .unwrap();
    db::insert_issue_labels(
        &pool,
        &[
            IssueLabel {
                issue_id: "I_1".into(),
                label_id: "feature".into(),
            },
            IssueLabel {
                issue_id: "I_2".into(),
                label_id: "feature".into(),
            },
        ],
    )
    .await
    .unwrap();

    let trees = query::release_issue_tree(&pool, &settings, "R_1").await.unwrap();
    let ids: Vec<_> = trees.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["I_1"]);
    assert_eq!(query::release_pull_requests(&pool, "R_1").await.unwrap().len(), 10);
}
