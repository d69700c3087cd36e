#![allow(dead_code)]

use release_radar::config::{self, Config};
use release_radar::error::ClientError;
use release_radar::github::{GraphqlService, QueryDef};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn test_config() -> Config {
    let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
    cfg.app.lock_at_least_seconds = 0;
    cfg
}

/// One scripted reply: a retrieved object, or an HTTP status to fail with.
pub type Reply = Result<Value, u16>;

/// GraphQL double. Replies are queued per query name; queries that take a
/// `branch` variable are keyed `"{name}@{branch}"`. An exhausted queue
/// answers with an absent response.
#[derive(Clone, Default)]
pub struct RecordingGraphql {
    replies: Arc<Mutex<HashMap<String, VecDeque<Reply>>>>,
    calls: Arc<Mutex<Vec<(String, Map<String, Value>)>>>,
}

impl RecordingGraphql {
    pub async fn script(&self, key: &str, replies: Vec<Reply>) {
        self.replies
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .extend(replies);
    }

    pub async fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().await.clone()
    }

    pub async fn calls_for(&self, key: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|(k, _)| k == key)
            .count()
    }
}

#[async_trait::async_trait]
impl GraphqlService for RecordingGraphql {
    async fn execute(
        &self,
        query: &QueryDef,
        variables: &Map<String, Value>,
    ) -> Result<Option<Value>, ClientError> {
        let key = match variables.get("branch").and_then(Value::as_str) {
            Some(branch) => format!("{}@{}", query.name, branch),
            None => query.name.to_string(),
        };
        self.calls.lock().await.push((key.clone(), variables.clone()));
        let reply = self
            .replies
            .lock()
            .await
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        match reply {
            None => Ok(None),
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(status)) => Err(ClientError::Status {
                query: query.name.to_string(),
                status,
                body: "scripted failure".into(),
            }),
        }
    }
}

/// A `nodes`-shaped connection page.
pub fn page(nodes: Vec<Value>, next: Option<&str>) -> Reply {
    Ok(json!({
        "nodes": nodes,
        "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next }
    }))
}

/// An `edges`-shaped connection page.
pub fn edge_page(nodes: Vec<Value>, next: Option<&str>) -> Reply {
    let edges: Vec<Value> = nodes.into_iter().map(|n| json!({ "node": n })).collect();
    Ok(json!({
        "edges": edges,
        "pageInfo": { "hasNextPage": next.is_some(), "endCursor": next }
    }))
}

pub fn pr_json(id: &str, number: i64, merged_at: &str) -> Value {
    json!({
        "id": id,
        "number": number,
        "title": format!("PR {}", number),
        "mergedAt": merged_at,
        "labels": { "nodes": [] },
        "closingIssuesReferences": { "nodes": [] }
    })
}
