use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ClientError;

pub mod convert;
pub mod model;
pub mod pagination;
pub mod queries;

pub use queries::{QueryDef, QueryRegistry};

/// Executes one GraphQL request and returns the object found at the query's
/// retrieve path, or `None` when the path is absent or null.
#[async_trait]
pub trait GraphqlService: Send + Sync {
    async fn execute(
        &self,
        query: &QueryDef,
        variables: &Map<String, Value>,
    ) -> Result<Option<Value>, ClientError>;
}

#[derive(Clone)]
pub struct GithubClient {
    http: Client,
    endpoint: Url,
    token: String,
}

impl fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl GithubClient {
    pub fn new(token: String, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint).context("invalid GitHub GraphQL endpoint")?;
        let http = Client::builder()
            .user_agent("release-radar/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint,
            token,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(cfg.github.token.clone(), &cfg.github.endpoint)
    }

    pub fn build_request(
        &self,
        query: &QueryDef,
        variables: &Map<String, Value>,
    ) -> Result<reqwest::Request, reqwest::Error> {
        let body = json!({
            "query": query.document,
            "variables": Value::Object(variables.clone()),
        });
        self.http
            .post(self.endpoint.clone())
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
            .json(&body)
            .build()
    }
}

#[async_trait]
impl GraphqlService for GithubClient {
    async fn execute(
        &self,
        query: &QueryDef,
        variables: &Map<String, Value>,
    ) -> Result<Option<Value>, ClientError> {
        let transport = |source| ClientError::Transport {
            query: query.name.to_string(),
            source,
        };
        let request = self.build_request(query, variables).map_err(transport)?;
        debug!(query = query.name, url = %request.url(), "graphql request");

        let res = self.http.execute(request).await.map_err(transport)?;
        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            let body = res.text().await.unwrap_or_default();
            warn!(query = query.name, %status, "rate limited by GitHub");
            return Err(ClientError::RateLimited {
                query: query.name.to_string(),
                body,
            });
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(query = query.name, %status, "GitHub API error");
            return Err(ClientError::Status {
                query: query.name.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let text = res.text().await.map_err(transport)?;
        let payload: GraphqlResponse =
            serde_json::from_str(&text).map_err(|source| ClientError::Decode {
                query: query.name.to_string(),
                source,
            })?;
        payload.into_retrieved(query)
    }
}

#[derive(Deserialize, Debug)]
struct GraphqlErrorEntry {
    message: String,
}

#[derive(Deserialize, Debug)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<GraphqlErrorEntry>>,
}

impl GraphqlResponse {
    fn into_retrieved(self, query: &QueryDef) -> Result<Option<Value>, ClientError> {
        if let Some(errors) = self.errors.filter(|e| !e.is_empty()) {
            let messages = errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ClientError::Graphql {
                query: query.name.to_string(),
                messages,
            });
        }
        Ok(self
            .data
            .and_then(|data| retrieve(data, query.retrieve_path)))
    }
}

/// Walk a dot-separated path into a JSON value. Null leaves count as absent.
pub fn retrieve(mut value: Value, path: &str) -> Option<Value> {
    for key in path.split('.').filter(|k| !k.is_empty()) {
        value = match value {
            Value::Object(mut map) => map.remove(key)?,
            _ => return None,
        };
    }
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}

/// Base variables shared by every repository-scoped query.
pub fn repository_variables(cfg: &Config) -> Map<String, Value> {
    let mut vars = Map::new();
    vars.insert("owner".into(), Value::String(cfg.github.owner.clone()));
    vars.insert("name".into(), Value::String(cfg.github.repository.clone()));
    vars.insert("pageSize".into(), Value::from(cfg.github.page_size));
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_walks_nested_objects() {
        let data = json!({ "repository": { "labels": { "nodes": [] } } });
        let found = retrieve(data, "repository.labels").unwrap();
        assert_eq!(found, json!({ "nodes": [] }));
    }

    #[test]
    fn retrieve_treats_null_and_missing_as_absent() {
        assert!(retrieve(json!({ "repository": null }), "repository.labels").is_none());
        assert!(retrieve(json!({ "repository": {} }), "repository.labels").is_none());
        assert!(retrieve(json!({ "organization": { "projectV2": null } }), "organization.projectV2").is_none());
    }

    #[test]
    fn graphql_errors_become_client_errors() {
        let registry = QueryRegistry::builtin();
        let query = registry.get(queries::LABELS).unwrap();
        let payload: GraphqlResponse = serde_json::from_value(json!({
            "data": null,
            "errors": [{ "message": "Could not resolve" }, { "message": "again" }]
        }))
        .unwrap();
        match payload.into_retrieved(query) {
            Err(ClientError::Graphql { query, messages }) => {
                assert_eq!(query, "labels");
                assert_eq!(messages, "Could not resolve; again");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn build_request_sets_headers_and_body() {
        let client = GithubClient::new("token".into(), "https://api.github.com/graphql").unwrap();
        let registry = QueryRegistry::builtin();
        let query = registry.get(queries::BRANCHES).unwrap();
        let mut vars = Map::new();
        vars.insert("owner".into(), json!("acme"));
        let request = client.build_request(query, &vars).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/graphql");
        assert_eq!(
            request
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap(),
            "Bearer token"
        );
        let body: Value =
            serde_json::from_slice(request.body().and_then(|b| b.as_bytes()).unwrap()).unwrap();
        assert_eq!(body["variables"]["owner"], "acme");
        assert!(body["query"].as_str().unwrap().contains("refs("));
    }

    #[test]
    fn repository_variables_from_example_config() {
        let cfg: Config = serde_yaml::from_str(crate::config::example()).unwrap();
        let vars = repository_variables(&cfg);
        assert_eq!(vars["owner"], "acme");
        assert_eq!(vars["name"], "platform");
        assert_eq!(vars["pageSize"], 100);
    }
}
