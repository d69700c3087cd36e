//! Cursor-based pagination over relay-style connections.
//!
//! Both envelope shapes GitHub returns are accepted:
//! `{ edges: [{ node }], pageInfo }` and `{ nodes: [..], pageInfo }`.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, instrument};

use super::model::RemoteRecord;
use super::{GraphqlService, QueryDef};
use crate::error::ClientError;

/// Variable under which the page cursor is injected on every request.
pub const CURSOR_VARIABLE: &str = "after";

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Edge<T> {
    pub node: T,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum Connection<T> {
    Edges {
        edges: Vec<Edge<T>>,
        #[serde(default, rename = "pageInfo")]
        page_info: PageInfo,
    },
    Nodes {
        nodes: Vec<T>,
        #[serde(default, rename = "pageInfo")]
        page_info: PageInfo,
    },
}

impl<T> Connection<T> {
    pub fn into_parts(self) -> (Vec<T>, PageInfo) {
        match self {
            Connection::Edges { edges, page_info } => {
                (edges.into_iter().map(|e| e.node).collect(), page_info)
            }
            Connection::Nodes { nodes, page_info } => (nodes, page_info),
        }
    }
}

/// Fetch every page of `query` and return the union of all records.
///
/// Records are deduplicated by external ID; order follows first appearance
/// but callers must not rely on it. An absent response or an empty page ends
/// pagination normally. Any error discards everything fetched so far.
#[instrument(skip_all, fields(query = query.name))]
pub async fn fetch_all<T>(
    client: &dyn GraphqlService,
    query: &QueryDef,
    variables: &Map<String, Value>,
) -> Result<Vec<T>, ClientError>
where
    T: DeserializeOwned + RemoteRecord,
{
    let mut variables = variables.clone();
    let mut cursor: Option<String> = None;
    let mut has_more = true;
    let mut seen: HashSet<String> = HashSet::new();
    let mut records: Vec<T> = Vec::new();
    let mut pages = 0usize;

    while has_more {
        variables.insert(
            CURSOR_VARIABLE.to_string(),
            cursor.clone().map(Value::String).unwrap_or(Value::Null),
        );
        let Some(body) = client.execute(query, &variables).await? else {
            break;
        };
        pages += 1;

        let connection: Connection<T> =
            serde_json::from_value(body).map_err(|source| ClientError::Decode {
                query: query.name.to_string(),
                source,
            })?;
        let (items, page_info) = connection.into_parts();
        if items.is_empty() {
            break;
        }

        for item in items {
            if seen.insert(item.external_id().to_string()) {
                records.push(item);
            }
        }
        cursor = page_info.end_cursor;
        has_more = page_info.has_next_page;
    }

    debug!(pages, fetched = records.len(), "pagination finished");
    Ok(records)
}

/// Run a non-paginated query and decode the retrieved object.
#[instrument(skip_all, fields(query = query.name))]
pub async fn fetch_one<T>(
    client: &dyn GraphqlService,
    query: &QueryDef,
    variables: &Map<String, Value>,
) -> Result<Option<T>, ClientError>
where
    T: DeserializeOwned,
{
    let Some(body) = client.execute(query, variables).await? else {
        return Ok(None);
    };
    serde_json::from_value(body)
        .map(Some)
        .map_err(|source| ClientError::Decode {
            query: query.name.to_string(),
            source,
        })
}
