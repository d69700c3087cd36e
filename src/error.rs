//! Error kinds shared by the sync engine and the read side.
use thiserror::Error;

use crate::model::SyncPhase;

/// A GraphQL call failed: transport, HTTP status, API error payload or decoding.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error for query {query}: {source}")]
    Transport {
        query: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("rate limited by GitHub while running {query}: {body}")]
    RateLimited { query: String, body: String },
    #[error("GitHub returned {status} for query {query}: {body}")]
    Status {
        query: String,
        status: u16,
        body: String,
    },
    #[error("GraphQL errors for query {query}: {messages}")]
    Graphql { query: String, messages: String },
    #[error("failed to decode response for query {query}: {source}")]
    Decode {
        query: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown query {0}")]
    UnknownQuery(String),
}

impl ClientError {
    pub fn query(&self) -> &str {
        match self {
            ClientError::Transport { query, .. }
            | ClientError::RateLimited { query, .. }
            | ClientError::Status { query, .. }
            | ClientError::Graphql { query, .. }
            | ClientError::Decode { query, .. } => query,
            ClientError::UnknownQuery(name) => name,
        }
    }
}

/// A whole sync phase failed and nothing further ran for it.
#[derive(Debug, Error)]
#[error("{phase} injection failed: {source}")]
pub struct InjectionError {
    pub phase: SyncPhase,
    #[source]
    pub source: anyhow::Error,
}

impl InjectionError {
    pub fn new(phase: SyncPhase, source: impl Into<anyhow::Error>) -> Self {
        Self {
            phase,
            source: source.into(),
        }
    }
}

/// Per-branch failure during pull-request reconciliation. Logged, never propagated.
#[derive(Debug, Error)]
#[error("failed to reconcile branch {branch}: {source}")]
pub struct LocalProcessingError {
    pub branch: String,
    #[source]
    pub source: anyhow::Error,
}

/// Errors surfaced to read-side callers.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl ReadError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ReadError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injection_error_names_phase() {
        let err = InjectionError::new(SyncPhase::Releases, anyhow::anyhow!("boom"));
        assert_eq!(err.to_string(), "releases injection failed: boom");
    }

    #[test]
    fn client_error_reports_query() {
        let err = ClientError::Graphql {
            query: "labels".into(),
            messages: "bad".into(),
        };
        assert_eq!(err.query(), "labels");
        assert_eq!(ClientError::UnknownQuery("x".into()).query(), "x");
    }

    #[test]
    fn not_found_is_distinct() {
        let err = ReadError::not_found("release", "R_1");
        assert!(matches!(err, ReadError::NotFound { kind: "release", .. }));
        assert_eq!(err.to_string(), "release R_1 not found");
    }
}
