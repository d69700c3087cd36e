//! Sync engine: fetches repository metadata phase by phase and reconciles it
//! with the local database.
//!
//! Every phase runs behind the count gate and its own lease lock. A failed
//! phase is reported and the run moves on to the next one.
use serde_json::{Map, Value};
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::db::Pool;
use crate::error::InjectionError;
use crate::github::model::RepositoryStats;
use crate::github::{self, pagination, queries, GraphqlService, QueryRegistry};
use crate::model::{PhaseOutcome, SyncPhase};

pub mod gate;
pub mod lock;
mod phases;
pub mod pull_requests;
pub mod releases;

pub type PhaseResult = Result<PhaseOutcome, InjectionError>;

/// Everything a sync run needs, borrowed for the duration of the run.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub pool: &'a Pool,
    pub client: &'a dyn GraphqlService,
    pub queries: &'a QueryRegistry,
    pub cfg: &'a Config,
}

impl<'a> SyncContext<'a> {
    pub fn new(
        pool: &'a Pool,
        client: &'a dyn GraphqlService,
        queries: &'a QueryRegistry,
        cfg: &'a Config,
    ) -> Self {
        Self {
            pool,
            client,
            queries,
            cfg,
        }
    }

    pub(crate) fn repository_variables(&self) -> Map<String, Value> {
        github::repository_variables(self.cfg)
    }

    /// Run every phase in order.
    pub async fn run_all(&self) -> Vec<(SyncPhase, PhaseResult)> {
        self.run_phases(&SyncPhase::ALL).await
    }

    /// Run the given phases in order, sharing one statistics snapshot.
    #[instrument(skip_all, fields(phases = phases.len()))]
    pub async fn run_phases(&self, phases: &[SyncPhase]) -> Vec<(SyncPhase, PhaseResult)> {
        let stats = self.fetch_stats().await;
        let mut results = Vec::with_capacity(phases.len());
        for &phase in phases {
            let result = self.run_phase(phase, stats.as_ref()).await;
            match &result {
                Ok(outcome) => info!(%phase, ?outcome, "phase finished"),
                Err(err) => error!(%phase, error = %err, "phase failed"),
            }
            results.push((phase, result));
        }
        results
    }

    /// Repository statistics for the gate. Failure is not fatal: phases
    /// simply fetch unconditionally.
    pub async fn fetch_stats(&self) -> Option<RepositoryStats> {
        let query = match self.queries.get(queries::REPOSITORY_STATS) {
            Ok(q) => q,
            Err(err) => {
                warn!(error = %err, "statistics query missing");
                return None;
            }
        };
        match pagination::fetch_one(self.client, query, &self.repository_variables()).await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "repository statistics unavailable; fetching everything");
                None
            }
        }
    }

    #[instrument(skip_all, fields(%phase))]
    pub async fn run_phase(
        &self,
        phase: SyncPhase,
        stats: Option<&RepositoryStats>,
    ) -> PhaseResult {
        let needed = gate::needs_sync(self.pool, stats, phase)
            .await
            .map_err(|e| InjectionError::new(phase, e))?;
        if !needed {
            return Ok(PhaseOutcome::Skipped);
        }

        let settings = lock::LeaseSettings::from_config(self.cfg);
        let Some(guard) = lock::try_acquire(self.pool, phase.as_str(), settings)
            .await
            .map_err(|e| InjectionError::new(phase, e))?
        else {
            info!(%phase, "phase locked by another instance");
            return Ok(PhaseOutcome::Locked);
        };

        let result = self
            .dispatch(phase)
            .await
            .map_err(|e| InjectionError::new(phase, e));

        if let Err(err) = guard.release(self.pool).await {
            warn!(%phase, error = %err, "failed to release phase lock");
        }
        result
    }

    async fn dispatch(&self, phase: SyncPhase) -> anyhow::Result<PhaseOutcome> {
        match phase {
            SyncPhase::Labels => phases::sync_labels(self).await,
            SyncPhase::Milestones => phases::sync_milestones(self).await,
            SyncPhase::IssueTypes => phases::sync_issue_types(self).await,
            SyncPhase::ProjectItems => phases::sync_project_items(self).await,
            SyncPhase::Branches => phases::sync_branches(self).await,
            SyncPhase::Issues => phases::sync_issues(self).await,
            SyncPhase::PullRequests => pull_requests::reconcile_pull_requests(self).await,
            SyncPhase::Releases => releases::inject_releases(self).await,
            SyncPhase::Vulnerabilities => phases::sync_vulnerabilities(self).await,
        }
    }
}
