use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use release_radar::config;
use release_radar::db;
use release_radar::github::{GithubClient, QueryRegistry};
use release_radar::model::{PhaseOutcome, SyncPhase};
use release_radar::sync::SyncContext;

#[derive(Debug, Parser)]
#[command(author, version, about = "Run the sync phases once and exit")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run only this phase (e.g. labels, pull_requests, releases). Repeatable.
    #[arg(long = "phase")]
    phases: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut phases = Vec::new();
    for name in &args.phases {
        match SyncPhase::parse_phase(name) {
            Some(phase) => phases.push(phase),
            None => bail!("unknown phase {name}"),
        }
    }
    if phases.is_empty() {
        phases.extend(SyncPhase::ALL);
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let client = GithubClient::from_config(&cfg)?;
    let queries = QueryRegistry::builtin();
    let ctx = SyncContext::new(&pool, &client, &queries, &cfg);

    let mut failed = 0;
    for (phase, result) in ctx.run_phases(&phases).await {
        match result {
            Ok(PhaseOutcome::Synced { fetched }) => info!(%phase, fetched, "synced"),
            Ok(PhaseOutcome::Skipped) => info!(%phase, "up to date"),
            Ok(PhaseOutcome::Locked) => info!(%phase, "locked elsewhere"),
            Err(err) => {
                failed += 1;
                error!(%phase, error = %err, "failed");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} phase(s) failed");
    }
    Ok(())
}
