use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use release_radar::config;
use release_radar::db;
use release_radar::github::{GithubClient, QueryRegistry};
use release_radar::sync::SyncContext;

#[derive(Debug, Parser)]
#[command(author, version, about = "Periodically sync repository metadata into SQLite")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let client = GithubClient::from_config(&cfg)?;
    let queries = QueryRegistry::builtin();
    let ctx = SyncContext::new(&pool, &client, &queries, &cfg);

    let mut ticker = tokio::time::interval(cfg.app.sync_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        owner = %cfg.github.owner,
        repository = %cfg.github.repository,
        interval_hours = cfg.app.sync_interval_hours,
        "starting sync scheduler"
    );
    loop {
        // First tick completes immediately, so the run on start comes for free.
        ticker.tick().await;
        let results = ctx.run_all().await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            error!(failed, "sync cycle finished with failed phases");
        } else {
            info!("sync cycle finished");
        }
    }
}
