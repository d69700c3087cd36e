use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use release_radar::config;
use release_radar::db;
use release_radar::query::{self, ReadSettings};

#[derive(Debug, Parser)]
#[command(author, version, about = "Print release views from the local database as JSON")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Highlighted labels for a release
    #[arg(long, value_name = "RELEASE_ID")]
    highlights: Option<String>,

    /// Pull requests attributed to a release
    #[arg(long, value_name = "RELEASE_ID")]
    pull_requests: Option<String>,

    /// Issue tree of the issues closed by a release
    #[arg(long, value_name = "RELEASE_ID")]
    release_tree: Option<String>,

    /// Issue tree of a milestone
    #[arg(long, value_name = "MILESTONE_ID")]
    milestone_tree: Option<String>,

    /// Epic trees
    #[arg(long)]
    epics: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;
    let settings = ReadSettings::from_config(&cfg);

    if let Some(id) = &args.highlights {
        print_json(&query::release_highlights(&pool, &settings, id).await?)
    } else if let Some(id) = &args.pull_requests {
        print_json(&query::release_pull_requests(&pool, id).await?)
    } else if let Some(id) = &args.release_tree {
        print_json(&query::release_issue_tree(&pool, &settings, id).await?)
    } else if let Some(id) = &args.milestone_tree {
        print_json(&query::milestone_issue_tree(&pool, &settings, id).await?)
    } else if args.epics {
        print_json(&query::epic_issue_trees(&pool, &settings).await?)
    } else {
        print_json(&query::list_releases(&pool).await?)
    }
}
