use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use notion_cache::cache::shape::parse_instant;
use notion_cache::cache::SnapshotStore;
use notion_cache::config;
use notion_cache::format::sync_summary;
use notion_cache::freshness::relative_time;
use notion_cache::notion::NotionClient;
use notion_cache::sync::{self, SyncOptions, SyncOutcome};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Pull the configured Notion databases into the local cache"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Cache file to write (overrides app.cache_path)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Sync even if the cache is still fresh
    #[arg(short, long)]
    refresh: bool,

    /// List what would be fetched and exit
    #[arg(long)]
    dry_run: bool,

    /// Print a per-database summary of the cache
    #[arg(long)]
    summary: bool,

    /// Freshness window in minutes (overrides app.max_age_minutes)
    #[arg(long)]
    max_age: Option<u64>,

    /// Additional database id to fetch; may be repeated
    #[arg(long = "db", value_name = "ID")]
    extra_ids: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let mut cfg = config::load_or_default(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if let Ok(token) = std::env::var("NOTION_TOKEN") {
        if !token.trim().is_empty() {
            cfg.notion.token = token;
        }
    }
    if let Some(minutes) = args.max_age {
        cfg.app.max_age_minutes = minutes;
    }

    let store = SnapshotStore::new(args.cache.clone().unwrap_or_else(|| cfg.resolved_cache_path()));
    if !args.dry_run {
        cfg.require_token()?;
    }
    let client = NotionClient::from_config(&cfg)?;

    let opts = SyncOptions {
        force: args.refresh,
        dry_run: args.dry_run,
        extra_ids: args.extra_ids.clone(),
    };
    info!(cache = %store.path().display(), "starting sync");

    match sync::run(&client, &cfg, &store, &opts).await? {
        SyncOutcome::DryRun(plan) => {
            println!("[notion_sync] Dry run. Would fetch {} databases:", plan.len());
            for (key, id) in plan {
                println!("  {}: {}", key, id);
            }
        }
        SyncOutcome::Fresh(snapshot) => {
            if args.summary {
                let databases = snapshot
                    .raw
                    .get("databases")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                println!("{}", sync_summary(&databases, snapshot.synced_at, Utc::now()));
            } else {
                let age = snapshot
                    .synced_at
                    .map(|at| relative_time(at, Utc::now()))
                    .unwrap_or_default();
                println!(
                    "[notion_sync] Cache is fresh (synced {}). Use --refresh to force.",
                    age
                );
            }
        }
        SyncOutcome::Synced(report) => {
            println!("{}", report.line());
            if !report.skipped.is_empty() {
                println!("Skipped (not found): {}", report.skipped.join(", "));
            }
            if args.summary {
                let databases: Map<String, Value> = report.file.databases.to_values();
                let synced_at = parse_instant(&report.file.synced_at);
                println!("{}", sync_summary(&databases, synced_at, Utc::now()));
            }
        }
    }
    Ok(())
}
