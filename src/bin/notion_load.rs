use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use notion_cache::cache::{CacheError, SnapshotStore};
use notion_cache::config::{self, Config};
use notion_cache::format::{self, OutputFormat};
use notion_cache::freshness::FreshnessPolicy;
use notion_cache::query::{self, Selection};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Render the local Notion cache for quick context"
)]
struct Args {
    /// Path to YAML config file (optional for reads)
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Cache file to read (overrides app.cache_path)
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Only databases whose name contains this (case-insensitive)
    #[arg(long)]
    db: Option<String>,

    /// Print an advisory line on stderr when the cache is stale
    #[arg(long)]
    stale_warn: bool,

    /// Exit 0 if the cache is present and fresh, 1 otherwise; prints nothing
    #[arg(long)]
    check: bool,

    /// Freshness window in minutes (overrides app.max_age_minutes)
    #[arg(long)]
    max_age: Option<u64>,
}

fn resolve(args: &Args) -> (Config, SnapshotStore, FreshnessPolicy) {
    let mut cfg = config::load_or_default(Some(&args.config)).unwrap_or_else(|err| {
        warn!(%err, "ignoring unreadable config");
        Config::default()
    });
    if let Some(minutes) = args.max_age {
        cfg.app.max_age_minutes = minutes;
    }
    let store = SnapshotStore::new(args.cache.clone().unwrap_or_else(|| cfg.resolved_cache_path()));
    let policy = cfg.freshness();
    (cfg, store, policy)
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.check {
        let (_, store, policy) = resolve(&args);
        return if policy.check(&store.load(), Utc::now()) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    println!("{}", render(&args));
    ExitCode::SUCCESS
}

/// Everything the read role prints. Failures become advisory lines.
fn render(args: &Args) -> String {
    let (cfg, store, policy) = resolve(args);
    let snapshot = match store.load() {
        Ok(snapshot) => snapshot,
        Err(CacheError::Absent(_)) => return "[notion_load] No cache. Run: notion_sync".into(),
        Err(err) => {
            warn!(%err, "cache unusable");
            return "[notion_load] Cache corrupt. Run: notion_sync --refresh".into();
        }
    };

    let now = Utc::now();
    let mut out = Vec::new();
    if args.stale_warn {
        if let Some(warning) = policy.stale_warning(&snapshot, now) {
            eprintln!("[notion_load] WARNING: {}", warning);
        }
    }

    if args.format == OutputFormat::Json {
        out.push(format::full_dump(&snapshot));
        return out.join("\n");
    }

    let selected = match query::select(&snapshot.databases, args.db.as_deref()) {
        Selection::Matched(dbs) => dbs,
        Selection::NoMatch { available } => {
            out.push(format!(
                "No database matching \"{}\". Available: {}",
                args.db.as_deref().unwrap_or_default(),
                available.join(", ")
            ));
            return out.join("\n");
        }
    };
    let prepared: Vec<_> = selected
        .into_iter()
        .map(|db| query::prepare(db, &cfg.query))
        .collect();

    out.push(match args.format {
        OutputFormat::Tasks => format::task_lines(&prepared, args.db.is_some(), &cfg.query),
        _ => format::grouped_text(&prepared, snapshot.synced_at, now, cfg.query.display_limit),
    });
    out.join("\n")
}
