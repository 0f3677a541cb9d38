use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use notion_cache::config;
use notion_cache::fetch::{FetchLimits, Fetcher};
use notion_cache::notion::NotionClient;

#[derive(Parser, Debug)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Database ID to inspect
    #[arg(long)]
    db_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = config::load_or_default(Some(&args.config))?;
    if let Ok(token) = std::env::var("NOTION_TOKEN") {
        cfg.notion.token = token;
    }
    cfg.require_token()?;
    let client = NotionClient::from_config(&cfg)?;
    let fetcher = Fetcher::new(&client, FetchLimits::from_config(&cfg.fetch), cfg.retry_policy());

    let db = fetcher.retrieve(&args.db_id).await?;
    println!("Database ID: {}", db.id);
    println!("Title: {}", db.plain_title());
    println!("Properties:");
    for (name, typ) in db.schema() {
        println!("  {} -> {}", name, typ.as_str().unwrap_or("?"));
    }
    Ok(())
}
