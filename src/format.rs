//! Output renderers for the read role and the sync summary.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::cache::Snapshot;
use crate::config::Query;
use crate::freshness::relative_time;
use crate::query::{is_task_database, Item, PreparedDatabase};

/// Output modes of the read role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Grouped, truncated text per database.
    #[default]
    Text,
    /// The whole cache file, unfiltered.
    Json,
    /// Bare task lines.
    Tasks,
}

pub fn full_dump(snapshot: &Snapshot) -> String {
    serde_json::to_string_pretty(&snapshot.raw).unwrap_or_else(|_| snapshot.raw.to_string())
}

/// `[status] title (due: date)`, omitting the parts that are absent.
pub fn item_line(item: &Item) -> String {
    let mut line = match &item.status {
        Some(status) => format!("[{}] {}", status, item.title),
        None => item.title.clone(),
    };
    if let Some(due) = &item.due {
        line.push_str(&format!(" (due: {})", due));
    }
    line
}

fn more_line(hidden: usize) -> String {
    format!("... and {} more (use --format json for full list)", hidden)
}

fn age_label(synced_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<String> {
    synced_at.map(|at| relative_time(at, now))
}

pub fn grouped_text(
    databases: &[PreparedDatabase],
    synced_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    limit: usize,
) -> String {
    let age = age_label(synced_at, now);
    let mut lines = vec![
        format!(
            "NOTION CONTEXT (cached {})",
            age.as_deref().unwrap_or("unknown")
        ),
        "---".to_string(),
    ];

    for db in databases {
        lines.push(format!("{} ({} items):", db.name, db.items.len()));
        for item in db.items.iter().take(limit) {
            lines.push(format!("  {}", item_line(item)));
        }
        if db.items.len() > limit {
            lines.push(format!("  {}", more_line(db.items.len() - limit)));
        }
        if db.items.is_empty() {
            lines.push("  (empty)".to_string());
        }
        lines.push(String::new());
    }

    lines.push("---".to_string());
    let cache_label = match age {
        Some(age) => format!("Cache: {}", age),
        None => "Cache: unknown age".to_string(),
    };
    lines.push(format!(
        "[{}] [Run 'notion_sync --refresh' to update]",
        cache_label
    ));
    lines.join("\n")
}

/// Bare item lines. With several databases and no explicit name filter, only
/// task-like databases contribute.
pub fn task_lines(
    databases: &[PreparedDatabase],
    name_filter_given: bool,
    vocab: &Query,
) -> String {
    let restrict = databases.len() > 1 && !name_filter_given;
    let mut lines = Vec::new();
    for db in databases {
        if restrict && !is_task_database(&db.name, vocab) {
            continue;
        }
        lines.extend(db.items.iter().take(vocab.display_limit).map(item_line));
        if db.items.len() > vocab.display_limit {
            lines.push(more_line(db.items.len() - vocab.display_limit));
        }
    }
    lines.join("\n")
}

/// Summary printed by the sync role.
pub fn sync_summary(
    databases: &Map<String, Value>,
    synced_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    let page_count = |db: &Value| -> usize {
        match db {
            Value::Array(items) => items.len(),
            other => other
                .get("pages")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0),
        }
    };
    let total: usize = databases.values().map(page_count).sum();
    let age = synced_at
        .map(|at| format!("{}min ago", (now - at).num_minutes()))
        .unwrap_or_else(|| "at an unknown time".into());

    let mut lines = vec![format!(
        "[notion_sync] Cache: {} databases, {} pages total, synced {}",
        databases.len(),
        total,
        age
    )];
    for (key, db) in databases {
        let title = db.get("title").and_then(Value::as_str).unwrap_or(key);
        lines.push(format!("  {}: \"{}\" — {} pages", key, title, page_count(db)));
    }
    lines.join("\n")
}
