use anyhow::Result;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use notion_cache::cache::{timestamp, CacheError, SnapshotStore};
use notion_cache::config::Query;
use notion_cache::format;
use notion_cache::query::{self, Selection};

fn records() -> Value {
    json!([
        {"id": "1", "url": "", "title": "Write report", "props": {"Status": "Todo", "Due": "2025-01-05"}},
        {"id": "2", "url": "", "title": "Ship it", "props": {"Status": "Done", "Due": "2025-01-02"}},
        {"id": "3", "url": "", "title": "Plan", "props": {"Status": "In progress"}},
        {"id": "4", "url": "", "title": "Review", "props": {"Status": "Todo", "Due": "2025-01-01"}},
        {"id": "5", "url": "", "title": "Archive old", "props": {"Status": "Archived"}}
    ])
}

fn render_tasks(cache: Value) -> String {
    let td = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(td.path().join("cache.json"));
    fs::write(store.path(), cache.to_string()).unwrap();
    let snapshot = store.load().unwrap();
    let vocab = Query::default();
    let Selection::Matched(selected) = query::select(&snapshot.databases, None) else {
        panic!("no filter, everything matches");
    };
    let prepared: Vec<_> = selected.into_iter().map(|db| query::prepare(db, &vocab)).collect();
    format::task_lines(&prepared, false, &vocab)
}

#[test]
fn top_level_and_keyed_layouts_render_identically() {
    let synced_at = "2025-01-01T00:00:00.000Z";
    let top_level = render_tasks(json!({ "Tasks": records(), "synced_at": synced_at }));
    let keyed = render_tasks(json!({ "databases": { "Tasks": records() }, "synced_at": synced_at }));

    assert_eq!(top_level, keyed);
    assert_eq!(
        top_level,
        "[Todo] Review (due: 2025-01-01)\n[Todo] Write report (due: 2025-01-05)\n[In progress] Plan"
    );
}

#[test]
fn missing_and_corrupt_cache_are_distinguished() {
    let td = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(td.path().join("cache.json"));
    assert!(matches!(store.load(), Err(CacheError::Absent(_))));
    fs::write(store.path(), "not json at all").unwrap();
    assert!(matches!(store.load(), Err(CacheError::Corrupt { .. })));
}

fn write_cache(dir: &Path, minutes_old: i64) -> Result<std::path::PathBuf> {
    let path = dir.join("cache.json");
    let cache = json!({
        "version": "1",
        "synced_at": timestamp(Utc::now() - Duration::minutes(minutes_old)),
        "databases": {
            "tasks": {
                "db_id": "t",
                "fetched_at": timestamp(Utc::now()),
                "title": "Tasks",
                "schema": {"Name": "title", "Status": "status"},
                "pages": [{"id": "1", "url": "", "title": "Only task", "props": {"Status": "Todo"}}]
            }
        }
    });
    fs::write(&path, serde_json::to_string_pretty(&cache)?)?;
    Ok(path)
}

fn notion_load(dir: &Path, cache: &Path, extra: &[&str]) -> Result<Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_notion_load"))
        .arg("--config")
        .arg(dir.join("none.yaml"))
        .arg("--cache")
        .arg(cache)
        .args(extra)
        .env_remove("RUST_LOG")
        .output()?)
}

#[test]
fn check_mode_fails_silently_on_stale_cache() -> Result<()> {
    let td = tempfile::tempdir()?;
    let stale = write_cache(td.path(), 90)?;
    let out = notion_load(td.path(), &stale, &["--check"])?;
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    assert!(out.stderr.is_empty());
    Ok(())
}

#[test]
fn check_mode_succeeds_on_fresh_cache_and_fails_on_missing() -> Result<()> {
    let td = tempfile::tempdir()?;
    let fresh = write_cache(td.path(), 5)?;
    let out = notion_load(td.path(), &fresh, &["--check"])?;
    assert!(out.status.success());
    assert!(out.stdout.is_empty());

    let out = notion_load(td.path(), &td.path().join("absent.json"), &["--check"])?;
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    Ok(())
}

#[test]
fn read_role_degrades_to_advisories() -> Result<()> {
    let td = tempfile::tempdir()?;
    let out = notion_load(td.path(), &td.path().join("absent.json"), &[])?;
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8(out.stdout)?.trim_end(),
        "[notion_load] No cache. Run: notion_sync"
    );

    let corrupt = td.path().join("corrupt.json");
    fs::write(&corrupt, "{ nope")?;
    let out = notion_load(td.path(), &corrupt, &[])?;
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8(out.stdout)?.trim_end(),
        "[notion_load] Cache corrupt. Run: notion_sync --refresh"
    );
    Ok(())
}

#[test]
fn read_role_renders_text_and_reports_filter_misses() -> Result<()> {
    let td = tempfile::tempdir()?;
    let cache = write_cache(td.path(), 90)?;

    let out = notion_load(td.path(), &cache, &["--stale-warn"])?;
    let text = String::from_utf8(out.stdout)?;
    assert!(String::from_utf8(out.stderr)?.contains("[notion_load] WARNING: cache is stale"));
    assert!(text.starts_with("NOTION CONTEXT (cached 1h ago)"));
    assert!(text.contains("tasks (1 items):\n  [Todo] Only task"));

    let out = notion_load(td.path(), &cache, &["--db", "inbox"])?;
    assert_eq!(
        String::from_utf8(out.stdout)?.trim_end(),
        "No database matching \"inbox\". Available: tasks"
    );

    let out = notion_load(td.path(), &cache, &["--format", "json"])?;
    let dumped: Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(dumped["databases"]["tasks"]["title"], "Tasks");
    Ok(())
}

#[test]
fn stale_warning_keeps_json_output_parseable() -> Result<()> {
    let td = tempfile::tempdir()?;
    let cache = write_cache(td.path(), 90)?;
    let out = notion_load(td.path(), &cache, &["--format", "json", "--stale-warn"])?;
    assert!(out.status.success());

    let dumped: Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(dumped["databases"]["tasks"]["pages"][0]["title"], "Only task");
    let stderr = String::from_utf8(out.stderr)?;
    assert!(stderr.contains("cache is stale (synced 1h ago)"));
    assert!(stderr.contains("notion_sync --refresh"));
    Ok(())
}

#[test]
fn check_mode_accepts_huge_max_age() -> Result<()> {
    let td = tempfile::tempdir()?;
    let cache = write_cache(td.path(), 60 * 24 * 365)?;
    for max_age in ["200000000000000000", "18446744073709551615"] {
        let out = notion_load(td.path(), &cache, &["--check", "--max-age", max_age])?;
        assert_eq!(out.status.code(), Some(0), "--max-age {max_age}");
        assert!(out.stdout.is_empty());
        assert!(out.stderr.is_empty());
    }
    Ok(())
}
