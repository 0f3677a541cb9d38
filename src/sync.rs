//! One sync pass: freshness gate, concurrent fetch, merge, atomic write.

use chrono::Utc;
use futures::future::try_join_all;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::cache::{merge, CacheError, CacheFile, DatabaseEntries, Snapshot, SnapshotStore};
use crate::config::Config;
use crate::fetch::{FetchLimits, FetchOutcome, Fetcher};
use crate::notion::{NotionApi, NotionError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(
        "database {db_id} ({key}) is not shared with the integration. \
         Share it in Notion: open the database, \"...\" menu -> Add connections"
    )]
    AccessDenied { key: String, db_id: String },
    #[error("failed to fetch database {key}: {source}")]
    Fetch {
        key: String,
        #[source]
        source: NotionError,
    },
    #[error("no databases to sync; configure notion.databases or pass --db <id>")]
    NothingToSync,
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Sync even when the cache is fresh.
    pub force: bool,
    /// Report the plan without touching the network or the cache.
    pub dry_run: bool,
    /// Ad hoc database ids, stored under their id as key.
    pub extra_ids: Vec<String>,
}

#[derive(Debug)]
pub struct SyncReport {
    pub fetched: Vec<String>,
    pub skipped: Vec<String>,
    /// Pages across the databases fetched in this pass.
    pub pages: usize,
    pub elapsed: Duration,
    /// What was written.
    pub file: CacheFile,
}

impl SyncReport {
    pub fn line(&self) -> String {
        format!(
            "Synced {} databases -> {} pages total in {}ms",
            self.fetched.len(),
            self.pages,
            self.elapsed.as_millis()
        )
    }
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Cache was fresh; nothing fetched.
    Fresh(Snapshot),
    /// `(key, id)` pairs that would be fetched.
    DryRun(Vec<(String, String)>),
    Synced(SyncReport),
}

/// Pinned databases in key order, then ad hoc ids not already pinned.
pub fn plan(cfg: &Config, extra_ids: &[String]) -> Vec<(String, String)> {
    let mut plan: Vec<(String, String)> = cfg
        .notion
        .databases
        .iter()
        .map(|(key, id)| (key.clone(), id.clone()))
        .collect();
    for id in extra_ids {
        let id = id.trim();
        if id.is_empty() || plan.iter().any(|(key, pinned)| pinned == id || key == id) {
            continue;
        }
        plan.push((id.to_string(), id.to_string()));
    }
    plan
}

#[instrument(skip_all, fields(cache = %store.path().display()))]
pub async fn run(
    api: &dyn NotionApi,
    cfg: &Config,
    store: &SnapshotStore,
    opts: &SyncOptions,
) -> Result<SyncOutcome, SyncError> {
    let plan = plan(cfg, &opts.extra_ids);
    if opts.dry_run {
        return Ok(SyncOutcome::DryRun(plan));
    }

    if !opts.force && opts.extra_ids.is_empty() {
        let loaded = store.load();
        if !cfg.freshness().needs_refresh(&loaded, Utc::now()) {
            if let Ok(snapshot) = loaded {
                info!("cache is fresh; skipping sync");
                return Ok(SyncOutcome::Fresh(snapshot));
            }
        }
    }

    if plan.is_empty() {
        return Err(SyncError::NothingToSync);
    }

    let started = Instant::now();
    let previous = match store.load_entries() {
        Ok(entries) => entries,
        Err(CacheError::Absent(_)) => DatabaseEntries::default(),
        Err(err) => {
            warn!(%err, "previous cache unreadable; nothing will be carried over");
            DatabaseEntries::default()
        }
    };

    let fetcher = Fetcher::new(
        api,
        FetchLimits::from_config(&cfg.fetch),
        cfg.retry_policy(),
    );
    let fetcher = &fetcher;
    let outcomes = try_join_all(plan.iter().map(|(key, id)| async move {
        fetcher
            .fetch(key, id)
            .await
            .map(|outcome| (key.clone(), outcome))
    }))
    .await?;

    let mut fetched = Vec::new();
    let mut skipped = Vec::new();
    for (key, outcome) in outcomes {
        match outcome {
            FetchOutcome::Fetched(db) => fetched.push((key, db)),
            FetchOutcome::Skipped => skipped.push(key),
        }
    }

    let pages = fetched.iter().map(|(_, db)| db.pages.len()).sum();
    let fetched_keys = fetched.iter().map(|(key, _)| key.clone()).collect();
    let file = merge(previous, fetched, Utc::now())?;
    store.save(&file)?;

    let report = SyncReport {
        fetched: fetched_keys,
        skipped,
        pages,
        elapsed: started.elapsed(),
        file,
    };
    info!(
        fetched = report.fetched.len(),
        skipped = report.skipped.len(),
        pages = report.pages,
        total = report.file.databases.len(),
        "sync complete"
    );
    Ok(SyncOutcome::Synced(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg_with(dbs: &[(&str, &str)]) -> Config {
        let mut cfg = Config::default();
        for (key, id) in dbs {
            cfg.notion.databases.insert(key.to_string(), id.to_string());
        }
        cfg
    }

    #[test]
    fn plan_appends_new_extra_ids() {
        let cfg = cfg_with(&[("tasks", "t-1"), ("projects", "p-1")]);
        let extras = vec!["x-9".to_string(), "t-1".to_string(), " ".to_string()];
        assert_eq!(
            plan(&cfg, &extras),
            vec![
                ("projects".to_string(), "p-1".to_string()),
                ("tasks".to_string(), "t-1".to_string()),
                ("x-9".to_string(), "x-9".to_string()),
            ]
        );
    }

    #[test]
    fn access_denied_message_tells_operator_what_to_do() {
        let err = SyncError::AccessDenied {
            key: "tasks".into(),
            db_id: "abc".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc (tasks)"));
        assert!(msg.contains("Add connections"));
    }

    #[test]
    fn report_line() {
        let report = SyncReport {
            fetched: vec!["a".into(), "b".into()],
            skipped: vec![],
            pages: 42,
            elapsed: Duration::from_millis(1234),
            file: merge(DatabaseEntries::default(), vec![], Utc::now()).unwrap(),
        };
        assert_eq!(report.line(), "Synced 2 databases -> 42 pages total in 1234ms");
    }
}
