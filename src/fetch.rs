//! Pulls one Notion database (metadata plus every page) into a `CachedDatabase`.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::cache::{timestamp, CachedDatabase};
use crate::config::Fetch;
use crate::normalize::simplify_page;
use crate::notion::model::RetrieveDatabaseResp;
use crate::notion::{NotionApi, NotionError};
use crate::retry::RetryPolicy;
use crate::sync::SyncError;

/// Pagination bounds for a single database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub page_size: u32,
    /// Records kept per database; anything past this is dropped.
    pub max_records: usize,
}

impl FetchLimits {
    pub fn from_config(fetch: &Fetch) -> Self {
        Self {
            page_size: fetch.page_size,
            max_records: fetch.max_pages_per_db,
        }
    }
}

#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(CachedDatabase),
    /// The database does not exist (or is not visible); the sync goes on without it.
    Skipped,
}

pub struct Fetcher<'a> {
    api: &'a dyn NotionApi,
    limits: FetchLimits,
    retry: RetryPolicy,
}

impl<'a> Fetcher<'a> {
    pub fn new(api: &'a dyn NotionApi, limits: FetchLimits, retry: RetryPolicy) -> Self {
        Self { api, limits, retry }
    }

    /// Database metadata, retried on transport failures.
    pub async fn retrieve(&self, db_id: &str) -> Result<RetrieveDatabaseResp, NotionError> {
        self.retry.run(|| self.api.retrieve_database(db_id)).await
    }

    #[instrument(skip_all, fields(key = %key, db_id = %db_id))]
    pub async fn fetch(&self, key: &str, db_id: &str) -> Result<FetchOutcome, SyncError> {
        let fail = |err: NotionError| -> Result<FetchOutcome, SyncError> {
            match err {
                NotionError::NotFound => {
                    warn!("database not found; skipping");
                    Ok(FetchOutcome::Skipped)
                }
                NotionError::AccessDenied { .. } => Err(SyncError::AccessDenied {
                    key: key.to_string(),
                    db_id: db_id.to_string(),
                }),
                source => Err(SyncError::Fetch {
                    key: key.to_string(),
                    source,
                }),
            }
        };

        let meta = match self.retrieve(db_id).await {
            Ok(meta) => meta,
            Err(err) => return fail(err),
        };
        let raw_pages = match self.collect_pages(db_id).await {
            Ok(pages) => pages,
            Err(err) => return fail(err),
        };

        let schema = meta.schema();
        let pages = raw_pages
            .iter()
            .map(|page| simplify_page(page, &schema))
            .collect::<Vec<_>>();
        let title = match meta.plain_title() {
            t if t.trim().is_empty() => key.to_string(),
            t => t,
        };
        debug!(pages = pages.len(), %title, "database fetched");

        Ok(FetchOutcome::Fetched(CachedDatabase {
            db_id: db_id.to_string(),
            fetched_at: timestamp(Utc::now()),
            title,
            schema,
            pages,
        }))
    }

    /// Follow `next_cursor` sequentially until the results run out or the
    /// record cap is reached.
    async fn collect_pages(&self, db_id: &str) -> Result<Vec<Value>, NotionError> {
        let mut pages: Vec<Value> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let resp = self
                .retry
                .run(|| {
                    self.api
                        .query_database(db_id, cursor.as_deref(), self.limits.page_size)
                })
                .await?;
            pages.extend(resp.results);

            if !resp.has_more || pages.len() >= self.limits.max_records {
                break;
            }
            match resp.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        if pages.len() > self.limits.max_records {
            debug!(
                dropped = pages.len() - self.limits.max_records,
                "record cap reached"
            );
            pages.truncate(self.limits.max_records);
        }
        Ok(pages)
    }
}
