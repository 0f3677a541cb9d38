use chrono::{DateTime, Duration, Utc};

use crate::cache::{CacheError, Snapshot};

/// Staleness window shared by the sync and read roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    max_age: Duration,
}

impl FreshnessPolicy {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    /// Windows too large for `Duration` saturate to `Duration::MAX`.
    pub fn from_minutes(minutes: u64) -> Self {
        let max_age = i64::try_from(minutes)
            .ok()
            .and_then(Duration::try_minutes)
            .unwrap_or(Duration::MAX);
        Self::new(max_age)
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// `now - synced_at < max_age`.
    pub fn is_fresh(&self, synced_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(synced_at) < self.max_age
    }

    /// A sync can be skipped only for a loadable snapshot with a fresh timestamp.
    pub fn needs_refresh(&self, loaded: &Result<Snapshot, CacheError>, now: DateTime<Utc>) -> bool {
        !self.check(loaded, now)
    }

    /// Strict readiness: present, parseable, timestamped and fresh.
    pub fn check(&self, loaded: &Result<Snapshot, CacheError>, now: DateTime<Utc>) -> bool {
        match loaded {
            Ok(snapshot) => snapshot
                .synced_at
                .map(|at| self.is_fresh(at, now))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Advisory line for a stale snapshot; `None` when fresh or untimestamped.
    pub fn stale_warning(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Option<String> {
        let synced_at = snapshot.synced_at?;
        if self.is_fresh(synced_at, now) {
            return None;
        }
        Some(format!(
            "cache is stale (synced {}). Run: notion_sync --refresh",
            relative_time(synced_at, now)
        ))
    }
}

/// Human-friendly age: `just now`, `12m ago`, `3h ago`, `2d ago`.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let mins = (now - then).num_minutes();
    if mins < 2 {
        return "just now".into();
    }
    if mins < 60 {
        return format!("{mins}m ago");
    }
    let hours = mins / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", hours / 24)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn snapshot_synced(at: DateTime<Utc>) -> Snapshot {
        Snapshot::from_value(json!({ "synced_at": crate::cache::timestamp(at), "databases": {} }))
            .unwrap()
    }

    #[test]
    fn boundary_around_max_age() {
        let now = Utc::now();
        for minutes in [1, 30, 60, 1440] {
            let policy = FreshnessPolicy::from_minutes(minutes);
            let max = policy.max_age();
            assert!(policy.is_fresh(now - (max - Duration::seconds(1)), now));
            assert!(!policy.is_fresh(now - (max + Duration::seconds(1)), now));
            assert!(!policy.is_fresh(now - max, now));
        }
    }

    #[test]
    fn huge_windows_saturate() {
        let now = Utc::now();
        for minutes in [200_000_000_000_000_000, i64::MAX as u64, u64::MAX] {
            let policy = FreshnessPolicy::from_minutes(minutes);
            assert_eq!(policy.max_age(), Duration::MAX);
            assert!(policy.is_fresh(now - Duration::days(365 * 100), now));
        }
    }

    #[test]
    fn check_rejects_stale_absent_and_corrupt() {
        let now = Utc::now();
        let policy = FreshnessPolicy::from_minutes(60);
        assert!(policy.check(&Ok(snapshot_synced(now - Duration::minutes(5))), now));
        assert!(!policy.check(&Ok(snapshot_synced(now - Duration::minutes(90))), now));
        assert!(!policy.check(&Err(CacheError::Absent(PathBuf::from("x"))), now));
        assert!(!policy.check(
            &Err(CacheError::Corrupt {
                path: PathBuf::from("x"),
                reason: "bad".into()
            }),
            now
        ));
        let untimestamped = Snapshot::from_value(json!({ "Tasks": [{"title": "a"}] })).unwrap();
        assert!(policy.needs_refresh(&Ok(untimestamped), now));
    }

    #[test]
    fn stale_warning_only_when_stale() {
        let now = Utc::now();
        let policy = FreshnessPolicy::from_minutes(60);
        assert!(policy
            .stale_warning(&snapshot_synced(now - Duration::minutes(10)), now)
            .is_none());
        let warning = policy
            .stale_warning(&snapshot_synced(now - Duration::minutes(90)), now)
            .unwrap();
        assert!(warning.contains("1h ago"));
    }

    #[test]
    fn relative_time_buckets() {
        let now = Utc::now();
        assert_eq!(relative_time(now - Duration::seconds(30), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(12), now), "12m ago");
        assert_eq!(relative_time(now - Duration::minutes(185), now), "3h ago");
        assert_eq!(relative_time(now - Duration::hours(50), now), "2d ago");
    }
}
