//! On-disk snapshot of synced Notion databases.
//!
//! - `SnapshotStore` owns the cache file: tolerant loads, merge-preserving
//!   atomic saves.
//! - `shape` turns whatever layout the file has into `DatabaseView`s.
//!
//! Writers always produce the canonical layout (`CacheFile`); readers accept
//! several historical ones.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

pub mod shape;

pub use shape::{DatabaseView, Record, Snapshot};

pub const CACHE_VERSION: &str = "1";

/// Indentation of a database entry inside the pretty-printed cache file.
const ENTRY_INDENT: &str = "    ";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no cache at {0}")]
    Absent(PathBuf),
    #[error("cache at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Canonical cache file written by every sync.
#[derive(Debug, Clone, Serialize)]
pub struct CacheFile {
    pub version: String,
    pub synced_at: String,
    pub databases: DatabaseEntries,
}

/// Database key -> cached database as JSON text, in file order. Entries
/// carried over from a previous snapshot keep their exact text.
#[derive(Debug, Clone, Default)]
pub struct DatabaseEntries(Vec<(String, Box<RawValue>)>);

impl DatabaseEntries {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Raw JSON text of one entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, raw)| raw.get())
    }

    /// Parsed view of every entry, for summaries.
    pub fn to_values(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter_map(|(k, raw)| {
                serde_json::from_str(raw.get())
                    .ok()
                    .map(|value| (k.clone(), value))
            })
            .collect()
    }

    fn push(&mut self, key: String, raw: Box<RawValue>) {
        self.0.push((key, raw));
    }
}

impl Serialize for DatabaseEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, raw)| (k, raw)))
    }
}

impl<'de> Deserialize<'de> for DatabaseEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = DatabaseEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of cached databases")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = DatabaseEntries::default();
                while let Some((key, raw)) = map.next_entry::<String, Box<RawValue>>()? {
                    entries.push(key, raw);
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Only the part of a previous cache file a sync carries forward.
#[derive(Deserialize)]
struct PreviousFile {
    #[serde(default)]
    databases: Option<Box<RawValue>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CachedDatabase {
    pub db_id: String,
    pub fetched_at: String,
    pub title: String,
    /// Property name -> type tag, in declaration order.
    pub schema: Map<String, Value>,
    pub pages: Vec<SimplifiedPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimplifiedPage {
    pub id: String,
    pub url: String,
    pub title: String,
    pub props: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Pretty text for a freshly fetched database, indented to sit under `databases`.
fn entry_text(db: &CachedDatabase) -> Result<Box<RawValue>, CacheError> {
    let text = serde_json::to_string_pretty(db)?.replace('\n', &format!("\n{ENTRY_INDENT}"));
    Ok(RawValue::from_string(text)?)
}

/// Build the snapshot to write after a sync: freshly fetched databases first,
/// then every key from `previous` that was not re-fetched, copied verbatim.
pub fn merge(
    previous: DatabaseEntries,
    fetched: Vec<(String, CachedDatabase)>,
    synced_at: DateTime<Utc>,
) -> Result<CacheFile, CacheError> {
    let mut databases = DatabaseEntries::default();
    for (key, db) in fetched {
        databases.push(key, entry_text(&db)?);
    }
    for (key, raw) in previous.0 {
        if !databases.contains_key(&key) {
            databases.push(key, raw);
        }
    }

    Ok(CacheFile {
        version: CACHE_VERSION.to_string(),
        synced_at: timestamp(synced_at),
        databases,
    })
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String, CacheError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(CacheError::Absent(self.path.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Raw JSON content of the cache file.
    pub fn load_raw(&self) -> Result<Value, CacheError> {
        let content = self.read()?;
        serde_json::from_str(&content).map_err(|err| self.corrupt(err.to_string()))
    }

    /// Keyed database entries of the current file, as exact JSON text. Other
    /// layouts carry nothing.
    pub fn load_entries(&self) -> Result<DatabaseEntries, CacheError> {
        let content = self.read()?;
        let previous: PreviousFile =
            serde_json::from_str(&content).map_err(|err| self.corrupt(err.to_string()))?;
        let Some(raw) = previous.databases else {
            return Ok(DatabaseEntries::default());
        };
        match serde_json::from_str(raw.get()) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                debug!(%err, "previous cache has a non-keyed databases layout; nothing carried over");
                Ok(DatabaseEntries::default())
            }
        }
    }

    /// Load and normalize the cache into its canonical read-side form.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Snapshot, CacheError> {
        let raw = self.load_raw()?;
        Snapshot::from_value(raw).map_err(|reason| self.corrupt(reason))
    }

    /// Replace the cache file. Content goes to a sibling temp file first and is
    /// renamed over the target, so readers never observe a partial write.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn save(&self, file: &CacheFile) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let payload = serde_json::to_string_pretty(file)?;
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cache.json".into());
        let temp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

        fs::write(&temp_path, payload)?;
        if let Err(err) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        debug!(databases = file.databases.len(), "cache written");
        Ok(())
    }

    fn corrupt(&self, reason: String) -> CacheError {
        CacheError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }
}
