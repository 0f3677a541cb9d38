//! Read-side adapter over the cache layouts seen in the wild.
//!
//! The layout is detected once, here, and converted into `DatabaseView`s.
//! Nothing downstream looks at the raw layout again.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::normalize::{simplify_page, UNTITLED};

/// Top-level keys that carry metadata, never a database.
const RESERVED_KEYS: &[&str] = &[
    "synced_at",
    "syncedAt",
    "last_sync",
    "version",
    "metadata",
    "databases",
    "pages",
];

const SYNCED_AT_KEYS: &[&str] = &["synced_at", "syncedAt", "last_sync"];

const FLAT_PAGES_NAME: &str = "Pages";

/// A record in canonical read-side form.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub url: String,
    pub title: String,
    pub props: Map<String, Value>,
    pub created_time: Option<String>,
}

/// One named database with its records. `schema` maps property name to type
/// tag when known; legacy layouts may leave it empty.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseView {
    pub name: String,
    pub schema: Map<String, Value>,
    pub records: Vec<Record>,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    /// File content as loaded, for the full dump.
    pub raw: Value,
    pub synced_at: Option<DateTime<Utc>>,
    pub databases: Vec<DatabaseView>,
}

enum CacheShape<'a> {
    /// `{"databases": {"<name>": [...] | {"pages": [...], ...}}}`
    Keyed(&'a Map<String, Value>),
    /// `{"databases": [{"title"|"name"|"id": ..., "pages"|"results": [...]}]}`
    Listed(&'a [Value]),
    /// `{"pages": [...]}`
    FlatPages(&'a [Value]),
    /// `{"<name>": [...], ...}`
    TopLevel(Vec<(&'a str, &'a [Value])>),
}

impl<'a> CacheShape<'a> {
    fn detect(root: &'a Map<String, Value>) -> Self {
        match root.get("databases") {
            Some(Value::Object(map)) => return CacheShape::Keyed(map),
            Some(Value::Array(list)) => return CacheShape::Listed(list),
            _ => {}
        }
        if let Some(Value::Array(pages)) = root.get("pages") {
            return CacheShape::FlatPages(pages);
        }
        CacheShape::TopLevel(
            root.iter()
                .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
                .filter_map(|(key, value)| match value {
                    Value::Array(items) if !items.is_empty() => Some((key.as_str(), items.as_slice())),
                    _ => None,
                })
                .collect(),
        )
    }

    fn into_views(self) -> Vec<DatabaseView> {
        match self {
            CacheShape::Keyed(map) => map
                .iter()
                .map(|(name, entry)| match entry {
                    Value::Array(items) => DatabaseView::build(name, Map::new(), items),
                    other => DatabaseView::build(name, schema_of(other), pages_of(other)),
                })
                .collect(),
            CacheShape::Listed(list) => list
                .iter()
                .map(|entry| {
                    let name = ["title", "name", "id"]
                        .iter()
                        .find_map(|k| entry.get(*k).and_then(Value::as_str))
                        .unwrap_or("Unknown");
                    DatabaseView::build(name, schema_of(entry), pages_of(entry))
                })
                .collect(),
            CacheShape::FlatPages(pages) => {
                vec![DatabaseView::build(FLAT_PAGES_NAME, Map::new(), pages)]
            }
            CacheShape::TopLevel(entries) => entries
                .into_iter()
                .map(|(name, items)| DatabaseView::build(name, Map::new(), items))
                .collect(),
        }
    }
}

fn schema_of(entry: &Value) -> Map<String, Value> {
    entry
        .get("schema")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn pages_of(entry: &Value) -> &[Value] {
    entry
        .get("pages")
        .or_else(|| entry.get("results"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

impl DatabaseView {
    fn build(name: &str, mut schema: Map<String, Value>, items: &[Value]) -> Self {
        let records = items
            .iter()
            .filter_map(|item| Record::from_value(item, &mut schema))
            .collect();
        Self {
            name: name.to_string(),
            schema,
            records,
        }
    }

    /// Declared type tag of a property, if known.
    pub fn type_of(&self, prop: &str) -> Option<&str> {
        self.schema.get(prop).and_then(Value::as_str)
    }
}

impl Record {
    /// Accepts both cached records (`{id, url, title, props}`) and raw Notion
    /// pages (`{properties: {...}}`). Types found inline on raw pages are
    /// added to `schema`.
    fn from_value(item: &Value, schema: &mut Map<String, Value>) -> Option<Self> {
        let obj = item.as_object()?;

        if let Some(properties) = obj.get("properties").and_then(Value::as_object) {
            for (name, prop) in properties {
                if let Some(tag) = prop.get("type").and_then(Value::as_str) {
                    if !schema.contains_key(name) {
                        schema.insert(name.clone(), Value::String(tag.to_string()));
                    }
                }
            }
            let page = simplify_page(item, schema);
            return Some(Self {
                id: page.id,
                url: page.url,
                title: page.title,
                props: page.props,
                created_time: page.created_time,
            });
        }

        let text = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            id: text("id").unwrap_or_default(),
            url: text("url").unwrap_or_default(),
            title: text("title")
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            props: obj
                .get("props")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            created_time: text("created_time"),
        })
    }
}

impl Snapshot {
    /// Normalize a parsed cache file. Errors describe why the content cannot
    /// be a cache at all.
    pub fn from_value(raw: Value) -> Result<Self, String> {
        let root = raw
            .as_object()
            .ok_or_else(|| "top-level value is not an object".to_string())?;

        let synced_at_raw = SYNCED_AT_KEYS
            .iter()
            .find_map(|k| root.get(*k).and_then(Value::as_str));
        let synced_at = synced_at_raw.and_then(parse_instant);
        let databases = CacheShape::detect(root).into_views();

        if synced_at_raw.is_none()
            && databases.is_empty()
            && !root.contains_key("databases")
            && !root.contains_key("pages")
        {
            return Err("no sync timestamp and no databases".into());
        }

        Ok(Self {
            raw,
            synced_at,
            databases,
        })
    }

    pub fn database_names(&self) -> Vec<&str> {
        self.databases.iter().map(|db| db.name.as_str()).collect()
    }
}

/// Parse an RFC 3339 instant or a bare `YYYY-MM-DD` date (taken as UTC midnight).
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn names(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.database_names()
    }

    #[test]
    fn canonical_layout() {
        let snapshot = Snapshot::from_value(json!({
            "version": "1",
            "synced_at": "2025-01-01T00:00:00.000Z",
            "databases": {
                "tasks": {
                    "db_id": "t",
                    "title": "Tasks",
                    "schema": {"Status": "status", "Due": "date"},
                    "pages": [{"id": "1", "url": "u", "title": "A", "props": {"Status": "Todo"}}]
                }
            }
        }))
        .unwrap();
        assert_eq!(names(&snapshot), vec!["tasks"]);
        let db = &snapshot.databases[0];
        assert_eq!(db.type_of("Status"), Some("status"));
        assert_eq!(db.records[0].title, "A");
        assert_eq!(db.records[0].props["Status"], "Todo");
        assert!(snapshot.synced_at.is_some());
    }

    #[test]
    fn keyed_record_arrays() {
        let snapshot = Snapshot::from_value(json!({
            "synced_at": "2025-01-01T00:00:00Z",
            "databases": {"Tasks": [{"title": "x"}], "Empty": "nonsense"}
        }))
        .unwrap();
        assert_eq!(names(&snapshot), vec!["Tasks", "Empty"]);
        assert_eq!(snapshot.databases[0].records.len(), 1);
        assert!(snapshot.databases[1].records.is_empty());
    }

    #[test]
    fn listed_databases() {
        let snapshot = Snapshot::from_value(json!({
            "synced_at": "2025-01-01T00:00:00Z",
            "databases": [
                {"id": "db-1", "results": [{"title": "r"}]},
                {"name": "Named", "pages": []},
                {"pages": [{"title": "q"}]}
            ]
        }))
        .unwrap();
        assert_eq!(names(&snapshot), vec!["db-1", "Named", "Unknown"]);
        assert_eq!(snapshot.databases[0].records[0].title, "r");
    }

    #[test]
    fn flat_pages_and_raw_notion_pages() {
        let snapshot = Snapshot::from_value(json!({
            "syncedAt": "2025-01-01T00:00:00Z",
            "pages": [{
                "id": "p1",
                "created_time": "2024-12-01T00:00:00.000Z",
                "properties": {
                    "Name": {"type": "title", "title": [{"plain_text": "Raw page"}]},
                    "Status": {"type": "status", "status": {"name": "Done"}}
                }
            }]
        }))
        .unwrap();
        assert_eq!(names(&snapshot), vec!["Pages"]);
        let db = &snapshot.databases[0];
        assert_eq!(db.type_of("Status"), Some("status"));
        let rec = &db.records[0];
        assert_eq!(rec.title, "Raw page");
        assert_eq!(rec.props["Status"], "Done");
        assert_eq!(rec.created_time.as_deref(), Some("2024-12-01T00:00:00.000Z"));
    }

    #[test]
    fn top_level_arrays_skip_reserved_and_empty() {
        let snapshot = Snapshot::from_value(json!({
            "synced_at": "2025-01-01T00:00:00Z",
            "metadata": [1],
            "version": "1",
            "Tasks": [{"title": "a"}],
            "Ideas": [],
            "Notes": [{"title": "n"}, 42]
        }))
        .unwrap();
        assert_eq!(names(&snapshot), vec!["Tasks", "Notes"]);
        assert_eq!(snapshot.databases[1].records.len(), 1);
    }

    #[test]
    fn rejects_content_without_timestamp_or_data() {
        assert!(Snapshot::from_value(json!({"foo": "bar"})).is_err());
        assert!(Snapshot::from_value(json!("string")).is_err());
        assert!(Snapshot::from_value(json!({"pages": []})).is_ok());
    }

    #[test]
    fn untitled_placeholder_for_blank_titles() {
        let snapshot = Snapshot::from_value(json!({"Tasks": [{"title": "  "}, {}]})).unwrap();
        let titles: Vec<&str> = snapshot.databases[0]
            .records
            .iter()
            .map(|r| r.title.as_str())
            .collect();
        assert_eq!(titles, vec![UNTITLED, UNTITLED]);
        assert!(snapshot.synced_at.is_none());
    }

    #[test]
    fn parses_instants_and_dates() {
        assert!(parse_instant("2025-01-05").is_some());
        assert!(parse_instant("2025-01-05T10:00:00.000+02:00").is_some());
        assert!(parse_instant("next tuesday").is_none());
        assert!(parse_instant("2025-01-01").unwrap() < parse_instant("2025-01-01T00:00:01Z").unwrap());
    }
}
