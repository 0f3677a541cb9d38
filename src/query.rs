//! Selection, filtering and ordering over a loaded snapshot.
//!
//! Status and due date are guessed from property types and names using the
//! vocabularies in [`crate::config::Query`]; see `status_of` and `due_of`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Ordering;

use crate::cache::shape::parse_instant;
use crate::cache::{DatabaseView, Record};
use crate::config::Query;
use crate::normalize::PropValue;

/// Outcome of a name-filtered selection.
#[derive(Debug, PartialEq)]
pub enum Selection<'a> {
    Matched(Vec<&'a DatabaseView>),
    /// A filter was given and nothing matched.
    NoMatch { available: Vec<String> },
}

/// Pick databases by name: case-insensitive substring or exact match.
pub fn select<'a>(databases: &'a [DatabaseView], filter: Option<&str>) -> Selection<'a> {
    let Some(filter) = filter else {
        return Selection::Matched(databases.iter().collect());
    };
    let needle = filter.to_lowercase();
    let matched: Vec<&DatabaseView> = databases
        .iter()
        .filter(|db| db.name.to_lowercase().contains(&needle) || db.name == filter)
        .collect();
    if matched.is_empty() {
        return Selection::NoMatch {
            available: databases.iter().map(|db| db.name.clone()).collect(),
        };
    }
    Selection::Matched(matched)
}

/// One record ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub title: String,
    pub status: Option<String>,
    pub due: Option<String>,
    due_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDatabase {
    pub name: String,
    pub items: Vec<Item>,
}

/// Filter out done-like records (only for databases at or above the filter
/// threshold), then order by due date and creation time.
pub fn prepare(db: &DatabaseView, vocab: &Query) -> PreparedDatabase {
    let apply_filter = db.records.len() >= vocab.filter_threshold;
    let mut items: Vec<Item> = db
        .records
        .iter()
        .map(|record| item(db, record, vocab))
        .filter(|item| {
            !apply_filter
                || !item
                    .status
                    .as_deref()
                    .map(|s| is_done(s, vocab))
                    .unwrap_or(false)
        })
        .collect();
    sort_items(&mut items);
    PreparedDatabase {
        name: db.name.clone(),
        items,
    }
}

fn item(db: &DatabaseView, record: &Record, vocab: &Query) -> Item {
    let due = due_of(db, record, vocab);
    Item {
        title: record.title.clone(),
        status: status_of(db, record, vocab),
        due_at: due.as_deref().and_then(parse_instant),
        due,
        created_at: created_of(db, record),
    }
}

pub fn is_done(status: &str, vocab: &Query) -> bool {
    let status = status.trim();
    vocab
        .done_statuses
        .iter()
        .any(|done| done.eq_ignore_ascii_case(status))
}

/// Items with a due date first, ascending; then by creation time. Stable, so
/// full ties keep snapshot order.
pub fn sort_items(items: &mut [Item]) {
    items.sort_by(|a, b| {
        let by_due = match (a.due_at, b.due_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_due.then_with(|| {
            let epoch = DateTime::<Utc>::default();
            a.created_at.unwrap_or(epoch).cmp(&b.created_at.unwrap_or(epoch))
        })
    });
}

/// Properties in schema declaration order, then any the schema does not list.
fn ordered_props<'a>(db: &'a DatabaseView, record: &'a Record) -> Vec<(&'a str, &'a Value)> {
    let mut out: Vec<(&str, &Value)> = db
        .schema
        .keys()
        .filter_map(|name| record.props.get(name).map(|v| (name.as_str(), v)))
        .collect();
    out.extend(
        record
            .props
            .iter()
            .filter(|(name, _)| !db.schema.contains_key(*name))
            .map(|(name, v)| (name.as_str(), v)),
    );
    out
}

fn text_value(v: &Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn in_vocab(name: &str, list: &[String]) -> bool {
    list.iter().any(|entry| entry.eq_ignore_ascii_case(name.trim()))
}

/// Status: a `status`-typed property, else one named like a status field,
/// else a `select` whose value looks like a workflow state.
pub fn status_of(db: &DatabaseView, record: &Record, vocab: &Query) -> Option<String> {
    let props = ordered_props(db, record);

    props
        .iter()
        .find(|(name, _)| db.type_of(name) == Some("status"))
        .and_then(|(_, v)| text_value(v))
        .or_else(|| {
            props
                .iter()
                .filter(|(name, _)| in_vocab(name, &vocab.status_properties))
                .find_map(|(_, v)| text_value(v))
        })
        .or_else(|| {
            props
                .iter()
                .filter(|(name, _)| db.type_of(name) == Some("select"))
                .filter_map(|(_, v)| text_value(v))
                .find(|value| {
                    let lower = value.to_lowercase();
                    vocab
                        .status_values
                        .iter()
                        .any(|s| lower.contains(&s.to_lowercase()))
                })
        })
}

fn date_start(v: &Value) -> Option<String> {
    let value: PropValue = serde_json::from_value(v.clone()).ok()?;
    value.date_start().map(str::to_string)
}

/// Due date: a date property named like a due field, else the first date
/// property in schema order. Without a schema, only named properties count.
pub fn due_of(db: &DatabaseView, record: &Record, vocab: &Query) -> Option<String> {
    let props = ordered_props(db, record);

    props
        .iter()
        .filter(|(name, _)| in_vocab(name, &vocab.due_date_properties))
        .filter(|(name, v)| match db.type_of(name) {
            Some(tag) => tag == "date",
            None => looks_like_date(v),
        })
        .find_map(|(_, v)| date_start(v))
        .or_else(|| {
            props
                .iter()
                .filter(|(name, _)| db.type_of(name) == Some("date"))
                .find_map(|(_, v)| date_start(v))
        })
}

fn looks_like_date(v: &Value) -> bool {
    date_start(v).and_then(|s| parse_instant(&s)).is_some()
}

/// Creation instant: the record's own timestamp, else a `created_time` property.
fn created_of(db: &DatabaseView, record: &Record) -> Option<DateTime<Utc>> {
    record
        .created_time
        .as_deref()
        .and_then(parse_instant)
        .or_else(|| {
            ordered_props(db, record)
                .into_iter()
                .find(|(name, _)| db.type_of(name) == Some("created_time"))
                .and_then(|(_, v)| v.as_str())
                .and_then(parse_instant)
        })
}

/// Whether a database name reads like a task list.
pub fn is_task_database(name: &str, vocab: &Query) -> bool {
    let name = name.to_lowercase();
    vocab
        .task_markers
        .iter()
        .any(|marker| name.contains(&marker.to_lowercase()))
}
