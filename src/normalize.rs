//! Reduces Notion's typed property objects to a small closed set of values.
//!
//! Every remote property becomes one [`PropValue`] or `None`. Unknown type
//! tags and properties without content both yield `None`; nothing here fails.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::cache::SimplifiedPage;

pub const UNTITLED: &str = "Untitled";

/// Declared property types understood by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Title,
    RichText,
    Number,
    Select,
    MultiSelect,
    Status,
    Checkbox,
    Date,
    Url,
    Email,
    PhoneNumber,
    Relation,
    Rollup,
    Formula,
    People,
    Files,
    CreatedTime,
    LastEditedTime,
    CreatedBy,
    LastEditedBy,
    UniqueId,
}

impl PropertyKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "title" => Self::Title,
            "rich_text" => Self::RichText,
            "number" => Self::Number,
            "select" => Self::Select,
            "multi_select" => Self::MultiSelect,
            "status" => Self::Status,
            "checkbox" => Self::Checkbox,
            "date" => Self::Date,
            "url" => Self::Url,
            "email" => Self::Email,
            "phone_number" => Self::PhoneNumber,
            "relation" => Self::Relation,
            "rollup" => Self::Rollup,
            "formula" => Self::Formula,
            "people" => Self::People,
            "files" => Self::Files,
            "created_time" => Self::CreatedTime,
            "last_edited_time" => Self::LastEditedTime,
            "created_by" => Self::CreatedBy,
            "last_edited_by" => Self::LastEditedBy,
            "unique_id" => Self::UniqueId,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// A normalized property value. String lists and id lists are both `List`
/// of `Text`; the owning schema tells them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    /// Only appears as an element of a rollup array.
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Range(DateRange),
    List(Vec<PropValue>),
}

impl PropValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Start instant of a date-like value.
    pub fn date_start(&self) -> Option<&str> {
        match self {
            PropValue::Text(s) => Some(s),
            PropValue::Range(r) => Some(&r.start),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Concatenated `plain_text` of a rich text array.
pub fn plain_text(items: &[Value]) -> String {
    items
        .iter()
        .filter_map(|t| t.get("plain_text").and_then(Value::as_str))
        .collect()
}

fn rich_text(prop: &Value, field: &str) -> String {
    prop.get(field)
        .and_then(Value::as_array)
        .map(|items| plain_text(items))
        .unwrap_or_default()
}

fn non_empty(s: String) -> Option<PropValue> {
    if s.is_empty() {
        None
    } else {
        Some(PropValue::Text(s))
    }
}

fn str_field(v: Option<&Value>) -> Option<PropValue> {
    v.and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| PropValue::Text(s.to_string()))
}

fn name_or_id(v: Option<&Value>) -> Option<String> {
    let v = v?;
    v.get("name")
        .and_then(Value::as_str)
        .or_else(|| v.get("id").and_then(Value::as_str))
        .map(str::to_string)
}

fn list_of<F>(prop: &Value, field: &str, f: F) -> Option<PropValue>
where
    F: Fn(&Value) -> Option<String>,
{
    let items = prop.get(field).and_then(Value::as_array);
    let values: Vec<PropValue> = items
        .map(|items| items.iter().filter_map(&f).map(PropValue::Text).collect())
        .unwrap_or_default();
    Some(PropValue::List(values))
}

fn date_value(date: Option<&Value>) -> Option<PropValue> {
    let date = date?;
    let start = date.get("start").and_then(Value::as_str)?.to_string();
    match date.get("end").and_then(Value::as_str) {
        Some(end) => Some(PropValue::Range(DateRange {
            start,
            end: Some(end.to_string()),
        })),
        None => Some(PropValue::Text(start)),
    }
}

fn number(v: Option<&Value>) -> Option<PropValue> {
    match v {
        Some(Value::Number(n)) => Some(PropValue::Number(n.clone())),
        _ => None,
    }
}

/// Normalize one property object (`{"type": "...", "<type>": ...}`).
pub fn normalize_property(prop: &Value) -> Option<PropValue> {
    let tag = prop.get("type").and_then(Value::as_str)?;
    let kind = PropertyKind::from_tag(tag)?;
    let body = prop.get(tag);
    match kind {
        PropertyKind::Title | PropertyKind::RichText => non_empty(rich_text(prop, tag)),
        PropertyKind::Number => number(body),
        PropertyKind::Select | PropertyKind::Status => {
            str_field(body.and_then(|b| b.get("name")))
        }
        PropertyKind::MultiSelect => list_of(prop, tag, |o| {
            o.get("name").and_then(Value::as_str).map(str::to_string)
        }),
        PropertyKind::Checkbox => Some(PropValue::Bool(
            body.and_then(Value::as_bool).unwrap_or(false),
        )),
        PropertyKind::Date => date_value(body),
        PropertyKind::Url
        | PropertyKind::Email
        | PropertyKind::PhoneNumber
        | PropertyKind::CreatedTime
        | PropertyKind::LastEditedTime => str_field(body),
        PropertyKind::Relation => list_of(prop, tag, |r| {
            r.get("id").and_then(Value::as_str).map(str::to_string)
        }),
        PropertyKind::Rollup => normalize_rollup(body?),
        PropertyKind::Formula => normalize_formula(body?),
        PropertyKind::People => list_of(prop, tag, |p| name_or_id(Some(p))),
        PropertyKind::Files => list_of(prop, tag, |f| {
            let name = f
                .get("name")
                .and_then(Value::as_str)
                .or_else(|| f.pointer("/external/url").and_then(Value::as_str))
                .or_else(|| f.pointer("/file/url").and_then(Value::as_str))
                .unwrap_or("");
            Some(name.to_string())
        }),
        PropertyKind::CreatedBy | PropertyKind::LastEditedBy => {
            name_or_id(body).map(PropValue::Text)
        }
        PropertyKind::UniqueId => {
            let body = body.filter(|b| b.is_object())?;
            let prefix = body.get("prefix").and_then(Value::as_str).unwrap_or("");
            let number = body
                .get("number")
                .filter(|n| !n.is_null())
                .map(|n| n.to_string())
                .unwrap_or_default();
            Some(PropValue::Text(format!("{prefix}{number}")))
        }
    }
}

fn normalize_rollup(rollup: &Value) -> Option<PropValue> {
    match rollup.get("type").and_then(Value::as_str)? {
        "number" => number(rollup.get("number")),
        "date" => date_value(rollup.get("date")),
        "array" => {
            let items = rollup.get("array").and_then(Value::as_array)?;
            Some(PropValue::List(
                items
                    .iter()
                    .map(|item| normalize_property(item).unwrap_or(PropValue::Null))
                    .collect(),
            ))
        }
        _ => None,
    }
}

fn normalize_formula(formula: &Value) -> Option<PropValue> {
    match formula.get("type").and_then(Value::as_str)? {
        "string" => str_field(formula.get("string")),
        "number" => number(formula.get("number")),
        "boolean" => formula.get("boolean").and_then(Value::as_bool).map(PropValue::Bool),
        "date" => date_value(formula.get("date")),
        _ => None,
    }
}

/// Resolve a page title: the title-typed property, else a text property
/// literally named `Name` or `Title`, else [`UNTITLED`].
pub fn resolve_title(properties: &Map<String, Value>, schema: &Map<String, Value>) -> String {
    let declared = |name: &str, prop: &Value| -> Option<String> {
        prop.get("type")
            .and_then(Value::as_str)
            .or_else(|| schema.get(name).and_then(Value::as_str))
            .map(str::to_string)
    };

    let title = properties
        .iter()
        .find(|(name, prop)| declared(name.as_str(), prop).as_deref() == Some("title"))
        .map(|(_, prop)| rich_text(prop, "title"))
        .or_else(|| {
            ["Name", "Title"].iter().find_map(|name| {
                let prop = properties.get(*name)?;
                normalize_property(prop)
                    .and_then(|v| v.as_text().map(str::to_string))
            })
        })
        .unwrap_or_default();

    if title.trim().is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

/// Convert one raw Notion page into its cached form. Title-typed properties are
/// lifted into `title`; every other property is kept only when it normalizes
/// to a value.
pub fn simplify_page(page: &Value, schema: &Map<String, Value>) -> SimplifiedPage {
    let empty = Map::new();
    let properties = page
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let mut props = Map::new();
    for (name, prop) in properties {
        let tag = prop
            .get("type")
            .and_then(Value::as_str)
            .or_else(|| schema.get(name).and_then(Value::as_str));
        if tag == Some("title") {
            continue;
        }
        if let Some(value) = normalize_property(prop) {
            props.insert(name.clone(), value.to_json());
        }
    }

    SimplifiedPage {
        id: str_or_empty(page.get("id")),
        url: str_or_empty(page.get("url")),
        title: resolve_title(properties, schema),
        props,
        created_time: page
            .get("created_time")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn str_or_empty(v: Option<&Value>) -> String {
    v.and_then(Value::as_str).unwrap_or_default().to_string()
}
