use serde::Deserialize;
use serde_json::{Map, Value};

use crate::normalize::plain_text;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct RetrieveDatabaseResp {
    pub id: String,
    #[serde(default)]
    pub title: Vec<Value>,
    /// Property name -> property object; declaration order is preserved.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl RetrieveDatabaseResp {
    pub fn plain_title(&self) -> String {
        plain_text(&self.title)
    }

    /// Property name -> declared type tag, in declaration order.
    pub fn schema(&self) -> Map<String, Value> {
        self.properties
            .iter()
            .filter_map(|(name, prop)| {
                let tag = prop.get("type").and_then(Value::as_str)?;
                Some((name.clone(), Value::String(tag.to_string())))
            })
            .collect()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct QueryDatabaseResp {
    #[serde(default)]
    pub results: Vec<Value>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}
