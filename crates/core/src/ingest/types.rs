use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// One page of the upstream analyst-action feed.
///
/// Items stay raw until ingestion so that one malformed record does not reject its page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    /// Continuation cursor; empty once the feed is exhausted.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub next_page: String,
}

impl FeedPage {
    pub fn next_cursor(&self) -> Option<&str> {
        let cursor = self.next_page.trim();
        (!cursor.is_empty()).then_some(cursor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    pub ticker: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub company: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub action: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub brokerage: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rating_from: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rating_to: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub target_from: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub target_to: String,
    pub time: DateTime<Utc>,
}

impl FeedRecord {
    pub fn from_item(item: &serde_json::Value) -> anyhow::Result<Self> {
        Self::deserialize(item).context("malformed feed record")
    }
}

/// Raw string field of an undecoded item, for logging.
pub fn item_field<'a>(item: &'a serde_json::Value, field: &str) -> &'a str {
    item.get(field)
        .and_then(serde_json::Value::as_str)
        .unwrap_or("")
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
