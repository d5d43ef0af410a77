use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/search`.
#[derive(Debug, Serialize)]
pub struct SearchRequest<'a> {
    pub filter: SearchFilter,
    pub sort: SearchSort,
    pub page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_cursor: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct SearchFilter {
    pub property: &'static str,
    pub value: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SearchSort {
    pub direction: &'static str,
    pub timestamp: &'static str,
}

impl<'a> SearchRequest<'a> {
    /// Pages only, most recently edited first.
    pub fn pages_by_last_edit(page_size: u32, start_cursor: Option<&'a str>) -> Self {
        Self {
            filter: SearchFilter {
                property: "object",
                value: "page",
            },
            sort: SearchSort {
                direction: "descending",
                timestamp: "last_edited_time",
            },
            page_size,
            start_cursor,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub last_edited_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NotionPage {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, PageProperty>,
}

impl NotionPage {
    /// Plain text of the page's title property, if it has a non-empty one.
    pub fn title(&self) -> Option<String> {
        let title = self
            .properties
            .values()
            .find(|p| p.kind == "title")
            .map(|p| plain_text(&p.title))?;
        (!title.is_empty()).then_some(title)
    }
}

#[derive(Debug, Deserialize)]
pub struct PageProperty {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Vec<RichText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
}

pub fn plain_text(parts: &[RichText]) -> String {
    parts.iter().map(|t| t.plain_text.as_str()).collect()
}

#[derive(Debug, Deserialize)]
pub struct BlockChildrenResponse {
    #[serde(default)]
    pub results: Vec<Block>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A Notion block. The type-specific payload lives under a key named after
/// the block type, e.g. `{"type": "to_do", "to_do": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub has_children: bool,
    #[serde(flatten)]
    pub payloads: HashMap<String, serde_json::Value>,
}

/// The fields of a block payload the renderer uses.
#[derive(Debug, Default, Deserialize)]
pub struct BlockContent {
    #[serde(default)]
    pub rich_text: Vec<RichText>,
    #[serde(default)]
    pub checked: Option<bool>,
    #[serde(default)]
    pub language: Option<String>,
    /// Set on `child_page` and `child_database` blocks.
    #[serde(default)]
    pub title: Option<String>,
}

impl Block {
    pub fn content(&self) -> BlockContent {
        self.payloads
            .get(&self.kind)
            .and_then(|v| BlockContent::deserialize(v).ok())
            .unwrap_or_default()
    }

    pub fn text(&self) -> String {
        plain_text(&self.content().rich_text)
    }
}

/// A page ready to be upserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    pub id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub rendered: String,
}
