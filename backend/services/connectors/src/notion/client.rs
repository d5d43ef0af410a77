use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, DurationRound, Utc};
use dust_common::error::DustResult;
use dust_config::env::{get_var_or, parse_var_or};
use dust_workflows::ActivityError;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::models::{
    BlockChildrenResponse, NotionPage, ParsedPage, SearchRequest, SearchResponse,
};
use super::render::{render_page, NestedBlock};

/// Children are fetched this many levels below the page, no deeper.
const MAX_BLOCK_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct NotionClientConfig {
    pub base_url: String,
    pub notion_version: String,
    pub page_size: u32,
    pub timeout_secs: u64,
}

impl NotionClientConfig {
    pub fn from_env() -> DustResult<Self> {
        Ok(Self {
            base_url: get_var_or("NOTION_BASE_URL", "https://api.notion.com"),
            notion_version: get_var_or("NOTION_VERSION", "2022-06-28"),
            page_size: parse_var_or("NOTION_PAGE_SIZE", 100)?,
            timeout_secs: parse_var_or("NOTION_TIMEOUT_SECS", 30)?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotionClientError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited by notion")]
    RateLimited { retry_after: Option<Duration> },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),
}

impl From<NotionClientError> for ActivityError {
    fn from(err: NotionClientError) -> Self {
        match err {
            NotionClientError::Unauthorized(msg) => ActivityError::Auth(msg),
            NotionClientError::RateLimited { retry_after } => ActivityError::RateLimited {
                message: "notion rate limit".to_owned(),
                retry_after,
            },
            NotionClientError::NotFound(msg) => ActivityError::NotFound(msg),
            NotionClientError::Transient(msg) => ActivityError::TransientNetwork(msg),
            other => ActivityError::Internal(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct NotionClient {
    client: Client,
    config: NotionClientConfig,
}

impl NotionClient {
    pub fn new(config: NotionClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// For testing: create a client pointing at a specific base URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    /// Ids of the pages edited at or after `cursor`, most recent first.
    ///
    /// Notion reports `last_edited_time` rounded down to the minute, so the
    /// cursor is floored the same way before comparing. `None` lists every
    /// page the integration can see.
    pub async fn list_pages_edited_since(
        &self,
        access_token: &str,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>, NotionClientError> {
        let floor = cursor.map(|c| {
            c.duration_trunc(chrono::Duration::minutes(1))
                .unwrap_or(c)
        });
        let url = format!("{}/v1/search", self.config.base_url);

        let mut seen = HashSet::new();
        let mut page_ids = Vec::new();
        let mut start_cursor: Option<String> = None;

        'pages: loop {
            let body =
                SearchRequest::pages_by_last_edit(self.config.page_size, start_cursor.as_deref());
            let response: SearchResponse = self
                .execute(self.client.post(&url).json(&body), access_token, "search")
                .await?;

            for result in response.results {
                if floor.is_some_and(|f| result.last_edited_time < f) {
                    break 'pages;
                }
                if seen.insert(result.id.clone()) {
                    page_ids.push(result.id);
                }
            }

            match response.next_cursor {
                Some(next) if response.has_more => start_cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(count = page_ids.len(), ?cursor, "listed notion pages");
        Ok(page_ids)
    }

    /// Fetch a page and its block tree, rendered as plain text.
    pub async fn fetch_and_render(
        &self,
        access_token: &str,
        page_id: &str,
    ) -> Result<ParsedPage, NotionClientError> {
        let url = format!("{}/v1/pages/{}", self.config.base_url, page_id);
        let page: NotionPage = self
            .execute(self.client.get(&url), access_token, page_id)
            .await?;

        let mut blocks = Vec::new();
        self.collect_blocks(access_token, page_id, 0, &mut blocks)
            .await?;

        let title = page.title();
        let rendered = render_page(title.as_deref(), &blocks);

        Ok(ParsedPage {
            id: page.id,
            title,
            url: page.url,
            rendered,
        })
    }

    /// Append the children of `block_id` in document order, each followed by
    /// its own children.
    fn collect_blocks<'a>(
        &'a self,
        access_token: &'a str,
        block_id: &'a str,
        depth: usize,
        out: &'a mut Vec<NestedBlock>,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotionClientError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!("{}/v1/blocks/{}/children", self.config.base_url, block_id);
            let mut start_cursor: Option<String> = None;

            loop {
                let mut request = self
                    .client
                    .get(&url)
                    .query(&[("page_size", self.config.page_size.to_string())]);
                if let Some(cursor) = &start_cursor {
                    request = request.query(&[("start_cursor", cursor)]);
                }

                let response: BlockChildrenResponse =
                    self.execute(request, access_token, block_id).await?;

                for block in response.results {
                    let descend = block.has_children && depth + 1 < MAX_BLOCK_DEPTH;
                    let child_id = block.id.clone();
                    out.push(NestedBlock { depth, block });
                    if descend {
                        self.collect_blocks(access_token, &child_id, depth + 1, out)
                            .await?;
                    }
                }

                match response.next_cursor {
                    Some(next) if response.has_more => start_cursor = Some(next),
                    _ => return Ok(()),
                }
            }
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        access_token: &str,
        what: &str,
    ) -> Result<T, NotionClientError> {
        let response = request
            .bearer_auth(access_token)
            .header("Notion-Version", &self.config.notion_version)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    NotionClientError::Transient(e.to_string())
                } else {
                    NotionClientError::RequestError(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(NotionClientError::RequestError);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            tracing::warn!(?retry_after, "rate-limited by notion");
            return Err(NotionClientError::RateLimited { retry_after });
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                NotionClientError::Unauthorized(format!("{status}: {body}"))
            }
            StatusCode::NOT_FOUND => NotionClientError::NotFound(what.to_owned()),
            s if s.is_server_error() => NotionClientError::Transient(format!("{status}: {body}")),
            _ => NotionClientError::HttpError { status, body },
        })
    }
}
