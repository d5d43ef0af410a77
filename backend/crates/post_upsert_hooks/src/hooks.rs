use std::time::Duration;

use async_trait::async_trait;
use dust_common::error::{DustError, DustResult};
use dust_config::env::parse_var_or;
use dust_data_sources::DataSourceDocument;
use reqwest::{Client, StatusCode};
use serde::Serialize;

/// A document as seen by hooks, re-read after its latest upsert.
#[derive(Debug, Clone)]
pub struct UpsertedDocument {
    pub data_source_name: String,
    pub workspace_id: String,
    pub document: DataSourceDocument,
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),
}

#[async_trait]
pub trait PostUpsertHook: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this hook cares about the document.
    fn filter(&self, doc: &UpsertedDocument) -> bool;

    async fn run(&self, doc: &UpsertedDocument) -> Result<(), HookError>;
}

#[derive(Debug, Clone)]
pub struct WebhookHookConfig {
    pub url: String,
    /// Only notify for these data sources; `None` means all of them.
    pub data_sources: Option<Vec<String>>,
    pub timeout_secs: u64,
}

impl WebhookHookConfig {
    /// Returns `Ok(None)` if no webhook URL is configured.
    pub fn from_env() -> DustResult<Option<Self>> {
        let url = match std::env::var("POST_UPSERT_WEBHOOK_URL").ok() {
            Some(v) if !v.trim().is_empty() => v,
            _ => return Ok(None),
        };

        let data_sources = match std::env::var("POST_UPSERT_WEBHOOK_DATA_SOURCES").ok() {
            Some(raw) => {
                let names: Vec<String> = raw
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if names.is_empty() {
                    return Err(DustError::Config(
                        "POST_UPSERT_WEBHOOK_DATA_SOURCES is set but lists no data source"
                            .to_owned(),
                    ));
                }
                Some(names)
            }
            None => None,
        };

        Ok(Some(Self {
            url,
            data_sources,
            timeout_secs: parse_var_or("POST_UPSERT_WEBHOOK_TIMEOUT_SECS", 10)?,
        }))
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    data_source_name: &'a str,
    workspace_id: &'a str,
    document_id: &'a str,
    source_url: Option<&'a str>,
    text_length: usize,
}

/// Notifies an external endpoint that a document changed.
pub struct WebhookHook {
    client: Client,
    config: WebhookHookConfig,
}

impl WebhookHook {
    pub fn new(config: WebhookHookConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl PostUpsertHook for WebhookHook {
    fn name(&self) -> &str {
        "webhook"
    }

    fn filter(&self, doc: &UpsertedDocument) -> bool {
        match &self.config.data_sources {
            Some(names) => names.iter().any(|n| *n == doc.data_source_name),
            None => true,
        }
    }

    async fn run(&self, doc: &UpsertedDocument) -> Result<(), HookError> {
        let payload = WebhookPayload {
            data_source_name: &doc.data_source_name,
            workspace_id: &doc.workspace_id,
            document_id: &doc.document.document_id,
            source_url: doc.document.source_url.as_deref(),
            text_length: doc.document.text.as_deref().map_or(0, str::len),
        };

        let response = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HookError::HttpError { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn doc(data_source_name: &str) -> UpsertedDocument {
        UpsertedDocument {
            data_source_name: data_source_name.to_string(),
            workspace_id: "w1".to_string(),
            document: DataSourceDocument {
                document_id: "notion-p1".to_string(),
                text: Some("Hello".to_string()),
                source_url: Some("https://notion.so/p1".to_string()),
                timestamp: None,
            },
        }
    }

    fn hook(url: String, data_sources: Option<Vec<String>>) -> WebhookHook {
        WebhookHook::new(WebhookHookConfig {
            url,
            data_sources,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn filter_honors_data_source_allowlist() {
        let all = hook("http://localhost/hook".to_string(), None);
        assert!(all.filter(&doc("ds1")));

        let only_ds1 = hook(
            "http://localhost/hook".to_string(),
            Some(vec!["ds1".to_string()]),
        );
        assert!(only_ds1.filter(&doc("ds1")));
        assert!(!only_ds1.filter(&doc("ds2")));
    }

    #[tokio::test]
    async fn run_posts_document_summary() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(serde_json::json!({
                "data_source_name": "ds1",
                "workspace_id": "w1",
                "document_id": "notion-p1",
                "source_url": "https://notion.so/p1",
                "text_length": 5
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        hook(format!("{}/hook", server.uri()), None)
            .run(&doc("ds1"))
            .await
            .expect("hook should succeed");
    }

    #[tokio::test]
    async fn run_surfaces_non_success_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let err = hook(format!("{}/hook", server.uri()), None)
            .run(&doc("ds1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HookError::HttpError { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
    }
}
