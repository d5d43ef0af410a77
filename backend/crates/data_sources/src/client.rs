use std::time::Duration;

use dust_common::error::DustResult;
use dust_config::env::{get_var, parse_var_or};
use dust_workflows::ActivityError;
use reqwest::{Client, StatusCode, Url};

use crate::models::{
    DataSourceConfig, DataSourceDocument, DocumentResponse, UpsertDocumentRequest,
};

#[derive(Debug, Clone)]
pub struct DataSourceClientConfig {
    /// Base URL of the front API serving `/api/v1/w/...`.
    pub base_url: String,
    pub timeout_secs: u64,
}

impl DataSourceClientConfig {
    pub fn from_env() -> DustResult<Self> {
        Ok(Self {
            base_url: get_var("DUST_FRONT_API")?,
            timeout_secs: parse_var_or("DUST_FRONT_TIMEOUT_SECS", 30)?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DataSourceClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("data source API error: {0}")]
    Api(String),

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid data source URL: {0}")]
    InvalidUrl(String),
}

/// Rejected credentials fail the whole run. Every other failure of the write
/// path is an upsert error: retried a bounded number of times, then the
/// document is skipped.
impl From<DataSourceClientError> for ActivityError {
    fn from(err: DataSourceClientError) -> Self {
        match err {
            DataSourceClientError::HttpError { status, body }
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
            {
                ActivityError::Auth(format!("data source rejected credentials: {status}: {body}"))
            }
            other => ActivityError::Upsert(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct DataSourceClient {
    client: Client,
    config: DataSourceClientConfig,
}

impl DataSourceClient {
    pub fn new(config: DataSourceClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn document_url(
        &self,
        target: &DataSourceConfig,
        document_id: &str,
    ) -> Result<Url, DataSourceClientError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| DataSourceClientError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| DataSourceClientError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend([
                "api",
                "v1",
                "w",
                target.workspace_id.as_str(),
                "data_sources",
                target.data_source_name.as_str(),
                "documents",
                document_id,
            ]);
        Ok(url)
    }

    /// Write a document. The same `document_id` always overwrites the same
    /// stored document, so repeating a call is harmless.
    pub async fn upsert(
        &self,
        target: &DataSourceConfig,
        document_id: &str,
        text: &str,
        source_url: Option<&str>,
    ) -> Result<(), DataSourceClientError> {
        let url = self.document_url(target, document_id)?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&target.workspace_api_key)
            .json(&UpsertDocumentRequest { text, source_url })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataSourceClientError::HttpError { status, body });
        }

        // The API may answer 200 with an error envelope.
        let body: DocumentResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(DataSourceClientError::Api(error.message));
        }

        tracing::debug!(
            workspace_id = %target.workspace_id,
            data_source = %target.data_source_name,
            document_id,
            text_len = text.len(),
            "upserted document"
        );
        Ok(())
    }

    /// Read a document back. Returns `None` if it does not exist (anymore).
    pub async fn get_document(
        &self,
        target: &DataSourceConfig,
        document_id: &str,
    ) -> Result<Option<DataSourceDocument>, DataSourceClientError> {
        let url = self.document_url(target, document_id)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&target.workspace_api_key)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DataSourceClientError::HttpError { status, body });
        }

        let body: DocumentResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(DataSourceClientError::Api(error.message));
        }
        Ok(body.document)
    }
}
