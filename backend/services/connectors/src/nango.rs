use std::time::Duration;

use dust_common::error::DustResult;
use dust_config::env::{get_var, get_var_or, parse_var_or};
use dust_workflows::ActivityError;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct NangoClientConfig {
    pub base_url: String,
    pub secret_key: String,
    /// Nango provider config key of the Notion integration.
    pub notion_connector_id: String,
    pub timeout_secs: u64,
}

impl NangoClientConfig {
    pub fn from_env() -> DustResult<Self> {
        Ok(Self {
            base_url: get_var_or("NANGO_BASE_URL", "https://api.nango.dev"),
            secret_key: get_var("NANGO_SECRET_KEY")?,
            notion_connector_id: get_var("NANGO_NOTION_CONNECTOR_ID")?,
            timeout_secs: parse_var_or("NANGO_TIMEOUT_SECS", 30)?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NangoClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid nango URL: {0}")]
    InvalidUrl(String),

    #[error("connection {0} has no access token")]
    MissingToken(String),
}

/// A broker that cannot hand out a token needs an operator, not a retry.
impl From<NangoClientError> for ActivityError {
    fn from(err: NangoClientError) -> Self {
        ActivityError::Config(format!("token broker: {err}"))
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionResponse {
    #[serde(default)]
    credentials: Option<Credentials>,
}

#[derive(Debug, Deserialize)]
struct Credentials {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Clone)]
pub struct NangoClient {
    client: Client,
    config: NangoClientConfig,
}

impl NangoClient {
    pub fn new(config: NangoClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Exchange a connection id for the current Notion access token.
    pub async fn get_access_token(&self, connection_id: &str) -> Result<String, NangoClientError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| NangoClientError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| NangoClientError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(["connection", connection_id]);
        url.query_pairs_mut()
            .append_pair("provider_config_key", &self.config.notion_connector_id);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NangoClientError::HttpError { status, body });
        }

        let connection: ConnectionResponse = response.json().await?;
        connection
            .credentials
            .and_then(|c| c.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| NangoClientError::MissingToken(connection_id.to_owned()))
    }
}
