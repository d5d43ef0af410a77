use std::fmt;

use serde::{Deserialize, Serialize};

/// Where and as whom to write documents: one data source of one workspace.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct DataSourceConfig {
    pub workspace_id: String,
    pub data_source_name: String,
    #[serde(skip_serializing)]
    pub workspace_api_key: String,
}

impl fmt::Debug for DataSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceConfig")
            .field("workspace_id", &self.workspace_id)
            .field("data_source_name", &self.data_source_name)
            .field("workspace_api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertDocumentRequest<'a> {
    pub text: &'a str,
    pub source_url: Option<&'a str>,
}

/// A document as stored in a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceDocument {
    pub document_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Envelope returned by the documents endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentResponse {
    #[serde(default)]
    pub document: Option<DataSourceDocument>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
    pub message: String,
}
