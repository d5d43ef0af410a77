use async_trait::async_trait;
use dust_data_sources::DataSourceConfig;
use dust_db::connectors::models::{Connector, ConnectorKey};
use dust_workflows::ActivityError;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub source: String,
    pub upserted: usize,
    /// Pages that disappeared between listing and fetching.
    pub skipped: usize,
    pub errors: usize,
    pub hooks_dispatched: usize,
}

#[async_trait]
pub trait SourceConnector: Send + Sync {
    fn source_name(&self) -> &str;
    async fn sync(&self, key: &ConnectorKey) -> Result<SyncResult, ActivityError>;
}

/// Where a connector's documents are written, fixed for the whole run.
pub fn upsert_target(connector: &Connector) -> DataSourceConfig {
    DataSourceConfig {
        workspace_id: connector.workspace_id.clone(),
        data_source_name: connector.data_source_name.clone(),
        workspace_api_key: connector.workspace_api_key.clone(),
    }
}
