use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::connectors::models::{
    Connector, ConnectorKey, ConnectorType, NewConnector, SyncResultUpdate,
};
use dust_common::error::DustResult;

/// Persistence of connector records.
///
/// Every mutating method is a single atomic read-modify-write: either the
/// whole update is committed or nothing is, and a missing connector is
/// reported as `DustError::NotFound`.
#[async_trait]
pub trait ConnectorRepository: Send + Sync {
    /// Register a connector. Fails with `AlreadyExists` if one is already
    /// registered for the same (type, workspace, data source).
    async fn create(&self, connector: NewConnector) -> DustResult<Connector>;

    async fn find(&self, key: &ConnectorKey) -> DustResult<Option<Connector>>;

    /// Look a connector up by the data source it writes into, whatever its type.
    async fn find_by_data_source(
        &self,
        workspace_id: &str,
        data_source_name: &str,
    ) -> DustResult<Option<Connector>>;

    async fn list_by_type(&self, connector_type: ConnectorType) -> DustResult<Vec<Connector>>;

    /// Set the start time of a run and mark the connector `in_progress`.
    async fn update_sync_start(
        &self,
        key: &ConnectorKey,
        at: DateTime<Utc>,
    ) -> DustResult<Connector>;

    /// Record the terminal result of a run.
    async fn update_sync_result(
        &self,
        key: &ConnectorKey,
        update: SyncResultUpdate,
    ) -> DustResult<Connector>;
}
