use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::connectors::models::{
    apply_sync_result, Connector, ConnectorKey, ConnectorType, NewConnector, SyncResultUpdate,
    SyncStatus,
};
use crate::connectors::repositories::ConnectorRepository;
use dust_common::error::{DustError, DustResult};

/// Connector store backed by a mutex-guarded map.
///
/// Each operation holds the lock for its whole read-modify-write, which gives
/// the same atomicity as the Postgres transactions. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryConnectorRepository {
    connectors: Arc<Mutex<HashMap<ConnectorKey, Connector>>>,
}

impl InMemoryConnectorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> DustResult<MutexGuard<'_, HashMap<ConnectorKey, Connector>>> {
        self.connectors
            .lock()
            .map_err(|_| DustError::Internal("connector store lock poisoned".to_owned()))
    }

    fn modify<F>(&self, key: &ConnectorKey, f: F) -> DustResult<Connector>
    where
        F: FnOnce(&mut Connector),
    {
        let mut connectors = self.lock()?;
        let connector = connectors
            .get_mut(key)
            .ok_or_else(|| DustError::NotFound(format!("connector {key}")))?;
        f(connector);
        Ok(connector.clone())
    }
}

#[async_trait]
impl ConnectorRepository for InMemoryConnectorRepository {
    async fn create(&self, connector: NewConnector) -> DustResult<Connector> {
        let connector = connector.into_connector(Utc::now());
        let key = connector.key();

        let mut connectors = self.lock()?;
        if connectors.contains_key(&key) {
            return Err(DustError::AlreadyExists(format!("connector {key}")));
        }
        connectors.insert(key, connector.clone());
        Ok(connector)
    }

    async fn find(&self, key: &ConnectorKey) -> DustResult<Option<Connector>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn find_by_data_source(
        &self,
        workspace_id: &str,
        data_source_name: &str,
    ) -> DustResult<Option<Connector>> {
        Ok(self
            .lock()?
            .values()
            .find(|c| c.workspace_id == workspace_id && c.data_source_name == data_source_name)
            .cloned())
    }

    async fn list_by_type(&self, connector_type: ConnectorType) -> DustResult<Vec<Connector>> {
        let mut connectors: Vec<Connector> = self
            .lock()?
            .values()
            .filter(|c| c.connector_type == connector_type)
            .cloned()
            .collect();
        connectors.sort_by_key(|c| c.created_at);
        Ok(connectors)
    }

    async fn update_sync_start(
        &self,
        key: &ConnectorKey,
        at: DateTime<Utc>,
    ) -> DustResult<Connector> {
        self.modify(key, |c| {
            c.last_sync_start_time = Some(at);
            c.last_sync_status = SyncStatus::InProgress;
            c.updated_at = at;
        })
    }

    async fn update_sync_result(
        &self,
        key: &ConnectorKey,
        update: SyncResultUpdate,
    ) -> DustResult<Connector> {
        self.modify(key, |c| apply_sync_result(c, &update))
    }
}
