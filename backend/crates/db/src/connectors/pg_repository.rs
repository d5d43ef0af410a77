use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::connectors::models::{
    Connector, ConnectorKey, ConnectorType, NewConnector, SyncResultUpdate, SyncStatus,
};
use crate::connectors::repositories::ConnectorRepository;
use dust_common::error::{DustError, DustResult};

const CONNECTOR_COLUMNS: &str = "id, type, workspace_id, workspace_api_key, data_source_name, connection_id, \
     last_sync_status, last_sync_start_time, last_sync_finish_time, last_sync_successful_time, \
     last_sync_error, sync_cursor, created_at, updated_at";

#[derive(Clone)]
pub struct PgConnectorRepository {
    pool: PgPool,
}

impl PgConnectorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> DustResult<Connector> {
        let type_raw: String = row.get("type");
        let status_raw: String = row.get("last_sync_status");

        Ok(Connector {
            id: row.get("id"),
            connector_type: ConnectorType::from_str(&type_raw).map_err(DustError::Internal)?,
            workspace_id: row.get("workspace_id"),
            workspace_api_key: row.get("workspace_api_key"),
            data_source_name: row.get("data_source_name"),
            connection_id: row.get("connection_id"),
            last_sync_status: SyncStatus::from_str(&status_raw).map_err(DustError::Internal)?,
            last_sync_start_time: row.get("last_sync_start_time"),
            last_sync_finish_time: row.get("last_sync_finish_time"),
            last_sync_successful_time: row.get("last_sync_successful_time"),
            last_sync_error: row.get("last_sync_error"),
            sync_cursor: row.get("sync_cursor"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Lock the connector row for the rest of the transaction.
    /// Returning early drops `tx`, which rolls it back.
    async fn lock_row(tx: &mut Transaction<'_, Postgres>, key: &ConnectorKey) -> DustResult<Uuid> {
        let row = sqlx::query(
            "select id from connectors
             where type = $1 and workspace_id = $2 and data_source_name = $3
             for update",
        )
        .bind(key.connector_type.as_str())
        .bind(&key.workspace_id)
        .bind(&key.data_source_name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| DustError::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(r.get("id")),
            None => Err(DustError::NotFound(format!("connector {key}"))),
        }
    }
}

#[async_trait]
impl ConnectorRepository for PgConnectorRepository {
    async fn create(&self, connector: NewConnector) -> DustResult<Connector> {
        let connector = connector.into_connector(Utc::now());
        let key = connector.key();

        let row = sqlx::query(&format!(
            "insert into connectors (id, type, workspace_id, workspace_api_key, data_source_name, connection_id,
                                     last_sync_status, created_at, updated_at)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $8)
             on conflict (type, workspace_id, data_source_name) do nothing
             returning {CONNECTOR_COLUMNS}"
        ))
        .bind(connector.id)
        .bind(connector.connector_type.as_str())
        .bind(&connector.workspace_id)
        .bind(&connector.workspace_api_key)
        .bind(&connector.data_source_name)
        .bind(&connector.connection_id)
        .bind(connector.last_sync_status.as_str())
        .bind(connector.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DustError::Database(e.to_string()))?;

        match row {
            Some(r) => Self::map_row(r),
            None => Err(DustError::AlreadyExists(format!("connector {key}"))),
        }
    }

    async fn find(&self, key: &ConnectorKey) -> DustResult<Option<Connector>> {
        let row = sqlx::query(&format!(
            "select {CONNECTOR_COLUMNS} from connectors
             where type = $1 and workspace_id = $2 and data_source_name = $3"
        ))
        .bind(key.connector_type.as_str())
        .bind(&key.workspace_id)
        .bind(&key.data_source_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DustError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn find_by_data_source(
        &self,
        workspace_id: &str,
        data_source_name: &str,
    ) -> DustResult<Option<Connector>> {
        let row = sqlx::query(&format!(
            "select {CONNECTOR_COLUMNS} from connectors
             where workspace_id = $1 and data_source_name = $2
             order by created_at asc
             limit 1"
        ))
        .bind(workspace_id)
        .bind(data_source_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DustError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn list_by_type(&self, connector_type: ConnectorType) -> DustResult<Vec<Connector>> {
        let rows = sqlx::query(&format!(
            "select {CONNECTOR_COLUMNS} from connectors where type = $1 order by created_at asc"
        ))
        .bind(connector_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DustError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn update_sync_start(
        &self,
        key: &ConnectorKey,
        at: DateTime<Utc>,
    ) -> DustResult<Connector> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DustError::Database(e.to_string()))?;

        let id = Self::lock_row(&mut tx, key).await?;

        let row = sqlx::query(&format!(
            "update connectors
             set last_sync_start_time = $1, last_sync_status = 'in_progress', updated_at = $1
             where id = $2
             returning {CONNECTOR_COLUMNS}"
        ))
        .bind(at)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DustError::Database(e.to_string()))?;

        let connector = Self::map_row(row)?;

        tx.commit()
            .await
            .map_err(|e| DustError::Database(e.to_string()))?;

        Ok(connector)
    }

    async fn update_sync_result(
        &self,
        key: &ConnectorKey,
        update: SyncResultUpdate,
    ) -> DustResult<Connector> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DustError::Database(e.to_string()))?;

        let id = Self::lock_row(&mut tx, key).await?;

        // greatest() ignores nulls, so both watermarks only ever move forward.
        let row = match &update {
            SyncResultUpdate::Succeeded { finished_at } => sqlx::query(&format!(
                "update connectors
                 set last_sync_status = 'succeeded',
                     last_sync_finish_time = $1,
                     last_sync_successful_time = greatest(last_sync_successful_time, $1),
                     last_sync_error = null,
                     sync_cursor = greatest(sync_cursor, last_sync_start_time),
                     updated_at = $1
                 where id = $2
                 returning {CONNECTOR_COLUMNS}"
            ))
            .bind(finished_at)
            .bind(id)
            .fetch_one(&mut *tx)
            .await,
            SyncResultUpdate::Failed { finished_at, error } => sqlx::query(&format!(
                "update connectors
                 set last_sync_status = 'failed',
                     last_sync_finish_time = $1,
                     last_sync_error = $2,
                     updated_at = $1
                 where id = $3
                 returning {CONNECTOR_COLUMNS}"
            ))
            .bind(finished_at)
            .bind(error)
            .bind(id)
            .fetch_one(&mut *tx)
            .await,
        }
        .map_err(|e| DustError::Database(e.to_string()))?;

        let connector = Self::map_row(row)?;

        tx.commit()
            .await
            .map_err(|e| DustError::Database(e.to_string()))?;

        Ok(connector)
    }
}
