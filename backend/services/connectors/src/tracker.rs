use chrono::Utc;
use dust_common::error::DustError;
use dust_db::connectors::models::{Connector, ConnectorKey, SyncResultUpdate};
use dust_db::connectors::repositories::ConnectorRepository;
use dust_workflows::ActivityError;

/// Sync bookkeeping on connector records. Each call is one atomic
/// repository transition.
#[derive(Clone)]
pub struct SyncStateTracker<R> {
    repo: R,
}

impl<R: ConnectorRepository> SyncStateTracker<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Load a connector; a missing one is fatal for the run.
    pub async fn find(&self, key: &ConnectorKey) -> Result<Connector, ActivityError> {
        self.repo
            .find(key)
            .await?
            .ok_or_else(|| DustError::NotFound(format!("connector {key}")).into())
    }

    pub async fn record_sync_start(&self, key: &ConnectorKey) -> Result<Connector, ActivityError> {
        let connector = self.repo.update_sync_start(key, Utc::now()).await?;
        tracing::info!(connector = %key, "sync started");
        Ok(connector)
    }

    /// Mark the run succeeded and advance the cursor to its start time.
    pub async fn record_sync_success(
        &self,
        key: &ConnectorKey,
    ) -> Result<Connector, ActivityError> {
        let connector = self
            .repo
            .update_sync_result(
                key,
                SyncResultUpdate::Succeeded {
                    finished_at: Utc::now(),
                },
            )
            .await?;
        tracing::info!(connector = %key, cursor = ?connector.sync_cursor, "sync succeeded");
        Ok(connector)
    }

    /// Mark the run failed. The cursor and last successful time are kept so
    /// the next run covers the same window again.
    pub async fn record_sync_failure(
        &self,
        key: &ConnectorKey,
        error: &str,
    ) -> Result<Connector, ActivityError> {
        let connector = self
            .repo
            .update_sync_result(
                key,
                SyncResultUpdate::Failed {
                    finished_at: Utc::now(),
                    error: error.to_owned(),
                },
            )
            .await?;
        tracing::warn!(connector = %key, error, "sync failed");
        Ok(connector)
    }
}
