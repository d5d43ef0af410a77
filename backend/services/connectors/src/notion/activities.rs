use std::sync::Arc;

use chrono::{DateTime, Utc};
use dust_data_sources::{DataSourceClient, DataSourceConfig};
use dust_db::connectors::models::{Connector, ConnectorKey};
use dust_db::connectors::repositories::ConnectorRepository;
use dust_post_upsert_hooks::launch_run_post_upsert_hooks_workflow;
use dust_workflows::{ActivityError, StartOutcome, WorkflowScheduler};

use super::client::{NotionClient, NotionClientError};
use crate::nango::NangoClient;
use crate::tracker::SyncStateTracker;

/// Data source document id of a Notion page.
pub fn notion_document_id(page_id: &str) -> String {
    format!("notion-{page_id}")
}

/// Classify a failure to fetch or render one page.
///
/// A rejected request or an undecodable response concerns that page alone,
/// so it is skipped rather than failing the run.
fn page_error(err: NotionClientError) -> ActivityError {
    match err {
        err @ (NotionClientError::HttpError { .. } | NotionClientError::RequestError(_)) => {
            ActivityError::InvalidDocument(err.to_string())
        }
        other => other.into(),
    }
}

/// The individually callable steps of a Notion sync.
///
/// Every step is safe to repeat with the same arguments: reads have no side
/// effects, upserts overwrite by document id and tracker writes assign
/// absolute values.
pub struct NotionActivities<R> {
    nango: NangoClient,
    notion: NotionClient,
    data_sources: DataSourceClient,
    tracker: SyncStateTracker<R>,
    scheduler: Arc<dyn WorkflowScheduler>,
}

impl<R: ConnectorRepository> NotionActivities<R> {
    pub fn new(
        nango: NangoClient,
        notion: NotionClient,
        data_sources: DataSourceClient,
        tracker: SyncStateTracker<R>,
        scheduler: Arc<dyn WorkflowScheduler>,
    ) -> Self {
        Self {
            nango,
            notion,
            data_sources,
            tracker,
            scheduler,
        }
    }

    pub async fn get_connector(&self, key: &ConnectorKey) -> Result<Connector, ActivityError> {
        self.tracker.find(key).await
    }

    pub async fn get_access_token(&self, connection_id: &str) -> Result<String, ActivityError> {
        Ok(self.nango.get_access_token(connection_id).await?)
    }

    pub async fn get_pages_to_sync(
        &self,
        access_token: &str,
        cursor: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>, ActivityError> {
        Ok(self
            .notion
            .list_pages_edited_since(access_token, cursor)
            .await?)
    }

    /// Fetch, render and upsert one page. Returns the document id written.
    pub async fn upsert_page(
        &self,
        access_token: &str,
        page_id: &str,
        target: &DataSourceConfig,
    ) -> Result<String, ActivityError> {
        let page = self
            .notion
            .fetch_and_render(access_token, page_id)
            .await
            .map_err(page_error)?;
        let document_id = notion_document_id(&page.id);

        self.data_sources
            .upsert(target, &document_id, &page.rendered, page.url.as_deref())
            .await?;

        tracing::debug!(
            page_id,
            document_id = %document_id,
            title = page.title.as_deref().unwrap_or(""),
            "upserted notion page"
        );
        Ok(document_id)
    }

    pub async fn save_start_sync(&self, key: &ConnectorKey) -> Result<Connector, ActivityError> {
        self.tracker.record_sync_start(key).await
    }

    pub async fn save_success_sync(&self, key: &ConnectorKey) -> Result<Connector, ActivityError> {
        self.tracker.record_sync_success(key).await
    }

    pub async fn save_failure_sync(
        &self,
        key: &ConnectorKey,
        error: &str,
    ) -> Result<Connector, ActivityError> {
        self.tracker.record_sync_failure(key, error).await
    }

    pub async fn launch_post_upsert_hooks(
        &self,
        target: &DataSourceConfig,
        document_id: &str,
    ) -> Result<StartOutcome, ActivityError> {
        launch_run_post_upsert_hooks_workflow(
            self.scheduler.as_ref(),
            &target.data_source_name,
            &target.workspace_id,
            document_id,
        )
        .await
        .map_err(|e| ActivityError::Internal(e.to_string()))
    }
}
