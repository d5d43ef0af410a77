use async_trait::async_trait;
use dust_config::RetryPolicy;
use dust_db::connectors::models::{Connector, ConnectorKey};
use dust_db::connectors::repositories::ConnectorRepository;
use dust_workflows::{with_retry, ActivityError};

use super::activities::NotionActivities;
use crate::connector::{upsert_target, SourceConnector, SyncResult};

/// One incremental sync of a Notion connector.
///
/// The token is fetched first, then the start is recorded and pages edited
/// since the stored cursor are upserted one by one in listing order. Pages
/// that fail on their own (gone, rejected or undecodable, upsert or network
/// errors that outlast the retries) are skipped. Anything else, including
/// credentials rejected by the data source, aborts the run and is recorded
/// as a failure, which leaves the cursor where it was.
pub struct NotionSyncer<R> {
    activities: NotionActivities<R>,
    retry: RetryPolicy,
}

impl<R: ConnectorRepository> NotionSyncer<R> {
    pub fn new(activities: NotionActivities<R>, retry: RetryPolicy) -> Self {
        Self { activities, retry }
    }

    async fn run(
        &self,
        key: &ConnectorKey,
        connector: &Connector,
    ) -> Result<SyncResult, ActivityError> {
        let access_token = with_retry(&self.retry, "get_access_token", || {
            self.activities.get_access_token(&connector.connection_id)
        })
        .await?;

        self.activities.save_start_sync(key).await?;

        let cursor = connector.sync_cursor;
        let page_ids = with_retry(&self.retry, "get_pages_to_sync", || {
            self.activities.get_pages_to_sync(&access_token, cursor)
        })
        .await?;
        tracing::info!(connector = %key, pages = page_ids.len(), ?cursor, "pages to sync");

        let target = upsert_target(connector);
        let mut result = SyncResult {
            source: "notion".to_string(),
            ..SyncResult::default()
        };

        for page_id in &page_ids {
            let upserted = with_retry(&self.retry, "upsert_page", || {
                self.activities.upsert_page(&access_token, page_id, &target)
            })
            .await;

            match upserted {
                Ok(document_id) => {
                    result.upserted += 1;
                    match self
                        .activities
                        .launch_post_upsert_hooks(&target, &document_id)
                        .await
                    {
                        Ok(_) => result.hooks_dispatched += 1,
                        Err(e) => {
                            tracing::warn!(
                                document_id = %document_id,
                                error = %e,
                                "failed to dispatch post-upsert hooks"
                            );
                        }
                    }
                }
                Err(ActivityError::NotFound(_)) => {
                    tracing::info!(page_id = %page_id, "page no longer accessible, skipping");
                    result.skipped += 1;
                }
                Err(
                    e @ (ActivityError::Upsert(_)
                    | ActivityError::TransientNetwork(_)
                    | ActivityError::InvalidDocument(_)),
                ) => {
                    tracing::warn!(
                        page_id = %page_id,
                        kind = e.kind(),
                        error = %e,
                        "failed to sync page, skipping"
                    );
                    result.errors += 1;
                }
                Err(e) => return Err(e),
            }
        }

        self.activities.save_success_sync(key).await?;
        Ok(result)
    }
}

#[async_trait]
impl<R: ConnectorRepository> SourceConnector for NotionSyncer<R> {
    fn source_name(&self) -> &str {
        "notion"
    }

    async fn sync(&self, key: &ConnectorKey) -> Result<SyncResult, ActivityError> {
        // Without a connector there is nothing to record against.
        let connector = self.activities.get_connector(key).await?;

        match self.run(key, &connector).await {
            Ok(result) => {
                tracing::info!(connector = %key, ?result, "notion sync completed");
                Ok(result)
            }
            Err(e) => {
                tracing::error!(
                    connector = %key,
                    kind = e.kind(),
                    error = %e,
                    "notion sync failed"
                );
                if let Err(record_err) = self
                    .activities
                    .save_failure_sync(key, &e.to_string())
                    .await
                {
                    tracing::error!(
                        connector = %key,
                        error = %record_err,
                        "failed to record sync failure"
                    );
                }
                Err(e)
            }
        }
    }
}
