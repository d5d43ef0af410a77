use async_trait::async_trait;
use dust_data_sources::{DataSourceClient, DataSourceDocument};
use dust_db::connectors::repositories::ConnectorRepository;
use dust_post_upsert_hooks::DocumentSource;
use dust_workflows::ActivityError;

use crate::connector::upsert_target;

/// Reads documents back from the data source a connector writes into,
/// using that connector's credentials.
pub struct ConnectorDocumentSource<R> {
    repo: R,
    client: DataSourceClient,
}

impl<R: ConnectorRepository> ConnectorDocumentSource<R> {
    pub fn new(repo: R, client: DataSourceClient) -> Self {
        Self { repo, client }
    }
}

#[async_trait]
impl<R: ConnectorRepository> DocumentSource for ConnectorDocumentSource<R> {
    async fn get_document(
        &self,
        data_source_name: &str,
        workspace_id: &str,
        document_id: &str,
    ) -> Result<Option<DataSourceDocument>, ActivityError> {
        let connector = self
            .repo
            .find_by_data_source(workspace_id, data_source_name)
            .await?
            .ok_or_else(|| {
                ActivityError::NotFound(format!(
                    "no connector writes into {workspace_id}/{data_source_name}"
                ))
            })?;

        Ok(self
            .client
            .get_document(&upsert_target(&connector), document_id)
            .await?)
    }
}
