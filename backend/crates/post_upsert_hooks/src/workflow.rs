use std::sync::Arc;

use async_trait::async_trait;
use dust_config::RetryPolicy;
use dust_data_sources::DataSourceDocument;
use dust_workflows::{
    decode_args, with_retry, ActivityError, Signal, WorkflowError, WorkflowHandler,
};

use crate::client::{PostUpsertHooksArgs, RUN_POST_UPSERT_HOOKS_WORKFLOW};
use crate::hooks::{PostUpsertHook, UpsertedDocument};

/// Where the workflow reads the current state of a document from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn get_document(
        &self,
        data_source_name: &str,
        workspace_id: &str,
        document_id: &str,
    ) -> Result<Option<DataSourceDocument>, ActivityError>;
}

/// Runs the registered hooks over the latest version of one document.
///
/// Every pass re-reads the document, so any number of merged upsert signals
/// lead to a single run of the hooks over the newest content.
pub struct RunPostUpsertHooksWorkflow {
    source: Arc<dyn DocumentSource>,
    hooks: Vec<Arc<dyn PostUpsertHook>>,
    retry: RetryPolicy,
}

impl RunPostUpsertHooksWorkflow {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        hooks: Vec<Arc<dyn PostUpsertHook>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            hooks,
            retry,
        }
    }
}

#[async_trait]
impl WorkflowHandler for RunPostUpsertHooksWorkflow {
    fn workflow_type(&self) -> &'static str {
        RUN_POST_UPSERT_HOOKS_WORKFLOW
    }

    async fn run(
        &self,
        workflow_id: &str,
        args: &serde_json::Value,
        signals: Vec<Signal>,
    ) -> Result<(), WorkflowError> {
        let args: PostUpsertHooksArgs = decode_args(args)?;

        let document = with_retry(&self.retry, "get_document", || {
            self.source.get_document(
                &args.data_source_name,
                &args.workspace_id,
                &args.document_id,
            )
        })
        .await;

        let document = match document {
            Ok(Some(document)) => document,
            Ok(None) | Err(ActivityError::NotFound(_)) => {
                tracing::info!(
                    workflow_id,
                    document_id = %args.document_id,
                    "document no longer exists, skipping hooks"
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let upserted = UpsertedDocument {
            data_source_name: args.data_source_name,
            workspace_id: args.workspace_id,
            document,
        };

        let mut ran = 0usize;
        for hook in self.hooks.iter().filter(|h| h.filter(&upserted)) {
            match hook.run(&upserted).await {
                Ok(()) => ran += 1,
                Err(e) => {
                    tracing::warn!(
                        workflow_id,
                        hook = hook.name(),
                        document_id = %upserted.document.document_id,
                        error = %e,
                        "post-upsert hook failed"
                    );
                }
            }
        }

        tracing::info!(
            workflow_id,
            document_id = %upserted.document.document_id,
            merged_signals = signals.len(),
            hooks_run = ran,
            "post-upsert hooks completed"
        );
        Ok(())
    }
}
