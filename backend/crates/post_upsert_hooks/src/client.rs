use dust_workflows::{
    workflow_id, SchedulerError, Signal, SignalWithStart, StartOutcome, WorkflowScheduler,
};
use serde::{Deserialize, Serialize};

pub const RUN_POST_UPSERT_HOOKS_WORKFLOW: &str = "run_post_upsert_hooks";
pub const POST_UPSERT_HOOKS_QUEUE: &str = "post-upsert-hooks-queue";
pub const NEW_UPSERT_SIGNAL: &str = "new_upsert_signal";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostUpsertHooksArgs {
    pub data_source_name: String,
    pub workspace_id: String,
    pub document_id: String,
}

/// Workflow id for a document. Identical triples always map to the same id
/// and different triples never do, even when the parts contain dashes.
pub fn post_upsert_hooks_workflow_id(
    data_source_name: &str,
    workspace_id: &str,
    document_id: &str,
) -> String {
    workflow_id(
        "workflow-run-post-upsert-hooks",
        &[workspace_id, data_source_name, document_id],
    )
}

/// Ask for the post-upsert hooks of a document to run.
///
/// Starts the document's workflow, or signals it if one is already live, so
/// an upsert that lands while hooks are still running is folded into that
/// instance. Returns once the scheduler accepted the request.
pub async fn launch_run_post_upsert_hooks_workflow(
    scheduler: &dyn WorkflowScheduler,
    data_source_name: &str,
    workspace_id: &str,
    document_id: &str,
) -> Result<StartOutcome, SchedulerError> {
    let args = PostUpsertHooksArgs {
        data_source_name: data_source_name.to_owned(),
        workspace_id: workspace_id.to_owned(),
        document_id: document_id.to_owned(),
    };

    let request = SignalWithStart {
        workflow_type: RUN_POST_UPSERT_HOOKS_WORKFLOW.to_owned(),
        workflow_id: post_upsert_hooks_workflow_id(data_source_name, workspace_id, document_id),
        task_queue: POST_UPSERT_HOOKS_QUEUE.to_owned(),
        args: serde_json::to_value(&args).unwrap_or(serde_json::Value::Null),
        // No payload: the workflow re-reads the document on every pass.
        signal: Signal::named(NEW_UPSERT_SIGNAL),
    };

    let outcome = scheduler.signal_with_start(request).await?;
    tracing::debug!(
        workspace_id,
        data_source = data_source_name,
        document_id,
        ?outcome,
        "launched post-upsert hooks workflow"
    );
    Ok(outcome)
}
