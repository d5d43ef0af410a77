//! Post-upsert hooks: processing triggered after a document is written,
//! decoupled from the write path through a per-document workflow.

pub mod client;
pub mod hooks;
pub mod workflow;

pub use client::{
    launch_run_post_upsert_hooks_workflow, post_upsert_hooks_workflow_id, PostUpsertHooksArgs,
    NEW_UPSERT_SIGNAL, POST_UPSERT_HOOKS_QUEUE, RUN_POST_UPSERT_HOOKS_WORKFLOW,
};
pub use hooks::{HookError, PostUpsertHook, UpsertedDocument, WebhookHook, WebhookHookConfig};
pub use workflow::{DocumentSource, RunPostUpsertHooksWorkflow};
