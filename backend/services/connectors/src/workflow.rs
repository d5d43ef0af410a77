use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dust_db::connectors::models::{ConnectorKey, ConnectorType};
use dust_db::connectors::repositories::ConnectorRepository;
use dust_workflows::{
    decode_args, workflow_id, ActivityError, SchedulerError, Signal, SignalWithStart,
    StartOutcome, WorkflowError, WorkflowHandler, WorkflowScheduler,
};
use tokio::sync::watch;

use crate::connector::SourceConnector;

pub const SYNC_CONNECTOR_WORKFLOW: &str = "sync_connector";
pub const SYNC_CONNECTOR_QUEUE: &str = "connectors-sync-queue";
pub const SYNC_REQUESTED_SIGNAL: &str = "sync_requested";

pub fn sync_workflow_id(key: &ConnectorKey) -> String {
    workflow_id(
        "workflow-sync",
        &[
            key.connector_type.as_str(),
            key.workspace_id.as_str(),
            key.data_source_name.as_str(),
        ],
    )
}

/// Runs one sync per pass. Triggers that arrive while a sync is running are
/// merged by the scheduler and produce a single follow-up pass.
#[derive(Default)]
pub struct SyncConnectorWorkflow {
    connectors: HashMap<ConnectorType, Arc<dyn SourceConnector>>,
}

impl SyncConnectorWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connector(
        mut self,
        connector_type: ConnectorType,
        connector: Arc<dyn SourceConnector>,
    ) -> Self {
        self.connectors.insert(connector_type, connector);
        self
    }
}

#[async_trait]
impl WorkflowHandler for SyncConnectorWorkflow {
    fn workflow_type(&self) -> &'static str {
        SYNC_CONNECTOR_WORKFLOW
    }

    async fn run(
        &self,
        workflow_id: &str,
        args: &serde_json::Value,
        signals: Vec<Signal>,
    ) -> Result<(), WorkflowError> {
        let key: ConnectorKey = decode_args(args)?;
        let connector = self.connectors.get(&key.connector_type).ok_or_else(|| {
            ActivityError::Config(format!("no connector for type {}", key.connector_type))
        })?;

        tracing::debug!(
            workflow_id,
            source = connector.source_name(),
            merged_triggers = signals.len(),
            "running connector sync"
        );
        connector.sync(&key).await?;
        Ok(())
    }
}

/// Start the sync workflow of a connector, or fold the request into the
/// running one.
pub async fn launch_sync_workflow(
    scheduler: &dyn WorkflowScheduler,
    key: &ConnectorKey,
) -> Result<StartOutcome, SchedulerError> {
    let args = serde_json::to_value(key).unwrap_or(serde_json::Value::Null);
    scheduler
        .signal_with_start(SignalWithStart {
            workflow_type: SYNC_CONNECTOR_WORKFLOW.to_owned(),
            workflow_id: sync_workflow_id(key),
            task_queue: SYNC_CONNECTOR_QUEUE.to_owned(),
            args,
            signal: Signal::named(SYNC_REQUESTED_SIGNAL),
        })
        .await
}

/// Launch a sync for every connector of `connector_type`. Returns how many
/// were accepted by the scheduler.
pub async fn trigger_syncs<R: ConnectorRepository>(
    repo: &R,
    scheduler: &dyn WorkflowScheduler,
    connector_type: ConnectorType,
) -> usize {
    let connectors = match repo.list_by_type(connector_type).await {
        Ok(connectors) => connectors,
        Err(e) => {
            tracing::error!(%connector_type, error = %e, "failed to list connectors");
            return 0;
        }
    };

    let mut launched = 0;
    for connector in &connectors {
        let key = connector.key();
        match launch_sync_workflow(scheduler, &key).await {
            Ok(outcome) => {
                tracing::debug!(connector = %key, ?outcome, "sync triggered");
                launched += 1;
            }
            Err(e) => {
                tracing::warn!(connector = %key, error = %e, "failed to trigger sync");
            }
        }
    }
    launched
}

/// Trigger syncs every `interval` until `shutdown` flips to `true`.
pub async fn run_sync_trigger<R: ConnectorRepository>(
    repo: R,
    scheduler: Arc<dyn WorkflowScheduler>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let launched =
                    trigger_syncs(&repo, scheduler.as_ref(), ConnectorType::Notion).await;
                tracing::info!(launched, "periodic sync trigger");
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("sync trigger stopped");
}
