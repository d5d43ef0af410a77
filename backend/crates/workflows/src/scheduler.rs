use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, WorkflowError};

/// A message delivered to a workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Signal {
    /// A signal that carries no data beyond its name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: serde_json::Value::Null,
        }
    }
}

/// Start a workflow instance, or signal it if one with the same id is live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalWithStart {
    pub workflow_type: String,
    pub workflow_id: String,
    pub task_queue: String,
    pub args: serde_json::Value,
    pub signal: Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// No instance was live; a new one was started with the signal queued.
    Started,
    /// The signal was merged into the live instance.
    Signaled,
}

/// The durable-execution contract the pipeline calls into.
///
/// Implementations guarantee workflow-id uniqueness: at most one live
/// instance per id, and every accepted signal is seen by that instance.
#[async_trait]
pub trait WorkflowScheduler: Send + Sync {
    async fn signal_with_start(&self, request: SignalWithStart)
        -> Result<StartOutcome, SchedulerError>;

    async fn signal(&self, workflow_id: &str, signal: Signal) -> Result<(), SchedulerError>;
}

/// Body of a workflow type.
///
/// `run` is one processing pass over the signals received since the previous
/// pass. It must re-read whatever state it acts on rather than trust signal
/// payloads, so merged signals are equivalent to a single one.
///
/// A pass that returns an error is logged and not replayed: the signals of
/// that batch are consumed. Only signals that arrive afterwards trigger
/// another pass, so a handler that needs its work retried must retry inside
/// `run`.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    fn workflow_type(&self) -> &'static str;

    async fn run(
        &self,
        workflow_id: &str,
        args: &serde_json::Value,
        signals: Vec<Signal>,
    ) -> Result<(), WorkflowError>;
}

/// Build a workflow id from a fixed prefix and the parts of its key.
///
/// Parts are joined with `-`, and any `%` or `-` inside a part is
/// percent-escaped, so two different part lists never share an id.
pub fn workflow_id(prefix: &str, parts: &[&str]) -> String {
    let mut id = prefix.to_owned();
    for part in parts {
        id.push('-');
        for c in part.chars() {
            match c {
                '%' => id.push_str("%25"),
                '-' => id.push_str("%2D"),
                c => id.push(c),
            }
        }
    }
    id
}

/// Decode workflow arguments into a typed value.
pub fn decode_args<T>(args: &serde_json::Value) -> Result<T, WorkflowError>
where
    T: for<'de> Deserialize<'de>,
{
    T::deserialize(args).map_err(|e| WorkflowError::InvalidArgs(e.to_string()))
}
