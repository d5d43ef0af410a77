//! Keyed workflow scheduling: signal-with-start dispatch that keeps at most
//! one live instance per workflow id, plus the activity retry loop.

pub mod error;
pub mod local;
pub mod retry;
pub mod scheduler;

pub use error::{ActivityError, SchedulerError, WorkflowError};
pub use local::LocalScheduler;
pub use retry::with_retry;
pub use scheduler::{
    decode_args, workflow_id, Signal, SignalWithStart, StartOutcome, WorkflowHandler,
    WorkflowScheduler,
};
