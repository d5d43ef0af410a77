use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use tokio::sync::{watch, Semaphore};

use crate::error::SchedulerError;
use crate::scheduler::{
    Signal, SignalWithStart, StartOutcome, WorkflowHandler, WorkflowScheduler,
};

/// In-process scheduler keyed by workflow id.
///
/// Each live instance owns a queue of pending signals. The instance's runner
/// takes the whole queue under the lock and runs one handler pass over it;
/// when it finds the queue empty it removes the instance under that same
/// lock. A signal therefore either lands in a queue that will still be
/// drained, or finds no instance and starts a new one.
#[derive(Clone)]
pub struct LocalScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    handlers: RwLock<HashMap<&'static str, Arc<dyn WorkflowHandler>>>,
    instances: Mutex<HashMap<String, Instance>>,
    permits: Semaphore,
    live: watch::Sender<usize>,
    shutting_down: AtomicBool,
}

struct Instance {
    workflow_type: &'static str,
    pending: Vec<Signal>,
}

impl LocalScheduler {
    /// `max_concurrent` bounds handler passes running at the same time
    /// across all instances.
    pub fn new(max_concurrent: usize) -> Self {
        let (live, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                handlers: RwLock::new(HashMap::new()),
                instances: Mutex::new(HashMap::new()),
                permits: Semaphore::new(max_concurrent.max(1)),
                live,
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// Register the handler for its workflow type, replacing any previous one.
    pub fn register(&self, handler: Arc<dyn WorkflowHandler>) {
        let workflow_type = handler.workflow_type();
        tracing::info!(workflow_type, "registered workflow handler");
        match self.inner.handlers.write() {
            Ok(mut handlers) => {
                handlers.insert(workflow_type, handler);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(workflow_type, handler);
            }
        }
    }

    pub fn live_instances(&self) -> usize {
        self.instances().len()
    }

    pub fn is_running(&self, workflow_id: &str) -> bool {
        self.instances().contains_key(workflow_id)
    }

    /// Resolve once no instance is live.
    pub async fn wait_idle(&self) {
        let mut live = self.inner.live.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = live.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting starts and signals, then wait for live instances to drain.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        tracing::info!(live = self.live_instances(), "draining workflow instances");
        self.wait_idle().await;
    }

    fn instances(&self) -> MutexGuard<'_, HashMap<String, Instance>> {
        // A panic never happens while the lock is held; recover the map anyway.
        self.inner
            .instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handler(&self, workflow_type: &str) -> Option<Arc<dyn WorkflowHandler>> {
        let handlers = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        handlers.get(workflow_type).cloned()
    }

    fn ensure_accepting(&self) -> Result<(), SchedulerError> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShuttingDown);
        }
        Ok(())
    }

    /// Take the pending signals of an instance, or retire it if there are none.
    fn next_batch(&self, workflow_id: &str) -> Option<Vec<Signal>> {
        let mut instances = self.instances();
        let batch = match instances.get_mut(workflow_id) {
            Some(instance) if !instance.pending.is_empty() => {
                Some(std::mem::take(&mut instance.pending))
            }
            Some(_) => {
                instances.remove(workflow_id);
                None
            }
            None => None,
        };
        self.inner.live.send_replace(instances.len());
        batch
    }

    async fn drive(
        self,
        handler: Arc<dyn WorkflowHandler>,
        workflow_id: String,
        args: serde_json::Value,
        task_queue: String,
    ) {
        let mut pass = 0u64;

        loop {
            let permit = match self.inner.permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let signals = match self.next_batch(&workflow_id) {
                Some(signals) => signals,
                None => break,
            };
            pass += 1;

            tracing::debug!(
                workflow_id = %workflow_id,
                task_queue = %task_queue,
                pass,
                signals = signals.len(),
                "running workflow pass"
            );

            // Run the pass on its own task so a panicking handler cannot
            // leave the instance registered forever.
            let run = {
                let handler = handler.clone();
                let workflow_id = workflow_id.clone();
                let args = args.clone();
                tokio::spawn(async move { handler.run(&workflow_id, &args, signals).await })
            };

            match run.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(workflow_id = %workflow_id, pass, error = %e, "workflow pass failed");
                }
                Err(e) => {
                    tracing::error!(workflow_id = %workflow_id, pass, error = %e, "workflow pass panicked");
                }
            }

            drop(permit);
        }

        tracing::debug!(workflow_id = %workflow_id, passes = pass, "workflow instance completed");
    }
}

#[async_trait]
impl WorkflowScheduler for LocalScheduler {
    async fn signal_with_start(
        &self,
        request: SignalWithStart,
    ) -> Result<StartOutcome, SchedulerError> {
        self.ensure_accepting()?;

        let handler = self
            .handler(&request.workflow_type)
            .ok_or_else(|| SchedulerError::UnknownWorkflowType(request.workflow_type.clone()))?;

        {
            let mut instances = self.instances();
            if let Some(instance) = instances.get_mut(&request.workflow_id) {
                instance.pending.push(request.signal);
                tracing::debug!(
                    workflow_id = %request.workflow_id,
                    workflow_type = instance.workflow_type,
                    pending = instance.pending.len(),
                    "signaled running workflow"
                );
                return Ok(StartOutcome::Signaled);
            }

            instances.insert(
                request.workflow_id.clone(),
                Instance {
                    workflow_type: handler.workflow_type(),
                    pending: vec![request.signal],
                },
            );
            self.inner.live.send_replace(instances.len());
        }

        tracing::info!(
            workflow_id = %request.workflow_id,
            workflow_type = %request.workflow_type,
            task_queue = %request.task_queue,
            "started workflow"
        );

        tokio::spawn(self.clone().drive(
            handler,
            request.workflow_id,
            request.args,
            request.task_queue,
        ));

        Ok(StartOutcome::Started)
    }

    async fn signal(&self, workflow_id: &str, signal: Signal) -> Result<(), SchedulerError> {
        self.ensure_accepting()?;

        let mut instances = self.instances();
        match instances.get_mut(workflow_id) {
            Some(instance) => {
                instance.pending.push(signal);
                Ok(())
            }
            None => Err(SchedulerError::WorkflowNotFound(workflow_id.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ActivityError, WorkflowError};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const TYPE: &str = "test_workflow";

    /// Records every pass; each pass waits for one permit on `gate`.
    struct GatedHandler {
        gate: Arc<Semaphore>,
        passes: Arc<Mutex<Vec<(String, usize)>>>,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
        fail_first: bool,
    }

    impl GatedHandler {
        fn new(fail_first: bool) -> Self {
            Self {
                gate: Arc::new(Semaphore::new(0)),
                passes: Arc::new(Mutex::new(Vec::new())),
                running: Arc::new(AtomicUsize::new(0)),
                max_running: Arc::new(AtomicUsize::new(0)),
                fail_first,
            }
        }
    }

    #[async_trait]
    impl WorkflowHandler for GatedHandler {
        fn workflow_type(&self) -> &'static str {
            TYPE
        }

        async fn run(
            &self,
            workflow_id: &str,
            _args: &serde_json::Value,
            signals: Vec<Signal>,
        ) -> Result<(), WorkflowError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            self.gate.acquire().await.expect("gate").forget();

            let pass_index = {
                let mut passes = self.passes.lock().unwrap();
                passes.push((workflow_id.to_owned(), signals.len()));
                passes.len()
            };
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.fail_first && pass_index == 1 {
                return Err(ActivityError::Internal("boom".to_owned()).into());
            }
            Ok(())
        }
    }

    fn request(workflow_id: &str) -> SignalWithStart {
        SignalWithStart {
            workflow_type: TYPE.to_owned(),
            workflow_id: workflow_id.to_owned(),
            task_queue: "test-queue".to_owned(),
            args: serde_json::Value::Null,
            signal: Signal::named("poke"),
        }
    }

    fn scheduler_with(handler: GatedHandler) -> (LocalScheduler, Arc<GatedHandler>) {
        let handler = Arc::new(handler);
        let scheduler = LocalScheduler::new(4);
        scheduler.register(handler.clone());
        (scheduler, handler)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn second_request_for_live_id_is_merged() {
        let (scheduler, handler) = scheduler_with(GatedHandler::new(false));

        let first = scheduler.signal_with_start(request("wf-1")).await.unwrap();
        settle().await;
        let second = scheduler.signal_with_start(request("wf-1")).await.unwrap();
        let third = scheduler.signal_with_start(request("wf-1")).await.unwrap();

        assert_eq!(first, StartOutcome::Started);
        assert_eq!(second, StartOutcome::Signaled);
        assert_eq!(third, StartOutcome::Signaled);
        assert_eq!(scheduler.live_instances(), 1);

        handler.gate.add_permits(10);
        scheduler.wait_idle().await;

        let passes = handler.passes.lock().unwrap().clone();
        // First pass saw the starting signal; the two merged signals share one follow-up pass.
        assert_eq!(passes, vec![("wf-1".to_owned(), 1), ("wf-1".to_owned(), 2)]);
        assert_eq!(handler.max_running.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_running("wf-1"));
    }

    #[tokio::test]
    async fn concurrent_requests_start_exactly_one_instance() {
        let (scheduler, handler) = scheduler_with(GatedHandler::new(false));

        let (a, b) = tokio::join!(
            scheduler.signal_with_start(request("wf-dup")),
            scheduler.signal_with_start(request("wf-dup")),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes.iter().filter(|o| **o == StartOutcome::Started).count(),
            1
        );
        assert_eq!(scheduler.live_instances(), 1);

        handler.gate.add_permits(10);
        scheduler.wait_idle().await;
        assert_eq!(handler.max_running.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn distinct_ids_run_independently() {
        let (scheduler, handler) = scheduler_with(GatedHandler::new(false));

        scheduler.signal_with_start(request("wf-a")).await.unwrap();
        scheduler.signal_with_start(request("wf-b")).await.unwrap();
        assert_eq!(scheduler.live_instances(), 2);

        handler.gate.add_permits(10);
        scheduler.wait_idle().await;
        assert_eq!(handler.passes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn signal_requires_live_instance() {
        let (scheduler, handler) = scheduler_with(GatedHandler::new(false));

        let err = scheduler
            .signal("wf-missing", Signal::named("poke"))
            .await
            .unwrap_err();
        assert_eq!(err, SchedulerError::WorkflowNotFound("wf-missing".to_owned()));

        scheduler.signal_with_start(request("wf-live")).await.unwrap();
        scheduler
            .signal("wf-live", Signal::named("poke"))
            .await
            .expect("live instance accepts signal");

        handler.gate.add_permits(10);
        scheduler.wait_idle().await;
    }

    #[tokio::test]
    async fn unknown_workflow_type_is_rejected() {
        let scheduler = LocalScheduler::new(1);
        let err = scheduler.signal_with_start(request("wf-1")).await.unwrap_err();
        assert_eq!(err, SchedulerError::UnknownWorkflowType(TYPE.to_owned()));
        assert_eq!(scheduler.live_instances(), 0);
    }

    #[tokio::test]
    async fn failed_pass_does_not_drop_pending_signals() {
        let (scheduler, handler) = scheduler_with(GatedHandler::new(true));

        scheduler.signal_with_start(request("wf-1")).await.unwrap();
        settle().await;
        scheduler.signal_with_start(request("wf-1")).await.unwrap();

        handler.gate.add_permits(10);
        scheduler.wait_idle().await;
        assert_eq!(handler.passes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_pass_is_not_replayed() {
        let (scheduler, handler) = scheduler_with(GatedHandler::new(true));

        scheduler.signal_with_start(request("wf-1")).await.unwrap();
        handler.gate.add_permits(10);
        scheduler.wait_idle().await;

        assert_eq!(handler.passes.lock().unwrap().len(), 1);
        assert!(!scheduler.is_running("wf-1"));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work() {
        let (scheduler, handler) = scheduler_with(GatedHandler::new(false));
        scheduler.signal_with_start(request("wf-1")).await.unwrap();

        handler.gate.add_permits(10);
        scheduler.shutdown().await;

        let err = scheduler.signal_with_start(request("wf-2")).await.unwrap_err();
        assert_eq!(err, SchedulerError::ShuttingDown);
    }
}
