//! The Command Pipeline (§4.4).
//!
//! Two unbounded queues (§9 sanctions unbounded as "a deliberate
//! simplification") and two workers: a **processor** that pulls one
//! command at a time and hands it to the [`CommandHandler`] — the single
//! consumer that gives invariant 4 ("no two commands execute in the
//! handler concurrently") — and a **dispatcher** that publishes each
//! result via the [`Hub`] before resolving any pending correlation
//! rendezvous, in that order (§4.4 ordering guarantee).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use command_core::CommandHandler;
use command_types::{ModelCommand, ModelResult};
use notification_hub::Hub;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::PipelineError;

struct Workers {
    cancel: CancellationToken,
    processor: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

pub struct CommandPipeline {
    handler: Arc<CommandHandler>,
    hub: Arc<Hub>,
    command_tx: Mutex<Option<mpsc::UnboundedSender<ModelCommand>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<ModelResult>>>,
    workers: AsyncMutex<Option<Workers>>,
    running: AtomicBool,
}

impl CommandPipeline {
    pub fn new(handler: Arc<CommandHandler>, hub: Arc<Hub>) -> Self {
        Self {
            handler,
            hub,
            command_tx: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            workers: AsyncMutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the processor and dispatcher workers as children of
    /// `parent_cancel` (§5, §9's hierarchical cancellation scope).
    pub async fn start(self: &Arc<Self>, parent_cancel: &CancellationToken) {
        let cancel = parent_cancel.child_token();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<ModelCommand>();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ModelResult>();

        *self.command_tx.lock().expect("command tx lock poisoned") = Some(command_tx);
        self.running.store(true, Ordering::SeqCst);

        let handler = Arc::clone(&self.handler);
        let processor_cancel = cancel.clone();
        let processor = tokio::spawn(async move {
            loop {
                let cmd = tokio::select! {
                    _ = processor_cancel.cancelled() => break,
                    cmd = command_rx.recv() => match cmd {
                        Some(cmd) => cmd,
                        None => break,
                    },
                };
                let result = handler.handle(&cmd).await;
                if result_tx.send(result).is_err() {
                    debug!("pipeline result channel closed, processor stopping");
                    break;
                }
            }
        });

        let pipeline = Arc::clone(self);
        let dispatcher_cancel = cancel.clone();
        let dispatcher = tokio::spawn(async move {
            loop {
                let result = tokio::select! {
                    _ = dispatcher_cancel.cancelled() => break,
                    result = result_rx.recv() => match result {
                        Some(result) => result,
                        None => break,
                    },
                };
                pipeline.dispatch(result);
            }
        });

        *self.workers.lock().await = Some(Workers {
            cancel,
            processor,
            dispatcher,
        });
    }

    fn dispatch(&self, result: ModelResult) {
        let correlation_id = result.correlation_id.clone();
        self.hub.notify_result(result.clone());
        if let Some(correlation_id) = correlation_id {
            let sender = self
                .pending
                .lock()
                .expect("pending table poisoned")
                .remove(&correlation_id);
            if let Some(sender) = sender {
                let _ = sender.send(result);
            }
        }
    }

    /// Push a command onto the queue. Returns `false` only if the pipeline
    /// is stopped (§4.4).
    ///
    /// Synchronous on purpose: the command queue's send is itself a
    /// non-blocking, non-async operation, and this is the method the
    /// orchestrator wires directly to a controller's synchronous
    /// `command_requested` subscription (§4.5) — no runtime hop needed.
    pub fn try_enqueue(&self, cmd: ModelCommand) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        match self
            .command_tx
            .lock()
            .expect("command tx lock poisoned")
            .as_ref()
        {
            Some(tx) => tx.send(cmd).is_ok(),
            None => false,
        }
    }

    /// Enqueue `cmd` (which must carry a `correlation_id`) and await its
    /// matching result via the rendezvous table (§4.4, §9).
    pub async fn execute(&self, cmd: ModelCommand) -> Result<ModelResult, PipelineError> {
        let correlation_id = cmd
            .correlation_id
            .clone()
            .ok_or(PipelineError::MissingCorrelationId)?;

        if !self.running.load(Ordering::SeqCst) {
            return Err(PipelineError::NotRunning);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().expect("pending table poisoned");
            if pending.contains_key(&correlation_id) {
                return Err(PipelineError::DuplicateCorrelationId(correlation_id));
            }
            pending.insert(correlation_id.clone(), tx);
        }

        if !self.try_enqueue(cmd) {
            self.pending
                .lock()
                .expect("pending table poisoned")
                .remove(&correlation_id);
            return Err(PipelineError::EnqueueFailed);
        }

        rx.await.map_err(|_| PipelineError::Cancelled)
    }

    /// Cancel both workers, wait for them to drain, and cancel all
    /// outstanding pending correlation slots.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.command_tx.lock().expect("command tx lock poisoned").take();

        if let Some(workers) = self.workers.lock().await.take() {
            workers.cancel.cancel();
            if let Err(err) = workers.processor.await {
                warn!(%err, "pipeline processor task panicked");
            }
            if let Err(err) = workers.dispatcher.await {
                warn!(%err, "pipeline dispatcher task panicked");
            }
        }

        // Dropping each sender resolves its receiver with an error —
        // exactly the "cancellation" outcome `execute`'s callers observe.
        self.pending.lock().expect("pending table poisoned").clear();
    }
}
