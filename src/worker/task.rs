//! Background execution with lifecycle callbacks.
//!
//! [`AsyncTask::execute`] runs `on_pre_execute` immediately, spawns
//! `on_execute` onto the runtime and returns. The outcome travels back over
//! the owner's completion channel and the remaining callbacks run only when
//! the owner dispatches it, on whatever context drives the [`TaskOwner`]:
//! exactly one of `on_executed` / `on_exception`, then `on_post_execute`.
//!
//! Tearing the owner down drops every pending delivery without running it.
//! Work already in flight is not aborted; its result is discarded.

use std::any::Any;
use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, error, info_span};

use crate::errors::SummarizeError;

/// Terminal result of one execution.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Success(T),
    Failure(SummarizeError),
    Cancelled,
}

impl<T> TaskOutcome<T> {
    #[must_use]
    pub fn kind(&self) -> OutcomeKind {
        match self {
            TaskOutcome::Success(_) => OutcomeKind::Success,
            TaskOutcome::Failure(_) => OutcomeKind::Failure,
            TaskOutcome::Cancelled => OutcomeKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Success,
    Failure,
    Cancelled,
}

#[async_trait]
pub trait AsyncTask: Send + Sync + 'static {
    type Args: Send + Sync + 'static;
    type Output: Send + 'static;

    /// Runs on the caller before the work is scheduled.
    fn on_pre_execute(&self, _args: &Self::Args) {}

    /// The unit of work. Runs on the runtime, never on the owner.
    async fn on_execute(&self, args: &Self::Args) -> Result<Self::Output, SummarizeError>;

    fn on_executed(&self, args: &Self::Args, output: Self::Output);

    fn on_exception(&self, args: &Self::Args, error: &SummarizeError);

    /// Runs last after either `on_executed` or `on_exception`.
    fn on_post_execute(&self, _args: &Self::Args) {}

    /// Schedules this task. `tag` only labels log output.
    ///
    /// Must be called from within a tokio runtime.
    fn execute(self: Arc<Self>, owner: &TaskOwner, args: Self::Args, tag: &str) -> TaskHandle
    where
        Self: Sized,
    {
        spawn_task(self, owner, args, tag)
    }
}

struct Delivery {
    run: Box<dyn FnOnce() -> OutcomeKind + Send>,
    done: oneshot::Sender<OutcomeKind>,
}

impl Delivery {
    fn run(self) {
        let kind = (self.run)();
        let _ = self.done.send(kind);
    }
}

enum Envelope {
    Deliver(Delivery),
    /// The worker went away without producing a delivery.
    Abandoned,
}

/// The worker's side of the owner relationship.
struct OwnerLink {
    sender: Option<mpsc::UnboundedSender<Envelope>>,
    alive: Arc<AtomicBool>,
}

impl OwnerLink {
    fn deliver(mut self, delivery: Delivery) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        if !self.alive.load(Ordering::Acquire) {
            debug!("Owner torn down, dropping delivery");
            return;
        }
        if sender.send(Envelope::Deliver(delivery)).is_err() {
            debug!("Owner gone, dropping delivery");
        }
    }
}

impl Drop for OwnerLink {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Envelope::Abandoned);
        }
    }
}

/// The control context that receives task callbacks.
///
/// Callbacks only ever run inside [`TaskOwner::dispatch_next`] or
/// [`TaskOwner::try_dispatch`], so they execute on whichever thread drives
/// the owner.
pub struct TaskOwner {
    sender: mpsc::UnboundedSender<Envelope>,
    receiver: mpsc::UnboundedReceiver<Envelope>,
    alive: Arc<AtomicBool>,
    pending: Cell<usize>,
}

impl Default for TaskOwner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskOwner {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver,
            alive: Arc::new(AtomicBool::new(true)),
            pending: Cell::new(0),
        }
    }

    /// Executions whose outcome has not been dispatched yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.get()
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        !self.alive.load(Ordering::Acquire)
    }

    fn link(&self) -> OwnerLink {
        self.pending.set(self.pending.get() + 1);
        OwnerLink {
            sender: Some(self.sender.clone()),
            alive: Arc::clone(&self.alive),
        }
    }

    fn settle(&self) {
        self.pending.set(self.pending.get().saturating_sub(1));
    }

    /// Waits for the next outcome and runs its callbacks.
    ///
    /// Returns `false` without waiting when nothing is pending or the owner
    /// has been torn down.
    pub async fn dispatch_next(&mut self) -> bool {
        while !self.is_torn_down() && self.pending.get() > 0 {
            let Some(envelope) = self.receiver.recv().await else {
                return false;
            };
            self.settle();
            if let Envelope::Deliver(delivery) = envelope {
                delivery.run();
                return true;
            }
        }
        false
    }

    /// Runs the callbacks of every outcome that is already available.
    /// Returns how many were dispatched.
    pub fn try_dispatch(&mut self) -> usize {
        let mut dispatched = 0;
        while !self.is_torn_down() {
            let Ok(envelope) = self.receiver.try_recv() else {
                break;
            };
            self.settle();
            if let Envelope::Deliver(delivery) = envelope {
                delivery.run();
                dispatched += 1;
            }
        }
        dispatched
    }

    /// Dispatches until nothing is pending.
    pub async fn run_until_idle(&mut self) {
        while self.dispatch_next().await {}
    }

    /// Detaches every execution from this owner. Queued and future outcomes
    /// are dropped without running any callback.
    pub fn tear_down(&mut self) {
        self.alive.store(false, Ordering::Release);
        self.receiver.close();
        let mut dropped = 0;
        while let Ok(envelope) = self.receiver.try_recv() {
            if matches!(envelope, Envelope::Deliver(_)) {
                dropped += 1;
            }
        }
        if dropped > 0 || self.pending.get() > 0 {
            debug!(
                "Owner torn down with {} pending, {} queued outcomes dropped",
                self.pending.get(),
                dropped
            );
        }
        self.pending.set(0);
    }
}

impl Drop for TaskOwner {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Resolves once the outcome of an execution has been dispatched or dropped.
#[derive(Debug)]
pub struct TaskHandle {
    tag: String,
    done: oneshot::Receiver<OutcomeKind>,
}

impl TaskHandle {
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The kind of outcome the owner received, or
    /// [`OutcomeKind::Cancelled`] if the owner was torn down first.
    pub async fn wait(self) -> OutcomeKind {
        self.done.await.unwrap_or(OutcomeKind::Cancelled)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task panicked".to_string())
}

fn spawn_task<K: AsyncTask>(task: Arc<K>, owner: &TaskOwner, args: K::Args, tag: &str) -> TaskHandle {
    let (done_tx, done_rx) = oneshot::channel();
    let handle = TaskHandle {
        tag: tag.to_string(),
        done: done_rx,
    };

    if owner.is_torn_down() {
        debug!("Owner torn down, not executing task {}", tag);
        return handle;
    }

    task.on_pre_execute(&args);

    let link = owner.link();
    let args = Arc::new(args);
    let span = info_span!("task", tag = %tag);

    tokio::spawn(
        async move {
            let result = AssertUnwindSafe(task.on_execute(&args))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(&*panic);
                    error!("Task panicked: {}", message);
                    Err(SummarizeError::TaskError(message))
                });

            let outcome = match result {
                Ok(output) => TaskOutcome::Success(output),
                Err(error) => {
                    debug!("Task failed: {}", error);
                    TaskOutcome::Failure(error)
                }
            };

            link.deliver(Delivery {
                run: Box::new(move || {
                    let kind = outcome.kind();
                    match outcome {
                        TaskOutcome::Success(output) => task.on_executed(&args, output),
                        TaskOutcome::Failure(error) => task.on_exception(&args, &error),
                        TaskOutcome::Cancelled => {}
                    }
                    task.on_post_execute(&args);
                    kind
                }),
                done: done_tx,
            });
        }
        .instrument(span),
    );

    handle
}
