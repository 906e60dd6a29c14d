//! Priority execution engine.
//!
//! A bounded pool of worker tasks drains one shared [`JobQueue`]. Each
//! scheduled job is represented by a [`JobTicket`] shared between its queue
//! entry and the caller's [`JobHandle`]; the ticket carries the status channel
//! and the final outcome, so the handle never has to be the queue entry.
//!
//! ## Pool sizing
//!
//! `core_pool_size` workers are spawned up front and live until shutdown.
//! When more jobs are queued than workers are idle, extra workers are spawned
//! up to `maximum_pool_size`; they exit after `keep_alive` without work.
//!
//! ## Shutdown
//!
//! Shutdown rejects new jobs, cancels every job still waiting in the queue and
//! lets running jobs finish.

use crate::config::PoolConfig;
use crate::error::{ConverterError, Result};
use crate::job::{JobId, JobRecord, JobStatus, Priority};
use crate::queue::JobQueue;
use crate::remote::{ConversionReply, ConversionService};
use crate::source::{DocumentSource, ResultConsumer};
use crate::telemetry::Telemetry;
use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

// =============================================================================
// Job Ticket
// =============================================================================

/// State of one scheduled job, shared by its queue entry and its handles.
pub(crate) struct JobTicket {
    id: JobId,
    priority: Priority,
    source: Arc<dyn DocumentSource>,
    consumer: Arc<dyn ResultConsumer>,
    state: Mutex<TicketState>,
    status_tx: watch::Sender<JobStatus>,
    interrupt: CancellationToken,
}

struct TicketState {
    record: JobRecord,
    outcome: Option<Result<bool>>,
}

impl JobTicket {
    fn new(
        source: Arc<dyn DocumentSource>,
        consumer: Arc<dyn ResultConsumer>,
        priority: Priority,
    ) -> Arc<Self> {
        let mut record = JobRecord::new(priority);
        record.mark_scheduled();
        let (status_tx, _) = watch::channel(JobStatus::Scheduled);

        Arc::new(Self {
            id: record.job_id,
            priority,
            source,
            consumer,
            state: Mutex::new(TicketState {
                record,
                outcome: None,
            }),
            status_tx,
            interrupt: CancellationToken::new(),
        })
    }

    fn record(&self) -> JobRecord {
        self.state.lock().record.clone()
    }

    /// Moves a queued job to running. False if it was cancelled meanwhile.
    fn try_start(&self) -> bool {
        let mut state = self.state.lock();
        if state.record.status != JobStatus::Scheduled {
            return false;
        }
        state.record.start_processing();
        self.status_tx.send_replace(JobStatus::Running);
        true
    }

    /// Cancels the job if no worker has picked it up yet.
    fn cancel_queued(&self) -> Option<JobRecord> {
        let mut state = self.state.lock();
        if state.record.status != JobStatus::Scheduled {
            return None;
        }
        state.record.mark_cancelled();
        state.outcome = Some(Err(ConverterError::Cancelled));
        self.status_tx.send_replace(JobStatus::Cancelled);
        Some(state.record.clone())
    }

    /// Requests interruption of a running job.
    fn interrupt_running(&self) -> bool {
        let state = self.state.lock();
        if state.record.status != JobStatus::Running {
            return false;
        }
        self.interrupt.cancel();
        true
    }

    /// Stores the outcome of an execution and publishes the terminal status.
    fn finish(&self, outcome: Result<bool>) -> JobRecord {
        let mut state = self.state.lock();
        if state.record.status.is_terminal() {
            return state.record.clone();
        }
        match &outcome {
            Ok(_) => state.record.mark_complete(),
            Err(ConverterError::Cancelled) => state.record.mark_cancelled(),
            Err(e) => state.record.mark_failed(e.to_string()),
        }
        state.outcome = Some(outcome);
        self.status_tx.send_replace(state.record.status);
        state.record.clone()
    }

    fn outcome(&self) -> Result<bool> {
        self.state.lock().outcome.clone().unwrap_or_else(|| {
            Err(ConverterError::illegal_state(format!(
                "job {} has not finished",
                self.id
            )))
        })
    }
}

// =============================================================================
// Job Handle
// =============================================================================

/// Caller-side handle of a scheduled conversion job.
///
/// Cloneable; all clones refer to the same job. Resolves to `Ok(true)` when
/// the converted document was delivered, `Ok(false)` when the server rejected
/// the document, and `Err` on failure or cancellation.
#[derive(Clone)]
pub struct JobHandle {
    ticket: Arc<JobTicket>,
    engine: Weak<Shared>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.ticket.id
    }

    pub fn priority(&self) -> Priority {
        self.ticket.priority
    }

    /// Current status, without waiting.
    pub fn status(&self) -> JobStatus {
        *self.ticket.status_tx.borrow()
    }

    /// Snapshot of the job's lifecycle record.
    pub fn record(&self) -> JobRecord {
        self.ticket.record()
    }

    pub fn is_done(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == JobStatus::Cancelled
    }

    /// Attempts to cancel the job.
    ///
    /// A queued job is removed from the queue and never executes. A running
    /// job is only interrupted when `may_interrupt_if_running` is set; the
    /// in-flight request is then dropped, which aborts the HTTP exchange on
    /// the client side but cannot undo work the server already started.
    /// Interrupting is best effort: a job that completes in the same instant
    /// keeps its result.
    ///
    /// Returns false if the job could not be cancelled.
    pub fn cancel(&self, may_interrupt_if_running: bool) -> bool {
        if let Some(record) = self.ticket.cancel_queued() {
            let engine = self.engine.upgrade();
            if let Some(shared) = &engine {
                shared.discard(self.ticket.id);
            }
            notify_consumer(self.ticket.id, || self.ticket.consumer.on_cancel());
            debug!(job_id = %self.ticket.id, "Cancelled queued conversion job");
            if let Some(shared) = &engine {
                shared.telemetry.record_job(&record);
            }
            return true;
        }

        may_interrupt_if_running && self.ticket.interrupt_running()
    }

    /// Waits for the job to reach a terminal state and returns its result.
    pub async fn wait(&self) -> Result<bool> {
        let mut status_rx = self.ticket.status_tx.subscribe();
        // The sender lives in the ticket we hold, so the channel cannot close.
        let _ = status_rx.wait_for(|status| status.is_terminal()).await;
        self.ticket.outcome()
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    ///
    /// Returns `None` if the job is still pending; the job keeps running.
    pub async fn wait_timeout(&self, timeout: Duration) -> Option<Result<bool>> {
        tokio::time::timeout(timeout, self.wait()).await.ok()
    }

    /// Blocks the calling thread until the job finishes.
    ///
    /// Must not be called from within an async task.
    pub fn wait_blocking(&self) -> Result<bool> {
        futures::executor::block_on(self.wait())
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("job_id", &self.ticket.id)
            .field("priority", &self.ticket.priority)
            .field("status", &self.status())
            .finish()
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Worker pool executing conversion jobs in priority order.
#[derive(Clone)]
pub(crate) struct Engine {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    pool: PoolConfig,
    service: Arc<dyn ConversionService>,
    telemetry: Telemetry,
    runtime: Handle,
    tracker: TaskTracker,
    available: Notify,
    state: Mutex<PoolState>,
}

struct PoolState {
    queue: JobQueue<Arc<JobTicket>>,
    workers: usize,
    idle: usize,
    next_worker_id: usize,
    shut_down: bool,
}

impl Engine {
    /// Starts the core workers on the current tokio runtime.
    pub(crate) fn start(
        pool: PoolConfig,
        service: Arc<dyn ConversionService>,
        telemetry: Telemetry,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            ConverterError::illegal_state("The converter must be started within a tokio runtime")
        })?;

        let shared = Arc::new(Shared {
            pool,
            service,
            telemetry,
            runtime,
            tracker: TaskTracker::new(),
            available: Notify::new(),
            state: Mutex::new(PoolState {
                queue: JobQueue::new(),
                workers: 0,
                idle: 0,
                next_worker_id: 0,
                shut_down: false,
            }),
        });

        {
            let mut state = shared.state.lock();
            for _ in 0..pool.core_pool_size {
                shared.spawn_worker(&mut state, true);
            }
        }

        info!(
            core_pool_size = pool.core_pool_size,
            maximum_pool_size = pool.maximum_pool_size,
            "Conversion engine started"
        );
        Ok(Self { shared })
    }

    /// Queues a job and returns its handle.
    ///
    /// Fails with [`ConverterError::IllegalState`] after shutdown.
    pub(crate) fn schedule(
        &self,
        source: Arc<dyn DocumentSource>,
        consumer: Arc<dyn ResultConsumer>,
        priority: Priority,
    ) -> Result<JobHandle> {
        let ticket = JobTicket::new(source, consumer, priority);

        {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return Err(ConverterError::illegal_state(
                    "The converter has been shut down",
                ));
            }
            state.queue.enqueue(Arc::clone(&ticket), priority);
            if state.queue.len() > state.idle && state.workers < self.shared.pool.maximum_pool_size
            {
                self.shared.spawn_worker(&mut state, false);
            }
        }
        self.shared.available.notify_one();

        debug!(job_id = %ticket.id, priority = %priority, "Scheduled conversion job");
        Ok(JobHandle {
            ticket,
            engine: Arc::downgrade(&self.shared),
        })
    }

    /// Stops accepting jobs and cancels everything still queued.
    ///
    /// Returns false if the engine was already shut down.
    pub(crate) fn shut_down(&self) -> bool {
        let discarded = {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return false;
            }
            state.shut_down = true;
            state.queue.drain()
        };

        self.shared.tracker.close();
        self.shared.available.notify_waiters();

        let discarded_count = discarded.len();
        for ticket in discarded {
            if let Some(record) = ticket.cancel_queued() {
                notify_consumer(ticket.id, || ticket.consumer.on_cancel());
                self.shared.telemetry.record_job(&record);
            }
        }

        info!(discarded = discarded_count, "Conversion engine shut down");
        true
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shut_down
    }

    /// Waits until every worker has exited. Only returns after shutdown.
    pub(crate) async fn await_termination(&self) {
        self.shared.tracker.wait().await;
    }

    /// Number of jobs waiting for a worker.
    pub(crate) fn queue_length(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Number of live workers.
    pub(crate) fn worker_count(&self) -> usize {
        self.shared.state.lock().workers
    }
}

impl Shared {
    fn spawn_worker(self: &Arc<Self>, state: &mut PoolState, core: bool) {
        let worker_id = state.next_worker_id;
        state.next_worker_id += 1;
        state.workers += 1;

        let shared = Arc::clone(self);
        self.tracker
            .spawn_on(worker_loop(shared, worker_id, core), &self.runtime);
    }

    fn discard(&self, job_id: JobId) {
        self.state.lock().queue.remove_where(|ticket| ticket.id == job_id);
    }

    /// Waits for the next job. Returns `None` when the worker should exit.
    async fn next_job(&self, worker_id: usize, core: bool) -> Option<Arc<JobTicket>> {
        loop {
            // Registered before the queue check so no wake-up is lost.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(entry) = state.queue.dequeue() {
                    let ticket = entry.item;
                    self.telemetry
                        .record_dispatch(worker_id, &ticket.record(), state.queue.len());
                    return Some(ticket);
                }
                if state.shut_down {
                    state.workers -= 1;
                    return None;
                }
                state.idle += 1;
            }

            let woken = if core {
                notified.await;
                true
            } else {
                tokio::time::timeout(self.pool.keep_alive, notified)
                    .await
                    .is_ok()
            };

            {
                let mut state = self.state.lock();
                state.idle -= 1;
                if !woken && state.queue.is_empty() {
                    state.workers -= 1;
                    debug!(worker_id = worker_id, "Idle conversion worker exiting");
                    return None;
                }
            }
        }
    }

    async fn execute(&self, ticket: Arc<JobTicket>) {
        if !ticket.try_start() {
            return;
        }

        // A panic anywhere in the conversion fails this job only.
        let conversion = AssertUnwindSafe(self.convert(&ticket)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = ticket.interrupt.cancelled() => Err(ConverterError::Cancelled),
            result = conversion => result.unwrap_or_else(|_| {
                Err(ConverterError::illegal_state("conversion service panicked"))
            }),
        };

        match &outcome {
            Err(ConverterError::Cancelled) => {
                notify_consumer(ticket.id, || ticket.consumer.on_cancel());
            }
            // The consumer reported its own failure already.
            Err(ConverterError::Consumer(_)) => {}
            Err(e) => {
                notify_consumer(ticket.id, || ticket.consumer.on_exception(e));
            }
            Ok(_) => {}
        }

        let record = ticket.finish(outcome);
        self.telemetry.record_job(&record);
    }

    async fn convert(&self, ticket: &JobTicket) -> Result<bool> {
        let payload = match AssertUnwindSafe(ticket.source.load()).catch_unwind().await {
            Ok(loaded) => loaded.map_err(|e| ConverterError::Source(e.to_string()))?,
            Err(_) => {
                return Err(ConverterError::Source(
                    "document source panicked".to_string(),
                ))
            }
        };

        let reply = self.service.convert(payload).await?;
        if panic::catch_unwind(AssertUnwindSafe(|| ticket.source.on_consumed())).is_err() {
            warn!(job_id = %ticket.id, "Document source panicked after conversion");
        }

        match reply {
            ConversionReply::Converted(output) => {
                deliver(ticket.consumer.as_ref(), output)?;
                Ok(true)
            }
            ConversionReply::Rejected { status } => {
                let rejection = ConverterError::Server {
                    status,
                    message: "document rejected by conversion server".to_string(),
                };
                if notify_consumer(ticket.id, || ticket.consumer.on_exception(&rejection)) {
                    Ok(false)
                } else {
                    Err(ConverterError::Consumer(
                        "result consumer panicked".to_string(),
                    ))
                }
            }
        }
    }
}

async fn worker_loop(shared: Arc<Shared>, worker_id: usize, core: bool) {
    debug!(worker_id = worker_id, core = core, "Conversion worker started");

    while let Some(ticket) = shared.next_job(worker_id, core).await {
        shared.execute(ticket).await;
    }

    debug!(worker_id = worker_id, "Conversion worker stopped");
}

/// Runs a consumer notification. Returns false if the consumer panicked.
fn notify_consumer(job_id: JobId, notification: impl FnOnce()) -> bool {
    if panic::catch_unwind(AssertUnwindSafe(notification)).is_ok() {
        return true;
    }
    warn!(job_id = %job_id, "Result consumer panicked while being notified");
    false
}

/// Hands the output to the consumer; a panicking consumer fails only its job.
fn deliver(consumer: &dyn ResultConsumer, output: Bytes) -> Result<()> {
    match panic::catch_unwind(AssertUnwindSafe(|| consumer.on_complete(output))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConverterError::Consumer(e.to_string())),
        Err(_) => Err(ConverterError::Consumer(
            "result consumer panicked".to_string(),
        )),
    }
}
