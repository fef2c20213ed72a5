//! Resource sender façade and its delivery worker.
//!
//! Producers hold a [`SenderHandle`] and push envelopes into a bounded
//! queue. A single worker task owns the pending batch and the connection;
//! nothing else touches either. The worker flushes when an arrival fills the
//! batch, when the timer fires with at least the minimum batch pending, and
//! on shutdown.
//!
//! ```text
//! send ──► [bounded queue] ──► worker ──► PendingBatch ──► Connection ──► ingestion
//!                                 ▲
//!                      timer tick ┘
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::buffer::{DeliveryStats, FlushDecision, FlushMode, PendingBatch, SenderConfig};
use crate::client::HttpConnector;
use crate::codec::{Codec, CodecError, Reflect};
use crate::config::Config;
use crate::connection::{backoff_delay, Connection};
use crate::envelope::{Envelope, JobContext, ResourceMeta};
use crate::job::JobStatus;
use crate::transport::Connector;

/// Work items carried by the queue.
#[derive(Debug)]
enum Message {
    Envelope(Envelope),
    Status(JobStatus),
    Shutdown,
}

/// Errors that can occur when handing work to the sender.
#[derive(Debug)]
pub enum SenderError {
    /// The resource could not be encoded
    Codec(CodecError),

    /// The worker has terminated and no longer accepts work
    Closed,

    /// The queue is full (for non-blocking sends)
    Full,
}

impl std::fmt::Display for SenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SenderError::Codec(e) => write!(f, "Failed to encode resource: {}", e),
            SenderError::Closed => write!(f, "Sender has been closed"),
            SenderError::Full => write!(f, "Sender queue is full"),
        }
    }
}

impl std::error::Error for SenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SenderError::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for SenderError {
    fn from(err: CodecError) -> Self {
        SenderError::Codec(err)
    }
}

/// What the worker hands back when it terminates.
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    /// Ids of every envelope that made it into the queue, in queue order
    pub resource_ids: Vec<String>,

    pub stats: DeliveryStats,
}

/// A producer handle for submitting resources to the sender.
///
/// This can be cloned and shared across multiple enumeration tasks.
#[derive(Clone)]
pub struct SenderHandle {
    tx: mpsc::Sender<Message>,
    codec: Arc<Codec>,
    job: Arc<JobContext>,
}

impl SenderHandle {
    /// Enqueue an envelope.
    ///
    /// Waits while the queue is full. Returns an error if the sender has
    /// been finished.
    pub async fn send(&self, envelope: Envelope) -> Result<(), SenderError> {
        self.tx
            .send(Message::Envelope(envelope))
            .await
            .map_err(|_| SenderError::Closed)
    }

    /// Try to enqueue an envelope without waiting.
    pub fn try_send(&self, envelope: Envelope) -> Result<(), SenderError> {
        self.tx
            .try_send(Message::Envelope(envelope))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SenderError::Full,
                mpsc::error::TrySendError::Closed(_) => SenderError::Closed,
            })
    }

    /// Encode `resource`, wrap it with `meta` and the job correlation, and
    /// enqueue it.
    ///
    /// # Errors
    ///
    /// Codec errors are returned before anything is enqueued.
    pub async fn send_resource(
        &self,
        meta: ResourceMeta,
        resource: &dyn Reflect,
    ) -> Result<(), SenderError> {
        let envelope = Envelope::describe(&self.codec, meta, &self.job, resource)?;
        self.send(envelope).await
    }

    /// Enqueue a job-level status. Pending envelopes are flushed before the
    /// status goes out.
    pub async fn report_status(&self, status: JobStatus) -> Result<(), SenderError> {
        self.tx
            .send(Message::Status(status))
            .await
            .map_err(|_| SenderError::Closed)
    }

    pub fn job(&self) -> &JobContext {
        &self.job
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }
}

/// Encodes resources and streams them in batches to the ingestion service.
///
/// # Example
///
/// ```no_run
/// use resource_sender::config::Config;
/// use resource_sender::envelope::{JobContext, ResourceMeta};
/// use resource_sender::sender::ResourceSender;
///
/// #[tokio::main]
/// async fn main() {
///     let config = Config::from_env().expect("Failed to load config");
///     let job = JobContext::new("job-1", "AWS::S3::Bucket");
///     let sender = ResourceSender::from_config(&config, job);
///
///     let bucket = String::from("logs");
///     let meta = ResourceMeta::new("arn:aws:s3:::logs", "logs", "AWS::S3::Bucket");
///     sender.send_resource(meta, &bucket).await.expect("encode failed");
///
///     let ids = sender.finish().await;
///     assert_eq!(ids, vec!["arn:aws:s3:::logs"]);
/// }
/// ```
pub struct ResourceSender {
    handle: SenderHandle,
    worker: JoinHandle<DeliveryReport>,
}

impl ResourceSender {
    /// Start the delivery worker on the current tokio runtime.
    pub fn spawn<C: Connector>(
        config: SenderConfig,
        connector: C,
        codec: Codec,
        job: JobContext,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = DeliveryWorker::new(rx, connector, config);
        let worker = tokio::spawn(worker.run());

        Self {
            handle: SenderHandle {
                tx,
                codec: Arc::new(codec),
                job: Arc::new(job),
            },
            worker,
        }
    }

    /// Start a sender that delivers over HTTP as configured.
    pub fn from_config(config: &Config, job: JobContext) -> Self {
        Self::spawn(
            config.sender_config(),
            HttpConnector::new(config),
            Codec::default(),
            job,
        )
    }

    /// A producer handle for other tasks.
    pub fn handle(&self) -> SenderHandle {
        self.handle.clone()
    }

    pub async fn send(&self, envelope: Envelope) -> Result<(), SenderError> {
        self.handle.send(envelope).await
    }

    pub fn try_send(&self, envelope: Envelope) -> Result<(), SenderError> {
        self.handle.try_send(envelope)
    }

    pub async fn send_resource(
        &self,
        meta: ResourceMeta,
        resource: &dyn Reflect,
    ) -> Result<(), SenderError> {
        self.handle.send_resource(meta, resource).await
    }

    pub async fn report_status(&self, status: JobStatus) -> Result<(), SenderError> {
        self.handle.report_status(status).await
    }

    /// Drain the queue, flush everything pending, and close the connection.
    ///
    /// Returns the ids of every envelope that was enqueued, whether or not
    /// it was confirmed delivered.
    pub async fn finish(self) -> Vec<String> {
        self.finish_with_stats().await.resource_ids
    }

    /// Like [`finish`](Self::finish), also returning delivery statistics.
    pub async fn finish_with_stats(self) -> DeliveryReport {
        let Self { handle, worker } = self;

        if handle.tx.send(Message::Shutdown).await.is_err() {
            debug!("Delivery worker already stopped");
        }
        drop(handle);

        match worker.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Delivery worker failed");
                DeliveryReport::default()
            }
        }
    }
}

/// The single task that owns the pending batch and the connection.
struct DeliveryWorker<C: Connector> {
    rx: mpsc::Receiver<Message>,
    batch: PendingBatch,
    connection: Connection<C>,
    config: SenderConfig,
    resource_ids: Vec<String>,
    /// Statuses waiting for the envelopes queued ahead of them
    held_statuses: Vec<JobStatus>,
    stats: DeliveryStats,
}

impl<C: Connector> DeliveryWorker<C> {
    fn new(rx: mpsc::Receiver<Message>, connector: C, config: SenderConfig) -> Self {
        Self {
            rx,
            batch: PendingBatch::with_capacity(config.max_batch_size),
            connection: Connection::new(connector, config.max_reconnect_retries),
            config,
            resource_ids: Vec::new(),
            held_statuses: Vec::new(),
            stats: DeliveryStats::default(),
        }
    }

    async fn run(mut self) -> DeliveryReport {
        let period = self.config.flush_interval.max(std::time::Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            max_batch_size = self.config.max_batch_size,
            min_batch_size = self.config.min_batch_size,
            flush_interval_secs = period.as_secs(),
            queue_capacity = self.config.queue_capacity,
            "Delivery worker started"
        );

        loop {
            tokio::select! {
                message = self.rx.recv() => {
                    match message {
                        Some(Message::Envelope(envelope)) => self.accept(envelope).await,
                        Some(Message::Status(status)) => self.report(status).await,
                        Some(Message::Shutdown) => {
                            info!(pending = self.batch.len(), "Shutdown requested, draining");
                            break;
                        }
                        None => {
                            info!(pending = self.batch.len(), "All senders dropped, draining");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    self.flush(FlushMode::Soft).await;
                }
            }
        }

        // Anything enqueued by other handles before the close still counts.
        self.rx.close();
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Envelope(envelope) => self.accept(envelope).await,
                Message::Status(status) => self.report(status).await,
                Message::Shutdown => {}
            }
        }

        self.drain().await;
        self.connection.close().await;
        self.stats.reconnects = self.connection.reconnects();

        info!(
            envelopes_received = self.stats.envelopes_received,
            envelopes_transmitted = self.stats.envelopes_transmitted,
            envelopes_abandoned = self.stats.envelopes_abandoned,
            batches_sent = self.stats.batches_sent,
            failed_attempts = self.stats.failed_attempts,
            forced_flushes = self.stats.forced_flushes,
            soft_flushes = self.stats.soft_flushes,
            deferred_soft_flushes = self.stats.deferred_soft_flushes,
            reconnects = self.stats.reconnects,
            "Delivery worker stopped"
        );

        DeliveryReport {
            resource_ids: self.resource_ids,
            stats: self.stats,
        }
    }

    async fn accept(&mut self, envelope: Envelope) {
        self.stats.envelopes_received += 1;
        self.resource_ids.push(envelope.id.clone());
        self.batch.push(envelope);

        if self.batch.is_full(self.config.max_batch_size) {
            debug!(
                batch_size = self.batch.len(),
                "Flushing batch: size threshold reached"
            );
            self.flush(FlushMode::Forced).await;
        }
    }

    /// A status never overtakes the envelopes queued before it. If they
    /// cannot be delivered now, it is held until a later flush succeeds.
    async fn report(&mut self, status: JobStatus) {
        self.held_statuses.push(status);

        if self.flush(FlushMode::Forced).await {
            self.release_statuses().await;
        } else {
            debug!(
                held = self.held_statuses.len(),
                pending = self.batch.len(),
                "Job status held until pending envelopes are delivered"
            );
        }
    }

    async fn release_statuses(&mut self) {
        for status in std::mem::take(&mut self.held_statuses) {
            match self.connection.report(&status).await {
                Ok(()) => info!(job_id = %status.job_id, state = %status.state, "Job status reported"),
                Err(e) => warn!(
                    job_id = %status.job_id,
                    state = %status.state,
                    error = %e,
                    "Failed to report job status"
                ),
            }
        }
    }

    /// Transmits the pending batch if `mode` allows it.
    ///
    /// Returns true when nothing is left pending afterwards.
    async fn flush(&mut self, mode: FlushMode) -> bool {
        match self.batch.decide(mode, self.config.min_batch_size) {
            FlushDecision::Empty => return true,
            FlushDecision::BelowMinimum => {
                self.stats.deferred_soft_flushes += 1;
                debug!(
                    batch_size = self.batch.len(),
                    min_batch_size = self.config.min_batch_size,
                    "Timer flush deferred: batch below minimum"
                );
                return false;
            }
            FlushDecision::Transmit => {}
        }

        match mode {
            FlushMode::Forced => self.stats.forced_flushes += 1,
            FlushMode::Soft => self.stats.soft_flushes += 1,
        }

        let batch_size = self.batch.len();
        match self.connection.transmit(self.batch.as_slice()).await {
            Ok(ack) => {
                self.stats.batches_sent += 1;
                self.stats.envelopes_transmitted += batch_size as u64;
                debug!(
                    batch_size = batch_size,
                    accepted = ack.accepted,
                    mode = ?mode,
                    "Batch transmitted"
                );
                self.batch.clear();
                self.release_statuses().await;
                true
            }
            Err(e) => {
                self.stats.failed_attempts += 1;
                warn!(
                    error = %e,
                    batch_size = batch_size,
                    mode = ?mode,
                    "Batch transmission failed, keeping batch for retry"
                );

                if self.config.reconnect_policy.should_reconnect(&e) {
                    if let Err(e) = self.connection.reconnect().await {
                        error!(error = %e, "Reconnect failed, connection left broken");
                    }
                }
                false
            }
        }
    }

    /// Final forced flushes before shutdown; gives up after `drain_attempts`.
    async fn drain(&mut self) {
        for attempt in 0..self.config.drain_attempts {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt - 1)).await;
            }
            if self.flush(FlushMode::Forced).await {
                break;
            }
        }

        if !self.batch.is_empty() {
            error!(
                abandoned = self.batch.len(),
                attempts = self.config.drain_attempts,
                "Giving up on pending envelopes"
            );
            self.stats.envelopes_abandoned += self.batch.len() as u64;
            self.batch.clear();

            if !self.held_statuses.is_empty() {
                warn!(
                    statuses = self.held_statuses.len(),
                    "Reporting job status after abandoning envelopes queued before it"
                );
            }
        }
        self.release_statuses().await;
    }
}
