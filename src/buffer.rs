//! Buffer scheduling for outgoing envelopes.
//!
//! The delivery worker owns a [`PendingBatch`] and asks it, on every trigger,
//! whether a flush should go out. Two thresholds govern the answer:
//! arrivals that bring the batch to `max_batch_size` force a flush
//! immediately, and timer ticks only flush once at least `min_batch_size`
//! envelopes are waiting.

use std::time::Duration;

use crate::connection::ReconnectPolicy;
use crate::envelope::Envelope;

/// Default capacity of the queue between producers and the delivery worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Default batch size that forces an immediate flush.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Default minimum batch size for a timer-triggered flush.
pub const DEFAULT_MIN_BATCH_SIZE: usize = 10;

/// Default flush timer period.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Default number of final flush attempts during shutdown.
pub const DEFAULT_DRAIN_ATTEMPTS: u32 = 3;

/// Default number of reconnect retries after the first attempt.
pub const DEFAULT_MAX_RECONNECT_RETRIES: u32 = 3;

/// Configuration for the resource sender.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Capacity of the queue; a full queue blocks `send`
    pub queue_capacity: usize,

    /// Batch size at which an arrival forces a flush
    pub max_batch_size: usize,

    /// Batch size below which a timer tick does not flush
    pub min_batch_size: usize,

    /// Period of the flush timer
    pub flush_interval: Duration,

    /// Final flush attempts before remaining envelopes are abandoned
    pub drain_attempts: u32,

    /// Reconnect retries after the first attempt
    pub max_reconnect_retries: u32,

    /// Which transmission failures trigger a reconnect
    pub reconnect_policy: ReconnectPolicy,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            drain_attempts: DEFAULT_DRAIN_ATTEMPTS,
            max_reconnect_retries: DEFAULT_MAX_RECONNECT_RETRIES,
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl SenderConfig {
    /// Create a config with the given batch thresholds and flush interval.
    pub fn new(max_batch_size: usize, min_batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            max_batch_size,
            min_batch_size,
            flush_interval,
            ..Self::default()
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    pub fn with_drain_attempts(mut self, attempts: u32) -> Self {
        self.drain_attempts = attempts;
        self
    }
}

/// What triggered a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Batch reached its maximum size, or the sender is shutting down
    Forced,

    /// Timer tick; deferred while the batch is below the minimum size
    Soft,
}

/// Outcome of asking a batch whether it should be transmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Nothing pending
    Empty,

    /// Soft flush with fewer than the minimum pending
    BelowMinimum,

    Transmit,
}

/// Envelopes accumulated since the last successful transmission, in
/// enqueue order.
#[derive(Debug, Default)]
pub struct PendingBatch {
    envelopes: Vec<Envelope>,
}

impl PendingBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            envelopes: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, envelope: Envelope) {
        self.envelopes.push(envelope);
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn as_slice(&self) -> &[Envelope] {
        &self.envelopes
    }

    /// Whether an arrival has brought the batch to `max_batch_size`.
    pub fn is_full(&self, max_batch_size: usize) -> bool {
        self.envelopes.len() >= max_batch_size
    }

    pub fn decide(&self, mode: FlushMode, min_batch_size: usize) -> FlushDecision {
        if self.envelopes.is_empty() {
            FlushDecision::Empty
        } else if mode == FlushMode::Soft && self.envelopes.len() < min_batch_size {
            FlushDecision::BelowMinimum
        } else {
            FlushDecision::Transmit
        }
    }

    /// Drops everything pending. Only called after a successful
    /// transmission or when the final drain gives up.
    pub fn clear(&mut self) {
        self.envelopes.clear();
    }
}

/// Statistics kept by the delivery worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Envelopes taken off the queue
    pub envelopes_received: u64,

    /// Envelopes in successfully transmitted batches
    pub envelopes_transmitted: u64,

    /// Envelopes given up on during the final drain
    pub envelopes_abandoned: u64,

    pub batches_sent: u64,
    pub failed_attempts: u64,
    pub forced_flushes: u64,
    pub soft_flushes: u64,

    /// Timer ticks that found fewer than the minimum pending
    pub deferred_soft_flushes: u64,

    pub reconnects: u64,
}
