//! Connection management.
//!
//! A [`Connection`] is either open (holds a live [`Link`]) or broken (the
//! link was dropped after a closed-connection failure, or could not be
//! established). Transmitting over a broken connection connects first.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::envelope::Envelope;
use crate::job::JobStatus;
use crate::transport::{Connector, IngestAck, Link, TransportError};

/// Default base delay for exponential backoff (in milliseconds).
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Maximum delay between reconnect attempts (in milliseconds).
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Which transmission failures make the worker re-establish the connection.
///
/// With `OnClosed`, any other failure leaves the link in place and the batch
/// is simply retried on the next trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Reconnect only when the remote end closed the connection
    #[default]
    OnClosed,

    /// Reconnect after every failed transmission
    OnAnyFailure,
}

impl ReconnectPolicy {
    pub fn should_reconnect(&self, err: &TransportError) -> bool {
        match self {
            ReconnectPolicy::OnClosed => err.is_connection_closed(),
            ReconnectPolicy::OnAnyFailure => true,
        }
    }
}

/// Calculate the backoff delay for a given retry attempt.
///
/// Uses exponential backoff with jitter:
/// delay = min(base_delay * 2^attempt + jitter, max_delay)
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let exponential_delay = DEFAULT_BASE_DELAY_MS.saturating_mul(1 << attempt.min(10));

    // Add jitter (up to 25% of the delay)
    let jitter = rand::random::<u64>() % (exponential_delay / 4 + 1);

    let total_delay = exponential_delay
        .saturating_add(jitter)
        .min(MAX_RETRY_DELAY_MS);

    Duration::from_millis(total_delay)
}

/// Owns the link to the ingestion service and re-establishes it on demand.
pub struct Connection<C: Connector> {
    connector: C,
    link: Option<C::Link>,
    max_retries: u32,
    reconnects: u64,
}

impl<C: Connector> Connection<C> {
    /// Creates a broken connection; the first transmission connects.
    pub fn new(connector: C, max_retries: u32) -> Self {
        Self {
            connector,
            link: None,
            max_retries,
            reconnects: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    /// Number of successful re-establishments after the first connect.
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Connects, retrying up to `max_retries` times with backoff.
    ///
    /// # Errors
    ///
    /// Returns the last connect error once all attempts are exhausted; the
    /// connection stays broken.
    pub async fn open(&mut self) -> Result<(), TransportError> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                warn!(
                    attempt = attempt,
                    max_retries = self.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying connect after failure"
                );
                tokio::time::sleep(delay).await;
            }

            match self.connector.connect().await {
                Ok(link) => {
                    debug!(attempts = attempt + 1, "Connection established");
                    self.link = Some(link);
                    return Ok(());
                }
                Err(e) if attempt < self.max_retries => {
                    warn!(error = %e, attempt = attempt + 1, "Connect failed, will retry");
                    attempt += 1;
                }
                Err(e) => {
                    error!(error = %e, attempts = attempt + 1, "Connect failed permanently");
                    return Err(e);
                }
            }
        }
    }

    /// Drops the current link, if any, and connects again.
    pub async fn reconnect(&mut self) -> Result<(), TransportError> {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        self.open().await?;
        self.reconnects += 1;
        info!(reconnects = self.reconnects, "Connection re-established");
        Ok(())
    }

    /// Sends one batch, connecting first if the connection is broken.
    ///
    /// A closed-connection failure marks the connection broken.
    pub async fn transmit(&mut self, envelopes: &[Envelope]) -> Result<IngestAck, TransportError> {
        let link = self.link_mut().await?;
        let result = link.transmit(envelopes).await;
        if let Err(e) = &result {
            if e.is_connection_closed() {
                self.link = None;
            }
        }
        result
    }

    /// Sends a job status, connecting first if the connection is broken.
    pub async fn report(&mut self, status: &JobStatus) -> Result<(), TransportError> {
        let link = self.link_mut().await?;
        let result = link.report(status).await;
        if let Err(e) = &result {
            if e.is_connection_closed() {
                self.link = None;
            }
        }
        result
    }

    /// Releases the link.
    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
            debug!("Connection closed");
        }
    }

    async fn link_mut(&mut self) -> Result<&mut C::Link, TransportError> {
        if self.link.is_none() {
            self.open().await?;
        }
        self.link
            .as_mut()
            .ok_or_else(|| TransportError::Closed("no link after connect".to_string()))
    }
}
